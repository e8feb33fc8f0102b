//! MCP server integration tests.
//!
//! Exercise the tool logic through the `test_*` helpers, against an in-memory
//! store.

use serde_json::json;
use tome_keeper::db::Database;
use tome_keeper::mcp::McpServer;
use tome_keeper::models::*;

/// Helper to create a test MCP server with in-memory database.
fn setup() -> (McpServer, Database) {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    let server = McpServer::new(db.clone());
    (server, db)
}

mod create_entity {
    use super::*;

    #[tokio::test]
    async fn returns_the_stored_entity_with_an_id() {
        let (server, _db) = setup();

        let entity = server
            .test_create_entity(
                "faction",
                &json!({
                    "name": "The Ashen Court",
                    "leadership": [{"name": "Vess", "role": "Regent"}]
                }),
            )
            .expect("create failed");

        assert!(entity["id"].as_str().is_some());
        assert_eq!(entity["leadership"][0]["name"], json!("Vess"));
        assert_eq!(entity["members"], json!([]));
    }

    #[tokio::test]
    async fn rejects_unknown_entity_types() {
        let (server, _db) = setup();

        let result = server.test_create_entity("dragon", &json!({"name": "Smaug"}));

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_invalid_payloads_without_writing() {
        let (server, db) = setup();

        let result = server.test_create_entity("npc", &json!({"race": "Elf"}));

        assert!(result.is_err());
        assert!(db.list_ids(EntityKind::Npc).unwrap().is_empty());
    }
}

mod get_entity {
    use super::*;

    #[tokio::test]
    async fn returns_nested_collections() {
        let (server, db) = setup();
        let id = db
            .create(&Quest {
                title: "The Drowned Bell".to_string(),
                stages: vec![Stage {
                    stage: 1,
                    objectives: vec!["Find the bell".to_string()],
                    ..Default::default()
                }],
                ..Default::default()
            })
            .unwrap();

        let quest = server.test_get_entity("quest", &id).expect("get failed");

        assert_eq!(quest["stages"][0]["objectives"], json!(["Find the bell"]));
    }

    #[tokio::test]
    async fn errors_for_missing_entity() {
        let (server, _db) = setup();

        let err = server.test_get_entity("quest", "missing").unwrap_err();

        assert_eq!(err.data, Some(json!({"code": "not_found"})));
    }
}

mod update_entity {
    use super::*;

    #[tokio::test]
    async fn replaces_named_collections_only() {
        let (server, db) = setup();
        let id = db
            .create(&Npc {
                name: "Mirela".to_string(),
                inventory: vec!["lantern".to_string()],
                personality: vec!["wry".to_string()],
                ..Default::default()
            })
            .unwrap();

        let npc = server
            .test_update_entity("npc", &id, &json!({"inventory": ["rope", "chalk"]}))
            .expect("update failed");

        assert_eq!(npc["inventory"], json!(["rope", "chalk"]));
        assert_eq!(npc["personality"], json!(["wry"]));
    }

    #[tokio::test]
    async fn reports_missing_references() {
        let (server, db) = setup();
        let id = db
            .create(&Faction {
                name: "Lantern Watch".to_string(),
                ..Default::default()
            })
            .unwrap();

        let err = server
            .test_update_entity("faction", &id, &json!({"allies": ["nobody"]}))
            .unwrap_err();

        assert_eq!(err.data, Some(json!({"code": "foreign_key_violation"})));
    }
}

mod delete_entity {
    use super::*;

    #[tokio::test]
    async fn deletes_then_reports_not_found() {
        let (server, db) = setup();
        let id = db
            .create(&Location {
                name: "Ravenhollow".to_string(),
                ..Default::default()
            })
            .unwrap();

        let response = server.test_delete_entity("location", &id).expect("delete failed");
        assert!(response.deleted);
        assert_eq!(response.id, id);

        assert!(server.test_delete_entity("location", &id).is_err());
        assert!(!db.exists(EntityKind::Location, &id).unwrap());
    }
}

mod list_entities {
    use super::*;

    #[tokio::test]
    async fn lists_every_entity_of_a_type() {
        let (server, _db) = setup();
        server
            .test_create_entity("npc", &json!({"name": "Mirela"}))
            .unwrap();
        server
            .test_create_entity("npc", &json!({"name": "Osric"}))
            .unwrap();
        server
            .test_create_entity("faction", &json!({"name": "Guild"}))
            .unwrap();

        let response = server.test_list_entities("npcs").expect("list failed");

        assert_eq!(response.count, 2);
        assert_eq!(response.entities.len(), 2);
    }
}

mod diagnostics {
    use super::*;

    #[tokio::test]
    async fn lists_and_describes_tables() {
        let (server, _db) = setup();

        let tables = server.test_list_tables().expect("list failed");
        assert!(tables.tables.contains(&"district_features".to_string()));

        let description = server
            .test_describe_table("district_features")
            .expect("describe failed");
        let columns: Vec<_> = description.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(columns, vec!["location_id", "district", "position", "feature"]);
    }

    #[tokio::test]
    async fn describing_an_unknown_table_is_an_error() {
        let (server, _db) = setup();

        assert!(server.test_describe_table("dragons").is_err());
    }
}
