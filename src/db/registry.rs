//! Schema registry: how each aggregate is laid out across flat tables.
//!
//! An [`EntitySchema`] names the root table and every owned collection. A
//! collection is either first-level (owned by the root) or a leaf owned by an
//! intermediate collection (a district owns its features). Nesting never goes
//! deeper than two levels.
//!
//! Every child table carries the root's owner column, a `position` column
//! recording insertion order, and the collection's own columns. Leaf tables
//! also carry the key of their intermediate entity.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::models::EntityKind;

/// Column that orders rows of a collection by insertion.
pub const POSITION_COLUMN: &str = "position";

/// Root tables use a single text primary key.
pub const ID_COLUMN: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
}

/// A scalar column. The column name doubles as the JSON field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub required: bool,
    /// Set when the column holds the id of another aggregate (a weak reference).
    pub references: Option<EntityKind>,
}

impl Column {
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            ty: ColumnType::Text,
            required: false,
            references: None,
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self {
            name,
            ty: ColumnType::Integer,
            required: false,
            references: None,
        }
    }

    pub const fn required(self) -> Self {
        Self {
            required: true,
            ..self
        }
    }

    pub const fn references(self, kind: EntityKind) -> Self {
        Self {
            references: Some(kind),
            ..self
        }
    }
}

/// How items of a collection look in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Bare values (`["Stall Row", "Old Mill"]`) stored in the collection's
    /// single column. The value is the item's key.
    Value,
    /// Objects whose `key` columns identify an item within its owner.
    Record { key: &'static [&'static str] },
}

/// Link from a leaf collection to the intermediate collection that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent {
    /// Field of the intermediate collection on the root document.
    pub field: &'static str,
    /// Column in the leaf table holding the intermediate entity's key.
    pub column: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    /// Field holding the collection, on the root document or, for leaves,
    /// on each intermediate item.
    pub field: &'static str,
    pub table: &'static str,
    pub parent: Option<Parent>,
    pub shape: Shape,
    pub columns: &'static [Column],
}

impl Collection {
    pub fn depth(&self) -> u8 {
        if self.parent.is_some() {
            2
        } else {
            1
        }
    }

    pub fn key_columns(&self) -> Vec<&'static str> {
        match self.shape {
            Shape::Value => self.columns.iter().map(|c| c.name).collect(),
            Shape::Record { key } => key.to_vec(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A column anywhere in the registry that names another aggregate's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeakReference {
    pub source: EntityKind,
    pub table: &'static str,
    pub column: &'static str,
    pub target: EntityKind,
    /// True when the reference is a scalar on the root row rather than a link row.
    pub on_root: bool,
}

#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub table: &'static str,
    /// Name of the column that child tables use to point back at the root.
    pub owner_column: &'static str,
    /// Root columns other than the id.
    pub columns: &'static [Column],
    pub collections: &'static [Collection],
}

impl EntitySchema {
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// First-level collections, in declaration order.
    pub fn top_level(&self) -> impl Iterator<Item = &'static Collection> + '_ {
        self.collections.iter().filter(|c| c.parent.is_none())
    }

    pub fn collection(&self, field: &str) -> Option<&'static Collection> {
        self.top_level().find(|c| c.field == field)
    }

    /// Leaf collections owned by the intermediate collection `field`.
    pub fn leaves_of<'a>(
        &'a self,
        field: &'a str,
    ) -> impl Iterator<Item = &'static Collection> + 'a {
        self.collections
            .iter()
            .filter(move |c| matches!(c.parent, Some(p) if p.field == field))
    }

    pub fn leaf(&self, parent_field: &str, field: &str) -> Option<&'static Collection> {
        self.leaves_of(parent_field).find(|c| c.field == field)
    }

    pub fn is_intermediate(&self, collection: &Collection) -> bool {
        collection.parent.is_none() && self.leaves_of(collection.field).next().is_some()
    }

    /// The key column of an intermediate collection. Registry construction
    /// guarantees intermediates have exactly one.
    pub fn intermediate_key(&self, collection: &Collection) -> &'static str {
        match collection.shape {
            Shape::Record { key } => key.first().copied().unwrap_or(ID_COLUMN),
            Shape::Value => collection.columns.first().map(|c| c.name).unwrap_or(ID_COLUMN),
        }
    }

    /// Full column list of a child table, in insertion order: owner column,
    /// intermediate key (leaves only), position, then the item's own columns.
    pub fn child_columns(&self, collection: &Collection) -> Vec<&'static str> {
        let mut columns = vec![self.owner_column];
        if let Some(parent) = collection.parent {
            columns.push(parent.column);
        }
        columns.push(POSITION_COLUMN);
        columns.extend(collection.columns.iter().map(|c| c.name));
        columns
    }

    /// Tables owned by this aggregate, leaves first, so deleting in this order
    /// never leaves a row without its parent.
    pub fn owned_tables_leaves_first(&self) -> Vec<&'static str> {
        let mut tables = Vec::new();
        for collection in self.top_level() {
            tables.extend(self.leaves_of(collection.field).map(|leaf| leaf.table));
            tables.push(collection.table);
        }
        tables
    }

    pub fn weak_references(&self) -> Vec<WeakReference> {
        let root = self.columns.iter().filter_map(|c| {
            c.references.map(|target| WeakReference {
                source: self.kind,
                table: self.table,
                column: c.name,
                target,
                on_root: true,
            })
        });
        let children = self.collections.iter().flat_map(|collection| {
            collection.columns.iter().filter_map(move |c| {
                c.references.map(|target| WeakReference {
                    source: self.kind,
                    table: collection.table,
                    column: c.name,
                    target,
                    on_root: false,
                })
            })
        });
        root.chain(children).collect()
    }
}

/// Startup-time configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("entity kind '{0}' is registered twice")]
    DuplicateEntity(EntityKind),

    #[error("table '{table}' is claimed by both {first} and {second}")]
    DuplicateTable {
        table: &'static str,
        first: String,
        second: String,
    },

    #[error("'{table}.{column}' references another aggregate and must be optional")]
    RequiredRootReference {
        table: &'static str,
        column: &'static str,
    },

    #[error("collection table '{table}' is invalid: {reason}")]
    InvalidCollection {
        table: &'static str,
        reason: &'static str,
    },
}

/// Immutable lookup of every entity schema.
#[derive(Debug)]
pub struct Registry {
    schemas: BTreeMap<EntityKind, &'static EntitySchema>,
}

impl Registry {
    pub fn new(
        schemas: impl IntoIterator<Item = &'static EntitySchema>,
    ) -> Result<Self, RegistryError> {
        let mut by_kind = BTreeMap::new();
        let mut tables: HashMap<&'static str, String> = HashMap::new();

        for schema in schemas {
            if by_kind.insert(schema.kind, schema).is_some() {
                return Err(RegistryError::DuplicateEntity(schema.kind));
            }

            claim_table(&mut tables, schema.table, format!("{} root", schema.kind))?;
            if let Some(column) = schema
                .columns
                .iter()
                .find(|c| c.required && c.references.is_some())
            {
                return Err(RegistryError::RequiredRootReference {
                    table: schema.table,
                    column: column.name,
                });
            }
            for collection in schema.collections {
                check_collection(schema, collection)?;
                claim_table(
                    &mut tables,
                    collection.table,
                    format!("{}.{}", schema.kind, collection.field),
                )?;
            }
        }

        Ok(Self { schemas: by_kind })
    }

    /// Registry holding the four campaign aggregates.
    pub fn standard() -> Result<Self, RegistryError> {
        Self::new([&LOCATION, &FACTION, &NPC, &QUEST])
    }

    pub fn schema(&self, kind: EntityKind) -> Option<&'static EntitySchema> {
        self.schemas.get(&kind).copied()
    }

    pub fn schemas(&self) -> impl Iterator<Item = &'static EntitySchema> + '_ {
        self.schemas.values().copied()
    }

    /// Weak references, from any aggregate, that point at `target`.
    pub fn references_to(&self, target: EntityKind) -> Vec<WeakReference> {
        self.schemas()
            .flat_map(|schema| schema.weak_references())
            .filter(|r| r.target == target)
            .collect()
    }
}

fn claim_table(
    tables: &mut HashMap<&'static str, String>,
    table: &'static str,
    owner: String,
) -> Result<(), RegistryError> {
    if let Some(first) = tables.get(table) {
        return Err(RegistryError::DuplicateTable {
            table,
            first: first.clone(),
            second: owner,
        });
    }
    tables.insert(table, owner);
    Ok(())
}

fn check_collection(schema: &EntitySchema, collection: &Collection) -> Result<(), RegistryError> {
    let invalid = |reason| RegistryError::InvalidCollection {
        table: collection.table,
        reason,
    };

    match collection.shape {
        Shape::Value if collection.columns.len() != 1 => {
            return Err(invalid("value collections need exactly one column"));
        }
        Shape::Record { key } => {
            if key.is_empty() {
                return Err(invalid("record collections need at least one key column"));
            }
            if key.iter().any(|k| collection.column(k).is_none()) {
                return Err(invalid("key column is not declared"));
            }
        }
        _ => {}
    }

    let siblings = schema
        .collections
        .iter()
        .filter(|c| c.parent.map(|p| p.field) == collection.parent.map(|p| p.field))
        .filter(|c| c.field == collection.field)
        .count();
    if siblings > 1 {
        return Err(invalid("field is declared twice under the same owner"));
    }

    if let Some(parent) = collection.parent {
        let owner = schema
            .collections
            .iter()
            .find(|c| c.field == parent.field && c.depth() == 1);
        let Some(owner) = owner else {
            return Err(match schema.collections.iter().any(|c| c.field == parent.field) {
                true => invalid("collections nest at most two levels"),
                false => invalid("parent collection is not declared"),
            });
        };
        match owner.shape {
            Shape::Record { key } if key.len() == 1 => {}
            _ => return Err(invalid("intermediate collections need exactly one key column")),
        }
        if collection.column(parent.column).is_some() || parent.column == schema.owner_column {
            return Err(invalid("parent key column collides with an item column"));
        }
    }

    if collection.column(schema.owner_column).is_some()
        || collection.column(POSITION_COLUMN).is_some()
    {
        return Err(invalid("item column collides with a bookkeeping column"));
    }

    Ok(())
}

// ============================================================
// Campaign aggregates
// ============================================================

const NAME: Column = Column::text("name").required();
const DESCRIPTION: Column = Column::text("description");
const FEATURE: Column = Column::text("feature");
const NPC_REF: Column = Column::text("npc_id").references(EntityKind::Npc).required();
const FACTION_REF: Column = Column::text("faction_id").references(EntityKind::Faction).required();
const QUEST_REF: Column = Column::text("quest_id").references(EntityKind::Quest).required();

const DISTRICTS: Parent = Parent {
    field: "districts",
    column: "district",
};
const AREAS: Parent = Parent {
    field: "areas",
    column: "area",
};

pub static LOCATION: EntitySchema = EntitySchema {
    kind: EntityKind::Location,
    table: "locations",
    owner_column: "location_id",
    columns: &[
        NAME,
        Column::text("type"),
        Column::text("region"),
        DESCRIPTION,
        Column::text("history"),
        Column::text("danger_level"),
        Column::text("faction_control").references(EntityKind::Faction),
    ],
    collections: &[
        Collection {
            field: "notable_features",
            table: "location_features",
            parent: None,
            shape: Shape::Value,
            columns: &[FEATURE],
        },
        Collection {
            field: "npcs",
            table: "location_npcs",
            parent: None,
            shape: Shape::Value,
            columns: &[NPC_REF],
        },
        Collection {
            field: "factions",
            table: "location_factions",
            parent: None,
            shape: Shape::Value,
            columns: &[FACTION_REF],
        },
        Collection {
            field: "points_of_interest",
            table: "location_points_of_interest",
            parent: None,
            shape: Shape::Record { key: &["name"] },
            columns: &[NAME, DESCRIPTION],
        },
        Collection {
            field: "connections",
            table: "location_connections",
            parent: None,
            shape: Shape::Value,
            columns: &[Column::text("connected_id")
                .references(EntityKind::Location)
                .required()],
        },
        Collection {
            field: "districts",
            table: "location_districts",
            parent: None,
            shape: Shape::Record { key: &["name"] },
            columns: &[NAME, DESCRIPTION],
        },
        Collection {
            field: "features",
            table: "district_features",
            parent: Some(DISTRICTS),
            shape: Shape::Value,
            columns: &[FEATURE],
        },
        Collection {
            field: "npcs",
            table: "district_npcs",
            parent: Some(DISTRICTS),
            shape: Shape::Value,
            columns: &[NPC_REF],
        },
        Collection {
            field: "areas",
            table: "location_areas",
            parent: None,
            shape: Shape::Record { key: &["name"] },
            columns: &[NAME, DESCRIPTION],
        },
        Collection {
            field: "features",
            table: "area_features",
            parent: Some(AREAS),
            shape: Shape::Value,
            columns: &[FEATURE],
        },
        Collection {
            field: "encounters",
            table: "area_encounters",
            parent: Some(AREAS),
            shape: Shape::Value,
            columns: &[Column::text("encounter")],
        },
        Collection {
            field: "treasures",
            table: "area_treasures",
            parent: Some(AREAS),
            shape: Shape::Value,
            columns: &[Column::text("treasure")],
        },
        Collection {
            field: "npcs",
            table: "area_npcs",
            parent: Some(AREAS),
            shape: Shape::Value,
            columns: &[NPC_REF],
        },
    ],
};

pub static FACTION: EntitySchema = EntitySchema {
    kind: EntityKind::Faction,
    table: "factions",
    owner_column: "faction_id",
    columns: &[
        NAME,
        Column::text("type"),
        Column::text("alignment"),
        DESCRIPTION,
        Column::text("public_goal"),
        Column::text("true_goal"),
        Column::text("headquarters"),
        Column::text("territory"),
        Column::text("history"),
    ],
    collections: &[
        Collection {
            field: "resources",
            table: "faction_resources",
            parent: None,
            shape: Shape::Value,
            columns: &[Column::text("resource")],
        },
        Collection {
            field: "leadership",
            table: "faction_leadership",
            parent: None,
            shape: Shape::Record { key: &["name"] },
            columns: &[
                NAME,
                Column::text("role"),
                DESCRIPTION,
                Column::text("secret"),
                Column::text("stats"),
                Column::text("bio"),
            ],
        },
        Collection {
            field: "members",
            table: "faction_members",
            parent: None,
            shape: Shape::Record { key: &["name"] },
            columns: &[NAME, DESCRIPTION, Column::text("stats")],
        },
        Collection {
            field: "allies",
            table: "faction_allies",
            parent: None,
            shape: Shape::Value,
            columns: &[Column::text("ally_id")
                .references(EntityKind::Faction)
                .required()],
        },
        Collection {
            field: "enemies",
            table: "faction_enemies",
            parent: None,
            shape: Shape::Value,
            columns: &[Column::text("enemy_id")
                .references(EntityKind::Faction)
                .required()],
        },
        Collection {
            field: "quests",
            table: "faction_quests",
            parent: None,
            shape: Shape::Value,
            columns: &[QUEST_REF],
        },
    ],
};

pub static NPC: EntitySchema = EntitySchema {
    kind: EntityKind::Npc,
    table: "npcs",
    owner_column: "npc_id",
    columns: &[
        NAME,
        Column::text("race"),
        Column::text("gender"),
        Column::text("occupation"),
        Column::text("role"),
        Column::text("quirk"),
        Column::text("background"),
        Column::text("motivation"),
        Column::text("secret"),
        Column::text("stats"),
    ],
    collections: &[
        Collection {
            field: "description",
            table: "npc_descriptions",
            parent: None,
            shape: Shape::Value,
            columns: &[DESCRIPTION],
        },
        Collection {
            field: "personality",
            table: "npc_personality_traits",
            parent: None,
            shape: Shape::Value,
            columns: &[Column::text("trait")],
        },
        Collection {
            field: "inventory",
            table: "npc_inventory",
            parent: None,
            shape: Shape::Value,
            columns: &[Column::text("item")],
        },
        Collection {
            field: "quests",
            table: "npc_quests",
            parent: None,
            shape: Shape::Record { key: &["quest_id"] },
            columns: &[QUEST_REF, DESCRIPTION],
        },
        Collection {
            field: "relationships",
            table: "npc_relationships",
            parent: None,
            shape: Shape::Record { key: &["target_id"] },
            columns: &[
                Column::text("target_id")
                    .references(EntityKind::Npc)
                    .required(),
                DESCRIPTION,
            ],
        },
        Collection {
            field: "locations",
            table: "npc_locations",
            parent: None,
            shape: Shape::Record {
                key: &["location_id"],
            },
            columns: &[
                Column::text("location_id")
                    .references(EntityKind::Location)
                    .required(),
                DESCRIPTION,
            ],
        },
    ],
};

const STAGES: Parent = Parent {
    field: "stages",
    column: "stage",
};
const DECISION_POINTS: Parent = Parent {
    field: "decision_points",
    column: "decision",
};

pub static QUEST: EntitySchema = EntitySchema {
    kind: EntityKind::Quest,
    table: "quests",
    owner_column: "quest_id",
    columns: &[
        Column::text("title").required(),
        Column::text("type"),
        Column::text("difficulty"),
        DESCRIPTION,
    ],
    collections: &[
        Collection {
            field: "stages",
            table: "quest_stages",
            parent: None,
            shape: Shape::Record { key: &["stage"] },
            columns: &[
                Column::integer("stage").required(),
                Column::text("title"),
                DESCRIPTION,
            ],
        },
        Collection {
            field: "objectives",
            table: "quest_objectives",
            parent: Some(STAGES),
            shape: Shape::Value,
            columns: &[Column::text("objective")],
        },
        Collection {
            field: "completion_paths",
            table: "quest_completion_paths",
            parent: Some(STAGES),
            shape: Shape::Record {
                key: &["path_name"],
            },
            columns: &[
                Column::text("path_name").required(),
                DESCRIPTION,
                Column::text("challenges"),
                Column::text("outcomes"),
            ],
        },
        Collection {
            field: "decision_points",
            table: "quest_decision_points",
            parent: None,
            shape: Shape::Record {
                key: &["decision"],
            },
            columns: &[
                Column::text("decision").required(),
                Column::integer("stage"),
                DESCRIPTION,
            ],
        },
        Collection {
            field: "choices",
            table: "quest_decision_choices",
            parent: Some(DECISION_POINTS),
            shape: Shape::Record { key: &["choice"] },
            columns: &[
                Column::text("choice").required(),
                Column::text("consequences"),
            ],
        },
        Collection {
            field: "twists",
            table: "quest_twists",
            parent: None,
            shape: Shape::Value,
            columns: &[Column::text("twist")],
        },
        Collection {
            field: "rewards",
            table: "quest_rewards",
            parent: None,
            shape: Shape::Record {
                key: &["path", "reward"],
            },
            columns: &[
                Column::text("path").required(),
                Column::text("reward").required(),
            ],
        },
        Collection {
            field: "follow_up_quests",
            table: "quest_follow_ups",
            parent: None,
            shape: Shape::Record {
                key: &["path", "follow_up_id"],
            },
            columns: &[
                Column::text("path").required(),
                Column::text("follow_up_id")
                    .references(EntityKind::Quest)
                    .required(),
            ],
        },
        Collection {
            field: "related_quests",
            table: "quest_related",
            parent: None,
            shape: Shape::Value,
            columns: &[Column::text("related_id")
                .references(EntityKind::Quest)
                .required()],
        },
        Collection {
            field: "associated_npcs",
            table: "quest_associated_npcs",
            parent: None,
            shape: Shape::Record { key: &["npc_id"] },
            columns: &[NPC_REF, Column::text("role")],
        },
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_is_valid() {
        let registry = Registry::standard().unwrap();
        assert_eq!(registry.schemas().count(), 4);
        assert_eq!(
            registry.schema(EntityKind::Location).map(|s| s.table),
            Some("locations")
        );
    }

    #[test]
    fn rejects_two_collections_claiming_one_table() {
        static CLASHING: EntitySchema = EntitySchema {
            kind: EntityKind::Npc,
            table: "factions",
            owner_column: "npc_id",
            columns: &[],
            collections: &[],
        };

        let err = Registry::new([&FACTION, &CLASHING]).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::DuplicateTable {
                table: "factions",
                ..
            }
        ));
    }

    #[test]
    fn rejects_registering_a_kind_twice() {
        let err = Registry::new([&NPC, &NPC]).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateEntity(EntityKind::Npc));
    }

    #[test]
    fn rejects_three_level_nesting() {
        static DEEP: EntitySchema = EntitySchema {
            kind: EntityKind::Location,
            table: "deep_roots",
            owner_column: "root_id",
            columns: &[],
            collections: &[
                Collection {
                    field: "rooms",
                    table: "deep_rooms",
                    parent: None,
                    shape: Shape::Record { key: &["name"] },
                    columns: &[NAME],
                },
                Collection {
                    field: "shelves",
                    table: "deep_shelves",
                    parent: Some(Parent {
                        field: "rooms",
                        column: "room",
                    }),
                    shape: Shape::Record { key: &["name"] },
                    columns: &[NAME],
                },
                Collection {
                    field: "books",
                    table: "deep_books",
                    parent: Some(Parent {
                        field: "shelves",
                        column: "shelf",
                    }),
                    shape: Shape::Value,
                    columns: &[Column::text("title")],
                },
            ],
        };

        let err = Registry::new([&DEEP]).unwrap_err();
        assert_eq!(
            err,
            RegistryError::InvalidCollection {
                table: "deep_books",
                reason: "collections nest at most two levels",
            }
        );
    }

    #[test]
    fn location_has_two_independent_intermediates() {
        let intermediates: Vec<_> = LOCATION
            .top_level()
            .filter(|c| LOCATION.is_intermediate(c))
            .map(|c| c.field)
            .collect();
        assert_eq!(intermediates, vec!["districts", "areas"]);
        assert_eq!(LOCATION.leaves_of("districts").count(), 2);
        assert_eq!(LOCATION.leaves_of("areas").count(), 4);
    }

    #[test]
    fn leaf_tables_come_before_their_intermediate() {
        let order = LOCATION.owned_tables_leaves_first();
        let pos = |t: &str| order.iter().position(|x| *x == t).unwrap();
        assert!(pos("district_features") < pos("location_districts"));
        assert!(pos("area_treasures") < pos("location_areas"));
        assert_eq!(order.len(), LOCATION.collections.len());
    }

    #[test]
    fn child_columns_thread_parent_keys() {
        let leaf = LOCATION.leaf("areas", "treasures").unwrap();
        assert_eq!(
            LOCATION.child_columns(leaf),
            vec!["location_id", "area", "position", "treasure"]
        );
    }

    #[test]
    fn finds_inbound_references() {
        let registry = Registry::standard().unwrap();
        let to_faction = registry.references_to(EntityKind::Faction);
        let tables: Vec<_> = to_faction.iter().map(|r| (r.table, r.column)).collect();
        assert!(tables.contains(&("locations", "faction_control")));
        assert!(tables.contains(&("faction_allies", "ally_id")));
        assert!(to_faction
            .iter()
            .any(|r| r.on_root && r.column == "faction_control"));
    }
}
