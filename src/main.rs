use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tome_keeper::adapter::Adapter;
use tome_keeper::config::StoreConfig;
use tome_keeper::{api, db, mcp};

#[derive(Parser)]
#[command(name = "tome")]
#[command(about = "Campaign content store for locations, factions, NPCs and quests")]
struct Cli {
    /// Database file (overrides TOME_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Start MCP server via stdio
    Mcp,
    /// Create entities from a JSON file (an array, or an object keyed by id)
    Import {
        /// location, faction, npc or quest
        entity_type: String,
        file: PathBuf,
    },
    /// List store tables, or describe one
    Tables {
        name: Option<String>,
    },
}

/// Initialize tracing with output to stderr (for MCP mode) or stdout
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "tome_keeper=info,tower_http=info".into()),
    );

    if use_stderr {
        // MCP mode: log to stderr so stdout is clean for protocol
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn open_store(db_path: Option<PathBuf>) -> anyhow::Result<db::Database> {
    let mut config = StoreConfig::from_env()?;
    if let Some(path) = db_path {
        config = config.with_db_path(path);
    }
    tracing::debug!(path = %config.db_path.display(), "Opening store");

    let db = db::Database::open_with(&config)?;
    db.migrate()?;
    Ok(db)
}

async fn serve(db: db::Database, port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting Tome Keeper server on port {}", port);

    let app = api::create_router(db);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Tome Keeper listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Items of an import file. Objects keyed by id get the key as their id
/// unless they carry one already.
fn import_items(contents: &str) -> anyhow::Result<Vec<Value>> {
    let parsed: Value = serde_json::from_str(contents).context("Import file is not valid JSON")?;
    match parsed {
        Value::Array(items) => Ok(items),
        Value::Object(entries) => Ok(entries
            .into_iter()
            .map(|(key, mut item)| {
                if let Value::Object(fields) = &mut item {
                    fields.entry("id").or_insert(Value::String(key));
                }
                item
            })
            .collect()),
        _ => anyhow::bail!("Import file must hold an array or an object of entities"),
    }
}

fn import(db: db::Database, entity_type: &str, file: &PathBuf) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let items = import_items(&contents)?;
    let adapter = Adapter::new(db);

    let mut failed = 0;
    for (i, item) in items.iter().enumerate() {
        match adapter.create(entity_type, item) {
            Ok(doc) => {
                let id = doc.get("id").and_then(Value::as_str).unwrap_or_default();
                println!("created {} {}", entity_type, id);
            }
            Err(err) => {
                failed += 1;
                eprintln!("item {}: [{}] {}", i, err.code.as_str(), err.message);
            }
        }
    }

    println!("{} of {} imported", items.len() - failed, items.len());
    if failed > 0 {
        anyhow::bail!("{} item(s) failed to import", failed);
    }
    Ok(())
}

fn tables(db: db::Database, name: Option<String>) -> anyhow::Result<()> {
    let adapter = Adapter::new(db);
    match name {
        None => {
            for table in adapter.list_tables()? {
                println!("{}", table);
            }
        }
        Some(name) => {
            for column in adapter.describe_table(&name)? {
                println!(
                    "{:<24} {:<8}{}{}",
                    column.name,
                    column.data_type,
                    if column.primary_key { " primary key" } else { "" },
                    if column.not_null { " not null" } else { "" },
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // MCP mode needs stderr for logging since stdout is the protocol channel
    let use_stderr = matches!(cli.command, Some(Commands::Mcp));
    init_tracing(use_stderr);

    let db = open_store(cli.db)?;

    match cli.command {
        Some(Commands::Serve { port }) => serve(db, port).await?,
        Some(Commands::Mcp) => mcp::run_stdio_server(db).await?,
        Some(Commands::Import { entity_type, file }) => import(db, &entity_type, &file)?,
        Some(Commands::Tables { name }) => tables(db, name)?,
        None => serve(db, 3000).await?,
    }

    Ok(())
}
