//! docrepo - demo runner
//!
//! Connects to MongoDB (or an in-process store with `--memory`) and walks a
//! sample order through every repository operation, logging each result.

use anyhow::Context;
use clap::Parser;
use docrepo::storage::{start_expiry_sweeper, DocumentStore, MemoryStore};
use docrepo::{CollectionRepository, ConnectionConfig, ConnectionHandler, Increment, SortOrder};
use mongodb::bson::{doc, DateTime};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line flags. Each one overrides the matching `MONGO_*` variable.
#[derive(Debug, Parser)]
#[command(name = "docrepo")]
#[command(version = docrepo::VERSION)]
#[command(about = "Run the sample order scenario against a MongoDB collection")]
struct Args {
    /// MongoDB host
    #[arg(long)]
    host: Option<String>,

    /// MongoDB port
    #[arg(short, long)]
    port: Option<u16>,

    /// Database name
    #[arg(short, long)]
    database: Option<String>,

    /// Collection name
    #[arg(short, long)]
    collection: Option<String>,

    /// Use the in-process store instead of a server
    #[arg(long)]
    memory: bool,
}

impl Args {
    fn apply(self, config: &mut ConnectionConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(database) = self.database {
            config.database = database;
        }
        if let Some(collection) = self.collection {
            config.collection = collection;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let memory = args.memory;
    let mut config = ConnectionConfig::from_env().context("invalid MONGO_* configuration")?;
    args.apply(&mut config);

    info!("docrepo v{}", docrepo::VERSION);

    if memory {
        let store = Arc::new(MemoryStore::new(config.collection.clone()));
        let _sweeper = start_expiry_sweeper(Arc::clone(&store));
        run_scenario(&CollectionRepository::with_store(Arc::clone(&store))).await?;
        info!(stats = ?store.stats(), "Memory store finished");
    } else {
        let mut handler = ConnectionHandler::new(config);
        handler
            .connect()
            .await
            .context("could not connect to MongoDB")?;
        run_scenario(&handler.repository()?).await?;
    }

    Ok(())
}

/// The sample order walk-through.
async fn run_scenario<S: DocumentStore>(repo: &CollectionRepository<S>) -> anyhow::Result<()> {
    let order = doc! {
        "name": "test",
        "address": "any",
        "requests": { "pizza": 2, "hamburguer": 5, "refri": 3 },
        "Numeros": [1, 2],
    };
    let order = repo.insert_document(order).await?;
    let id = order.get_object_id("_id")?.to_hex();
    info!(%id, "Inserted order");

    let many = repo.select_many(doc! { "name": "test" }).await?;
    info!(documents = ?many, "select_many");
    let one = repo.select_one(doc! { "name": "test" }).await?;
    info!(document = ?one, "select_one");
    let with_id = repo.select_if_property_exists("_id").await?;
    info!(documents = ?with_id, "select_if_property_exists");
    let ordered = repo
        .select_many_ordered("pizza", doc! { "name": "test" }, SortOrder::Descending)
        .await?;
    info!(documents = ?ordered, "select_many_ordered");
    let either = repo.select_or(doc! { "name": "test" }, "ola").await?;
    info!(documents = ?either, "select_or");
    let by_id = repo.select_by_object_id(&id).await?;
    info!(documents = ?by_id, "select_by_object_id");

    let modified = repo.edit_registry(&id, doc! { "Estou": "aqui" }).await?;
    info!(modified, "edit_registry");

    let modified = repo
        .edit_many_registries(doc! { "Numeros": 1 }, doc! { "Numeros.0": 0 })
        .await?;
    info!(modified, "edit_many_registries");

    let modified = repo
        .edit_many_increment(
            doc! { "_id": order.get_object_id("_id")? },
            &Increment::new().field("Numeros.1", 4).field("requests.pizza", 4),
        )
        .await?;
    info!(modified, "edit_many_increment");

    let deleted = repo.delete_registry(doc! { "Estou": "aqui" }, None).await?;
    info!(deleted, "delete_registry");

    repo.create_index_ttl("creation_date", Duration::from_secs(15))
        .await?;
    info!("TTL index ready on creation_date (15s)");

    let alan = repo
        .insert_document(doc! { "name": "Alan", "age": 26, "creation_date": DateTime::now() })
        .await?;
    info!(document = ?alan, "Inserted timestamped document");

    Ok(())
}
