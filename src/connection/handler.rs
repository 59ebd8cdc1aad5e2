//! Connection Handler
//!
//! Owns the MongoDB client for the lifetime of the process and hands out
//! database handles and repositories bound to it.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. ConnectionHandler::new(config)      no client yet
//!        │
//!        ▼
//! 2. connect().await
//!    ┌──────────────────────────────────────┐
//!    │ build connection string from config  │
//!    │ parse into ClientOptions             │
//!    │ apply app name / selection timeout   │
//!    │ Client::with_options                 │
//!    │ ping the authentication database     │
//!    └──────────────────┬───────────────────┘
//!                       │
//!                       ▼
//! 3. database() / client() / repository()
//! ```
//!
//! The driver pools connections internally, so one handler (or a clone of
//! its `Client`) is shared across the whole process.

use crate::config::ConnectionConfig;
use crate::error::{RepositoryError, Result};
use crate::repository::CollectionRepository;
use crate::storage::MongoStore;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use tracing::{debug, info, warn};

/// Establishes and holds the client session.
#[derive(Debug)]
pub struct ConnectionHandler {
    config: ConnectionConfig,
    client: Option<Client>,
    database: Option<Database>,
}

impl ConnectionHandler {
    /// Stores the configuration; nothing is opened until [`connect`](Self::connect).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            client: None,
            database: None,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.database.is_some()
    }

    /// Opens the client and verifies it with a `ping`.
    ///
    /// Calling it again replaces the held client and database handle.
    ///
    /// # Errors
    ///
    /// `Config` for a connection string the driver cannot parse, `Connection`
    /// when the server is unreachable or rejects the credentials.
    pub async fn connect(&mut self) -> Result<()> {
        let uri = self.config.connection_string()?;

        let mut options = ClientOptions::parse(uri.as_str()).await.map_err(|err| {
            match RepositoryError::from(err) {
                RepositoryError::Driver(err) => RepositoryError::Config(err.to_string()),
                other => other,
            }
        })?;
        if let Some(app_name) = &self.config.app_name {
            options.app_name = Some(app_name.clone());
        }
        if let Some(timeout) = self.config.server_selection_timeout {
            options.server_selection_timeout = Some(timeout);
        }

        let client = Client::with_options(options)?;
        debug!(host = %self.config.host, port = self.config.port, "Client created, verifying session");

        if let Err(err) = client
            .database(&self.config.auth_source)
            .run_command(doc! { "ping": 1 })
            .await
        {
            warn!(
                host = %self.config.host,
                port = self.config.port,
                error = %err,
                "Failed to connect to MongoDB"
            );
            return Err(err.into());
        }

        let database = client.database(&self.config.database);
        info!(
            host = %self.config.host,
            port = self.config.port,
            database = %self.config.database,
            "Connected to MongoDB"
        );

        self.client = Some(client);
        self.database = Some(database);
        Ok(())
    }

    /// The configured database. Fails with `NotConnected` before `connect()`.
    pub fn database(&self) -> Result<&Database> {
        self.database.as_ref().ok_or(RepositoryError::NotConnected)
    }

    pub fn client(&self) -> Result<&Client> {
        self.client.as_ref().ok_or(RepositoryError::NotConnected)
    }

    /// A repository bound to the configured collection.
    pub fn repository(&self) -> Result<CollectionRepository<MongoStore>> {
        let database = self.database()?;
        Ok(CollectionRepository::new(database, &self.config.collection))
    }
}
