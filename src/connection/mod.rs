//! Connection Module
//!
//! Turns a [`ConnectionConfig`](crate::config::ConnectionConfig) into a live
//! MongoDB client and database handle.
//!
//! ## Example
//!
//! ```no_run
//! use docrepo::config::ConnectionConfig;
//! use docrepo::connection::ConnectionHandler;
//!
//! # async fn run() -> docrepo::Result<()> {
//! let mut handler = ConnectionHandler::new(ConnectionConfig::from_env()?);
//! handler.connect().await?;
//!
//! let repo = handler.repository()?;
//! println!("bound to {}", repo.collection_name());
//! # Ok(())
//! # }
//! ```

pub mod handler;

pub use handler::ConnectionHandler;
