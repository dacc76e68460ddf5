//! # fcircle-store - Friend circle persistence layer
//!
//! Stores subscribed friend sites and the posts fetched from their feeds.
//!
//! fcircle-store provides:
//! - Settings and environment driven backend selection (SQLite, MySQL, MongoDB)
//! - SQLite path resolution with a seed-copy fallback for read-only deployments
//! - A process-wide engine factory that materializes the schema on first use
//! - Sessions exposing record operations over friends and posts

pub mod config;
pub mod storage;
pub mod ui;

use std::path::PathBuf;

// Re-exports for convenient access
pub use config::{Backend, ConfigResolver, ConnectionDescriptor, Environment, Platform, Settings};
pub use storage::{
    Engine, EngineFactory, Friend, FriendCircleStore, Post, PostQuery, Record, Session, SortRule,
    create_all_tables, get_engine, get_session, open_store,
};

/// Result type alias for fcircle-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for fcircle-store operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(&'static str),

    #[error("Database file not found: {}", .0.display())]
    DataFileNotFound(PathBuf),

    #[error("Failed to connect to {backend}: {message}")]
    Connection { backend: Backend, message: String },

    #[error("Failed to create table `{table}`: {message}")]
    SchemaCreation { table: String, message: String },

    #[error("Unknown sort rule: {0} (expected `created` or `updated`)")]
    InvalidSortRule(String),

    #[error("Invalid range: start {start} is greater than end {end}")]
    InvalidRange { start: usize, end: usize },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("MySQL error: {0}")]
    MySql(#[from] sqlx::Error),

    #[error("MongoDB error: {0}")]
    Document(#[from] mongodb::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
