//! Engine construction and the process-wide engine factory
//!
//! An `EngineFactory` builds its engine at most once: the first `get_engine`
//! resolves the configuration, opens the connection and creates missing
//! tables; later calls return the same `Arc`. Construction runs inside a
//! `OnceCell`, so concurrent first calls still produce a single engine. A
//! failed construction leaves the cell empty and the next call tries again.

use super::mysql::MySqlEngine;
use super::schema::{self, Dialect, SchemaReport};
use super::session::Session;
use super::sqlite::SqliteEngine;
use crate::config::{Backend, ConfigResolver, ConnectionDescriptor};
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;

/// Open connection (SQLite) or pool (MySQL) to the relational backend
pub struct Engine {
    descriptor: ConnectionDescriptor,
    backend: EngineBackend,
}

pub(crate) enum EngineBackend {
    Sqlite(SqliteEngine),
    MySql(MySqlEngine),
}

impl Engine {
    /// Open the backend described by `descriptor`.
    pub async fn connect(descriptor: ConnectionDescriptor) -> Result<Self> {
        let backend = match descriptor.backend {
            Backend::Sqlite => {
                let path = descriptor.database_file.clone().ok_or_else(|| {
                    Error::Configuration("sqlite descriptor without a database file".to_string())
                })?;
                let engine = SqliteEngine::open(&path).map_err(|e| Error::Connection {
                    backend: Backend::Sqlite,
                    message: format!("cannot open {}: {}", path.display(), e),
                })?;
                EngineBackend::Sqlite(engine)
            }
            Backend::MySql => {
                let engine = MySqlEngine::connect(&descriptor.driver_url())
                    .await
                    .map_err(|e| Error::Connection {
                        backend: Backend::MySql,
                        message: format!("MySQL connection failed ({}): {}", descriptor.redacted_url(), e),
                    })?;
                EngineBackend::MySql(engine)
            }
            Backend::MongoDb => {
                return Err(Error::Configuration(
                    "mongodb is a document backend and has no relational engine".to_string(),
                ));
            }
        };
        Ok(Self { descriptor, backend })
    }

    /// In-memory SQLite engine without schema (for testing)
    pub fn sqlite_in_memory() -> Result<Self> {
        Ok(Self {
            descriptor: ConnectionDescriptor {
                backend: Backend::Sqlite,
                url: "sqlite://".to_string(),
                database_file: None,
            },
            backend: EngineBackend::Sqlite(SqliteEngine::open_in_memory()?),
        })
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn backend(&self) -> Backend {
        self.descriptor.backend
    }

    pub fn dialect(&self) -> Dialect {
        match self.backend {
            EngineBackend::Sqlite(_) => Dialect::Sqlite,
            EngineBackend::MySql(_) => Dialect::MySql,
        }
    }

    pub(crate) fn inner(&self) -> &EngineBackend {
        &self.backend
    }

    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        match &self.backend {
            EngineBackend::Sqlite(db) => db.table_exists(name),
            EngineBackend::MySql(db) => db.table_exists(name).await,
        }
    }

    pub(crate) async fn execute_ddl(&self, sql: &str) -> Result<()> {
        match &self.backend {
            EngineBackend::Sqlite(db) => db.execute_batch(sql),
            EngineBackend::MySql(db) => db.execute(sql).await,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.backend())
            .field("url", &self.descriptor.redacted_url())
            .finish()
    }
}

/// Where a factory takes its configuration from
#[derive(Debug, Clone)]
pub(crate) enum ConfigSource {
    /// Settings file and process environment, read at first use
    Environment(Option<PathBuf>),
    Resolver(ConfigResolver),
}

impl ConfigSource {
    pub(crate) fn resolver(&self) -> Result<ConfigResolver> {
        match self {
            ConfigSource::Environment(path) => ConfigResolver::from_env(path.as_deref()),
            ConfigSource::Resolver(resolver) => Ok(resolver.clone()),
        }
    }
}

pub struct EngineFactory {
    source: ConfigSource,
    engine: OnceCell<Arc<Engine>>,
}

static GLOBAL: OnceLock<EngineFactory> = OnceLock::new();

impl EngineFactory {
    pub fn new(resolver: ConfigResolver) -> Self {
        Self { source: ConfigSource::Resolver(resolver), engine: OnceCell::new() }
    }

    /// Factory configured from the environment when the engine is first requested
    pub fn from_env(settings_path: Option<PathBuf>) -> Self {
        Self { source: ConfigSource::Environment(settings_path), engine: OnceCell::new() }
    }

    /// The process-wide factory behind `get_engine` and `get_session`
    pub fn global() -> &'static EngineFactory {
        GLOBAL.get_or_init(|| EngineFactory::from_env(None))
    }

    /// Return the engine, building it on first call
    pub async fn get_engine(&self) -> Result<Arc<Engine>> {
        self.engine.get_or_try_init(|| self.build()).await.cloned()
    }

    pub async fn get_session(&self) -> Result<Session> {
        Ok(Session::new(self.get_engine().await?))
    }

    /// Create missing tables, reporting failures to the caller
    pub async fn create_all_tables(&self) -> Result<SchemaReport> {
        let engine = self.get_engine().await?;
        schema::create_all(&engine).await
    }

    async fn build(&self) -> Result<Arc<Engine>> {
        let resolver = self.source.resolver()?;
        let descriptor = resolver.resolve()?;
        let engine = Engine::connect(descriptor).await?;
        tracing::info!(
            "Opened {} engine at {}",
            engine.backend(),
            engine.descriptor().redacted_url()
        );

        match schema::create_all(&engine).await {
            Ok(report) if !report.created.is_empty() => {
                tracing::info!("Created tables: {}", report.created.join(", "));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Schema creation failed, continuing: {}", e),
        }

        Ok(Arc::new(engine))
    }
}

/// Engine of the process-wide factory
pub async fn get_engine() -> Result<Arc<Engine>> {
    EngineFactory::global().get_engine().await
}

/// Session bound to the process-wide engine
pub async fn get_session() -> Result<Session> {
    EngineFactory::global().get_session().await
}

pub async fn create_all_tables() -> Result<SchemaReport> {
    EngineFactory::global().create_all_tables().await
}
