//! Settings, environment and connection resolution
//!
//! Decides which backend to use and how to reach it:
//! - `Settings` come from a TOML file (`fc_settings.toml` by default)
//! - `Environment` captures the process variables once (`DEBUG`, `MYSQL_URI`, ...)
//! - `ConfigResolver` combines both into a `ConnectionDescriptor`

use crate::storage::path::PathResolver;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEBUG_VAR: &str = "DEBUG";
pub const MYSQL_URI_VAR: &str = "MYSQL_URI";
pub const MONGODB_URI_VAR: &str = "MONGODB_URI";
pub const VERCEL_VAR: &str = "VERCEL";
pub const SETTINGS_PATH_VAR: &str = "FCIRCLE_SETTINGS";

pub const SQLITE_SCHEME: &str = "sqlite";
pub const SQLITE_OPTIONS: &str = "check_same_thread=False";
/// Scheme used in MySQL descriptors; the `+sqlx` tag names the driver.
pub const MYSQL_SCHEME: &str = "mysql+sqlx";
pub const MYSQL_CHARSET_OPTION: &str = "charset=utf8mb4";

/// Database backend selected by the `database` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Sqlite,
    MySql,
    MongoDb,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::MySql => "mysql",
            Backend::MongoDb => "mongodb",
        }
    }

    /// Whether the backend stores records in tables
    pub fn is_relational(&self) -> bool {
        !matches!(self, Backend::MongoDb)
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "mysql" => Ok(Backend::MySql),
            "mongodb" => Ok(Backend::MongoDb),
            _ => Err(Error::Configuration(format!("unsupported database backend: {}", s))),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Platform family, which decides the SQLite URL prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) { Platform::Windows } else { Platform::Unix }
    }
}

/// Development MySQL credentials, used when `DEBUG` is on.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MySqlCredentials {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl Default for MySqlCredentials {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            password: "123456".to_string(),
            host: "localhost".to_string(),
            port: 3306,
            database: "test".to_string(),
        }
    }
}

impl MySqlCredentials {
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}@{}:{}/{}?{}",
            MYSQL_SCHEME, self.user, self.password, self.host, self.port, self.database, MYSQL_CHARSET_OPTION
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevSettings {
    pub mysql: MySqlCredentials,
    pub mongodb_uri: String,
}

impl Default for DevSettings {
    fn default() -> Self {
        Self {
            mysql: MySqlCredentials::default(),
            mongodb_uri: "mongodb://localhost:27017".to_string(),
        }
    }
}

/// User settings file.
///
/// Upper-case keys from older settings files are accepted as aliases.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(alias = "DATABASE")]
    pub database: String,
    #[serde(alias = "DEPLOY_TYPE")]
    pub deploy_type: String,
    /// Posts whose `updated` date is older than this many days are cleaned up
    #[serde(alias = "OUTDATE_CLEAN")]
    pub outdate_clean: usize,
    /// Install directory holding `data.db` (defaults to the working directory)
    pub base_path: Option<PathBuf>,
    /// Always-writable directory (defaults to the OS temp directory)
    pub scratch_dir: Option<PathBuf>,
    pub dev: DevSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: Backend::Sqlite.as_str().to_string(),
            deploy_type: String::new(),
            outdate_clean: 60,
            base_path: None,
            scratch_dir: None,
            dev: DevSettings::default(),
        }
    }
}

impl Settings {
    /// Vercel deployments mount the install directory read-only
    pub fn is_read_only_deploy(&self) -> bool {
        self.deploy_type.eq_ignore_ascii_case("vercel")
    }
}

pub fn default_settings_path() -> PathBuf {
    std::env::var_os(SETTINGS_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("fc_settings.toml"))
}

/// Load settings, falling back to defaults when the file does not exist.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_settings_path);
    if !path.exists() {
        tracing::debug!("No settings file at {}, using defaults", path.display());
        return Ok(Settings::default());
    }

    let contents = std::fs::read_to_string(&path)?;
    let settings: Settings = toml::from_str(&contents)?;
    Ok(settings)
}

/// Process environment relevant to connection resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub debug: bool,
    pub mysql_uri: Option<String>,
    pub mongodb_uri: Option<String>,
    pub vercel: bool,
}

impl Environment {
    /// Read the environment, loading a `.env` file first if one exists
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            debug: non_empty(DEBUG_VAR).is_some_and(|v| is_truthy(&v)),
            mysql_uri: non_empty(MYSQL_URI_VAR),
            mongodb_uri: non_empty(MONGODB_URI_VAR),
            vercel: non_empty(VERCEL_VAR).is_some_and(|v| is_truthy(&v)),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !(value == "0" || value.eq_ignore_ascii_case("false"))
}

/// Everything needed to open a connection to the configured backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub backend: Backend,
    /// Canonical connection string
    pub url: String,
    /// Local database file, for file-backed backends
    pub database_file: Option<PathBuf>,
}

impl ConnectionDescriptor {
    pub fn sqlite(platform: Platform, path: PathBuf) -> Self {
        Self {
            backend: Backend::Sqlite,
            url: sqlite_url(platform, &path),
            database_file: Some(path),
        }
    }

    pub fn mysql(url: String) -> Self {
        Self { backend: Backend::MySql, url, database_file: None }
    }

    pub fn mongodb(url: String) -> Self {
        Self { backend: Backend::MongoDb, url, database_file: None }
    }

    /// URL in the form the driver parses (`mysql+sqlx://` becomes `mysql://`)
    pub fn driver_url(&self) -> String {
        match self.url.strip_prefix(MYSQL_SCHEME) {
            Some(rest) if self.backend == Backend::MySql => format!("mysql{}", rest),
            _ => self.url.clone(),
        }
    }

    /// URL with the password masked, for logs and terminal output
    pub fn redacted_url(&self) -> String {
        redact_url(&self.url)
    }
}

/// Build the SQLite connection string for `path`.
///
/// Windows keeps the path as given after `sqlite:///`; other platforms use
/// `sqlite:////` followed by the absolute path without its leading separator.
pub fn sqlite_url(platform: Platform, path: &Path) -> String {
    let path = path.to_string_lossy();
    match platform {
        Platform::Windows => format!("{}:///{}?{}", SQLITE_SCHEME, path, SQLITE_OPTIONS),
        Platform::Unix => format!(
            "{}:////{}?{}",
            SQLITE_SCHEME,
            path.trim_start_matches('/'),
            SQLITE_OPTIONS
        ),
    }
}

/// Rewrite a `mysql://` URI to the driver scheme and append the charset option.
pub fn normalize_mysql_uri(uri: &str) -> String {
    let uri = uri.trim();
    let mut normalized = match uri.strip_prefix("mysql://") {
        Some(rest) => format!("{}://{}", MYSQL_SCHEME, rest),
        None => uri.to_string(),
    };
    normalized.push(if normalized.contains('?') { '&' } else { '?' });
    normalized.push_str(MYSQL_CHARSET_OPTION);
    normalized
}

pub fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let prefix = &url[..scheme_end + 3];
    let rest = &url[scheme_end + 3..];
    let authority = &rest[..rest.find('/').unwrap_or(rest.len())];
    let Some(at) = authority.rfind('@') else {
        return url.to_string();
    };
    let Some(colon) = authority[..at].find(':') else {
        return url.to_string();
    };
    format!("{}{}:***{}", prefix, &authority[..colon], &rest[at..])
}

/// Turns settings and environment into a `ConnectionDescriptor`.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    settings: Settings,
    env: Environment,
    platform: Platform,
}

impl ConfigResolver {
    pub fn new(settings: Settings, env: Environment, platform: Platform) -> Self {
        Self { settings, env, platform }
    }

    /// Resolver for the current process: settings file, `.env` and variables
    pub fn from_env(settings_path: Option<&Path>) -> Result<Self> {
        let env = Environment::from_env();
        let settings = load_settings(settings_path)?;
        Ok(Self::new(settings, env, Platform::current()))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn backend(&self) -> Result<Backend> {
        self.settings.database.parse()
    }

    /// The seed-copy fallback applies to read-only production deployments off Windows
    pub fn read_only_fallback(&self) -> bool {
        !self.env.debug
            && self.platform != Platform::Windows
            && (self.settings.is_read_only_deploy() || self.env.vercel)
    }

    pub fn path_resolver(&self) -> Result<PathResolver> {
        let base = match &self.settings.base_path {
            Some(path) => path.clone(),
            None => std::env::current_dir()?,
        };
        let scratch = self.settings.scratch_dir.clone().unwrap_or_else(std::env::temp_dir);
        Ok(PathResolver::new(std::path::absolute(base)?, scratch)
            .with_read_only_fallback(self.read_only_fallback()))
    }

    /// Resolve the descriptor for the configured backend.
    ///
    /// The backend name is validated before any filesystem or network work.
    pub fn resolve(&self) -> Result<ConnectionDescriptor> {
        match self.backend()? {
            Backend::Sqlite => {
                let resolved = self.path_resolver()?.resolve()?;
                Ok(ConnectionDescriptor::sqlite(self.platform, resolved.path))
            }
            Backend::MySql => Ok(ConnectionDescriptor::mysql(self.mysql_uri()?)),
            Backend::MongoDb => Ok(ConnectionDescriptor::mongodb(self.mongodb_uri()?)),
        }
    }

    fn mysql_uri(&self) -> Result<String> {
        if self.env.debug {
            return Ok(self.settings.dev.mysql.url());
        }
        let uri = self
            .env
            .mysql_uri
            .as_deref()
            .ok_or(Error::MissingEnvironmentVariable(MYSQL_URI_VAR))?;
        Ok(normalize_mysql_uri(uri))
    }

    fn mongodb_uri(&self) -> Result<String> {
        if self.env.debug {
            return Ok(self.settings.dev.mongodb_uri.clone());
        }
        self.env
            .mongodb_uri
            .clone()
            .ok_or(Error::MissingEnvironmentVariable(MONGODB_URI_VAR))
    }
}
