use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

const DEFAULT_TABLE: &str = "packages";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Base path must start with '/' and must not end with '/': {0}")]
    InvalidBasePath(String),

    #[error("Empty history table name")]
    EmptyTable,

    #[error("Timeout cannot be 0")]
    InvalidTimeout,
}

/// Update server configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for update checks and status reports
    pub listener: Listener,
    /// Listener for health and readiness probes
    pub admin_listener: Listener,
    /// Prefix every public route is mounted under, e.g. "/codepush".
    /// Empty mounts the routes at the root.
    #[serde(default)]
    pub base_path: String,
    /// Where package histories are read from
    pub history_store: HistoryStore,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if !self.base_path.is_empty()
            && (!self.base_path.starts_with('/') || self.base_path.ends_with('/'))
        {
            return Err(ValidationError::InvalidBasePath(self.base_path.clone()));
        }

        self.history_store.validate()
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum HistoryStore {
    /// A JSON file mapping deployment keys to their package lists.
    Filesystem { path: PathBuf },
    /// A PostgREST endpoint exposing one row per released package.
    Rest {
        url: Url,
        #[serde(default = "default_table")]
        table: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

impl HistoryStore {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            HistoryStore::Filesystem { .. } => Ok(()),
            HistoryStore::Rest {
                table,
                timeout_secs,
                ..
            } => {
                if table.is_empty() {
                    return Err(ValidationError::EmptyTable);
                }
                if *timeout_secs == 0 {
                    return Err(ValidationError::InvalidTimeout);
                }
                Ok(())
            }
        }
    }
}

fn default_table() -> String {
    DEFAULT_TABLE.into()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
