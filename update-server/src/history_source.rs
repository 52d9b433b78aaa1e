//! Sources of package history snapshots.
//!
//! The update check handler asks a [`HistorySource`] for the releases of one
//! deployment on every request. Sources never cache across requests; each
//! fetch returns the history as currently stored.

use crate::config::HistoryStore;
use acquisition::{BlobInfo, Package, PackageHistory};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use url::Url;

const BASE_DELAY: u64 = 500;
const MAX_RETRIES: u32 = 3;

const SELECT_COLUMNS: &str = "app_version,blob_url,description,diff_package_map,is_disabled,\
    is_mandatory,label,manifest_blob_url,package_hash,rollout,size";

#[derive(thiserror::Error, Debug)]
pub enum HistorySourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse package history: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("history request failed: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("history store unavailable")]
    RetriesExceeded,

    #[error("history store responded with {0}")]
    UnexpectedStatus(StatusCode),
}

#[async_trait]
pub trait HistorySource: Send + Sync {
    /// The releases of `deployment_key`, oldest first. `None` when the
    /// deployment is unknown.
    async fn fetch_history(
        &self,
        deployment_key: &str,
    ) -> Result<Option<PackageHistory>, HistorySourceError>;

    fn is_ready(&self) -> bool {
        true
    }
}

/// Builds the history source described by the config.
pub fn get_source(store: &HistoryStore) -> Result<Arc<dyn HistorySource>, HistorySourceError> {
    match store {
        HistoryStore::Filesystem { path } => {
            Ok(Arc::new(FilesystemHistorySource::new(path.clone())))
        }
        HistoryStore::Rest {
            url,
            table,
            api_key,
            timeout_secs,
        } => Ok(Arc::new(RestHistorySource::new(
            url,
            table,
            api_key.clone(),
            Duration::from_secs(*timeout_secs),
        )?)),
    }
}

fn into_history(packages: Option<Vec<Package>>) -> Option<PackageHistory> {
    packages.map(PackageHistory::new)
}

/// Reads a JSON document of the form `{"<deployment key>": [package, ...]}`.
pub struct FilesystemHistorySource {
    path: PathBuf,
}

impl FilesystemHistorySource {
    pub fn new(path: PathBuf) -> Self {
        FilesystemHistorySource { path }
    }
}

#[async_trait]
impl HistorySource for FilesystemHistorySource {
    async fn fetch_history(
        &self,
        deployment_key: &str,
    ) -> Result<Option<PackageHistory>, HistorySourceError> {
        let contents = tokio::fs::read(&self.path).await?;
        let mut deployments: HashMap<String, Vec<Package>> = serde_json::from_slice(&contents)?;
        Ok(into_history(deployments.remove(deployment_key)))
    }

    fn is_ready(&self) -> bool {
        self.path.is_file()
    }
}

/// A package row as exposed by the REST store.
#[derive(Deserialize)]
struct PackageRow {
    app_version: String,
    #[serde(default)]
    blob_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    diff_package_map: Option<HashMap<String, BlobInfo>>,
    #[serde(default)]
    is_disabled: Option<bool>,
    #[serde(default)]
    is_mandatory: Option<bool>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    manifest_blob_url: Option<String>,
    package_hash: String,
    #[serde(default)]
    rollout: Option<u8>,
    #[serde(default)]
    size: Option<u64>,
}

impl From<PackageRow> for Package {
    fn from(row: PackageRow) -> Self {
        Package {
            app_version: row.app_version,
            blob_url: row.blob_url.unwrap_or_default(),
            description: row.description.unwrap_or_default(),
            diff_package_map: row.diff_package_map,
            is_disabled: row.is_disabled.unwrap_or_default(),
            is_mandatory: row.is_mandatory.unwrap_or_default(),
            label: row.label,
            manifest_blob_url: row.manifest_blob_url.unwrap_or_default(),
            package_hash: row.package_hash,
            rollout: row.rollout,
            size: row.size.unwrap_or_default(),
        }
    }
}

/// Queries a PostgREST-style table of package rows keyed by deployment key.
pub struct RestHistorySource {
    client: reqwest::Client,
    table_url: String,
    api_key: Option<String>,
}

impl RestHistorySource {
    pub fn new(
        base_url: &Url,
        table: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, HistorySourceError> {
        let table_url = format!("{}/{}", base_url.as_str().trim_end_matches('/'), table);
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(RestHistorySource {
            client,
            table_url,
            api_key,
        })
    }

    fn request_url(&self, deployment_key: &str) -> Result<Url, HistorySourceError> {
        let mut url =
            Url::parse(&self.table_url).map_err(|e| HistorySourceError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("select", SELECT_COLUMNS)
            .append_pair("deployment_key", &format!("eq.{deployment_key}"));
        Ok(url)
    }
}

#[async_trait]
impl HistorySource for RestHistorySource {
    async fn fetch_history(
        &self,
        deployment_key: &str,
    ) -> Result<Option<PackageHistory>, HistorySourceError> {
        const RETRIABLE_STATUS_CODES: &[StatusCode] = &[
            StatusCode::TOO_MANY_REQUESTS,     // 429
            StatusCode::INTERNAL_SERVER_ERROR, // 500
            StatusCode::BAD_GATEWAY,           // 502
            StatusCode::SERVICE_UNAVAILABLE,   // 503
            StatusCode::GATEWAY_TIMEOUT,       // 504
        ];

        let url = self.request_url(deployment_key)?;
        let mut retries = 0;

        let response = loop {
            let mut request = self.client.get(url.clone());
            if let Some(api_key) = &self.api_key {
                request = request.header("apikey", api_key).bearer_auth(api_key);
            }

            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                break response;
            }

            if !RETRIABLE_STATUS_CODES.contains(&status) {
                tracing::error!(%status, "History store rejected the request");
                return Err(HistorySourceError::UnexpectedStatus(status));
            }

            if retries < MAX_RETRIES {
                let retry_millis = BASE_DELAY * 2_u64.pow(retries);
                tracing::warn!(%status, retry_millis, "Retrying history fetch");
                sleep(Duration::from_millis(retry_millis)).await;
                retries += 1;
                continue;
            }

            tracing::error!(%status, retries, "History store request failed");
            return Err(HistorySourceError::RetriesExceeded);
        };

        let rows = response.json::<Vec<PackageRow>>().await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let packages = rows.into_iter().map(Package::from).collect();
        Ok(Some(PackageHistory::new(packages)))
    }
}

/// Serves fixed histories from memory.
#[derive(Default)]
pub struct StaticHistorySource {
    deployments: HashMap<String, Vec<Package>>,
}

impl StaticHistorySource {
    pub fn new(deployments: HashMap<String, Vec<Package>>) -> Self {
        StaticHistorySource { deployments }
    }
}

#[async_trait]
impl HistorySource for StaticHistorySource {
    async fn fetch_history(
        &self,
        deployment_key: &str,
    ) -> Result<Option<PackageHistory>, HistorySourceError> {
        Ok(into_history(self.deployments.get(deployment_key).cloned()))
    }
}
