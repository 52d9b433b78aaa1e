use crate::rollout::RolloutPercentage;
use crate::validation::{ValidationError, validate_package_info};
use crate::version::VersionRange;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Location and size of a downloadable artifact.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub size: u64,
    pub url: String,
}

/// A published release of one deployment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub app_version: String,
    #[serde(default)]
    pub blob_url: String,
    #[serde(default)]
    pub description: String,
    /// Smaller patch artifacts keyed by the package hash a client upgrades from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_package_map: Option<HashMap<String, BlobInfo>>,
    #[serde(default)]
    pub is_disabled: bool,
    #[serde(default)]
    pub is_mandatory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub manifest_blob_url: String,
    pub package_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout: Option<u8>,
    #[serde(default)]
    pub size: u64,
}

impl Package {
    /// The release-specific string rollout buckets are derived from.
    pub fn rollout_identifier(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.package_hash)
    }

    /// The diff artifact for a client currently holding `package_hash`, if a
    /// usable one exists.
    pub fn diff_from(&self, package_hash: &str) -> Option<&BlobInfo> {
        let blob = self.diff_package_map.as_ref()?.get(package_hash)?;
        if blob.url.is_empty() {
            tracing::warn!(
                label = self.label.as_deref(),
                from = package_hash,
                "Ignoring diff package without a url"
            );
            return None;
        }
        Some(blob)
    }
}

/// Parses a `v<positive integer>` label into its number.
pub fn label_number(label: &str) -> Option<u64> {
    let digits = label.strip_prefix('v')?;
    if digits.starts_with('0') || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    digits.parse().ok()
}

#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum HistoryError {
    #[error("package {package} is invalid: {errors:?}")]
    InvalidPackage {
        package: String,
        errors: Vec<ValidationError>,
    },
    #[error("duplicate package label {0}")]
    DuplicateLabel(String),
}

/// A package paired with its parsed target range.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    package: Package,
    range: VersionRange,
    rollout: Option<RolloutPercentage>,
}

impl HistoryEntry {
    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn range(&self) -> &VersionRange {
        &self.range
    }

    pub fn rollout(&self) -> Option<RolloutPercentage> {
        self.rollout
    }

    /// A rollout that has not yet reached every client.
    pub fn has_unfinished_rollout(&self) -> bool {
        self.rollout.is_some_and(|rollout| rollout.is_unfinished())
    }
}

/// Every package published to one deployment, oldest first.
///
/// When every package carries a label the history is ordered by label
/// number; otherwise the supplied order is taken as publish order.
///
/// Packages that fail validation are left out and never served. The reasons
/// are kept in [`PackageHistory::rejected`].
#[derive(Clone, Debug, Default)]
pub struct PackageHistory {
    entries: Vec<HistoryEntry>,
    rejected: Vec<HistoryError>,
}

fn history_entry(
    package: Package,
    labels: &mut HashSet<String>,
) -> Result<HistoryEntry, HistoryError> {
    let errors = validate_package_info(&package);
    let range = match (errors.is_empty(), VersionRange::parse(&package.app_version)) {
        (true, Ok(range)) => range,
        (_, _) => {
            return Err(HistoryError::InvalidPackage {
                package: package.rollout_identifier().to_string(),
                errors,
            });
        }
    };

    if let Some(label) = &package.label
        && !labels.insert(label.clone())
    {
        return Err(HistoryError::DuplicateLabel(label.clone()));
    }

    let rollout = package.rollout.and_then(RolloutPercentage::new);
    Ok(HistoryEntry {
        package,
        range,
        rollout,
    })
}

impl PackageHistory {
    pub fn new(packages: Vec<Package>) -> Self {
        let mut labels = HashSet::new();
        let mut entries = Vec::with_capacity(packages.len());
        let mut rejected = Vec::new();

        for package in packages {
            match history_entry(package, &mut labels) {
                Ok(entry) => entries.push(entry),
                Err(error) => {
                    tracing::warn!(%error, "Skipping unservable package");
                    rejected.push(error);
                }
            }
        }

        if entries.iter().all(|entry| entry.package.label.is_some()) {
            entries.sort_by_key(|entry| {
                entry
                    .package
                    .label
                    .as_deref()
                    .and_then(label_number)
                    .unwrap_or_default()
            });
        }

        PackageHistory { entries, rejected }
    }

    /// Why each left-out package was rejected, in input order.
    pub fn rejected(&self) -> &[HistoryError] {
        &self.rejected
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in publish order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&Package> {
        self.entries.last().map(HistoryEntry::package)
    }
}
