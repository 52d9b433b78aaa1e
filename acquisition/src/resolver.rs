//! Selection of the release a client should be served.
//!
//! History is scanned newest first. Disabled releases are never served. The
//! target is the newest enabled release whose app version range contains the
//! client's binary version; scanning stops once the release the client
//! currently runs is reached, and a mandatory release found before that point
//! makes the served update mandatory.
//!
//! Resolution runs twice when the target is under a staged rollout: once
//! including unfinished rollouts (the gated variant) and once skipping them
//! (what every other client gets). The rollout gate then picks between the
//! two.

use crate::errors::AcquisitionError;
use crate::package::{HistoryEntry, Package, PackageHistory};
use crate::request::UpdateCheck;
use crate::rollout::RolloutPercentage;

/// Hints returned to a client that has nothing to download.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NoUpdate {
    /// App version of the newest enabled release, when it does not apply to
    /// the client's binary.
    pub app_version: Option<String>,
    /// The client should install a newer binary to get further updates.
    pub update_app_version: bool,
    /// No release applies to the client's binary; it should run the code it
    /// shipped with.
    pub should_run_binary_version: bool,
}

impl NoUpdate {
    pub fn run_binary_version() -> Self {
        NoUpdate {
            should_run_binary_version: true,
            ..Default::default()
        }
    }
}

/// A release resolved for one client, with diff substitution applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdatePackage {
    pub label: Option<String>,
    /// The client's normalized binary version.
    pub app_version: String,
    /// Hash of the full release, even when a diff is served.
    pub package_hash: String,
    pub download_url: String,
    pub package_size: u64,
    pub description: String,
    pub is_mandatory: bool,
}

impl UpdatePackage {
    fn rollout_identifier(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.package_hash)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    NoUpdate(NoUpdate),
    Available(UpdatePackage),
}

/// The variant served only to clients selected into a staged rollout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatedRelease {
    pub package: UpdatePackage,
    pub rollout: RolloutPercentage,
}

impl GatedRelease {
    /// The release-specific string rollout buckets are derived from.
    pub fn identifier(&self) -> &str {
        self.package.rollout_identifier()
    }
}

/// Both candidate answers for one update check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolutionOutcome {
    /// What the client gets when it is not part of any rollout cohort.
    pub original: Resolution,
    /// Present only when the target release has an unfinished rollout.
    pub rollout: Option<GatedRelease>,
}

/// Resolves the release a client should receive from a history snapshot.
pub fn resolve(
    history: &PackageHistory,
    check: &UpdateCheck,
) -> Result<ResolutionOutcome, AcquisitionError> {
    if history.is_empty() {
        return Err(AcquisitionError::NoDeploymentFound);
    }

    let outcome = match scan(history, check, false) {
        (Resolution::Available(package), Some(rollout)) if rollout.is_unfinished() => {
            let (original, _) = scan(history, check, true);
            ResolutionOutcome {
                original,
                rollout: Some(GatedRelease { package, rollout }),
            }
        }
        (original, _) => ResolutionOutcome {
            original,
            rollout: None,
        },
    };

    tracing::debug!(
        deployment_key = %check.deployment_key,
        app_version = %check.app_version,
        available = matches!(outcome.original, Resolution::Available(_)),
        gated = outcome.rollout.is_some(),
        "Resolved update check"
    );

    Ok(outcome)
}

fn is_current(package: &Package, check: &UpdateCheck) -> bool {
    match (&check.label, &check.package_hash) {
        (Some(label), _) => package.label.as_ref() == Some(label),
        (None, Some(hash)) => package.package_hash == *hash,
        (None, None) => true,
    }
}

fn scan(
    history: &PackageHistory,
    check: &UpdateCheck,
    skip_unfinished_rollouts: bool,
) -> (Resolution, Option<RolloutPercentage>) {
    let version = check.app_version.version();

    let mut found_current = false;
    let mut latest_enabled: Option<&HistoryEntry> = None;
    let mut latest_applicable: Option<&HistoryEntry> = None;
    let mut passes_mandatory = false;

    for entry in history.iter().rev() {
        let package = entry.package();
        found_current = found_current || is_current(package, check);

        if package.is_disabled || (skip_unfinished_rollouts && entry.has_unfinished_rollout()) {
            continue;
        }
        latest_enabled.get_or_insert(entry);

        if !entry.range().satisfied_by(version) {
            continue;
        }
        latest_applicable.get_or_insert(entry);

        // Everything further down is older than what the client runs.
        if found_current {
            break;
        }
        if package.is_mandatory {
            passes_mandatory = true;
            break;
        }
    }

    let Some(latest_enabled) = latest_enabled else {
        return (Resolution::NoUpdate(NoUpdate::run_binary_version()), None);
    };

    let target = match latest_applicable {
        Some(entry) if Some(&entry.package().package_hash) != check.package_hash.as_ref() => entry,
        _ => {
            let hint = binary_version_hint(latest_enabled, check, latest_applicable.is_none());
            return (Resolution::NoUpdate(hint), None);
        }
    };

    let package = target.package();
    let diff = check
        .package_hash
        .as_deref()
        .and_then(|hash| package.diff_from(hash));
    let (download_url, package_size) = match diff {
        Some(diff) => (diff.url.clone(), diff.size),
        None => (package.blob_url.clone(), package.size),
    };

    let update = UpdatePackage {
        label: package.label.clone(),
        app_version: check.app_version.normalized().to_string(),
        package_hash: package.package_hash.clone(),
        download_url,
        package_size,
        description: package.description.clone(),
        is_mandatory: passes_mandatory || package.is_mandatory,
    };

    (Resolution::Available(update), target.rollout())
}

/// Tells a client with nothing to download what app version the newest
/// release targets, and whether it needs a newer binary to get it.
fn binary_version_hint(
    latest_enabled: &HistoryEntry,
    check: &UpdateCheck,
    should_run_binary_version: bool,
) -> NoUpdate {
    let version = check.app_version.version();
    let range = latest_enabled.range();
    let mut hint = NoUpdate {
        should_run_binary_version,
        ..Default::default()
    };

    if range.is_below(version) {
        hint.app_version = Some(latest_enabled.package().app_version.clone());
    } else if !range.satisfied_by(version) {
        hint.update_app_version = true;
        hint.app_version = Some(latest_enabled.package().app_version.clone());
    }

    hint
}
