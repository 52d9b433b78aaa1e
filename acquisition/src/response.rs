use crate::errors::AcquisitionError;
use crate::package::PackageHistory;
use crate::request::UpdateCheck;
use crate::resolver::{NoUpdate, Resolution, ResolutionOutcome, UpdatePackage, resolve};
use crate::rollout::is_selected_for_rollout;
use crate::version::AppVersion;
use serde::Serialize;

/// How the rollout gate treated a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RolloutDecision {
    /// The target release is fully rolled out.
    NotGated,
    Selected,
    Excluded,
    /// The client sent no unique id and is never placed in a cohort.
    Unidentified,
}

impl RolloutDecision {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RolloutDecision::NotGated => "not_gated",
            RolloutDecision::Selected => "selected",
            RolloutDecision::Excluded => "excluded",
            RolloutDecision::Unidentified => "unidentified",
        }
    }
}

/// Runs the rollout gate over both candidate answers.
pub fn choose_variant(
    outcome: ResolutionOutcome,
    client_unique_id: Option<&str>,
) -> (Resolution, RolloutDecision) {
    let Some(gated) = outcome.rollout else {
        return (outcome.original, RolloutDecision::NotGated);
    };
    let Some(client_unique_id) = client_unique_id else {
        return (outcome.original, RolloutDecision::Unidentified);
    };

    if is_selected_for_rollout(client_unique_id, gated.rollout, gated.identifier()) {
        (Resolution::Available(gated.package), RolloutDecision::Selected)
    } else {
        (outcome.original, RolloutDecision::Excluded)
    }
}

/// The `update_info` object of an update check response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UpdateInfo {
    pub download_url: String,
    pub description: String,
    pub is_available: bool,
    pub is_mandatory: bool,
    pub app_version: String,
    pub package_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub package_size: u64,
    pub update_app_version: bool,
    pub should_run_binary_version: bool,
    /// Mirrors `app_version` for clients speaking the newer protocol.
    pub target_binary_range: String,
}

impl UpdateInfo {
    pub fn available(package: UpdatePackage, app_version: &AppVersion) -> Self {
        let echoed = app_version.echo(&package.app_version).to_string();
        UpdateInfo {
            download_url: package.download_url,
            description: package.description,
            is_available: true,
            is_mandatory: package.is_mandatory,
            target_binary_range: echoed.clone(),
            app_version: echoed,
            package_hash: package.package_hash,
            label: package.label,
            package_size: package.package_size,
            update_app_version: false,
            should_run_binary_version: false,
        }
    }

    pub fn no_update(no_update: NoUpdate, app_version: &AppVersion) -> Self {
        let echoed = no_update
            .app_version
            .as_deref()
            .map(|emitted| app_version.echo(emitted).to_string())
            .unwrap_or_default();
        UpdateInfo {
            target_binary_range: echoed.clone(),
            app_version: echoed,
            update_app_version: no_update.update_app_version,
            should_run_binary_version: no_update.should_run_binary_version,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UpdateCheckResponse {
    pub update_info: UpdateInfo,
}

/// The answer served to one client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Acquired {
    pub update_info: UpdateInfo,
    pub decision: RolloutDecision,
}

/// Resolves, gates and assembles the answer to a validated update check.
///
/// Fails with [`AcquisitionError::NoDeploymentFound`] for an empty history
/// and with [`AcquisitionError::NoApplicableUpdate`] when the client ends up
/// with nothing to download.
pub fn update_check(
    history: &PackageHistory,
    check: &UpdateCheck,
) -> Result<Acquired, AcquisitionError> {
    let outcome = resolve(history, check)?;
    let (resolution, decision) = choose_variant(outcome, check.client_unique_id.as_deref());

    tracing::debug!(
        deployment_key = %check.deployment_key,
        decision = decision.as_str(),
        "Rollout gate applied"
    );

    match resolution {
        Resolution::Available(package) => Ok(Acquired {
            update_info: UpdateInfo::available(package, &check.app_version),
            decision,
        }),
        Resolution::NoUpdate(no_update) => Err(AcquisitionError::NoApplicableUpdate(no_update)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::BlobInfo;
    use crate::request::UpdateCheckRequest;
    use crate::testutils::{DEPLOYMENT_KEY, check, history, package};
    use std::collections::{BTreeSet, HashMap};

    fn check_as(client: &str, version: &str) -> UpdateCheck {
        let mut check = check(version, None);
        check.client_unique_id = Some(client.to_string());
        check
    }

    fn rollout_history(rollout: u8) -> PackageHistory {
        let mut rolling = package("v2", "1.0.0", "h2");
        rolling.rollout = Some(rollout);
        history(vec![package("v1", "1.0.0", "h1"), rolling])
    }

    fn served_label(history: &PackageHistory, check: &UpdateCheck) -> String {
        update_check(history, check)
            .unwrap()
            .update_info
            .label
            .unwrap()
    }

    #[test]
    fn test_plain_integer_version_is_echoed() {
        let history = history(vec![package("v1", "1.0.0", "h1")]);
        let acquired = update_check(&history, &check("1", Some(""))).unwrap();

        assert_eq!(acquired.update_info.label.as_deref(), Some("v1"));
        assert_eq!(acquired.update_info.app_version, "1");
        assert_eq!(acquired.update_info.target_binary_range, "1");
        assert!(acquired.update_info.is_available);
        assert_eq!(acquired.decision, RolloutDecision::NotGated);
    }

    #[test]
    fn test_missing_patch_version_is_echoed() {
        let history = history(vec![package("v1", "2.0.0-beta", "h1")]);
        let acquired = update_check(&history, &check("2.0-beta", None)).unwrap();
        assert_eq!(acquired.update_info.app_version, "2.0-beta");
    }

    #[test]
    fn test_strict_version_is_emitted_unchanged() {
        let history = history(vec![package("v1", "^1.0.0", "h1")]);
        let acquired = update_check(&history, &check("1.2.3", None)).unwrap();
        assert_eq!(acquired.update_info.app_version, "1.2.3");
        assert_eq!(acquired.update_info.target_binary_range, "1.2.3");
    }

    #[test]
    fn test_current_client_gets_no_update() {
        let history = history(vec![package("v1", "1.0.0", "h1")]);
        let err = update_check(&history, &check("1", Some("h1"))).unwrap_err();
        assert_eq!(err, AcquisitionError::NoApplicableUpdate(NoUpdate::default()));
    }

    #[test]
    fn test_no_update_echoes_hint_version() {
        let history = history(vec![package("v1", "1.0.0", "h1")]);
        let app_version = AppVersion::parse("1").unwrap();
        let info = UpdateInfo::no_update(
            NoUpdate {
                app_version: Some("1.0.0".into()),
                update_app_version: false,
                should_run_binary_version: false,
            },
            &app_version,
        );
        assert_eq!(info.app_version, "1");
        assert!(!info.is_available);
        assert_eq!(info.download_url, "");

        let err = update_check(&history, &check("2", None)).unwrap_err();
        let info = UpdateInfo::no_update(
            err.no_update().unwrap(),
            &AppVersion::parse("2").unwrap(),
        );
        assert_eq!(info.app_version, "1.0.0");
        assert_eq!(info.target_binary_range, "1.0.0");
        assert!(info.should_run_binary_version);
    }

    #[test]
    fn test_missing_client_id_never_gets_rollout_package() {
        let history = rollout_history(99);
        let acquired = update_check(&history, &check("1.0.0", None)).unwrap();
        assert_eq!(acquired.update_info.label.as_deref(), Some("v1"));
        assert_eq!(acquired.decision, RolloutDecision::Unidentified);
    }

    #[test]
    fn test_invalid_stored_package_is_not_served() {
        let mut broken = package("v2", "1.0.0", "h2");
        broken.rollout = Some(0);
        let history = history(vec![package("v1", "1.0.0", "h1"), broken]);

        let acquired = update_check(&history, &check("1.0.0", None)).unwrap();
        assert_eq!(acquired.update_info.label.as_deref(), Some("v1"));
        assert_eq!(acquired.decision, RolloutDecision::NotGated);
    }

    #[test]
    fn test_excluded_client_still_gets_original_package() {
        let history = rollout_history(1);
        let excluded = (0..1000)
            .map(|i| format!("client-{i}"))
            .find(|id| {
                update_check(&history, &check_as(id, "1.0.0")).unwrap().decision
                    == RolloutDecision::Excluded
            })
            .unwrap();

        let acquired = update_check(&history, &check_as(&excluded, "1.0.0")).unwrap();
        assert!(acquired.update_info.is_available);
        assert_eq!(acquired.update_info.label.as_deref(), Some("v1"));
    }

    #[test]
    fn test_rollout_cohort_fraction_and_growth() {
        let clients: Vec<String> = (0..10_000).map(|i| format!("device-{i}")).collect();
        let cohort = |history: &PackageHistory| -> BTreeSet<&String> {
            clients
                .iter()
                .filter(|id| served_label(history, &check_as(id, "1.0.0")) == "v2")
                .collect()
        };

        let at_30 = cohort(&rollout_history(30));
        let fraction = at_30.len() as f64 / clients.len() as f64;
        assert!((fraction - 0.30).abs() < 0.03, "selected fraction {fraction}");

        let at_60 = cohort(&rollout_history(60));
        assert!(at_60.is_superset(&at_30));
        assert!(at_60.len() > at_30.len());
    }

    #[test]
    fn test_completed_rollout_serves_diff_to_everyone() {
        let mut rolling = package("v2", "1.0.0", "h2");
        rolling.rollout = Some(100);
        rolling.diff_package_map = Some(HashMap::from([(
            "h1".to_string(),
            BlobInfo {
                size: 3,
                url: "https://blobs/diff".into(),
            },
        )]));
        let history = history(vec![package("v1", "1.0.0", "h1"), rolling]);

        let acquired = update_check(&history, &check("1.0.0", Some("h1"))).unwrap();
        assert_eq!(acquired.decision, RolloutDecision::NotGated);
        assert_eq!(acquired.update_info.download_url, "https://blobs/diff");
        assert_eq!(acquired.update_info.package_hash, "h2");
        assert_eq!(acquired.update_info.package_size, 3);
    }

    #[test]
    fn test_serialized_shape() {
        let request = UpdateCheckRequest {
            deployment_key: Some(DEPLOYMENT_KEY.into()),
            app_version: Some("1.0.0".into()),
            ..Default::default()
        };
        let check = request.validate().unwrap();
        let history = history(vec![package("v1", "1.0.0", "h1")]);
        let response = UpdateCheckResponse {
            update_info: update_check(&history, &check).unwrap().update_info,
        };

        let json = serde_json::to_value(&response).unwrap();
        let info = &json["update_info"];
        assert_eq!(info["download_url"], "https://blobs/h1");
        assert_eq!(info["is_available"], true);
        assert_eq!(info["package_size"], 100);
        assert_eq!(info["label"], "v1");
        assert_eq!(info["target_binary_range"], "1.0.0");
        assert_eq!(info["should_run_binary_version"], false);

        let no_update = serde_json::to_value(UpdateInfo::default()).unwrap();
        assert!(no_update.get("label").is_none());
    }
}
