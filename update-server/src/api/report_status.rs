//! Deploy and download status reports sent by clients.
//!
//! Reports are validated, logged and counted. They are not persisted.

use crate::api::utils::HandlerBody;
use crate::metrics_defs::STATUS_REPORTS;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use shared::http::make_text_response;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeploymentStatus {
    DeploymentSucceeded,
    DeploymentFailed,
    Downloaded,
}

impl DeploymentStatus {
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "DeploymentSucceeded" => Some(DeploymentStatus::DeploymentSucceeded),
            "DeploymentFailed" => Some(DeploymentStatus::DeploymentFailed),
            "Downloaded" => Some(DeploymentStatus::Downloaded),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::DeploymentSucceeded => "DeploymentSucceeded",
            DeploymentStatus::DeploymentFailed => "DeploymentFailed",
            DeploymentStatus::Downloaded => "Downloaded",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReportError {
    #[error("Malformed JSON body.")]
    MalformedBody,

    #[error("A deploy status report must contain a valid appVersion and deploymentKey.")]
    MissingDeployFields,

    #[error("A deploy status report for a labelled package must contain a valid status.")]
    MissingStatus,

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("A download status report must contain a valid deploymentKey and package label.")]
    MissingDownloadFields,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployReportBody {
    #[serde(alias = "deployment_key")]
    deployment_key: Option<String>,
    #[serde(alias = "app_version")]
    app_version: Option<String>,
    #[serde(alias = "client_unique_id")]
    client_unique_id: Option<String>,
    label: Option<String>,
    status: Option<String>,
    #[serde(alias = "previous_label_or_app_version")]
    previous_label_or_app_version: Option<String>,
    #[serde(alias = "previous_deployment_key")]
    previous_deployment_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadReportBody {
    #[serde(alias = "deployment_key")]
    deployment_key: Option<String>,
    #[serde(alias = "client_unique_id")]
    client_unique_id: Option<String>,
    label: Option<String>,
}

/// An accepted deploy report.
#[derive(Debug, PartialEq, Eq)]
pub struct DeployReport {
    pub deployment_key: String,
    pub app_version: String,
    pub client_unique_id: Option<String>,
    /// Absent when the client reports running its binary version.
    pub label: Option<String>,
    pub status: Option<DeploymentStatus>,
    pub previous_label_or_app_version: Option<String>,
    pub previous_deployment_key: Option<String>,
}

/// An accepted download report.
#[derive(Debug, PartialEq, Eq)]
pub struct DownloadReport {
    pub deployment_key: String,
    pub label: String,
    pub client_unique_id: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ReportError> {
    serde_json::from_slice(body).map_err(|_| ReportError::MalformedBody)
}

pub fn parse_deploy_report(body: &[u8]) -> Result<DeployReport, ReportError> {
    let body: DeployReportBody = parse_body(body)?;

    let (Some(deployment_key), Some(app_version)) =
        (non_empty(body.deployment_key), non_empty(body.app_version))
    else {
        return Err(ReportError::MissingDeployFields);
    };

    let label = non_empty(body.label);
    let status = match (&label, non_empty(body.status)) {
        // Binary-version reports carry no meaningful status.
        (None, _) => None,
        (Some(_), None) => return Err(ReportError::MissingStatus),
        (Some(_), Some(status)) => Some(
            DeploymentStatus::parse(&status).ok_or(ReportError::InvalidStatus(status))?,
        ),
    };

    Ok(DeployReport {
        deployment_key,
        app_version,
        client_unique_id: non_empty(body.client_unique_id),
        label,
        status,
        previous_label_or_app_version: non_empty(body.previous_label_or_app_version),
        previous_deployment_key: non_empty(body.previous_deployment_key),
    })
}

pub fn parse_download_report(body: &[u8]) -> Result<DownloadReport, ReportError> {
    let body: DownloadReportBody = parse_body(body)?;

    let (Some(deployment_key), Some(label)) =
        (non_empty(body.deployment_key), non_empty(body.label))
    else {
        return Err(ReportError::MissingDownloadFields);
    };

    Ok(DownloadReport {
        deployment_key,
        label,
        client_unique_id: non_empty(body.client_unique_id),
    })
}

fn rejected(kind: &'static str, error: ReportError) -> Response<HandlerBody> {
    tracing::debug!(kind, %error, "Rejected status report");
    shared::counter!(STATUS_REPORTS, "kind" => kind, "status" => "invalid").increment(1);
    make_text_response(StatusCode::BAD_REQUEST, error.to_string())
}

pub fn handle_deploy_report(body: &Bytes) -> Response<HandlerBody> {
    let report = match parse_deploy_report(body) {
        Ok(report) => report,
        Err(error) => return rejected("deploy", error),
    };

    let status = report.status.map_or("none", |status| status.as_str());
    tracing::info!(
        deployment_key = %report.deployment_key,
        app_version = %report.app_version,
        label = report.label.as_deref(),
        status,
        client_unique_id = report.client_unique_id.as_deref(),
        previous_label_or_app_version = report.previous_label_or_app_version.as_deref(),
        previous_deployment_key = report.previous_deployment_key.as_deref(),
        "Deploy status reported"
    );
    shared::counter!(STATUS_REPORTS, "kind" => "deploy", "status" => status).increment(1);

    make_text_response(StatusCode::OK, "OK")
}

pub fn handle_download_report(body: &Bytes) -> Response<HandlerBody> {
    let report = match parse_download_report(body) {
        Ok(report) => report,
        Err(error) => return rejected("download", error),
    };

    tracing::info!(
        deployment_key = %report.deployment_key,
        label = %report.label,
        client_unique_id = report.client_unique_id.as_deref(),
        "Download reported"
    );
    shared::counter!(STATUS_REPORTS, "kind" => "download", "status" => "downloaded").increment(1);

    make_text_response(StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::body_text;

    #[test]
    fn test_deploy_report_accepts_both_casings() {
        let report = parse_deploy_report(
            br#"{"deployment_key": "key", "appVersion": "1.0.0", "label": "v3",
                 "status": "DeploymentSucceeded", "previousLabelOrAppVersion": "v2"}"#,
        )
        .unwrap();
        assert_eq!(report.deployment_key, "key");
        assert_eq!(report.app_version, "1.0.0");
        assert_eq!(report.status, Some(DeploymentStatus::DeploymentSucceeded));
        assert_eq!(report.previous_label_or_app_version.as_deref(), Some("v2"));
    }

    #[test]
    fn test_binary_version_deploy_needs_no_status() {
        let report =
            parse_deploy_report(br#"{"deploymentKey": "key", "appVersion": "1.0.0"}"#).unwrap();
        assert_eq!(report.label, None);
        assert_eq!(report.status, None);

        let report = parse_deploy_report(
            br#"{"deploymentKey": "key", "appVersion": "1.0.0", "status": "Bogus"}"#,
        )
        .unwrap();
        assert_eq!(report.label, None);
        assert_eq!(report.status, None);
    }

    #[test]
    fn test_deploy_report_errors() {
        let cases: [(&[u8], ReportError); 5] = [
            (b"{not json", ReportError::MalformedBody),
            (br#"{"deploymentKey": "key"}"#, ReportError::MissingDeployFields),
            (
                br#"{"deploymentKey": "", "appVersion": "1.0.0"}"#,
                ReportError::MissingDeployFields,
            ),
            (
                br#"{"deploymentKey": "key", "appVersion": "1.0.0", "label": "v1"}"#,
                ReportError::MissingStatus,
            ),
            (
                br#"{"deploymentKey": "key", "appVersion": "1.0.0", "label": "v1", "status": "Active"}"#,
                ReportError::InvalidStatus("Active".into()),
            ),
        ];

        for (body, expected) in cases {
            assert_eq!(parse_deploy_report(body).unwrap_err(), expected);
        }
    }

    #[test]
    fn test_download_report() {
        let report =
            parse_download_report(br#"{"deployment_key": "key", "label": "v2"}"#).unwrap();
        assert_eq!(report.label, "v2");
        assert_eq!(
            parse_download_report(br#"{"deploymentKey": "key"}"#).unwrap_err(),
            ReportError::MissingDownloadFields
        );
    }

    #[tokio::test]
    async fn test_handlers_render_messages() {
        let response = handle_deploy_report(&Bytes::from_static(
            br#"{"deploymentKey": "key", "appVersion": "1.0.0", "label": "v1", "status": "Nope"}"#,
        ));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "Invalid status: Nope");

        let response = handle_download_report(&Bytes::from_static(
            br#"{"deploymentKey": "key", "label": "v1"}"#,
        ));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");
    }
}
