use crate::resolver::NoUpdate;
use crate::validation::ValidationError;
use thiserror::Error;

/// Result type alias for acquisition operations
pub type Result<T, E = AcquisitionError> = std::result::Result<T, E>;

/// Errors that can occur while answering an update check
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    #[error("invalid update check: {0}")]
    InvalidRequest(#[from] InvalidRequest),

    /// The deployment key is unknown or its history is empty.
    #[error("no deployment found")]
    NoDeploymentFound,

    /// Nothing in the history applies to the client, or the client is
    /// already current. Carries the hints reported alongside "no update".
    #[error("no applicable update")]
    NoApplicableUpdate(NoUpdate),
}

impl AcquisitionError {
    /// The "no update" response a client should see for this error, if the
    /// error is not a client mistake.
    pub fn no_update(&self) -> Option<NoUpdate> {
        match self {
            AcquisitionError::InvalidRequest(_) => None,
            AcquisitionError::NoDeploymentFound => Some(NoUpdate::run_binary_version()),
            AcquisitionError::NoApplicableUpdate(no_update) => Some(no_update.clone()),
        }
    }
}

/// Which part of an update check failed validation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidRequest {
    #[error("invalid deployment key")]
    DeploymentKey,
    #[error("invalid app version")]
    AppVersion,
    #[error("invalid deployment key and app version")]
    DeploymentKeyAndAppVersion,
}

impl InvalidRequest {
    pub fn from_errors(errors: &[ValidationError]) -> Option<Self> {
        let key = errors.iter().any(|e| e.field == "deploymentKey");
        let version = errors.iter().any(|e| e.field == "appVersion");
        match (key, version) {
            (true, true) => Some(InvalidRequest::DeploymentKeyAndAppVersion),
            (true, false) => Some(InvalidRequest::DeploymentKey),
            (false, true) => Some(InvalidRequest::AppVersion),
            (false, false) => None,
        }
    }

    /// The explanation shown to the developer whose app sent the request.
    pub fn message(&self) -> &'static str {
        match self {
            InvalidRequest::DeploymentKey => {
                "An update check must include a valid deployment key - please check that your app has been \
                 configured correctly. To view available deployment keys, run 'code-push-standalone deployment ls <appName> -k'."
            }
            InvalidRequest::AppVersion => {
                "An update check must include a binary version that conforms to the semver standard (e.g. '1.0.0'). \
                 The binary version is normally inferred from the App Store/Play Store version configured with your app."
            }
            InvalidRequest::DeploymentKeyAndAppVersion => {
                "An update check must include a valid deployment key and provide a semver-compliant app version."
            }
        }
    }
}
