use crate::errors::InvalidRequest;
use crate::validation::validate_update_check_request;
use crate::version::AppVersion;

/// An update check as sent by a client, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateCheckRequest {
    pub deployment_key: Option<String>,
    pub app_version: Option<String>,
    /// Hash of the package the client runs; absent or empty when the client
    /// still runs the code bundled with its binary.
    pub package_hash: Option<String>,
    /// Label of the package the client runs, sent by newer clients.
    pub label: Option<String>,
    pub is_companion: bool,
    pub client_unique_id: Option<String>,
}

impl UpdateCheckRequest {
    /// Validates the request, normalizing its app version.
    pub fn validate(self) -> Result<UpdateCheck, InvalidRequest> {
        let errors = validate_update_check_request(&self);
        if let Some(invalid) = InvalidRequest::from_errors(&errors) {
            return Err(invalid);
        }

        let (Some(deployment_key), Some(raw_version)) = (self.deployment_key, self.app_version)
        else {
            return Err(InvalidRequest::DeploymentKeyAndAppVersion);
        };
        let app_version =
            AppVersion::parse(&raw_version).map_err(|_| InvalidRequest::AppVersion)?;

        Ok(UpdateCheck {
            deployment_key,
            app_version,
            package_hash: self.package_hash.filter(|hash| !hash.is_empty()),
            label: self.label.filter(|label| !label.is_empty()),
            is_companion: self.is_companion,
            client_unique_id: self.client_unique_id.filter(|id| !id.is_empty()),
        })
    }
}

/// A validated update check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateCheck {
    pub deployment_key: String,
    pub app_version: AppVersion,
    pub package_hash: Option<String>,
    pub label: Option<String>,
    /// Reported by companion apps; informational only.
    pub is_companion: bool,
    pub client_unique_id: Option<String>,
}
