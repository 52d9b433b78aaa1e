use crate::api::utils::{HandlerBody, QueryParams, json_response};
use crate::errors::UpdateServerError;
use crate::history_source::HistorySource;
use crate::metrics_defs::{HISTORY_FETCH_DURATION, ROLLOUT_DECISIONS, UPDATE_CHECKS};
use acquisition::{AcquisitionError, UpdateCheckRequest, UpdateCheckResponse, UpdateInfo, update_check};
use hyper::{Response, StatusCode};
use shared::http::make_text_response;
use std::time::Instant;

/// Reads an update check from query parameters.
pub fn parse_update_check_request(query: Option<&str>) -> UpdateCheckRequest {
    let params = QueryParams::parse(query);
    let string = |camel_case: &str, snake_case: &str| {
        params.get(camel_case, snake_case).map(String::from)
    };

    UpdateCheckRequest {
        deployment_key: string("deploymentKey", "deployment_key"),
        app_version: string("appVersion", "app_version"),
        package_hash: string("packageHash", "package_hash"),
        label: string("label", "label"),
        is_companion: params
            .get("isCompanion", "is_companion")
            .is_some_and(|value| value.eq_ignore_ascii_case("true")),
        client_unique_id: string("clientUniqueId", "client_unique_id"),
    }
}

pub async fn handle_update_check(
    source: &dyn HistorySource,
    query: Option<&str>,
) -> Result<Response<HandlerBody>, UpdateServerError> {
    let check = match parse_update_check_request(query).validate() {
        Ok(check) => check,
        Err(invalid) => {
            tracing::debug!(error = %invalid, "Rejected update check");
            shared::counter!(UPDATE_CHECKS, "result" => "invalid").increment(1);
            return Ok(make_text_response(StatusCode::BAD_REQUEST, invalid.message()));
        }
    };

    let started = Instant::now();
    let history = source.fetch_history(&check.deployment_key).await;
    shared::histogram!(HISTORY_FETCH_DURATION).record(started.elapsed().as_secs_f64());
    let history = history.inspect_err(|_| {
        shared::counter!(UPDATE_CHECKS, "result" => "error").increment(1);
    })?;

    let result = match history {
        Some(history) => update_check(&history, &check),
        None => Err(AcquisitionError::NoDeploymentFound),
    };

    let update_info = match result {
        Ok(acquired) => {
            shared::counter!(ROLLOUT_DECISIONS, "decision" => acquired.decision.as_str())
                .increment(1);
            shared::counter!(UPDATE_CHECKS, "result" => "available").increment(1);
            acquired.update_info
        }
        Err(err) => {
            // The request was validated above, so only "no update" outcomes remain.
            let Some(no_update) = err.no_update() else {
                shared::counter!(UPDATE_CHECKS, "result" => "error").increment(1);
                return Err(err.into());
            };
            tracing::debug!(deployment_key = %check.deployment_key, %err, "No update served");
            shared::counter!(UPDATE_CHECKS, "result" => "no_update").increment(1);
            UpdateInfo::no_update(no_update, &check.app_version)
        }
    };

    json_response(StatusCode::OK, &UpdateCheckResponse { update_info })
}
