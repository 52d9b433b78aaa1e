//! HTTP front end for the update acquisition engine.
//!
//! The main listener serves update checks and status reports; the admin
//! listener serves health and readiness probes.

pub mod api;
pub mod config;
pub mod errors;
pub mod history_source;
mod metrics_defs;
pub mod service;

#[cfg(test)]
mod testutils;

use crate::errors::UpdateServerError;
use crate::service::UpdateService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;

pub use metrics_defs::ALL_METRICS;

pub async fn run(config: config::Config) -> Result<(), UpdateServerError> {
    let source = history_source::get_source(&config.history_store)?;
    let readiness_source = source.clone();

    let update_service = UpdateService::new(&config.base_path, source);
    let admin_service =
        AdminService::<_, UpdateServerError>::new(move || readiness_source.is_ready());

    let update_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        update_service,
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(update_task, admin_task)?;
    Ok(())
}
