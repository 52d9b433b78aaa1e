use crate::api::utils::HandlerBody;
use crate::history_source::StaticHistorySource;
use acquisition::Package;
use http_body_util::BodyExt;
use hyper::Response;
use std::collections::HashMap;

pub const DEPLOYMENT_KEY: &str = "abcdefghij0123456789";

pub fn package(label: &str, app_version: &str, package_hash: &str) -> Package {
    Package {
        app_version: app_version.into(),
        blob_url: format!("https://blobs/{package_hash}"),
        label: Some(label.into()),
        package_hash: package_hash.into(),
        size: 100,
        ..Default::default()
    }
}

/// A source holding `packages` as the history of [`DEPLOYMENT_KEY`].
pub fn static_source(packages: Vec<Package>) -> StaticHistorySource {
    StaticHistorySource::new(HashMap::from([(DEPLOYMENT_KEY.to_string(), packages)]))
}

pub async fn body_text(response: Response<HandlerBody>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<HandlerBody>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
