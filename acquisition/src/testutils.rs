use crate::package::{Package, PackageHistory};
use crate::request::{UpdateCheck, UpdateCheckRequest};

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

pub fn history(packages: Vec<Package>) -> PackageHistory {
    PackageHistory::new(packages)
}

pub fn check(app_version: &str, package_hash: Option<&str>) -> UpdateCheck {
    UpdateCheckRequest {
        deployment_key: Some(DEPLOYMENT_KEY.into()),
        app_version: Some(app_version.into()),
        package_hash: package_hash.map(String::from),
        ..Default::default()
    }
    .validate()
    .expect("valid update check")
}
