//! Field validation driven by a table of named validators.
//!
//! Each record type exposes its fields by name through [`Fields`]; a
//! validation is a list of `(field, validator)` pairs plus the fields that
//! must be present, applied uniformly by [`validate`].

use crate::package::{Package, label_number};
use crate::request::UpdateCheckRequest;
use crate::version::{VersionRange, normalize_app_version};
use semver::Version;

const KEY_MIN_LENGTH: usize = 10;
const KEY_MAX_LENGTH: usize = 100;
const DESCRIPTION_MAX_LENGTH: usize = 10_000;

/// A borrowed field value as seen by validators.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldValue<'a> {
    Str(&'a str),
    Bool(bool),
    Int(i64),
}

pub type Validator = fn(FieldValue<'_>) -> bool;

/// Named access to the fields of a record under validation.
pub trait Fields {
    /// The value of `name`, or `None` when the field is absent.
    fn field(&self, name: &str) -> Option<FieldValue<'_>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: &'static str,
}

pub fn validate<T: Fields + ?Sized>(
    object: &T,
    validators: &[(&'static str, Validator)],
    required_fields: &[&str],
) -> Vec<ValidationError> {
    validators
        .iter()
        .filter_map(|&(field, validator)| match object.field(field) {
            Some(value) if !validator(value) => Some(ValidationError {
                field,
                message: "Field is invalid",
            }),
            Some(_) => None,
            None if required_fields.contains(&field) => Some(ValidationError {
                field,
                message: "Field is required",
            }),
            None => None,
        })
        .collect()
}

fn string_length_within(value: FieldValue<'_>, min: usize, max: usize) -> bool {
    match value {
        FieldValue::Str(s) => (min..=max).contains(&s.chars().count()),
        _ => false,
    }
}

pub fn is_valid_key_field(value: FieldValue<'_>) -> bool {
    string_length_within(value, KEY_MIN_LENGTH, KEY_MAX_LENGTH)
}

pub fn is_valid_app_version_field(value: FieldValue<'_>) -> bool {
    matches!(value, FieldValue::Str(s) if Version::parse(s).is_ok())
}

fn is_valid_app_version_range_field(value: FieldValue<'_>) -> bool {
    matches!(value, FieldValue::Str(s) if VersionRange::parse(s).is_ok())
}

fn is_valid_description_field(value: FieldValue<'_>) -> bool {
    string_length_within(value, 0, DESCRIPTION_MAX_LENGTH)
}

fn is_valid_label_field(value: FieldValue<'_>) -> bool {
    matches!(value, FieldValue::Str(s) if label_number(s).is_some())
}

fn is_valid_boolean_field(value: FieldValue<'_>) -> bool {
    matches!(value, FieldValue::Bool(_))
}

pub fn is_valid_rollout_field(value: FieldValue<'_>) -> bool {
    matches!(value, FieldValue::Int(1..=100))
}

const UPDATE_CHECK_VALIDATORS: &[(&str, Validator)] = &[
    ("appVersion", is_valid_app_version_field),
    ("deploymentKey", is_valid_key_field),
];

const PACKAGE_INFO_VALIDATORS: &[(&str, Validator)] = &[
    ("appVersion", is_valid_app_version_range_field),
    ("description", is_valid_description_field),
    ("label", is_valid_label_field),
    ("isDisabled", is_valid_boolean_field),
    ("isMandatory", is_valid_boolean_field),
    ("rollout", is_valid_rollout_field),
];

/// The fields of an update check as validated: the app version is checked in
/// its normalized form.
struct UpdateCheckFields<'a> {
    deployment_key: Option<&'a str>,
    app_version: Option<String>,
}

impl Fields for UpdateCheckFields<'_> {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "deploymentKey" => self.deployment_key.map(FieldValue::Str),
            "appVersion" => self.app_version.as_deref().map(FieldValue::Str),
            _ => None,
        }
    }
}

/// Validates the fields of an inbound update check.
pub fn validate_update_check_request(request: &UpdateCheckRequest) -> Vec<ValidationError> {
    let fields = UpdateCheckFields {
        deployment_key: request.deployment_key.as_deref(),
        app_version: request
            .app_version
            .as_deref()
            .map(|raw| normalize_app_version(raw).normalized),
    };
    validate(
        &fields,
        UPDATE_CHECK_VALIDATORS,
        &["appVersion", "deploymentKey"],
    )
}

pub fn is_valid_update_check_request(request: &UpdateCheckRequest) -> bool {
    validate_update_check_request(request).is_empty()
}

impl Fields for Package {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "appVersion" => Some(FieldValue::Str(&self.app_version)),
            "description" => Some(FieldValue::Str(&self.description)),
            "label" => self.label.as_deref().map(FieldValue::Str),
            "isDisabled" => Some(FieldValue::Bool(self.is_disabled)),
            "isMandatory" => Some(FieldValue::Bool(self.is_mandatory)),
            "rollout" => self.rollout.map(|r| FieldValue::Int(r.into())),
            _ => None,
        }
    }
}

/// Validates the metadata of a published package.
pub fn validate_package_info(package: &Package) -> Vec<ValidationError> {
    validate(package, PACKAGE_INFO_VALIDATORS, &["appVersion"])
}
