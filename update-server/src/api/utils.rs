use crate::errors::UpdateServerError;
use http_body_util::combinators::BoxBody;
use hyper::StatusCode;
use hyper::body::Bytes;
use serde::Serialize;
use shared::http::make_json_response;
use std::collections::HashMap;

pub type HandlerBody = BoxBody<Bytes, UpdateServerError>;

/// Decoded query string parameters. The first occurrence of a name wins.
#[derive(Debug, Default)]
pub struct QueryParams(HashMap<String, String>);

impl QueryParams {
    pub fn parse(query: Option<&str>) -> Self {
        let mut params = HashMap::new();
        for (name, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            params.entry(name.into_owned()).or_insert(value.into_owned());
        }
        QueryParams(params)
    }

    /// Looks a parameter up by its camelCase name, falling back to snake_case
    /// when the camelCase one is absent or empty.
    pub fn get(&self, camel_case: &str, snake_case: &str) -> Option<&str> {
        self.0
            .get(camel_case)
            .filter(|value| !value.is_empty())
            .or_else(|| self.0.get(snake_case))
            .map(String::as_str)
    }
}

/// Serializes a value into a JSON response.
pub fn json_response<T: Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<hyper::Response<HandlerBody>, UpdateServerError> {
    let bytes = serde_json::to_vec(value)?;
    Ok(make_json_response(status, bytes))
}
