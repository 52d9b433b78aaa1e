use crate::api::report_status::{handle_deploy_report, handle_download_report};
use crate::api::update_check::handle_update_check;
use crate::api::utils::HandlerBody;
use crate::errors::UpdateServerError;
use crate::history_source::HistorySource;
use crate::metrics_defs::REQUEST_DURATION;
use http_body_util::BodyExt;
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use shared::http::make_boxed_error_response;
use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

const UPDATE_CHECK_PATH: &str = "/v0.1/public/codepush/update_check";
const REPORT_DEPLOY_PATH: &str = "/v0.1/public/codepush/report_status/deploy";
const REPORT_DOWNLOAD_PATH: &str = "/v0.1/public/codepush/report_status/download";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Route {
    UpdateCheck,
    ReportDeploy,
    ReportDownload,
}

impl Route {
    fn find(base_path: &str, path: &str) -> Option<Self> {
        match path.strip_prefix(base_path)? {
            UPDATE_CHECK_PATH => Some(Route::UpdateCheck),
            REPORT_DEPLOY_PATH => Some(Route::ReportDeploy),
            REPORT_DOWNLOAD_PATH => Some(Route::ReportDownload),
            _ => None,
        }
    }

    fn method(&self) -> Method {
        match self {
            Route::UpdateCheck => Method::GET,
            Route::ReportDeploy | Route::ReportDownload => Method::POST,
        }
    }

    const fn as_str(&self) -> &'static str {
        match self {
            Route::UpdateCheck => "update_check",
            Route::ReportDeploy => "report_status_deploy",
            Route::ReportDownload => "report_status_download",
        }
    }
}

/// Serves update checks and status reports on the main listener.
#[derive(Clone)]
pub struct UpdateService {
    base_path: Arc<str>,
    source: Arc<dyn HistorySource>,
}

impl UpdateService {
    pub fn new(base_path: &str, source: Arc<dyn HistorySource>) -> Self {
        UpdateService {
            base_path: base_path.into(),
            source,
        }
    }

    pub async fn handle<B>(&self, request: Request<B>) -> Response<HandlerBody>
    where
        B: Body,
        B::Error: Display,
    {
        let started = Instant::now();
        let Some(route) = Route::find(&self.base_path, request.uri().path()) else {
            return make_boxed_error_response(StatusCode::NOT_FOUND);
        };

        let response = if request.method() != route.method() {
            make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED)
        } else {
            match self.dispatch(route, request).await {
                Ok(response) => response,
                Err(error) => {
                    tracing::error!(route = route.as_str(), %error, "Request failed");
                    make_boxed_error_response(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        };

        shared::histogram!(
            REQUEST_DURATION,
            "route" => route.as_str(),
            "status" => response.status().as_str().to_string()
        )
        .record(started.elapsed().as_secs_f64());

        response
    }

    async fn dispatch<B>(
        &self,
        route: Route,
        request: Request<B>,
    ) -> Result<Response<HandlerBody>, UpdateServerError>
    where
        B: Body,
        B::Error: Display,
    {
        match route {
            Route::UpdateCheck => {
                handle_update_check(self.source.as_ref(), request.uri().query()).await
            }
            Route::ReportDeploy => Ok(handle_deploy_report(&read_body(request).await?)),
            Route::ReportDownload => Ok(handle_download_report(&read_body(request).await?)),
        }
    }
}

async fn read_body<B>(request: Request<B>) -> Result<Bytes, UpdateServerError>
where
    B: Body,
    B::Error: Display,
{
    request
        .into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| UpdateServerError::RequestBodyError(e.to_string()))
}

impl Service<Request<Incoming>> for UpdateService {
    type Response = Response<HandlerBody>;
    type Error = UpdateServerError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, request: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(request).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{DEPLOYMENT_KEY, body_json, body_text, package, static_source};
    use http_body_util::Full;

    fn service(base_path: &str) -> UpdateService {
        let source = static_source(vec![package("v1", "1.0.0", "h1")]);
        UpdateService::new(base_path, Arc::new(source))
    }

    fn request(method: Method, uri: &str, body: &'static str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    #[test]
    fn test_route_find() {
        assert_eq!(Route::find("", UPDATE_CHECK_PATH), Some(Route::UpdateCheck));
        assert_eq!(
            Route::find("/codepush", "/codepush/v0.1/public/codepush/report_status/deploy"),
            Some(Route::ReportDeploy)
        );
        assert_eq!(Route::find("/codepush", UPDATE_CHECK_PATH), None);
        assert_eq!(Route::find("", "/v0.1/public/codepush/update_check/"), None);
    }

    #[tokio::test]
    async fn test_update_check_under_base_path() {
        let uri = format!(
            "http://localhost/codepush/v0.1/public/codepush/update_check\
             ?deployment_key={DEPLOYMENT_KEY}&app_version=1.0.0"
        );
        let response = service("/codepush")
            .handle(
                Request::builder()
                    .uri(uri)
                    .body(Full::new(Bytes::new()))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["update_info"]["label"], "v1");
    }

    #[tokio::test]
    async fn test_status_reports() {
        let service = service("");
        let response = service
            .handle(request(
                Method::POST,
                REPORT_DEPLOY_PATH,
                r#"{"deploymentKey": "key", "appVersion": "1.0.0", "label": "v1", "status": "DeploymentFailed"}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = service
            .handle(request(Method::POST, REPORT_DOWNLOAD_PATH, "{}"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_text(response).await,
            "A download status report must contain a valid deploymentKey and package label."
        );

        let response = service
            .handle(request(Method::POST, REPORT_DEPLOY_PATH, "[1, 2"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_path_and_wrong_method() {
        let service = service("");

        let response = service.handle(request(Method::GET, "/nope", "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = service
            .handle(request(Method::POST, UPDATE_CHECK_PATH, ""))
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let response = service
            .handle(request(Method::GET, REPORT_DEPLOY_PATH, ""))
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_history_failure_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = crate::history_source::FilesystemHistorySource::new(dir.path().join("none"));
        let service = UpdateService::new("", Arc::new(source));

        let uri = format!("{UPDATE_CHECK_PATH}?deploymentKey={DEPLOYMENT_KEY}&appVersion=1.0.0");
        let response = service
            .handle(
                Request::builder()
                    .uri(uri)
                    .body(Full::new(Bytes::new()))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
