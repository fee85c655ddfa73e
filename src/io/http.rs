//! HTTP surface: JSON API, SSE update streams, Prometheus metrics and health
//!
//! Uses hyper's http1 connection builder with one task per connection, the
//! same accept loop the metrics endpoint has always used.

use crate::app::AppState;
use crate::domain::package::{NewPackage, StatusUpdate};
use crate::domain::transitions;
use crate::domain::types::{PackageId, PackageStatus, TrackingCode};
use crate::io::prometheus::format_prometheus_metrics;
use crate::io::sse::SseBody;
use crate::services::lifecycle::LifecycleError;
use crate::services::simulator::StartOutcome;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub type HttpBody = UnsyncBoxBody<Bytes, Infallible>;

/// Largest JSON request body accepted
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Error payload shared by every failing route
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    message: String,
    code: &'a str,
    timestamp: DateTime<Utc>,
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

fn full(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<HttpBody> {
    let mut response = Response::new(Full::new(body.into()).boxed_unsync());
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<HttpBody> {
    match serde_json::to_vec(value) {
        Ok(body) => full(status, "application/json", body),
        Err(e) => {
            error!(error = %e, "response_serialize_failed");
            full(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "internal error")
        }
    }
}

fn error_body(
    status: StatusCode,
    error: &str,
    code: &str,
    message: String,
    path: &str,
    details: Option<serde_json::Value>,
) -> Response<HttpBody> {
    let body = ErrorBody {
        success: false,
        error,
        message,
        code,
        timestamp: Utc::now(),
        path,
        details,
    };
    json_response(status, &body)
}

fn bad_request(message: String, path: &str) -> Response<HttpBody> {
    error_body(StatusCode::BAD_REQUEST, "Validation error", "VALIDATION_ERROR", message, path, None)
}

/// Map a lifecycle error to its HTTP status and error payload
pub fn error_response(err: &LifecycleError, path: &str) -> Response<HttpBody> {
    match err {
        LifecycleError::PackageNotFound(_) => error_body(
            StatusCode::NOT_FOUND,
            "Package not found",
            "PACKAGE_NOT_FOUND",
            err.to_string(),
            path,
            None,
        ),
        LifecycleError::ActorNotFound(_) => error_body(
            StatusCode::NOT_FOUND,
            "Employee not found",
            "EMPLOYEE_NOT_FOUND",
            err.to_string(),
            path,
            None,
        ),
        LifecycleError::InvalidTransition(t) => error_body(
            StatusCode::BAD_REQUEST,
            "Invalid status transition",
            "INVALID_STATUS_TRANSITION",
            err.to_string(),
            path,
            Some(json!({ "currentStatus": t.from, "attemptedStatus": t.to })),
        ),
        LifecycleError::Validation(_) => bad_request(err.to_string(), path),
        LifecycleError::GenerationExhausted(_) | LifecycleError::Store(_) => {
            error!(error = %err, path = %path, "request_failed");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                "INTERNAL_ERROR",
                "An unexpected error occurred".to_string(),
                path,
                None,
            )
        }
    }
}

/// Filters accepted by `GET /api/packages`
#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
    phone: Option<String>,
}

async fn read_json<T, B>(body: B) -> Result<T, String>
where
    T: DeserializeOwned,
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = Limited::new(body, MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| format!("failed to read request body: {e}"))?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| format!("invalid request body: {e}"))
}

/// Route one request. Generic over the body so tests can drive it directly.
pub async fn route<B>(req: Request<B>, state: Arc<AppState>) -> Response<HttpBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    debug!(method = %parts.method, path = %path, "http_request");

    match (&parts.method, segments.as_slice()) {
        (&Method::POST, ["api", "packages"]) => {
            let request: NewPackage = match read_json(body).await {
                Ok(request) => request,
                Err(message) => return bad_request(message, &path),
            };
            match state.lifecycle.create(request).await {
                Ok(package) => json_response(StatusCode::CREATED, &package),
                Err(e) => error_response(&e, &path),
            }
        }
        (&Method::GET, ["api", "packages"]) => {
            let filters: ListQuery =
                match serde_urlencoded::from_str(parts.uri.query().unwrap_or("")) {
                    Ok(filters) => filters,
                    Err(e) => return bad_request(format!("invalid query string: {e}"), &path),
                };
            let result = if let Some(raw) = filters.status {
                match raw.parse::<PackageStatus>() {
                    Ok(status) => state.lifecycle.list_by_status(status).await,
                    Err(e) => return bad_request(e.to_string(), &path),
                }
            } else if let Some(phone) = filters.phone {
                state.lifecycle.list_by_recipient_phone(&phone).await
            } else {
                state.lifecycle.list_all().await
            };
            match result {
                Ok(packages) => json_response(StatusCode::OK, &packages),
                Err(e) => error_response(&e, &path),
            }
        }
        (&Method::GET, ["api", "packages", "id", id]) => {
            match state.lifecycle.find_by_id(&PackageId(id.to_string())).await {
                Ok(package) => json_response(StatusCode::OK, &package),
                Err(e) => error_response(&e, &path),
            }
        }
        (&Method::GET, ["api", "packages", "id", id, "notifications"]) => {
            let id = PackageId(id.to_string());
            if let Err(e) = state.lifecycle.find_by_id(&id).await {
                return error_response(&e, &path);
            }
            match state.notifications.for_package(&id).await {
                Ok(notifications) => json_response(StatusCode::OK, &notifications),
                Err(e) => error_response(&LifecycleError::Store(e), &path),
            }
        }
        (&Method::GET, ["api", "packages", code]) => {
            match state.lifecycle.find_by_tracking_code(&TrackingCode::from(*code)).await {
                Ok(package) => json_response(StatusCode::OK, &package),
                Err(e) => error_response(&e, &path),
            }
        }
        (&Method::PUT, ["api", "packages", code, "status"]) => {
            let update: StatusUpdate = match read_json(body).await {
                Ok(update) => update,
                Err(message) => return bad_request(message, &path),
            };
            match state.lifecycle.apply_status_change(&TrackingCode::from(*code), update).await {
                Ok(package) => json_response(StatusCode::OK, &package),
                Err(e) => error_response(&e, &path),
            }
        }
        (&Method::GET, ["api", "tracking", "in-transit"]) => {
            match state.lifecycle.packages_in_transit().await {
                Ok(packages) => json_response(StatusCode::OK, &packages),
                Err(e) => error_response(&e, &path),
            }
        }
        (&Method::POST, ["api", "tracking", code, "simulate"]) => {
            let code = TrackingCode::from(*code);
            match state.simulator.start(&code).await {
                Ok(StartOutcome::NotFound) => {
                    error_response(&LifecycleError::PackageNotFound(code.to_string()), &path)
                }
                Ok(outcome) => json_response(
                    StatusCode::ACCEPTED,
                    &json!({ "trackingNumber": code, "outcome": format!("{outcome:?}") }),
                ),
                Err(e) => error_response(&e, &path),
            }
        }
        (&Method::GET, ["api", "tracking", code, "stream"]) => {
            let rx = state.streams.open(TrackingCode::from(*code));
            let mut response = Response::new(SseBody::new(rx).boxed_unsync());
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            response
        }
        (&Method::GET, ["api", "notifications", "pending"]) => {
            match state.notifications.pending().await {
                Ok(notifications) => json_response(StatusCode::OK, &notifications),
                Err(e) => error_response(&LifecycleError::Store(e), &path),
            }
        }
        (&Method::GET, ["api", "notifications", code]) => {
            match state.notifications.for_tracking_code(&TrackingCode::from(*code)).await {
                Ok(notifications) => json_response(StatusCode::OK, &notifications),
                Err(e) => error_response(&LifecycleError::Store(e), &path),
            }
        }
        (&Method::GET, ["api", "statuses"]) => json_response(StatusCode::OK, &transitions::table()),
        (&Method::GET, ["metrics"]) => {
            let summary = state.metrics.snapshot(state.simulator.active_count());
            full(
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                format_prometheus_metrics(&summary, &state.site_id),
            )
        }
        (&Method::GET, ["health"]) => json_response(
            StatusCode::OK,
            &json!({ "status": "ok", "site": state.site_id, "version": state.version }),
        ),
        _ => {
            warn!(method = %parts.method, path = %path, "http_route_not_found");
            full(StatusCode::NOT_FOUND, "text/plain", "Not Found")
        }
    }
}

/// Serve connections from `listener` until shutdown is signalled
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { Ok::<_, Infallible>(route(req, state).await) }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                debug!(peer = %peer, error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

/// Bind and run the HTTP server
pub async fn start_http_server(
    bind_address: &str,
    port: u16,
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{bind_address}:{port}").parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, site = %state.site_id, "http_server_started");
    serve(listener, state, shutdown).await
}
