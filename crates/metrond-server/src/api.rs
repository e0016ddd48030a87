//! HTTP handlers.
//!
//! JSON bodies are decoded by hand so a malformed payload is a bare 400;
//! error messages never reach the client, only status codes do.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::str::FromStr;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;

use metrond_common::metric::{Metric, MetricType, MetricValue};

use crate::error::ServiceError;
use crate::service::RequestInfo;
use crate::state::AppState;
use crate::web;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const TEXT_HTML: &str = "text/html; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

/// Client address taken from the connection info, empty when absent
/// (e.g. when the router is driven in-process).
pub struct RemoteAddr(pub String);

impl<S> FromRequestParts<S> for RemoteAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.to_string())
            .unwrap_or_default();
        Ok(RemoteAddr(addr))
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn status_only(status: StatusCode) -> Response {
    respond(status, TEXT_PLAIN, Vec::new())
}

fn error_status(err: &ServiceError) -> Response {
    match err {
        ServiceError::NotFound { .. } => tracing::info!(error = %err, "request failed"),
        _ => tracing::error!(error = %err, "request failed"),
    }
    status_only(err.status_code())
}

fn json_response(metric: &Metric) -> Response {
    match serde_json::to_vec(metric) {
        Ok(body) => respond(StatusCode::OK, APPLICATION_JSON, body),
        Err(e) => {
            tracing::error!(error = %e, "error marshalling metric");
            status_only(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// `GET /ping`: 200 iff the storage is reachable.
pub async fn ping(State(state): State<AppState>) -> Response {
    match state.service.ping_storage().await {
        Ok(()) => status_only(StatusCode::OK),
        Err(e) => {
            tracing::error!(error = %e, "error pinging storage");
            status_only(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// `GET /`: HTML table of everything stored.
pub async fn list(State(state): State<AppState>) -> Response {
    match state.service.get_all_metrics().await {
        Ok(metrics) => respond(
            StatusCode::OK,
            TEXT_HTML,
            web::metrics_list_page(&metrics).into_bytes(),
        ),
        Err(e) => {
            tracing::error!(error = %e, "error getting list of metrics");
            status_only(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// `POST /update/{type}/{name}/{value}`: URL-form single update.
pub async fn update_url(
    State(state): State<AppState>,
    RemoteAddr(remote_addr): RemoteAddr,
    Path((mtype, id, value)): Path<(String, String, String)>,
) -> Response {
    let Ok(mtype) = MetricType::from_str(&mtype) else {
        tracing::info!(mtype = %mtype, "incorrect metric type");
        return status_only(StatusCode::BAD_REQUEST);
    };

    let parsed = match mtype {
        MetricType::Gauge => value.parse::<f64>().map(MetricValue::Gauge).ok(),
        MetricType::Counter => value.parse::<i64>().map(MetricValue::Counter).ok(),
    };
    let Some(parsed) = parsed else {
        tracing::info!(mtype = %mtype, value = %value, "incorrect metric value");
        return status_only(StatusCode::BAD_REQUEST);
    };

    let mut metric = Metric::new(id, mtype);
    if metric.update_value(parsed).is_err() {
        return status_only(StatusCode::BAD_REQUEST);
    }

    match state
        .service
        .update_metric(metric, RequestInfo { remote_addr })
        .await
    {
        Ok(()) => status_only(StatusCode::OK),
        Err(e) => error_status(&e),
    }
}

/// `GET /value/{type}/{name}`: plain-text value lookup.
pub async fn value_url(
    State(state): State<AppState>,
    Path((mtype, id)): Path<(String, String)>,
) -> Response {
    let Ok(mtype) = MetricType::from_str(&mtype) else {
        tracing::info!(mtype = %mtype, "incorrect metric type");
        return status_only(StatusCode::BAD_REQUEST);
    };

    match state.service.get_metric(&Metric::new(id, mtype)).await {
        Ok(metric) => respond(StatusCode::OK, TEXT_PLAIN, metric.value_str().into_bytes()),
        Err(e) => error_status(&e),
    }
}

/// `POST /update`: JSON single update, answers with the merged metric.
pub async fn update_json(
    State(state): State<AppState>,
    RemoteAddr(remote_addr): RemoteAddr,
    body: Bytes,
) -> Response {
    let metric: Metric = match serde_json::from_slice(&body) {
        Ok(metric) => metric,
        Err(e) => {
            tracing::info!(error = %e, "json decoding error");
            return status_only(StatusCode::BAD_REQUEST);
        }
    };

    let lookup = Metric::new(metric.id.clone(), metric.mtype);
    if let Err(e) = state
        .service
        .update_metric(metric, RequestInfo { remote_addr })
        .await
    {
        return error_status(&e);
    }

    match state.service.get_metric(&lookup).await {
        Ok(merged) => json_response(&merged),
        Err(e) => error_status(&e),
    }
}

/// `POST /value`: JSON lookup by id and type.
pub async fn value_json(State(state): State<AppState>, body: Bytes) -> Response {
    let metric: Metric = match serde_json::from_slice(&body) {
        Ok(metric) => metric,
        Err(e) => {
            tracing::info!(error = %e, "json decoding error");
            return status_only(StatusCode::BAD_REQUEST);
        }
    };

    match state.service.get_metric(&metric).await {
        Ok(found) => json_response(&found),
        Err(e) => error_status(&e),
    }
}

/// `POST /updates`: JSON batch update.
pub async fn updates_json(
    State(state): State<AppState>,
    RemoteAddr(remote_addr): RemoteAddr,
    body: Bytes,
) -> Response {
    let metrics: Vec<Metric> = match serde_json::from_slice(&body) {
        Ok(metrics) => metrics,
        Err(e) => {
            tracing::info!(error = %e, "json decoding error");
            return status_only(StatusCode::BAD_REQUEST);
        }
    };

    match state
        .service
        .update_metrics(metrics, RequestInfo { remote_addr })
        .await
    {
        Ok(()) => status_only(StatusCode::OK),
        Err(e) => error_status(&e),
    }
}
