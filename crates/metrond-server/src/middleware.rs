//! Middleware stack, outermost first: request logging, HMAC verification,
//! envelope decryption, gzip. The signature covers the body bytes exactly
//! as they travel on the wire, so verification runs before decryption; for
//! the same reason response signing happens after response compression.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::header::{HeaderValue, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

use metrond_common::{compress, sign};

use crate::state::AppState;

fn status_response(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// Logs method, path, status and elapsed time for every request.
pub async fn request_logging(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "request handled"
    );
    response
}

/// Verifies `HashSHA256` over the raw received body and signs response
/// bodies with the same key. A missing header passes through; a mismatch
/// is a 400.
pub async fn verify_hmac(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(key) = state.sign_key.clone() else {
        return next.run(req).await;
    };
    if req.method() != Method::POST {
        return next.run(req).await;
    }
    let header = HeaderName::from_static("hashsha256");
    let received = match req.headers().get(&header).and_then(|v| v.to_str().ok()) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => return next.run(req).await,
    };

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "unexpected error reading request body");
            return status_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    match sign::verify(&bytes, &key, &received) {
        Ok(true) => {}
        Ok(false) => {
            tracing::info!("hash check failed");
            return status_response(StatusCode::BAD_REQUEST);
        }
        Err(e) => {
            tracing::error!(error = %e, "hash verification error");
            return status_response(StatusCode::BAD_REQUEST);
        }
    }

    let req = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(req).await;

    // sign the response body as it will be sent
    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "unexpected error reading response body");
            return status_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let mut response = Response::from_parts(parts, Body::from(bytes.clone()));
    if !bytes.is_empty() {
        if let Ok(hash) = sign::calculate(&bytes, &key) {
            if let Ok(value) = HeaderValue::from_str(&hash) {
                response.headers_mut().insert(header, value);
            }
        }
    }
    response
}

/// Opens the hybrid envelope on POST bodies when a private key is
/// configured. Failures are a 400.
pub async fn decrypt(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(decryptor) = state.decryptor.clone() else {
        return next.run(req).await;
    };
    if req.method() != Method::POST {
        return next.run(req).await;
    }

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "unexpected error reading request body");
            return status_response(StatusCode::BAD_REQUEST);
        }
    };
    if bytes.is_empty() {
        return next.run(Request::from_parts(parts, Body::empty())).await;
    }

    let plaintext = match decryptor.decrypt(&bytes) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            tracing::error!(error = %e, "decryption failed");
            return status_response(StatusCode::BAD_REQUEST);
        }
    };

    next.run(Request::from_parts(parts, Body::from(plaintext)))
        .await
}

/// Request side: unpacks `Content-Encoding: gzip` bodies, answering 400 on
/// malformed streams. Response side: compresses JSON and HTML responses
/// when the client accepts gzip.
pub async fn gzip(req: Request, next: Next) -> Response {
    let accepts_gzip = req
        .headers()
        .get(ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));

    let sends_gzip = req
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));

    let req = if sends_gzip {
        let (mut parts, body) = req.into_parts();
        let bytes = match to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "unexpected error reading request body");
                return status_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };
        let plain = match compress::gunzip(&bytes) {
            Ok(plain) => plain,
            Err(e) => {
                tracing::info!(error = %e, "malformed gzip request body");
                return status_response(StatusCode::BAD_REQUEST);
            }
        };
        parts.headers.remove(CONTENT_ENCODING);
        Request::from_parts(parts, Body::from(plain))
    } else {
        req
    };

    let response = next.run(req).await;
    if !accepts_gzip {
        return response;
    }

    // compress only JSON and HTML payloads
    let compressible = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json") || ct.starts_with("text/html"));
    if !compressible {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "unexpected error reading response body");
            return status_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let packed = match compress::gzip(&bytes) {
        Ok(packed) => packed,
        Err(e) => {
            tracing::error!(error = %e, "error compressing response");
            return Response::from_parts(parts, Body::from(bytes));
        }
    };

    parts
        .headers
        .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(packed))
}
