use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;
use crate::{api, middleware};

/// Builds the full router. Layers added later wrap the earlier ones, so
/// the execution order is logging, HMAC verification, decryption, gzip,
/// then the handler.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::list))
        .route("/ping", get(api::ping))
        .route("/update/{mtype}/{id}/{value}", post(api::update_url))
        .route("/value/{mtype}/{id}", get(api::value_url))
        .route("/update", post(api::update_json))
        .route("/value", post(api::value_json))
        .route("/updates", post(api::updates_json))
        .layer(from_fn(middleware::gzip))
        .layer(from_fn_with_state(state.clone(), middleware::decrypt))
        .layer(from_fn_with_state(state.clone(), middleware::verify_hmac))
        .layer(from_fn(middleware::request_logging))
        .with_state(state)
}
