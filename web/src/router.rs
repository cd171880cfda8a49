use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use log::*;
use service::AppState;
use tower_http::cors::CorsLayer;

use crate::controller::{health_check_controller, sse_controller, stream_controller};

pub fn define_routes(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state);

    Router::new()
        .merge(health_routes())
        .merge(stream_routes(app_state.clone()))
        .merge(sse_routes(app_state))
        .layer(cors)
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn stream_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/stream", get(stream_controller::stream))
        .with_state(app_state)
}

fn sse_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/sse", get(sse_controller::sse))
        .with_state(app_state)
}

fn cors_layer(app_state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = app_state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(origin) => Some(origin),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET])
}
