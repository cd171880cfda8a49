use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use log::*;
use service::AppState;

use crate::demo;
use crate::error::Result;

/// GET the demo value as framed text. The body is complete JSON once every source finished.
pub async fn stream(State(app_state): State<AppState>) -> Result<Response> {
    debug!("Streaming demo value as framed text");

    let text = app_state
        .tson
        .stringify_stream(&demo::demo_value(), app_state.config.stream_indent)?;

    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(text),
    )
        .into_response())
}
