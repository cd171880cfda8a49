use axum::extract::State;
use axum::response::Response;
use log::*;
use service::AppState;

use crate::demo;
use crate::error::Result;

/// GET the demo value as a Server-Sent-Events stream.
pub async fn sse(State(app_state): State<AppState>) -> Result<Response> {
    debug!("Streaming demo value as server-sent events");

    let events = sse::encode(&app_state.tson, &demo::demo_value())?;
    Ok(sse::sse_response(events, app_state.sse_keep_alive()))
}
