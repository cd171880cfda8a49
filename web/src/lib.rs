//! HTTP surface of the demo server: health check, framed text stream and SSE stream of a value
//! holding promises and async iterables.

use log::*;
use service::AppState;
use tokio::net::TcpListener;

mod controller;
pub(crate) mod demo;
mod error;
pub mod router;

pub use error::{Error, Result};

/// Binds the configured interface and port and serves until the listener fails.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let address = format!(
        "{}:{}",
        app_state.config.interface(),
        app_state.config.port
    );
    let listener = TcpListener::bind(&address).await?;
    info!("Server starting... listening for connections on http://{address}");

    axum::serve(listener, router::define_routes(app_state)).await
}
