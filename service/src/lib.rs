use config::Config;
use log::info;
use std::time::Duration;
use tson::{handlers, Tson};

pub mod config;
pub mod logging;

// Service-level state shared by every request
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Config,
    pub tson: Tson,
}

impl AppState {
    /// Builds the state with every built-in handler registered.
    pub fn new(app_config: Config) -> Result<Self, tson::Error> {
        let tson = Tson::new(handlers::all())?;
        info!("Registered {} type handlers", tson.registry().len());

        Ok(Self {
            config: app_config,
            tson,
        })
    }

    /// Interval between SSE keep-alive events, `None` when disabled.
    pub fn sse_keep_alive(&self) -> Option<Duration> {
        match self.config.sse_keep_alive_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
