use log::{error, info};
use service::{config::Config, logging::Logger, AppState};

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config as &Config);

    info!(
        "Starting tson_server [{}] on {}:{}",
        config.runtime_env(),
        config.interface(),
        config.port
    );

    let app_state = match AppState::new(config) {
        Ok(app_state) => app_state,
        Err(e) => {
            error!("Failed to build the handler registry: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = web::init_server(app_state).await {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
