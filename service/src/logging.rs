use crate::config::Config;
use log::LevelFilter;
use simplelog::{ConfigBuilder, TermLogger};

/// Runtime and HTTP stack crates, silenced below `Trace`.
const FILTERED_MODULES: &[&str] = &["tokio", "hyper", "axum", "tower", "mio"];

pub struct Logger {}

impl Logger {
    pub fn init_logger(config: &Config) {
        TermLogger::init(
            config.log_level_filter,
            Self::log_config(config.log_level_filter),
            simplelog::TerminalMode::Mixed,
            simplelog::ColorChoice::Auto,
        )
        .expect("Failed to start simplelog");
    }

    fn log_config(level: LevelFilter) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();
        if level != LevelFilter::Trace {
            for module in FILTERED_MODULES {
                builder.add_filter_ignore_str(module);
            }
        }
        builder.build()
    }
}
