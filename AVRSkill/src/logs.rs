// logs.rs
use avrconfig::Config;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Filtre de logs : `RUST_LOG` s'il est défini, sinon `host.logger.min_level`.
fn log_filter(config: &Config) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let level = config
        .get_log_min_level()
        .unwrap_or_else(|_| "INFO".to_string());
    EnvFilter::try_new(level.to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialise le logging console
pub fn init_logging(config: &Config) {
    Registry::default()
        .with(log_filter(config))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(true),
        )
        .init();
}
