use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, filter::Targets, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// Crate log level: `debug` when verbose, `info` for long-running commands
/// and `warn` for the rest.
pub fn level_for(verbose: bool, long_running: bool) -> LevelFilter {
    match (verbose, long_running) {
        (true, _) => LevelFilter::DEBUG,
        (false, true) => LevelFilter::INFO,
        (false, false) => LevelFilter::WARN,
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence.
pub fn init_logging(verbose: bool, long_running: bool) {
    let level_filter = level_for(verbose, long_running);
    let app_filter = Targets::new()
        .with_target("tasabcv", level_filter)
        .with_target("tower_http", level_filter);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_filter.to_string().to_lowercase()));

    tracing_subscriber::registry()
        .with(fmt::layer().pretty().without_time())
        .with(app_filter)
        .with(env_filter)
        .init();
}
