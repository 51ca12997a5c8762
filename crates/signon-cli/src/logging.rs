use std::env;
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

fn level_from_env() -> Level {
    env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO)
}

/// Install the stderr subscriber. `RUST_LOG` wins over `LOG_LEVEL`.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { Level::DEBUG } else { level_from_env() };
        EnvFilter::new(format!("warn,signon={level},signon_cli={level}").to_lowercase())
    });

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    // Only fails when a global subscriber exists, which then receives this.
    if let Err(e) = installed {
        debug!("keeping the existing tracing subscriber: {e}");
    }
}
