//! Subscriber setup for the CLI. Logs go to stderr so stdout stays clean for
//! command output.

use crate::ports::config_port::ConfigPort;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LEVEL: &str = "info";

/// `RUST_LOG` wins over `[logging] level`.
pub fn filter_directive(config: Option<&dyn ConfigPort>) -> String {
    if let Ok(env) = std::env::var("RUST_LOG") {
        if !env.trim().is_empty() {
            return env;
        }
    }
    config
        .and_then(|c| c.get_string("logging", "level"))
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
}

/// Installs the global subscriber. A second call is a no-op.
pub fn init(config: Option<&dyn ConfigPort>) {
    let directive = filter_directive(config);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
