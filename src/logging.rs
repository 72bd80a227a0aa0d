//! Tracing setup. The level comes from configuration and is fixed once at
//! startup; `RUST_LOG` still wins when set, for ad-hoc debugging.

use crate::uploader::config::LogConfig;
use tracing_subscriber::EnvFilter;

fn filter_for(cfg: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level))
}

/// Install the global subscriber, writing to stderr so stdout stays free for
/// command reports. Calling it again is a no-op.
pub fn init(cfg: &LogConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(cfg))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
