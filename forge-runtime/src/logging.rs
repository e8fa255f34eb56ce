//! Initializes the process-wide `tracing` subscriber: an `EnvFilter`
//! defaulting to `info`, overridable via `RUST_LOG`, writing to stderr so
//! stdout stays free for protocol traffic.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}
