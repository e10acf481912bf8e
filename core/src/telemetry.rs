// Telemetry and observability
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Call once from your entry point
/// before constructing a Host; repeated calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
