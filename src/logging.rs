use tracing_subscriber::EnvFilter;

/// Initialise logging. The configured level is the default; `RUST_LOG`
/// overrides it when set. Safe to call more than once.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
