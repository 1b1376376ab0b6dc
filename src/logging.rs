use std::env;

/// Initializes the tracing subscriber for the embedding application.
///
/// An explicit `RUST_LOG` takes precedence over the configured level. Safe to
/// call more than once; subsequent calls are no-ops.
pub fn init(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("agrimart_checkout={}", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new(filter_directive))
        .with(fmt::layer())
        .try_init();
}
