//! Optional structured tracing. Compiled in with the `telemetry` feature and switched on at
//! runtime with `DEVBOX_TRACING_FMT=1`; `RUST_LOG` selects the filter (default `warn`).

#[cfg(feature = "telemetry")]
use once_cell::sync::OnceCell;

#[cfg(feature = "telemetry")]
static INIT: OnceCell<()> = OnceCell::new();

#[cfg(feature = "telemetry")]
fn fmt_enabled_env() -> bool {
    std::env::var("DEVBOX_TRACING_FMT").ok().as_deref() == Some("1")
}

/// Install the global fmt subscriber once. Returns whether a subscriber was installed.
#[cfg(feature = "telemetry")]
pub fn telemetry_init() -> bool {
    use tracing_subscriber::prelude::*;

    if INIT.get().is_some() || !fmt_enabled_env() {
        return false;
    }
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    let env_filter = tracing_subscriber::EnvFilter::new(filter);
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        eprintln!("devbox: telemetry init skipped (global subscriber already set)");
        return false;
    }
    let _ = INIT.set(());
    true
}

#[cfg(not(feature = "telemetry"))]
pub fn telemetry_init() -> bool {
    false
}
