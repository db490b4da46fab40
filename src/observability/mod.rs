//! Tracing initialization
//!
//! Hosts embedding the engine call this once at startup; tests use
//! `try_init` so repeated initialization is harmless.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a formatted subscriber filtered by `RETUNE_LOG` (falling back to
/// `RUST_LOG`, then `retune=info`).
pub fn init_tracing() {
    let filter = std::env::var("RETUNE_LOG")
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("retune=info"))
        });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
