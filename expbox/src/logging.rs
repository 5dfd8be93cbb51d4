//! Diagnostic tracing for the `expbox` binary.
//!
//! - **Tracing (this module)**: developer diagnostics via `RUST_LOG`, written
//!   to stderr and never persisted.
//! - **Experiment metrics (`io/exp_logger`)**: product output in
//!   `logs/metrics.jsonl` inside each box, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output goes to stderr so stdout
/// stays machine-readable.
///
/// ```bash
/// RUST_LOG=expbox=debug expbox save --status done
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
