//! Diagnostics for the binary. Evidence files are written regardless of
//! the filter chosen here.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a stderr subscriber filtered by `RUST_LOG` (default `warn`).
/// Library code logs through the `log` facade, which this subscriber picks up.
///
/// ```bash
/// RUST_LOG=autoqa=debug autoqa run --tag smoke
/// ```
pub fn init(verbose: bool) {
    let default = if verbose { "autoqa=info,warn" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
