// src/logging.rs
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a compact stderr subscriber. `RUST_LOG` wins over the
/// given default filter. The library itself never calls this; it is
/// for binaries embedding the pipeline and for tests. Calling it twice
/// is a no-op rather than a panic.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_does_not_panic() {
        init_tracing("idea_inspiration_pipeline=debug");
        init_tracing("warn");
    }
}
