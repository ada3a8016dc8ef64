use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Directive used when neither `RUST_LOG` nor an explicit filter is given.
pub const DEFAULT_FILTER: &str = "info,wgpu_core=info,naga=info,wgpu_hal=info";

static INIT: Once = Once::new();

/// Installs the global fmt subscriber with the default filter.
///
/// `RUST_LOG` takes precedence when set. Calling this more than once is a no-op.
pub fn init() {
    init_with_filter(DEFAULT_FILTER);
}

pub fn init_with_filter(filter: &str) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
        // Another subscriber may already be installed by the host application.
        let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_does_not_panic() {
        init();
        init_with_filter("debug");
        tracing::info!("logging initialised");
    }
}
