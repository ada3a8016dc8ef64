//! Profiling utilities based on the `puffin` crate.

pub use puffin::{GlobalProfiler, profile_function, profile_scope};

/// Profiling backend options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilingBackend {
    /// Record scopes in-process only.
    InProcess,
    /// Send profiling data to puffin_viewer via HTTP.
    PuffinHttp,
}

#[cfg(feature = "profiling")]
static PROFILING_SERVER: std::sync::OnceLock<puffin_http::Server> = std::sync::OnceLock::new();

/// Address the puffin HTTP server binds to.
pub const PUFFIN_ADDR: &str = "0.0.0.0:8585";

/// Enable scope recording and start the requested backend.
///
/// # Example
/// ```no_run
/// use vellum_core::profiling::{init_profiling, ProfilingBackend};
///
/// init_profiling(ProfilingBackend::PuffinHttp);
/// ```
pub fn init_profiling(backend: ProfilingBackend) {
    puffin::set_scopes_on(true);

    match backend {
        ProfilingBackend::InProcess => {}
        #[cfg(feature = "profiling")]
        ProfilingBackend::PuffinHttp => match puffin_http::Server::new(PUFFIN_ADDR) {
            Ok(server) => {
                tracing::info!("Puffin profiler server started on http://{}", PUFFIN_ADDR);
                let _ = PROFILING_SERVER.set(server);
            }
            Err(e) => {
                tracing::error!("Failed to start puffin server: {}", e);
            }
        },
        #[cfg(not(feature = "profiling"))]
        ProfilingBackend::PuffinHttp => {
            tracing::warn!("puffin_http support not compiled in; recording scopes in-process");
        }
    }
}

/// Mark the start of a new frame for profiling.
///
/// The renderer calls this from `flip`, so applications only need it when
/// they drive frames without presenting.
#[inline]
pub fn new_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}
