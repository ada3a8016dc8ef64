use crate::logging;
use crate::profiling::{ProfilingBackend, init_profiling};

/// Process-level settings for a Vellum application.
#[derive(Debug, Default)]
pub struct Config {
    /// Custom `tracing` directive. Falls back to [`logging::DEFAULT_FILTER`].
    pub log_filter: Option<String>,
    pub benchmark: BenchmarkMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BenchmarkMode {
    /// Benchmarking is disabled
    #[default]
    Off,
    /// Profiling scopes are recorded in-process
    On,
    /// Profiling scopes are recorded and served to external tools such as 'puffin_viewer'
    WithWebserver,
}

impl Config {
    /// Initializes logging and, if requested, profiling.
    pub fn apply(&self) {
        match &self.log_filter {
            Some(filter) => logging::init_with_filter(filter),
            None => logging::init(),
        }

        match self.benchmark {
            BenchmarkMode::Off => {}
            BenchmarkMode::On => init_profiling(ProfilingBackend::InProcess),
            BenchmarkMode::WithWebserver => init_profiling(ProfilingBackend::PuffinHttp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_disables_benchmarking() {
        let config = Config::default();
        assert_eq!(config.benchmark, BenchmarkMode::Off);
        assert!(config.log_filter.is_none());
    }
}
