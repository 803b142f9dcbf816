//! Logging setup.
//!
//! Log lines go to stderr with a local `HH:MM:SS` timestamp so they stay
//! readable next to the report printed on stdout. `RUST_LOG` takes precedence
//! over the configured level.

use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone)]
pub struct Telemetry {
    level: String,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(&self.level).unwrap_or_else(|e| {
                eprintln!("Invalid log level '{}' ({}), falling back to info", self.level, e);
                EnvFilter::new("info")
            })
        })
    }

    /// Install the global subscriber. A second call is a no-op.
    pub fn register(self) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(self.env_filter())
            .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
