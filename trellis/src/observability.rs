//! Tracing subscriber setup.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Configures the global `tracing` subscriber.
///
/// `RUST_LOG`, when set, overrides the configured level.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub level: Level,
    pub json: bool,
}

impl TracingConfig {
    pub fn new() -> Self {
        Self {
            level: Level::INFO,
            json: false,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Emit one JSON object per event.
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_ascii_lowercase()))
    }

    /// Installs the subscriber. Does nothing if one is already installed.
    pub fn init(self) {
        let builder = tracing_subscriber::fmt().with_env_filter(self.filter());
        let _ = if self.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = TracingConfig::new().with_level(Level::DEBUG).json();
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.json);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        TracingConfig::new().init();
        TracingConfig::new().json().init();
    }
}
