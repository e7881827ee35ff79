use tracing::Level;

/// Log output settings consumed by [`crate::tracing::initialize`].
#[derive(Debug, Clone)]
pub struct Config {
    /// `EnvFilter` directives, e.g. `warn,balancer_stable=debug`.
    pub(crate) env_filter: String,
    /// Events at or above this level go to stderr instead of stdout.
    pub(crate) stderr_threshold: Option<Level>,
    pub(crate) use_json_format: bool,
}

impl Config {
    pub fn new(env_filter: impl Into<String>) -> Self {
        Self {
            env_filter: env_filter.into(),
            ..Default::default()
        }
    }

    pub fn with_json_format(self) -> Self {
        Self {
            use_json_format: true,
            ..self
        }
    }

    pub fn with_env_filter(self, env_filter: impl Into<String>) -> Self {
        Self {
            env_filter: env_filter.into(),
            ..self
        }
    }

    pub fn with_stderr_threshold(self, level: Level) -> Self {
        Self {
            stderr_threshold: Some(level),
            ..self
        }
    }

    pub fn env_filter(&self) -> &str {
        &self.env_filter
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env_filter: "info".to_string(),
            stderr_threshold: None,
            use_json_format: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let config = Config::default()
            .with_env_filter("warn,balancer_stable=trace")
            .with_stderr_threshold(Level::WARN)
            .with_json_format();
        assert_eq!(config.env_filter(), "warn,balancer_stable=trace");
        assert_eq!(config.stderr_threshold, Some(Level::WARN));
        assert!(config.use_json_format);
    }

    #[test]
    fn new_keeps_plain_output() {
        let config = Config::new("debug");
        assert_eq!(config.env_filter(), "debug");
        assert_eq!(config.stderr_threshold, None);
        assert!(!config.use_json_format);
    }
}
