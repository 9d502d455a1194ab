use crate::groups;

/// Primary configuration struct containing all config sections
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    pub streaming: groups::streaming::ConfigValues,
    pub engine: groups::engine::ConfigValues,
}

impl StreamConfig {
    /// Create a new StreamConfig instance with default values and apply environment
    /// variable overrides. This is equivalent to
    /// `StreamConfig::default().with_env_overrides()`.
    pub fn new() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment variable overrides to all configuration sections.
    /// Returns a new `StreamConfig` instance with overrides applied.
    /// The group name for each section is derived from its module name.
    /// Environment variables follow the pattern: PIECESTREAM_{GROUP_NAME}_{FIELD_NAME}
    pub fn with_env_overrides(mut self) -> Self {
        self.streaming.apply_env_overrides();
        self.engine.apply_env_overrides();
        self
    }
}

lazy_static::lazy_static! {
    static ref STREAM_CONFIG: StreamConfig = StreamConfig::new();
}

/// Process-wide configuration defaults, resolved once from the environment on
/// first access.
pub fn stream_config() -> &'static StreamConfig {
    &STREAM_CONFIG
}
