pub mod macros;
pub mod stream_config;

pub mod groups;

// Re-exports for use in the config_group macro expansion.
pub use utils::configuration_utils::ParsableConfigValue;
#[doc(hidden)]
pub use {const_str, konst};
// Re-export StreamConfig and the process-wide accessor for convenience
pub use stream_config::{stream_config};

pub type StreamingConfig = groups::streaming::ConfigValues;
pub type EngineConfig = groups::engine::ConfigValues;
