//! Session-wide tunables.

use serde::{Deserialize, Serialize};

/// Default cap on descent levels during address lookup.
pub const DEFAULT_LOOKUP_ITERATION_LIMIT: usize = 100;

/// Top-level configuration for a [`crate::Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(default)]
pub struct RalConfig {
    /// Maximum tree levels visited by address lookup before it is treated as
    /// a malformed (cyclic) map.
    pub lookup_iteration_limit: usize,
    /// Decodes every numeric attribute when the session starts instead of on
    /// first access.
    pub eager_expansion: bool,
}

impl Default for RalConfig {
    fn default() -> Self {
        Self {
            lookup_iteration_limit: DEFAULT_LOOKUP_ITERATION_LIMIT,
            eager_expansion: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RalConfig, DEFAULT_LOOKUP_ITERATION_LIMIT};

    #[test]
    fn default_config_uses_lookup_cap_of_100() {
        let config = RalConfig::default();
        assert_eq!(config.lookup_iteration_limit, DEFAULT_LOOKUP_ITERATION_LIMIT);
        assert_eq!(DEFAULT_LOOKUP_ITERATION_LIMIT, 100);
        assert!(!config.eager_expansion);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: RalConfig =
            serde_json::from_str(r#"{"eager_expansion": true}"#).expect("valid config");
        assert!(config.eager_expansion);
        assert_eq!(config.lookup_iteration_limit, DEFAULT_LOOKUP_ITERATION_LIMIT);
    }
}
