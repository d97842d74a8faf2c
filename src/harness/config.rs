//! Harness configuration.
//!
//! Values are layered: built-in defaults, then the `defaults:` blocks of the loaded suite
//! files in load order, then command-line flags. A per-example `timeout` still wins over
//! all of them for that one example.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_MAX_CALL_DEPTH: usize = 2000;
pub const DEFAULT_SEED: u64 = 0x5EED;
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Wall-clock limit per example.
    pub timeout_ms: u64,
    /// Nested calls allowed before `RangeError: Maximum call stack size exceeded`.
    pub max_call_depth: usize,
    /// Seed for `Math.random`.
    pub seed: u64,
    /// Stack reserved for each worker thread.
    pub stack_size: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            seed: DEFAULT_SEED,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl HarnessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Overlays the fields a suite's `defaults:` block sets.
    pub fn apply(&mut self, defaults: &SuiteDefaults) {
        if let Some(timeout_ms) = defaults.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if let Some(max_call_depth) = defaults.max_call_depth {
            self.max_call_depth = max_call_depth;
        }
        if let Some(seed) = defaults.seed {
            self.seed = seed;
        }
    }
}

/// The `defaults:` block of a suite file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteDefaults {
    pub timeout_ms: Option<u64>,
    pub max_call_depth: Option<usize>,
    pub seed: Option<u64>,
}

impl SuiteDefaults {
    /// Later values win.
    pub fn merge(&mut self, other: &SuiteDefaults) {
        self.timeout_ms = other.timeout_ms.or(self.timeout_ms);
        self.max_call_depth = other.max_call_depth.or(self.max_call_depth);
        self.seed = other.seed.or(self.seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_defaults_only_override_what_they_set() {
        let mut config = HarnessConfig::default();
        config.apply(&SuiteDefaults {
            timeout_ms: Some(500),
            ..SuiteDefaults::default()
        });
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
        assert_eq!(config.seed, DEFAULT_SEED);
    }

    #[test]
    fn later_defaults_win() {
        let mut merged = SuiteDefaults {
            timeout_ms: Some(100),
            seed: Some(1),
            ..SuiteDefaults::default()
        };
        merged.merge(&SuiteDefaults {
            timeout_ms: Some(300),
            ..SuiteDefaults::default()
        });
        assert_eq!(merged.timeout_ms, Some(300));
        assert_eq!(merged.seed, Some(1));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: HarnessConfig = serde_yaml::from_str("timeout_ms: 50").unwrap();
        assert_eq!(config.timeout_ms, 50);
        assert_eq!(config.stack_size, DEFAULT_STACK_SIZE);
        assert!(serde_yaml::from_str::<HarnessConfig>("timeout: 50").is_err());
    }
}
