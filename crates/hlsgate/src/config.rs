use std::time::Duration;

use crate::cache::CacheConfig;
use crate::pool::PoolConfig;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub cache: CacheConfig,
    pub pool: PoolConfig,
    pub fetch: FetchConfig,
}

/// Per-request fetch timeouts. Segment downloads get a shorter budget than
/// manifest fetches since players re-request them aggressively.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub manifest_fetch_timeout: Duration,
    pub segment_fetch_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            manifest_fetch_timeout: Duration::from_secs(15),
            segment_fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Runtime switch helper. Switches are matched against the literal string
/// `"true"` and re-read on every call, so flipping the environment takes
/// effect without a restart.
pub fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v == "true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_flag_matches_literal_true_only() {
        // SAFETY: test-local variable name, not read by other tests.
        unsafe {
            std::env::set_var("HLSGATE_TEST_FLAG", "1");
        }
        assert!(!env_flag("HLSGATE_TEST_FLAG"));
        unsafe {
            std::env::set_var("HLSGATE_TEST_FLAG", "true");
        }
        assert!(env_flag("HLSGATE_TEST_FLAG"));
        unsafe {
            std::env::remove_var("HLSGATE_TEST_FLAG");
        }
        assert!(!env_flag("HLSGATE_TEST_FLAG"));
    }

    #[test]
    fn fetch_defaults() {
        let fetch = FetchConfig::default();
        assert_eq!(fetch.manifest_fetch_timeout, Duration::from_secs(15));
        assert_eq!(fetch.segment_fetch_timeout, Duration::from_secs(10));
    }
}
