//! Platform publisher abstraction
//!
//! The core never talks to a social platform directly; it calls whatever
//! `PlatformPublisher` implementations the hosting application registers
//! with the orchestrator. Publishers are plain injected capabilities owned
//! by the host, one per platform, never process-wide singletons.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::PlatformsConfig;
use crate::error::Result;
use crate::types::ScheduledPost;

pub mod mock;

pub use mock::MockPublisher;

/// Delivery capability for a single social platform.
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    /// Lowercase platform identifier this publisher serves, matching the
    /// entries posts carry in `platforms`.
    fn name(&self) -> &str;

    /// Deliver the post to the platform.
    ///
    /// May be called more than once for the same post: after a lease
    /// expires mid-publish, a later reconciliation pass re-delivers.
    /// Implementations should be idempotent or safely retryable; a
    /// duplicate external post is an accepted, documented risk.
    ///
    /// # Errors
    ///
    /// Returns a `PlatformError` describing the failed attempt. The error
    /// is recorded against the post and never aborts sibling platforms.
    async fn publish(&self, post: &ScheduledPost) -> Result<()>;
}

/// Build simulated publishers for every enabled platform id.
///
/// Used by the shipped binaries, which have no real platform credentials;
/// delivery latency and failures come from the `[platforms]` config
/// section.
pub fn create_publishers(config: &PlatformsConfig) -> Vec<Arc<dyn PlatformPublisher>> {
    config
        .enabled
        .iter()
        .map(|name| {
            Arc::new(MockPublisher::flaky(
                name,
                config.failure_rate,
                std::time::Duration::from_millis(config.publish_delay_ms),
            )) as Arc<dyn PlatformPublisher>
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_publishers_covers_enabled_platforms() {
        let config = PlatformsConfig {
            enabled: vec!["insta".to_string(), "tiktok".to_string()],
            failure_rate: 0.0,
            publish_delay_ms: 0,
        };

        let publishers = create_publishers(&config);
        assert_eq!(publishers.len(), 2);

        let names: Vec<&str> = publishers.iter().map(|p| p.name()).collect();
        assert!(names.contains(&"insta"));
        assert!(names.contains(&"tiktok"));
    }

    #[test]
    fn test_create_publishers_empty_config() {
        let config = PlatformsConfig {
            enabled: vec![],
            failure_rate: 0.0,
            publish_delay_ms: 0,
        };

        assert!(create_publishers(&config).is_empty());
    }
}
