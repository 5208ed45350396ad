//! Multi-platform publish orchestration
//!
//! Fans one due post out to every platform it targets, concurrently, and
//! aggregates the individually-failable attempts into a single post-level
//! outcome. One platform's failure never cancels or masks another's
//! attempt; the post is `published` when at least one platform succeeded
//! and `failed` only when every attempt failed, and the per-platform
//! results are always kept regardless of the aggregate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::platforms::PlatformPublisher;
use crate::types::{PostStatus, PublishResult, ScheduledPost};

/// Aggregated outcome of one publish pass.
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    /// `Published` or `Failed`
    pub status: PostStatus,
    /// One entry per target platform, in `post.platforms` order.
    pub results: Vec<PublishResult>,
}

pub struct PublishOrchestrator {
    publishers: HashMap<String, Arc<dyn PlatformPublisher>>,
    publish_timeout: Duration,
}

impl PublishOrchestrator {
    pub fn new(publish_timeout: Duration) -> Self {
        Self {
            publishers: HashMap::new(),
            publish_timeout,
        }
    }

    /// Register a publisher under its own platform name. A later
    /// registration for the same name replaces the earlier one.
    pub fn register(&mut self, publisher: Arc<dyn PlatformPublisher>) {
        self.publishers
            .insert(publisher.name().to_string(), publisher);
    }

    pub fn publisher_count(&self) -> usize {
        self.publishers.len()
    }

    /// Attempt delivery to every platform the post targets.
    ///
    /// Never returns an error: platform failures, missing publishers, and
    /// timeouts all become failure entries in the outcome. No retries are
    /// attempted within a single pass.
    pub async fn publish(&self, post: &ScheduledPost) -> PublishOutcome {
        use futures::future::join_all;

        let attempts = post.platforms.iter().map(|platform| {
            let platform = platform.clone();
            async move {
                let Some(publisher) = self.publishers.get(&platform) else {
                    warn!(platform = %platform, post_id = %post.id, "no publisher registered");
                    return PublishResult::failure(
                        &platform,
                        format!("no publisher registered for platform '{}'", platform),
                    );
                };

                info!(platform = %platform, post_id = %post.id, "publishing");
                match timeout(self.publish_timeout, publisher.publish(post)).await {
                    Ok(Ok(())) => {
                        info!(platform = %platform, post_id = %post.id, "published");
                        PublishResult::success(&platform)
                    }
                    Ok(Err(e)) => {
                        warn!(platform = %platform, post_id = %post.id, error = %e, "publish failed");
                        PublishResult::failure(&platform, e.to_string())
                    }
                    Err(_) => {
                        warn!(platform = %platform, post_id = %post.id, "publish timed out");
                        PublishResult::failure(
                            &platform,
                            format!(
                                "publish timed out after {}s",
                                self.publish_timeout.as_secs()
                            ),
                        )
                    }
                }
            }
        });

        let results = join_all(attempts).await;

        let status = if results.iter().any(|r| r.success) {
            PostStatus::Published
        } else {
            PostStatus::Failed
        };

        PublishOutcome { status, results }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::MockPublisher;

    fn post_for(platforms: &[&str]) -> ScheduledPost {
        ScheduledPost::new(
            "Orchestration test".to_string(),
            platforms.iter().map(|p| p.to_string()).collect(),
            1_900_000_000,
        )
    }

    fn orchestrator_with(
        publishers: Vec<Arc<MockPublisher>>,
        timeout: Duration,
    ) -> PublishOrchestrator {
        let mut orchestrator = PublishOrchestrator::new(timeout);
        for publisher in publishers {
            orchestrator.register(publisher);
        }
        orchestrator
    }

    #[tokio::test]
    async fn test_all_platforms_succeed() {
        let insta = Arc::new(MockPublisher::success("insta"));
        let tiktok = Arc::new(MockPublisher::success("tiktok"));
        let orchestrator =
            orchestrator_with(vec![insta.clone(), tiktok.clone()], Duration::from_secs(5));

        let post = post_for(&["insta", "tiktok"]);
        let outcome = orchestrator.publish(&post).await;

        assert_eq!(outcome.status, PostStatus::Published);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|r| r.success));
        assert_eq!(insta.publish_calls(), 1);
        assert_eq!(tiktok.publish_calls(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_still_publishes() {
        let insta = Arc::new(MockPublisher::success("insta"));
        let tiktok = Arc::new(MockPublisher::failing("tiktok", "rate limited"));
        let orchestrator = orchestrator_with(vec![insta, tiktok], Duration::from_secs(5));

        let post = post_for(&["insta", "tiktok"]);
        let outcome = orchestrator.publish(&post).await;

        assert_eq!(outcome.status, PostStatus::Published);
        assert_eq!(outcome.results.len(), 2);

        let insta_result = outcome.results.iter().find(|r| r.platform == "insta").unwrap();
        assert!(insta_result.success);
        assert_eq!(insta_result.error, None);

        let tiktok_result = outcome.results.iter().find(|r| r.platform == "tiktok").unwrap();
        assert!(!tiktok_result.success);
        assert!(tiktok_result.error.as_deref().unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_all_platforms_fail() {
        let insta = Arc::new(MockPublisher::failing("insta", "down"));
        let tiktok = Arc::new(MockPublisher::failing("tiktok", "down too"));
        let orchestrator = orchestrator_with(vec![insta, tiktok], Duration::from_secs(5));

        let post = post_for(&["insta", "tiktok"]);
        let outcome = orchestrator.publish(&post).await;

        assert_eq!(outcome.status, PostStatus::Failed);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|r| !r.success));
        assert!(outcome.results.iter().all(|r| r.error.is_some()));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_cancel_siblings() {
        let fast_fail = Arc::new(MockPublisher::failing("insta", "immediate failure"));
        let slow_ok = Arc::new(MockPublisher::with_delay("tiktok", Duration::from_millis(100)));
        let orchestrator =
            orchestrator_with(vec![fast_fail, slow_ok.clone()], Duration::from_secs(5));

        let post = post_for(&["insta", "tiktok"]);
        let outcome = orchestrator.publish(&post).await;

        // The slow platform finished despite the sibling failing first
        assert_eq!(outcome.status, PostStatus::Published);
        assert_eq!(slow_ok.publish_calls(), 1);
        assert_eq!(slow_ok.published_posts(), vec![post.id.clone()]);
    }

    #[tokio::test]
    async fn test_unregistered_platform_becomes_failure_entry() {
        let insta = Arc::new(MockPublisher::success("insta"));
        let orchestrator = orchestrator_with(vec![insta], Duration::from_secs(5));

        let post = post_for(&["insta", "myspace"]);
        let outcome = orchestrator.publish(&post).await;

        assert_eq!(outcome.status, PostStatus::Published);
        assert_eq!(outcome.results.len(), 2);

        let missing = outcome.results.iter().find(|r| r.platform == "myspace").unwrap();
        assert!(!missing.success);
        assert!(missing.error.as_deref().unwrap().contains("no publisher registered"));
    }

    #[tokio::test]
    async fn test_slow_platform_times_out_as_failure() {
        let slow = Arc::new(MockPublisher::with_delay("insta", Duration::from_millis(200)));
        let ok = Arc::new(MockPublisher::success("tiktok"));
        let orchestrator = orchestrator_with(vec![slow, ok], Duration::from_millis(50));

        let post = post_for(&["insta", "tiktok"]);
        let outcome = orchestrator.publish(&post).await;

        assert_eq!(outcome.status, PostStatus::Published);

        let timed_out = outcome.results.iter().find(|r| r.platform == "insta").unwrap();
        assert!(!timed_out.success);
        assert!(timed_out.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_results_follow_post_platform_order() {
        let a = Arc::new(MockPublisher::success("a"));
        let b = Arc::new(MockPublisher::with_delay("b", Duration::from_millis(30)));
        let c = Arc::new(MockPublisher::success("c"));
        let orchestrator = orchestrator_with(vec![a, b, c], Duration::from_secs(5));

        let post = post_for(&["c", "a", "b"]);
        let outcome = orchestrator.publish(&post).await;

        let order: Vec<&str> = outcome.results.iter().map(|r| r.platform.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_concurrent_execution_not_sequential() {
        let publishers: Vec<Arc<MockPublisher>> = ["a", "b", "c"]
            .iter()
            .map(|name| Arc::new(MockPublisher::with_delay(name, Duration::from_millis(80))))
            .collect();
        let orchestrator = orchestrator_with(publishers, Duration::from_secs(5));

        let post = post_for(&["a", "b", "c"]);
        let start = std::time::Instant::now();
        let outcome = orchestrator.publish(&post).await;
        let elapsed = start.elapsed();

        assert_eq!(outcome.status, PostStatus::Published);
        // Three 80ms publishes in parallel finish well under 240ms
        assert!(
            elapsed < Duration::from_millis(200),
            "publishes appear to have run sequentially: {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_register_replaces_same_name() {
        let first = Arc::new(MockPublisher::failing("insta", "old"));
        let second = Arc::new(MockPublisher::success("insta"));

        let mut orchestrator = PublishOrchestrator::new(Duration::from_secs(5));
        orchestrator.register(first.clone());
        orchestrator.register(second.clone());
        assert_eq!(orchestrator.publisher_count(), 1);

        let post = post_for(&["insta"]);
        let outcome = orchestrator.publish(&post).await;

        assert_eq!(outcome.status, PostStatus::Published);
        assert_eq!(first.publish_calls(), 0);
        assert_eq!(second.publish_calls(), 1);
    }
}
