//! Configurable in-process publisher
//!
//! Simulates platform delivery with controllable success, failure, latency,
//! and a random failure rate. Available in all builds: the test suites use
//! it to drive the orchestrator and scheduler, and the shipped binaries use
//! it as their simulated-delivery backend.

use async_trait::async_trait;
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::PlatformPublisher;
use crate::types::ScheduledPost;

/// Behavior configuration for a mock publisher
#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Platform name (e.g., "insta", "tiktok")
    pub name: String,

    /// Fixed outcome: Some(error) always fails, None always succeeds
    /// (unless `failure_rate` trips).
    pub publish_error: Option<String>,

    /// Probability in [0, 1] of a simulated random failure.
    pub failure_rate: f64,

    /// Delay before completing a publish call (simulates network latency)
    pub delay: Duration,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            publish_error: None,
            failure_rate: 0.0,
            delay: Duration::from_millis(0),
        }
    }
}

/// Mock platform publisher
pub struct MockPublisher {
    behavior: MockBehavior,
    publish_calls: Arc<Mutex<usize>>,
    published_posts: Arc<Mutex<Vec<String>>>,
}

impl MockPublisher {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            publish_calls: Arc::new(Mutex::new(0)),
            published_posts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A publisher that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockBehavior {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// A publisher that always fails with the given error
    pub fn failing(name: &str, error: &str) -> Self {
        Self::new(MockBehavior {
            name: name.to_string(),
            publish_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// A publisher that succeeds after the given delay
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockBehavior {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// A publisher that fails randomly at the given rate
    pub fn flaky(name: &str, failure_rate: f64, delay: Duration) -> Self {
        Self::new(MockBehavior {
            name: name.to_string(),
            failure_rate,
            delay,
            ..Default::default()
        })
    }

    /// Number of publish calls made so far
    pub fn publish_calls(&self) -> usize {
        *self.publish_calls.lock().unwrap()
    }

    /// IDs of the posts delivered successfully, in call order
    pub fn published_posts(&self) -> Vec<String> {
        self.published_posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformPublisher for MockPublisher {
    fn name(&self) -> &str {
        &self.behavior.name
    }

    async fn publish(&self, post: &ScheduledPost) -> Result<()> {
        *self.publish_calls.lock().unwrap() += 1;

        if !self.behavior.delay.is_zero() {
            sleep(self.behavior.delay).await;
        }

        if let Some(error) = &self.behavior.publish_error {
            return Err(PlatformError::Publishing(error.clone()).into());
        }

        if self.behavior.failure_rate > 0.0 {
            let roll: f64 = rand::thread_rng().gen();
            if roll < self.behavior.failure_rate {
                return Err(PlatformError::Network(format!(
                    "simulated delivery failure on {}",
                    self.behavior.name
                ))
                .into());
            }
        }

        self.published_posts.lock().unwrap().push(post.id.clone());
        Ok(())
    }
}
