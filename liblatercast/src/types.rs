//! Core types for Latercast

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A post waiting in (or already processed by) the scheduling queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub id: String,
    pub caption: String,
    /// Target platform identifiers, non-empty and deduplicated.
    pub platforms: Vec<String>,
    /// Unix timestamp at which the post becomes eligible for publishing.
    pub scheduled_for: i64,
    pub status: PostStatus,
    pub created_at: i64,
    /// Set on the first transition into a terminal state, never overwritten.
    pub published_at: Option<i64>,
    /// Number of completed publish passes for this post.
    pub attempts: u32,
    /// Lease fields guarding against duplicate concurrent publishing.
    /// Held only while the post is `publishing`.
    pub lease_token: Option<String>,
    pub lease_expiry: Option<i64>,
}

impl ScheduledPost {
    pub fn new(caption: String, platforms: Vec<String>, scheduled_for: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            caption,
            platforms,
            scheduled_for,
            status: PostStatus::Scheduled,
            created_at: chrono::Utc::now().timestamp(),
            published_at: None,
            attempts: 0,
            lease_token: None,
            lease_expiry: None,
        }
    }

    /// True once `scheduled_for` has passed and the post is still queued.
    pub fn is_due(&self, now: i64) -> bool {
        self.status == PostStatus::Scheduled && self.scheduled_for <= now
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Scheduled,
    Publishing,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Publishing => "publishing",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::Failed)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "publishing" => Ok(Self::Publishing),
            "published" => Ok(Self::Published),
            "failed" => Ok(Self::Failed),
            other => Err(format!(
                "Invalid post status: '{}'. Valid options: scheduled, publishing, published, failed",
                other
            )),
        }
    }
}

/// Outcome of one platform attempt within a publish pass.
///
/// A post's pass produces exactly one result per entry in `platforms`,
/// regardless of how many of the attempts failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishResult {
    pub platform: String,
    pub success: bool,
    pub error: Option<String>,
}

impl PublishResult {
    pub fn success(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            success: true,
            error: None,
        }
    }

    pub fn failure(platform: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Persisted row recording one platform attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRecord {
    /// Database row ID (None for new records)
    pub id: Option<i64>,
    pub post_id: String,
    pub platform: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub attempted_at: i64,
}

impl PublishRecord {
    pub fn from_result(post_id: &str, result: &PublishResult, attempted_at: i64) -> Self {
        Self {
            id: None,
            post_id: post_id.to_string(),
            platform: result.platform.clone(),
            success: result.success,
            error_message: result.error.clone(),
            attempted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_new_uuid_generation() {
        let post = ScheduledPost::new(
            "Launch day!".to_string(),
            vec!["insta".to_string()],
            1_900_000_000,
        );

        let uuid = uuid::Uuid::parse_str(&post.id).expect("Post ID should be a valid UUID");
        assert_eq!(uuid.get_version(), Some(uuid::Version::Random));
    }

    #[test]
    fn test_post_new_unique_ids() {
        let a = ScheduledPost::new("one".to_string(), vec!["insta".to_string()], 0);
        let b = ScheduledPost::new("two".to_string(), vec!["insta".to_string()], 0);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_post_new_default_values() {
        let post = ScheduledPost::new(
            "caption".to_string(),
            vec!["insta".to_string(), "tiktok".to_string()],
            1_900_000_000,
        );

        assert_eq!(post.status, PostStatus::Scheduled);
        assert_eq!(post.published_at, None);
        assert_eq!(post.attempts, 0);
        assert_eq!(post.lease_token, None);
        assert_eq!(post.lease_expiry, None);
        assert!(post.created_at > 1_600_000_000);
    }

    #[test]
    fn test_post_is_due() {
        let mut post = ScheduledPost::new("caption".to_string(), vec!["insta".to_string()], 100);

        assert!(post.is_due(100));
        assert!(post.is_due(101));
        assert!(!post.is_due(99));

        post.status = PostStatus::Published;
        assert!(!post.is_due(101));
    }

    #[test]
    fn test_post_status_round_trip() {
        for status in [
            PostStatus::Scheduled,
            PostStatus::Publishing,
            PostStatus::Published,
            PostStatus::Failed,
        ] {
            let parsed: PostStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_post_status_from_str_invalid() {
        let result = "pending".parse::<PostStatus>();
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Invalid post status"));
    }

    #[test]
    fn test_post_status_is_terminal() {
        assert!(!PostStatus::Scheduled.is_terminal());
        assert!(!PostStatus::Publishing.is_terminal());
        assert!(PostStatus::Published.is_terminal());
        assert!(PostStatus::Failed.is_terminal());
    }

    #[test]
    fn test_post_status_serde_lowercase() {
        let json = serde_json::to_string(&PostStatus::Publishing).unwrap();
        assert_eq!(json, r#""publishing""#);

        let parsed: PostStatus = serde_json::from_str(r#""failed""#).unwrap();
        assert_eq!(parsed, PostStatus::Failed);
    }

    #[test]
    fn test_publish_result_constructors() {
        let ok = PublishResult::success("insta");
        assert_eq!(ok.platform, "insta");
        assert!(ok.success);
        assert_eq!(ok.error, None);

        let err = PublishResult::failure("tiktok", "rate limited");
        assert_eq!(err.platform, "tiktok");
        assert!(!err.success);
        assert_eq!(err.error, Some("rate limited".to_string()));
    }

    #[test]
    fn test_publish_record_from_result() {
        let result = PublishResult::failure("tiktok", "network timeout");
        let record = PublishRecord::from_result("post-123", &result, 1234567890);

        assert_eq!(record.id, None);
        assert_eq!(record.post_id, "post-123");
        assert_eq!(record.platform, "tiktok");
        assert!(!record.success);
        assert_eq!(record.error_message, Some("network timeout".to_string()));
        assert_eq!(record.attempted_at, 1234567890);
    }

    #[test]
    fn test_post_serialization() {
        let post = ScheduledPost {
            id: "test-id".to_string(),
            caption: "Big announcement".to_string(),
            platforms: vec!["insta".to_string(), "tiktok".to_string()],
            scheduled_for: 1234567900,
            status: PostStatus::Scheduled,
            created_at: 1234567890,
            published_at: None,
            attempts: 0,
            lease_token: None,
            lease_expiry: None,
        };

        let json = serde_json::to_string(&post).unwrap();
        let deserialized: ScheduledPost = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.id, post.id);
        assert_eq!(deserialized.caption, post.caption);
        assert_eq!(deserialized.platforms, post.platforms);
        assert_eq!(deserialized.scheduled_for, post.scheduled_for);
        assert_eq!(deserialized.status, post.status);
    }
}
