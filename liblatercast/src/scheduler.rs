//! The reconciliation loop and the command surface in front of it
//!
//! The scheduler turns "time has passed" or "an explicit signal arrived"
//! into publish attempts: on every trigger it lists due posts, claims each
//! with an atomic lease so concurrent passes never double-publish, fans the
//! claimed posts out through the orchestrator, persists the outcomes, and
//! notifies observers. It also carries the commands a hosting application
//! issues against the queue (schedule, update, delete, check-now).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::{LatercastError, Result};
use crate::events::{Alert, Event, NotificationDispatcher};
use crate::orchestrator::PublishOrchestrator;
use crate::store::PostStore;
use crate::trigger::Triggers;
use crate::types::{PostStatus, PublishRecord, ScheduledPost};

/// Caller-supplied fields for scheduling or replacing a post.
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub caption: String,
    pub platforms: Vec<String>,
    pub scheduled_for: i64,
}

pub struct Scheduler {
    store: PostStore,
    orchestrator: PublishOrchestrator,
    dispatcher: NotificationDispatcher,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: PostStore,
        orchestrator: PublishOrchestrator,
        dispatcher: NotificationDispatcher,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            orchestrator,
            dispatcher,
            config,
        }
    }

    pub fn store(&self) -> &PostStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Queue a new post for future publication.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the caption is blank, the platform list is
    /// empty, the timestamp is malformed, or `scheduled_for` lies in the
    /// past beyond the configured grace window.
    pub async fn schedule_post(&self, draft: PostDraft) -> Result<ScheduledPost> {
        let now = chrono::Utc::now().timestamp();
        let platforms = self.validate(&draft, now)?;

        let post = ScheduledPost::new(draft.caption, platforms, draft.scheduled_for);
        self.store.put(&post).await?;

        info!(post_id = %post.id, scheduled_for = post.scheduled_for, "post scheduled");
        Ok(post)
    }

    /// Replace a post's content, targets, or time, re-queueing it as
    /// `scheduled`. Creates the post when the id is unknown.
    ///
    /// # Errors
    ///
    /// `Conflict` when the existing record is mid-publish; `InvalidInput`
    /// as for `schedule_post`.
    pub async fn update_post(&self, post_id: &str, draft: PostDraft) -> Result<ScheduledPost> {
        let now = chrono::Utc::now().timestamp();
        let platforms = self.validate(&draft, now)?;

        let post = ScheduledPost {
            id: post_id.to_string(),
            caption: draft.caption,
            platforms,
            scheduled_for: draft.scheduled_for,
            status: PostStatus::Scheduled,
            created_at: now,
            published_at: None,
            attempts: 0,
            lease_token: None,
            lease_expiry: None,
        };

        if !self.store.upsert_unless_publishing(&post).await? {
            return Err(LatercastError::Conflict(format!(
                "post {} is currently publishing and cannot be updated",
                post_id
            )));
        }

        info!(post_id = %post.id, scheduled_for = post.scheduled_for, "post updated");
        // Re-read: a replaced row keeps its original created_at
        self.store.get(post_id).await
    }

    /// Remove a post from the queue. A no-op when the id is unknown.
    ///
    /// # Errors
    ///
    /// `Conflict` when the post is mid-publish.
    pub async fn delete_post(&self, post_id: &str) -> Result<()> {
        if !self.store.delete_unless_publishing(post_id).await? {
            return Err(LatercastError::Conflict(format!(
                "post {} is currently publishing and cannot be deleted",
                post_id
            )));
        }

        info!(post_id = %post_id, "post deleted");
        Ok(())
    }

    /// Force an immediate reconciliation pass.
    ///
    /// Returns the posts found due at the start of the pass, whether or
    /// not this pass won their leases.
    pub async fn check_now(&self) -> Result<Vec<ScheduledPost>> {
        self.reconcile(chrono::Utc::now().timestamp()).await
    }

    /// Run the scheduler loop until `shutdown` is set.
    ///
    /// A failed pass is logged and retried on the next trigger; the loop
    /// itself never gives up.
    pub async fn run(&self, mut triggers: Triggers, shutdown: Arc<AtomicBool>) {
        info!("scheduler loop started");

        loop {
            tokio::select! {
                trigger = triggers.next() => {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    debug!(?trigger, "reconciliation trigger");
                    if let Err(e) = self.check_now().await {
                        error!(error = %e, "reconciliation pass failed");
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(1)) => {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                }
            }
        }

        info!("scheduler loop stopped");
    }

    /// One reconciliation pass at time `now`.
    async fn reconcile(&self, now: i64) -> Result<Vec<ScheduledPost>> {
        use futures::future::join_all;

        let due = self
            .store
            .list_due_before(now, PostStatus::Scheduled)
            .await?;
        let stale = self.store.list_expired_leases(now).await?;

        if !stale.is_empty() {
            warn!(
                count = stale.len(),
                "re-leasing posts whose previous publish pass stalled"
            );
        }
        if !due.is_empty() {
            info!(count = due.len(), "posts due for publishing");
        }

        let mut leased = Vec::new();
        for post in due.iter().chain(stale.iter()) {
            let token = Uuid::new_v4().to_string();
            let expiry = now + self.config.lease_duration as i64;
            if self.store.acquire_lease(&post.id, &token, expiry, now).await? {
                leased.push((post.clone(), token));
            } else {
                debug!(post_id = %post.id, "lease held elsewhere, skipping");
            }
        }

        let results = join_all(
            leased
                .iter()
                .map(|(post, token)| self.publish_leased(post, token)),
        )
        .await;

        // Collect after every in-flight post has settled, so a store
        // failure on one post cannot strand the others mid-publish.
        for result in results {
            result?;
        }

        Ok(due)
    }

    /// Publish a single leased post and commit the outcome.
    async fn publish_leased(&self, post: &ScheduledPost, token: &str) -> Result<()> {
        self.dispatcher.emit(Event::Started {
            post_id: post.id.clone(),
            platforms: post.platforms.clone(),
        });

        let outcome = self.orchestrator.publish(post).await;
        let finished_at = chrono::Utc::now().timestamp();

        let retry = self.config.retry;
        let attempts_after = post.attempts + 1;
        let (status, published_at, rescheduled_for) =
            if outcome.status == PostStatus::Failed
                && retry.enabled
                && attempts_after < retry.max_retries
            {
                let delay = retry.retry_delay.saturating_mul(attempts_after as u64) as i64;
                (PostStatus::Scheduled, None, Some(finished_at + delay))
            } else {
                (outcome.status, Some(finished_at), None)
            };

        let records: Vec<PublishRecord> = outcome
            .results
            .iter()
            .map(|r| PublishRecord::from_result(&post.id, r, finished_at))
            .collect();

        let committed = self
            .store
            .complete_publish(&post.id, token, status, published_at, rescheduled_for, &records)
            .await?;

        if !committed {
            // Our lease expired mid-publish and another pass took over;
            // its outcome wins and ours is discarded.
            warn!(post_id = %post.id, "lease lost before commit, outcome discarded");
            return Ok(());
        }

        match status {
            PostStatus::Published => {
                info!(post_id = %post.id, "post published");
                self.dispatcher.emit(Event::Published {
                    post_id: post.id.clone(),
                    results: outcome.results.clone(),
                });
                self.dispatcher.alert(Alert::published(post));
            }
            PostStatus::Failed => {
                warn!(post_id = %post.id, "post failed on every platform");
                self.dispatcher.emit(Event::Failed {
                    post_id: post.id.clone(),
                    results: outcome.results.clone(),
                });
                self.dispatcher.alert(Alert::failed(post, &outcome.results));
            }
            PostStatus::Scheduled => {
                info!(
                    post_id = %post.id,
                    attempt = attempts_after,
                    retry_at = rescheduled_for,
                    "all platforms failed, retry queued"
                );
            }
            PostStatus::Publishing => unreachable!("publish pass never commits 'publishing'"),
        }

        Ok(())
    }

    /// Validate a draft and return its deduplicated platform list.
    fn validate(&self, draft: &PostDraft, now: i64) -> Result<Vec<String>> {
        if draft.caption.trim().is_empty() {
            return Err(LatercastError::InvalidInput(
                "caption cannot be empty".to_string(),
            ));
        }

        let mut platforms: Vec<String> = Vec::new();
        for platform in &draft.platforms {
            let platform = platform.trim();
            if platform.is_empty() {
                continue;
            }
            if !platforms.iter().any(|p| p == platform) {
                platforms.push(platform.to_string());
            }
        }
        if platforms.is_empty() {
            return Err(LatercastError::InvalidInput(
                "platform list cannot be empty".to_string(),
            ));
        }

        if draft.scheduled_for <= 0 {
            return Err(LatercastError::InvalidInput(format!(
                "malformed schedule timestamp: {}",
                draft.scheduled_for
            )));
        }
        if draft.scheduled_for < now - self.config.schedule_grace as i64 {
            return Err(LatercastError::InvalidInput(format!(
                "scheduled time is more than {}s in the past",
                self.config.schedule_grace
            )));
        }

        Ok(platforms)
    }
}
