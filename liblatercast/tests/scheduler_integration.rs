//! End-to-end tests exercising the full pipeline: command surface, store,
//! lease-guarded reconciliation, orchestration, and event delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use liblatercast::config::SchedulerConfig;
use liblatercast::platforms::{MockPublisher, PlatformPublisher};
use liblatercast::{
    Event, NotificationDispatcher, PostDraft, PostStatus, PostStore, PublishOrchestrator,
    Scheduler, Trigger, Triggers,
};

struct Harness {
    scheduler: Arc<Scheduler>,
    insta: Arc<MockPublisher>,
    tiktok: Arc<MockPublisher>,
}

async fn harness(insta: MockPublisher, tiktok: MockPublisher) -> Harness {
    let store = PostStore::in_memory().await.unwrap();
    let insta = Arc::new(insta);
    let tiktok = Arc::new(tiktok);

    let config = SchedulerConfig::default();
    let mut orchestrator = PublishOrchestrator::new(config.publish_timeout());
    orchestrator.register(insta.clone() as Arc<dyn PlatformPublisher>);
    orchestrator.register(tiktok.clone() as Arc<dyn PlatformPublisher>);

    let scheduler = Arc::new(Scheduler::new(
        store,
        orchestrator,
        NotificationDispatcher::new(64),
        config,
    ));

    Harness {
        scheduler,
        insta,
        tiktok,
    }
}

fn draft(caption: &str, platforms: &[&str], scheduled_for: i64) -> PostDraft {
    PostDraft {
        caption: caption.to_string(),
        platforms: platforms.iter().map(|p| p.to_string()).collect(),
        scheduled_for,
    }
}

#[tokio::test]
async fn schedule_then_check_now_publishes_due_post() {
    let h = harness(
        MockPublisher::success("insta"),
        MockPublisher::success("tiktok"),
    )
    .await;
    let now = chrono::Utc::now().timestamp();

    let due = h
        .scheduler
        .schedule_post(draft("goes out now", &["insta", "tiktok"], now - 1))
        .await
        .unwrap();
    let future = h
        .scheduler
        .schedule_post(draft("goes out later", &["insta"], now + 3600))
        .await
        .unwrap();

    let found = h.scheduler.check_now().await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, due.id);

    let store = h.scheduler.store();
    assert_eq!(store.get(&due.id).await.unwrap().status, PostStatus::Published);
    assert_eq!(store.get(&future.id).await.unwrap().status, PostStatus::Scheduled);

    // The future post was not delivered anywhere
    assert_eq!(h.insta.published_posts(), vec![due.id.clone()]);
    assert_eq!(h.tiktok.published_posts(), vec![due.id]);
}

#[tokio::test]
async fn full_lifecycle_events_arrive_in_order() {
    let h = harness(
        MockPublisher::success("insta"),
        MockPublisher::failing("tiktok", "upload rejected"),
    )
    .await;
    let mut events = h.scheduler.dispatcher().subscribe();
    let mut alerts = h.scheduler.dispatcher().subscribe_alerts();
    let now = chrono::Utc::now().timestamp();

    let post = h
        .scheduler
        .schedule_post(draft("partial delivery", &["insta", "tiktok"], now - 1))
        .await
        .unwrap();
    h.scheduler.check_now().await.unwrap();

    let started = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    match started {
        Event::Started { post_id, platforms } => {
            assert_eq!(post_id, post.id);
            assert_eq!(platforms, vec!["insta", "tiktok"]);
        }
        other => panic!("expected Started first, got {:?}", other),
    }

    let terminal = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    match terminal {
        Event::Published { post_id, results } => {
            assert_eq!(post_id, post.id);
            assert_eq!(results.len(), 2);
            assert!(results.iter().find(|r| r.platform == "insta").unwrap().success);
            let tiktok = results.iter().find(|r| r.platform == "tiktok").unwrap();
            assert!(!tiktok.success);
            assert!(tiktok.error.as_deref().unwrap().contains("upload rejected"));
        }
        other => panic!("expected Published, got {:?}", other),
    }

    let alert = tokio::time::timeout(Duration::from_secs(1), alerts.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alert.title, "Post published");
    assert_eq!(alert.post_id, post.id);
}

#[tokio::test]
async fn records_always_cover_every_platform() {
    let h = harness(
        MockPublisher::failing("insta", "auth expired"),
        MockPublisher::failing("tiktok", "api down"),
    )
    .await;
    let now = chrono::Utc::now().timestamp();

    let post = h
        .scheduler
        .schedule_post(draft("doomed", &["insta", "tiktok"], now - 1))
        .await
        .unwrap();
    h.scheduler.check_now().await.unwrap();

    let stored = h.scheduler.store().get(&post.id).await.unwrap();
    assert_eq!(stored.status, PostStatus::Failed);
    assert!(stored.published_at.is_some());

    let records = h.scheduler.store().get_publish_records(&post.id).await.unwrap();
    assert_eq!(records.len(), stored.platforms.len());
    assert!(records.iter().all(|r| !r.success && r.error_message.is_some()));
}

#[tokio::test]
async fn daemon_loop_with_explicit_trigger() {
    let h = harness(
        MockPublisher::success("insta"),
        MockPublisher::success("tiktok"),
    )
    .await;

    // Long intervals: only the startup tick and our explicit trigger fire
    let (triggers, handle) =
        Triggers::new(Duration::from_secs(3600), Duration::from_secs(3600));
    let shutdown = Arc::new(AtomicBool::new(false));

    let scheduler = h.scheduler.clone();
    let loop_shutdown = shutdown.clone();
    let task = tokio::spawn(async move {
        scheduler.run(triggers, loop_shutdown).await;
    });

    // Let the startup pass drain, then schedule a post and wake the loop
    tokio::time::sleep(Duration::from_millis(200)).await;
    let now = chrono::Utc::now().timestamp();
    let post = h
        .scheduler
        .schedule_post(draft("woken up", &["insta"], now - 1))
        .await
        .unwrap();

    handle.fire(Trigger::Command).await;

    let mut published = false;
    for _ in 0..50 {
        if h.scheduler.store().get(&post.id).await.unwrap().status == PostStatus::Published {
            published = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(published, "explicit trigger did not cause a publish");

    shutdown.store(true, Ordering::Relaxed);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop did not stop")
        .unwrap();
}

#[tokio::test]
async fn rescheduling_a_failed_post_publishes_it_again() {
    let h = harness(
        MockPublisher::failing("insta", "flaky"),
        MockPublisher::success("tiktok"),
    )
    .await;
    let now = chrono::Utc::now().timestamp();

    // Target only the failing platform first
    let post = h
        .scheduler
        .schedule_post(draft("try insta", &["insta"], now - 1))
        .await
        .unwrap();
    h.scheduler.check_now().await.unwrap();
    assert_eq!(
        h.scheduler.store().get(&post.id).await.unwrap().status,
        PostStatus::Failed
    );

    // Reschedule onto the healthy platform
    h.scheduler
        .update_post(&post.id, draft("try tiktok instead", &["tiktok"], now - 1))
        .await
        .unwrap();
    h.scheduler.check_now().await.unwrap();

    let stored = h.scheduler.store().get(&post.id).await.unwrap();
    assert_eq!(stored.status, PostStatus::Published);
    assert_eq!(h.tiktok.published_posts(), vec![post.id]);
}
