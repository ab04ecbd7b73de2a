//! Scheduler recovery when a request task dies, and credential gating.

use std::future::Ready;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bastion_core::{CacheConfig, FetchError, ManualClock, RemoteError, SchedulerConfig};
use bastion_events::EventBus;
use bastion_net::{RemoteApi, RequestScheduler, Task};
use bastion_storage::ResponseCache;
use serde_json::{json, Value as JsonValue};
use tokio::time::timeout;

#[derive(Default)]
struct CountingRemote {
    calls: AtomicUsize,
}

#[async_trait]
impl RemoteApi for CountingRemote {
    async fn get(&self, key: &str) -> Result<JsonValue, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "key": key }))
    }
}

fn scheduler(max_concurrency: usize) -> (RequestScheduler, Arc<CountingRemote>) {
    let remote = Arc::new(CountingRemote::default());
    let cache = Arc::new(ResponseCache::new(
        CacheConfig::default(),
        Arc::new(ManualClock::starting_now()),
    ));
    let config = SchedulerConfig {
        max_concurrency,
        ..SchedulerConfig::default()
    };
    let scheduler = RequestScheduler::new(config, remote.clone(), cache, EventBus::new(64));
    (scheduler, remote)
}

async fn malformed_payload() -> Result<JsonValue, RemoteError> {
    panic!("malformed payload")
}

fn unbuildable_request() -> Ready<Result<JsonValue, RemoteError>> {
    panic!("request could not be built")
}

fn rejected_credential() -> RemoteError {
    RemoteError::CredentialInvalid {
        message: "Incorrect key".to_string(),
    }
}

const PATIENCE: Duration = Duration::from_secs(1);

#[tokio::test]
async fn test_panicking_attempt_fails_every_waiter_and_frees_the_key() {
    let (scheduler, remote) = scheduler(1);

    let first = scheduler.submit(Task::new("user/1", malformed_payload));
    let joined = scheduler.submit(Task::new("user/1", malformed_payload));

    let first = timeout(PATIENCE, first).await.expect("first resolves");
    let joined = timeout(PATIENCE, joined).await.expect("joined resolves");
    for result in [first, joined] {
        assert!(matches!(result, Err(FetchError::Aborted { ref key, .. }) if key == "user/1"));
    }

    let retry = timeout(PATIENCE, scheduler.fetch("user/1", Duration::ZERO, 3))
        .await
        .expect("key is usable again");
    assert_eq!(retry, Ok(json!({ "key": "user/1" })));
    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.stats().in_flight, 0);
}

#[tokio::test]
async fn test_panic_while_building_request_releases_slot() {
    let (scheduler, remote) = scheduler(1);

    let dead = scheduler.submit(Task::new("faction/1", unbuildable_request));
    let remote_api: Arc<dyn RemoteApi> = remote.clone();
    let queued = scheduler.submit(Task::new("faction/2", move || {
        let remote = Arc::clone(&remote_api);
        async move { remote.get("faction/2").await }
    }));
    assert_eq!(scheduler.stats().queued, 1);

    let dead = timeout(PATIENCE, dead).await.expect("waiter is released");
    assert_eq!(dead, Err(FetchError::Dropped));
    // The task queued behind the dead one still runs.
    let queued = timeout(PATIENCE, queued).await.expect("queued task starts");
    assert_eq!(queued, Ok(json!({ "key": "faction/2" })));

    let again = timeout(PATIENCE, scheduler.fetch("faction/1", Duration::ZERO, 3))
        .await
        .expect("slot was freed");
    assert_eq!(again, Ok(json!({ "key": "faction/1" })));
    assert_eq!(scheduler.stats().in_flight, 0);
}

#[tokio::test]
async fn test_ungated_credential_failure_leaves_gate_open() {
    let (scheduler, remote) = scheduler(3);

    let result = scheduler
        .submit(
            Task::new("authority/push", || async { Err(rejected_credential()) })
                .bypass_credential_gate(),
        )
        .await;
    assert!(matches!(result, Err(FetchError::Remote { ref key, .. }) if key == "authority/push"));
    assert!(!scheduler.is_credential_invalid());

    scheduler
        .fetch("chain", Duration::ZERO, 3)
        .await
        .expect("gated reads still flow");
    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ungated_task_runs_while_gate_is_closed() {
    let (scheduler, _remote) = scheduler(3);

    let gated = scheduler
        .submit(Task::new("user", || async { Err(rejected_credential()) }))
        .await;
    assert!(matches!(gated, Err(FetchError::CredentialInvalid { .. })));
    assert!(scheduler.is_credential_invalid());

    let pulled = scheduler
        .submit(
            Task::new("authority/pull", || async { Ok(json!({"claims": []})) })
                .bypass_credential_gate(),
        )
        .await;
    assert_eq!(pulled, Ok(json!({"claims": []})));
    assert!(scheduler.is_credential_invalid());
}
