//! Sync bridge behavior against a scripted authority.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bastion_claims::{ClaimArbiter, ClaimMutation};
use bastion_core::{
    ClaimStatus, Clock, FetchError, ManualClock, RemoteError, SyncConfig, SyncError, TargetId,
    TargetNote, WarConfig, WarMode,
};
use bastion_events::EventBus;
use bastion_net::RequestScheduler;
use bastion_storage::records::SYNC_MARKS_KEY;
use bastion_storage::{load_record, InMemoryDurableStore};
use bastion_sync::{Bundle, SinceMarks, SyncBridge};
use bastion_test_utils::fixtures::{arbiter, authority_claim, hit, scheduler_over};
use bastion_test_utils::{drain_event_names, ScriptedAuthority, ScriptedRemote};
use tokio::sync::watch;

struct Harness {
    clock: ManualClock,
    events: EventBus,
    remote: Arc<ScriptedRemote>,
    scheduler: RequestScheduler,
    authority: Arc<ScriptedAuthority>,
    arbiter: Arc<ClaimArbiter>,
    bridge: SyncBridge,
}

fn harness() -> Harness {
    let clock = ManualClock::starting_now();
    let events = EventBus::new(256);
    let authority = Arc::new(ScriptedAuthority::new());
    let arbiter = arbiter(&clock, &events);
    let remote = Arc::new(ScriptedRemote::new());
    let scheduler = scheduler_over(remote.clone(), &clock, &events);
    let bridge = SyncBridge::new(
        SyncConfig::default(),
        scheduler.clone(),
        authority.clone(),
        Arc::clone(&arbiter),
        events.clone(),
    );
    Harness {
        clock,
        events,
        remote,
        scheduler,
        authority,
        arbiter,
        bridge,
    }
}

fn rejected_key() -> RemoteError {
    RemoteError::CredentialInvalid {
        message: "Incorrect key".to_string(),
    }
}

fn maintenance() -> RemoteError {
    RemoteError::Api {
        code: 9,
        message: "API disabled for maintenance".to_string(),
    }
}

#[tokio::test]
async fn test_tick_pushes_outbox_before_pulling() {
    let h = harness();
    h.arbiter.create_claim(hit(1, 100)).expect("create");
    h.arbiter
        .set_note(&TargetId::from(1u64), &100u64.into(), "bring xanax")
        .expect("note");
    assert_eq!(h.arbiter.outbox_len(), 2);

    let report = h.bridge.tick().await.expect("tick");
    assert_eq!(report.pushed, 2);
    assert_eq!(h.arbiter.outbox_len(), 0);

    let pushed = h.authority.pushed();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0][0].op(), "claim_upserted");
    assert!(matches!(pushed[0][1], ClaimMutation::NoteSet { .. }));
    assert_eq!(h.authority.pull_count(), 1);
}

#[tokio::test]
async fn test_failed_push_requeues_and_skips_pull() {
    let h = harness();
    h.arbiter.create_claim(hit(1, 100)).expect("create");
    h.authority.queue_push(Err(maintenance()));

    let err = h.bridge.tick().await.expect_err("push should fail");
    assert!(matches!(err, SyncError::Fetch(FetchError::Remote { .. })));
    assert_eq!(h.arbiter.outbox_len(), 1);
    assert_eq!(h.authority.pull_count(), 0);

    h.bridge.tick().await.expect("second tick");
    let pushed = h.authority.pushed();
    assert_eq!(pushed.len(), 2);
    assert_eq!(pushed[0], pushed[1]);
    assert_eq!(h.arbiter.outbox_len(), 0);
    assert_eq!(h.authority.pull_count(), 1);
}

#[tokio::test]
async fn test_pulled_claims_replace_local_state() {
    let h = harness();
    let local = h.arbiter.create_claim(hit(1, 100)).expect("create");
    let local = local.claim.expect("local claim");
    h.bridge.push_pending().await.expect("push");

    let now = h.clock.now();
    let remote = authority_claim(2, 101, now);
    h.authority.queue_pull(Ok(Bundle {
        claims: Some(vec![remote.clone()]),
        marks: SinceMarks {
            claims_ts: Some(now),
            ..SinceMarks::default()
        },
        ..Bundle::default()
    }));

    let mut rx = h.events.subscribe();
    let report = h.bridge.tick().await.expect("tick");
    assert_eq!(report.claims, Some(1));
    assert_eq!(report.notes, None);

    let active = h.arbiter.active_claims();
    assert_eq!(active, vec![remote]);
    assert!(h.arbiter.claim(&local.claim_id).is_none());
    assert_eq!(h.bridge.marks().claims_ts, Some(now));
    assert!(drain_event_names(&mut rx).contains(&"SyncApplied"));
}

#[tokio::test]
async fn test_unchanged_bundle_keeps_local_state_and_sends_marks() {
    let h = harness();
    let now = h.clock.now();
    let notes: BTreeMap<TargetId, TargetNote> = [(
        TargetId::from(7u64),
        TargetNote {
            target_id: TargetId::from(7u64),
            text: "hospital in 5".to_string(),
            author_id: 101u64.into(),
            updated_at: now,
        },
    )]
    .into_iter()
    .collect();
    h.authority.queue_pull(Ok(Bundle {
        notes: Some(notes),
        marks: SinceMarks {
            notes_ts: Some(now),
            ..SinceMarks::default()
        },
        ..Bundle::default()
    }));
    h.bridge.tick().await.expect("first tick");
    assert_eq!(h.arbiter.notes().len(), 1);

    let mut rx = h.events.subscribe();
    let report = h.bridge.tick().await.expect("second tick");
    assert_eq!(report.notes, None);
    assert_eq!(h.arbiter.notes().len(), 1);
    assert!(drain_event_names(&mut rx).is_empty());

    let seen = h.authority.seen_marks();
    assert_eq!(seen[0], SinceMarks::default());
    assert_eq!(seen[1].notes_ts, Some(now));
}

#[tokio::test]
async fn test_closed_config_from_authority_supersedes_claims() {
    let h = harness();
    let now = h.clock.now();
    h.authority.queue_pull(Ok(Bundle {
        claims: Some(vec![authority_claim(3, 102, now)]),
        war_config: Some(WarConfig::default().with_mode(WarMode::Off)),
        ..Bundle::default()
    }));

    let mut rx = h.events.subscribe();
    let report = h.bridge.tick().await.expect("tick");
    assert!(report.config_changed);
    assert!(h.arbiter.active_claims().is_empty());
    let history = h.arbiter.history(&TargetId::from(3u64));
    assert_eq!(history[0].status, ClaimStatus::Superseded);

    let names = drain_event_names(&mut rx);
    assert!(names.contains(&"WarConfigUpdated"));
    assert!(names.contains(&"ClaimSuperseded"));
    // Applying the authority's state never echoes back.
    assert_eq!(h.arbiter.outbox_len(), 0);
}

#[tokio::test]
async fn test_tick_persists_board_and_marks() {
    let h = harness();
    let store = Arc::new(InMemoryDurableStore::new());
    let bridge = SyncBridge::new(
        SyncConfig::default(),
        scheduler_over(Arc::new(ScriptedRemote::new()), &h.clock, &h.events),
        h.authority.clone(),
        Arc::clone(&h.arbiter),
        h.events.clone(),
    )
    .with_store(store.clone());

    let now = h.clock.now();
    h.authority.queue_pull(Ok(Bundle {
        claims: Some(vec![authority_claim(4, 103, now)]),
        marks: SinceMarks {
            claims_ts: Some(now),
            ..SinceMarks::default()
        },
        ..Bundle::default()
    }));
    bridge.tick().await.expect("tick");

    let marks: Option<SinceMarks> = load_record(store.as_ref(), SYNC_MARKS_KEY)
        .await
        .expect("load marks");
    assert_eq!(marks.and_then(|m| m.claims_ts), Some(now));

    let restored = arbiter(&h.clock, &h.events);
    assert!(restored.load_board(store.as_ref()).await.expect("load board"));
    assert_eq!(restored.active_claims().len(), 1);

    let fresh = SyncBridge::new(
        SyncConfig::default(),
        scheduler_over(Arc::new(ScriptedRemote::new()), &h.clock, &h.events),
        h.authority.clone(),
        restored,
        h.events.clone(),
    )
    .with_store(store);
    fresh.restore_marks().await.expect("restore marks");
    assert_eq!(fresh.marks().claims_ts, Some(now));
}

#[tokio::test(start_paused = true)]
async fn test_run_ticks_on_active_interval_until_shutdown() {
    let h = harness();
    let bridge = Arc::new(h.bridge);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&bridge).run(shutdown_rx));

    // Ticks at 0s, 15s and 30s.
    tokio::time::sleep(Duration::from_secs(40)).await;
    shutdown_tx.send(true).expect("send shutdown");
    let metrics = handle.await.expect("loop finishes").snapshot();

    assert!(metrics.ticks >= 3);
    assert_eq!(metrics.pulls, metrics.ticks);
    assert_eq!(metrics.failures, 0);
    assert_eq!(bridge.current_interval(), Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn test_interval_backs_off_when_idle() {
    let h = harness();
    tokio::time::advance(Duration::from_secs(301)).await;
    assert_eq!(h.bridge.current_interval(), Duration::from_secs(60));
    h.bridge.record_activity();
    assert_eq!(h.bridge.current_interval(), Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn test_run_pushes_local_mutation_without_waiting_for_tick() {
    let h = harness();
    let bridge = Arc::new(h.bridge);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&bridge).run(shutdown_rx));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.authority.pull_count(), 1);
    h.arbiter.create_claim(hit(1, 100)).expect("create");

    // Well inside the 15s active interval.
    tokio::time::sleep(Duration::from_secs(5)).await;
    let pushed = h.authority.pushed();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0][0].op(), "claim_upserted");
    assert_eq!(h.arbiter.outbox_len(), 0);
    assert_eq!(h.authority.pull_count(), 1);

    shutdown_tx.send(true).expect("send shutdown");
    let metrics = handle.await.expect("loop finishes").snapshot();
    assert_eq!(metrics.ticks, 1);
    assert_eq!(metrics.pushes, 1);
    assert_eq!(metrics.failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_immediate_push_is_retried_on_next_tick() {
    let h = harness();
    let bridge = Arc::new(h.bridge);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&bridge).run(shutdown_rx));

    tokio::time::sleep(Duration::from_secs(1)).await;
    h.authority.queue_push(Err(maintenance()));
    h.arbiter.create_claim(hit(1, 100)).expect("create");

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.authority.pushed().len(), 1);
    assert_eq!(h.arbiter.outbox_len(), 1);

    // The tick at 15s sends the same batch again.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let pushed = h.authority.pushed();
    assert_eq!(pushed.len(), 2);
    assert_eq!(pushed[0], pushed[1]);
    assert_eq!(h.arbiter.outbox_len(), 0);

    shutdown_tx.send(true).expect("send shutdown");
    let metrics = handle.await.expect("loop finishes").snapshot();
    assert_eq!(metrics.failures, 1);
}

#[tokio::test]
async fn test_authority_credential_rejection_leaves_world_gate_open() {
    let h = harness();
    h.arbiter.create_claim(hit(1, 100)).expect("create");
    h.authority.queue_push(Err(rejected_key()));

    let err = h.bridge.tick().await.expect_err("push refused");
    assert!(matches!(err, SyncError::Fetch(FetchError::Remote { .. })));
    assert!(!h.scheduler.is_credential_invalid());
    assert_eq!(h.arbiter.outbox_len(), 1);
}

#[tokio::test]
async fn test_sync_continues_while_world_credential_is_invalid() {
    let h = harness();
    h.remote.script("user", Err(rejected_key()));
    let world = h.scheduler.fetch("user", Duration::ZERO, 3).await;
    assert!(matches!(world, Err(FetchError::CredentialInvalid { .. })));
    assert!(h.scheduler.is_credential_invalid());

    h.arbiter.create_claim(hit(1, 100)).expect("create");
    let report = h.bridge.tick().await.expect("authority calls still flow");
    assert_eq!(report.pushed, 1);
    assert_eq!(h.authority.pull_count(), 1);
}
