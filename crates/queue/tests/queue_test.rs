//! Integration tests for debounced admission.
//!
//! All tests run on a paused tokio clock, so sleeping advances virtual time
//! and every timer due before the wake-up has already fired.

use std::time::Duration;

use hush_queue::{DelayedUniqueQueue, DuplicatePolicy};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn queue(default_delay_ms: u64) -> DelayedUniqueQueue<String> {
    DelayedUniqueQueue::builder()
        .default_delay(ms(default_delay_ms))
        .register_shutdown_hook(false)
        .build()
        .expect("queue builds inside a runtime")
}

fn s(v: &str) -> String {
    v.to_string()
}

#[tokio::test(start_paused = true)]
async fn resubmission_within_window_admits_once() {
    let q = queue(1_000);

    q.submit(s("e"), None);
    tokio::time::sleep(ms(500)).await;
    q.submit(s("e"), None);
    assert_eq!(q.pending_size(), 1);

    // The first submission's deadline passes without an admission.
    tokio::time::sleep(ms(600)).await;
    assert_eq!(q.size(), 0);
    assert!(q.has_pending_entry(&s("e")));

    // The second submission's full delay elapses.
    tokio::time::sleep(ms(500)).await;
    assert_eq!(q.size(), 1);
    assert_eq!(q.pending_size(), 0);
    assert_eq!(q.dequeue(), Some(s("e")));
    assert_eq!(q.dequeue(), None);
}

#[tokio::test(start_paused = true)]
async fn resubmission_uses_the_new_delay() {
    let q = queue(10_000);

    q.submit(s("e"), Some(ms(3_000)));
    tokio::time::sleep(ms(1_000)).await;
    q.submit(s("e"), Some(ms(500)));

    // Admitted at 1000 + 500, long before 3000.
    tokio::time::sleep(ms(499)).await;
    assert_eq!(q.size(), 0);
    tokio::time::sleep(ms(2)).await;
    assert_eq!(q.size(), 1);

    // Nothing left to fire at the first deadline.
    tokio::time::sleep(ms(5_000)).await;
    assert_eq!(q.size(), 1);
}

#[tokio::test(start_paused = true)]
async fn zero_delay_admits_synchronously() {
    let q = queue(1_000);
    q.submit(s("other"), None);
    let pending_before = q.pending_size();

    q.submit(s("now"), Some(Duration::ZERO));

    assert_eq!(q.pending_size(), pending_before);
    assert_eq!(q.size(), 1);
    assert_eq!(q.to_vec(), vec![s("now")]);
}

#[tokio::test(start_paused = true)]
async fn admission_follows_expiry_not_submission_order() {
    let q = queue(60_000);

    q.submit(s("A"), Some(ms(4_000)));
    q.submit(s("B"), Some(ms(2_000)));

    tokio::time::sleep(ms(2_001)).await;
    assert_eq!(q.size(), 1);

    tokio::time::sleep(ms(2_000)).await;
    assert_eq!(q.dequeue(), Some(s("B")));
    assert_eq!(q.dequeue(), Some(s("A")));
}

#[tokio::test(start_paused = true)]
async fn cancelled_entry_is_never_admitted() {
    let q = queue(1_000);
    q.submit(s("e"), None);
    q.submit(s("f"), None);

    assert!(q.cancel_pending_entry(&s("e")));
    assert_eq!(q.pending_size(), 1);
    assert!(!q.cancel_pending_entry(&s("e")));
    assert!(!q.clear_pending_entry(&s("missing")));

    tokio::time::sleep(ms(2_000)).await;
    assert_eq!(q.to_vec(), vec![s("f")]);
}

#[tokio::test(start_paused = true)]
async fn cancel_does_not_touch_admitted_entries() {
    let q = queue(1_000);
    q.submit(s("e"), Some(Duration::ZERO));
    assert!(!q.cancel_pending_entry(&s("e")));
    assert_eq!(q.size(), 1);
}

#[tokio::test(start_paused = true)]
async fn clear_all_is_idempotent() {
    let q = queue(1_000);
    q.submit_all([s("a"), s("b")], None);
    q.submit(s("c"), Some(Duration::ZERO));

    q.clear_all();
    assert_eq!(q.size(), 0);
    assert_eq!(q.pending_size(), 0);
    assert!(q.is_empty());
    assert!(q.is_pending_empty());

    q.clear_all();
    assert_eq!(q.size(), 0);
    assert_eq!(q.pending_size(), 0);

    tokio::time::sleep(ms(2_000)).await;
    assert!(q.is_empty());
}

#[tokio::test(start_paused = true)]
async fn clear_keeps_pending_timers() {
    let q = queue(1_000);
    q.submit(s("now"), Some(Duration::ZERO));
    q.submit(s("later"), None);

    q.clear();
    assert!(q.is_empty());
    assert!(q.has_pending());

    tokio::time::sleep(ms(1_001)).await;
    assert_eq!(q.dequeue(), Some(s("later")));
}

#[tokio::test(start_paused = true)]
async fn cancel_all_pending_reports_count() {
    let q = queue(1_000);
    q.submit_all([s("a"), s("b"), s("a")], None);
    assert_eq!(q.pending_size(), 2);
    assert_eq!(q.cancel_all_pending(), 2);
    assert_eq!(q.clear_pending(), 0);

    tokio::time::sleep(ms(2_000)).await;
    assert!(q.is_empty());
}

#[tokio::test(start_paused = true)]
async fn snapshots_are_copies() {
    let q = queue(1_000);
    q.submit(s("p"), None);
    q.submit(s("a"), Some(Duration::ZERO));

    let mut admitted = q.to_vec();
    let mut pending = q.pending_to_vec();
    admitted.clear();
    pending.push(s("x"));

    assert_eq!(q.size(), 1);
    assert_eq!(q.pending_to_vec(), vec![s("p")]);
}

#[tokio::test(start_paused = true)]
async fn close_releases_timers_and_queue_stays_usable() {
    let q = queue(1_000);
    q.submit(s("a"), None);
    q.close();
    q.close();
    assert!(!q.has_pending());

    q.submit(s("b"), None);
    tokio::time::sleep(ms(1_001)).await;
    assert_eq!(q.to_vec(), vec![s("b")]);
}

#[tokio::test(start_paused = true)]
async fn clones_share_state() {
    let q = queue(100);
    let other = q.clone();
    q.submit(s("a"), None);
    assert_eq!(other.pending_size(), 1);

    tokio::time::sleep(ms(101)).await;
    assert_eq!(other.dequeue(), Some(s("a")));
    assert!(q.is_empty());
}

#[tokio::test(start_paused = true)]
async fn struct_entries_collapse_by_content() {
    #[derive(Clone, Debug, PartialEq, serde::Serialize)]
    struct Update {
        user: u32,
        field: String,
    }

    let q: DelayedUniqueQueue<Update> = DelayedUniqueQueue::builder()
        .default_delay(ms(100))
        .duplicate_policy(DuplicatePolicy::SkipAdmitted)
        .register_shutdown_hook(false)
        .build()
        .unwrap();

    for _ in 0..5 {
        q.submit(Update { user: 1, field: "email".into() }, None);
    }
    q.submit(Update { user: 2, field: "email".into() }, None);
    assert_eq!(q.pending_size(), 2);

    tokio::time::sleep(ms(101)).await;
    let mut users: Vec<u32> = q.to_vec().into_iter().map(|u| u.user).collect();
    users.sort();
    assert_eq!(users, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn huge_delays_are_accepted() {
    let q = queue(1_000);
    q.submit(s("a"), Some(ms(100)));
    q.submit(s("a"), Some(Duration::MAX));
    assert_eq!(q.pending_size(), 1);
    assert!(q.pending_deadline(&s("a")).is_some());

    tokio::time::sleep(ms(10_000)).await;
    assert!(q.is_empty());

    // Still resettable and cancellable.
    q.submit(s("a"), Some(ms(100)));
    tokio::time::sleep(ms(101)).await;
    assert_eq!(q.dequeue(), Some(s("a")));

    q.submit(s("b"), Some(Duration::MAX));
    assert!(q.cancel_pending_entry(&s("b")));
}

#[tokio::test(start_paused = true)]
async fn huge_default_delay_is_accepted() {
    let q: DelayedUniqueQueue<String> = DelayedUniqueQueue::builder()
        .default_delay(Duration::from_secs(u64::MAX / 2))
        .register_shutdown_hook(false)
        .build()
        .unwrap();
    q.submit(s("a"), None);
    assert!(q.has_pending_entry(&s("a")));
    assert_eq!(q.force_admit_pending(), 1);
}

/// Default delay 5000ms; entry1 is reset at 2000ms.
#[tokio::test(start_paused = true)]
async fn debounce_scenario() {
    let q = queue(5_000);
    assert_eq!(q.enqueue_delay(), ms(5_000));

    q.submit(s("entry1"), None);
    q.submit(s("entry2"), None);

    tokio::time::sleep(ms(2_000)).await;
    q.submit(s("entry1"), None);

    tokio::time::sleep(ms(4_000)).await;
    assert_eq!(q.pending_size(), 1);
    assert_eq!(q.size(), 1);
    assert_eq!(q.dequeue(), Some(s("entry2")));

    tokio::time::sleep(ms(2_000)).await;
    assert_eq!(q.size(), 1);
    assert_eq!(q.dequeue(), Some(s("entry1")));
}
