//! Delayed unique queue.
//!
//! Entries are held back for a delay window before they become visible to
//! [`dequeue`](DelayedUniqueQueue::dequeue). Submitting an entry whose key is
//! already pending cancels the earlier timer and starts a fresh one, so a
//! burst of equivalent submissions produces a single admission once the
//! burst has been quiet for the full delay.
//!
//! Each pending key owns exactly one timer. Every path that removes a pending
//! record (expiry, cancellation, resubmission, forced flush, teardown, drop)
//! also cancels or releases that timer.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use hush_core::{DuplicatePolicy, QueueConfig};
use indexmap::IndexMap;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::QueueError;
use crate::key::{json_key_fn, KeyFn};
use crate::listener::{notify, EventKind, Listener, ListenerId, ListenerRegistry};
use crate::shutdown::{ShutdownRegistry, Teardown};
use crate::timer::TimerHandle;

/// Default delay when none is configured (one minute).
pub const DEFAULT_DELAY: Duration = Duration::from_millis(hush_core::config::DEFAULT_DELAY_MS);

// ── State ─────────────────────────────────────────────────────

struct PendingRecord<T> {
    value: T,
    /// Arming sequence; a timer whose sequence no longer matches is stale.
    seq: u64,
    timer: TimerHandle,
}

struct State<T> {
    /// Insertion-ordered so forced flushes and snapshots are deterministic.
    pending: IndexMap<String, PendingRecord<T>>,
    admitted: VecDeque<(String, T)>,
    listeners: ListenerRegistry<T>,
    next_seq: u64,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    default_delay: Duration,
    policy: DuplicatePolicy,
    key_fn: KeyFn<T>,
    runtime: Handle,
}

impl<T: Clone + Send + 'static> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to the admitted sequence unless the duplicate policy forbids it.
    /// Returns the value to hand to listeners.
    fn admit(&self, state: &mut State<T>, key: String, value: T, via: &'static str) -> Option<T> {
        if self.policy == DuplicatePolicy::SkipAdmitted
            && state.admitted.iter().any(|(k, _)| *k == key)
        {
            debug!(key = %key, via, "already admitted, skipping");
            return None;
        }
        debug!(key = %key, via, "admitted");
        state.admitted.push_back((key, value.clone()));
        Some(value)
    }

    /// Release the lock, then notify enqueue listeners for each admission.
    /// By the time a listener runs, the queue already reflects the admission.
    fn publish(&self, state: MutexGuard<'_, State<T>>, admitted: Vec<T>) {
        if admitted.is_empty() {
            return;
        }
        let listeners = state.listeners.snapshot(EventKind::Enqueue);
        drop(state);
        if listeners.is_empty() {
            return;
        }
        for entry in &admitted {
            notify(EventKind::Enqueue, &listeners, entry);
        }
    }

    /// Timer expiry for `key`, armed with sequence `seq`.
    fn fire(&self, key: &str, seq: u64) {
        let mut state = self.lock();
        match state.pending.get(key) {
            Some(record) if record.seq == seq => {}
            _ => {
                trace!(key, seq, "stale timer woke up, ignoring");
                return;
            }
        }
        let Some((key, record)) = state.pending.shift_remove_entry(key) else {
            return;
        };
        record.timer.detach();
        let admitted = self.admit(&mut state, key, record.value, "timer");
        self.publish(state, admitted.into_iter().collect());
    }

    fn cancel_all(&self) -> usize {
        let mut state = self.lock();
        let pending = std::mem::take(&mut state.pending);
        drop(state);
        let count = pending.len();
        for (_, record) in pending {
            record.timer.cancel();
        }
        if count > 0 {
            debug!(count, "cancelled all pending entries");
        }
        count
    }
}

impl<T: Clone + Send + 'static> Teardown for Inner<T> {
    fn teardown(&self) {
        self.cancel_all();
    }
}

// ── Queue ─────────────────────────────────────────────────────

/// FIFO queue that admits entries only after a per-key debounce delay.
///
/// Cloning yields another handle to the same queue. Dropping the last handle
/// cancels every outstanding timer. A listener that keeps a strong handle
/// keeps the queue alive; listeners should hold a [`WeakQueue`] instead.
pub struct DelayedUniqueQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for DelayedUniqueQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Non-owning handle to a [`DelayedUniqueQueue`], for use inside listeners.
pub struct WeakQueue<T> {
    inner: Weak<Inner<T>>,
}

impl<T> WeakQueue<T> {
    /// A strong handle, or `None` once every strong handle is gone.
    pub fn upgrade(&self) -> Option<DelayedUniqueQueue<T>> {
        self.inner.upgrade().map(|inner| DelayedUniqueQueue { inner })
    }
}

impl<T> Clone for WeakQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> DelayedUniqueQueue<T>
where
    T: Serialize + Clone + Send + 'static,
{
    /// Queue with the default one minute delay, keyed by [`json_key`](crate::key::json_key).
    pub fn new() -> Result<Self, QueueError> {
        Self::builder().build()
    }

    pub fn with_delay(default_delay: Duration) -> Result<Self, QueueError> {
        Self::builder().default_delay(default_delay).build()
    }

    pub fn builder() -> QueueBuilder<T> {
        QueueBuilder::with_key_fn(json_key_fn())
    }

    pub fn from_config(config: &QueueConfig) -> Result<Self, QueueError> {
        Self::builder().apply_config(config).build()
    }
}

impl<T> DelayedUniqueQueue<T>
where
    T: Clone + Send + 'static,
{
    /// Builder for entries that are keyed by a custom function.
    pub fn builder_with_key<F>(key_fn: F) -> QueueBuilder<T>
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        QueueBuilder::with_key_fn(Arc::new(key_fn))
    }

    fn key_of(&self, entry: &T) -> String {
        (self.inner.key_fn)(entry)
    }

    // ── Submission ────────────────────────────────────────────

    /// Schedule `entry` for admission after `delay` (or the default delay).
    ///
    /// A pending entry with the same key is cancelled first, restarting the
    /// delay. A zero delay admits synchronously without creating a timer.
    pub fn submit(&self, entry: T, delay: Option<Duration>) {
        let inner = &self.inner;
        let key = self.key_of(&entry);
        let delay = delay.unwrap_or(inner.default_delay);

        let mut state = inner.lock();
        if let Some(previous) = state.pending.shift_remove(&key) {
            previous.timer.cancel();
            debug!(key = %key, "pending entry resubmitted, delay reset");
        }

        if delay.is_zero() {
            let admitted = inner.admit(&mut state, key, entry, "immediate");
            inner.publish(state, admitted.into_iter().collect());
            return;
        }

        state.next_seq += 1;
        let seq = state.next_seq;
        let weak = Arc::downgrade(inner);
        let timer_key = key.clone();
        let timer = TimerHandle::arm(&inner.runtime, delay, move || {
            if let Some(inner) = weak.upgrade() {
                inner.fire(&timer_key, seq);
            }
        });
        debug!(
            key = %key,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "entry pending"
        );
        state.pending.insert(
            key,
            PendingRecord {
                value: entry,
                seq,
                timer,
            },
        );
    }

    /// [`submit`](Self::submit) each entry in iteration order.
    pub fn submit_all<I>(&self, entries: I, delay: Option<Duration>)
    where
        I: IntoIterator<Item = T>,
    {
        for entry in entries {
            self.submit(entry, delay);
        }
    }

    /// Admit everything pending right now, in submission order.
    /// Returns the number of entries actually admitted.
    pub fn force_admit_pending(&self) -> usize {
        let inner = &self.inner;
        let mut state = inner.lock();
        let pending = std::mem::take(&mut state.pending);
        let mut admitted = Vec::with_capacity(pending.len());
        for (key, record) in pending {
            record.timer.cancel();
            if let Some(value) = inner.admit(&mut state, key, record.value, "flush") {
                admitted.push(value);
            }
        }
        let count = admitted.len();
        inner.publish(state, admitted);
        count
    }

    // ── Consumption ───────────────────────────────────────────

    /// Remove and return the oldest admitted entry.
    pub fn dequeue(&self) -> Option<T> {
        self.inner.lock().admitted.pop_front().map(|(_, value)| value)
    }

    // ── Cancellation ──────────────────────────────────────────

    /// Cancel the pending admission of `entry`. Admitted entries are untouched.
    pub fn cancel_pending_entry(&self, entry: &T) -> bool {
        let key = self.key_of(entry);
        let removed = self.inner.lock().pending.shift_remove(&key);
        match removed {
            Some(record) => {
                record.timer.cancel();
                debug!(key = %key, "pending entry cancelled");
                true
            }
            None => false,
        }
    }

    /// Alias of [`cancel_pending_entry`](Self::cancel_pending_entry).
    pub fn clear_pending_entry(&self, entry: &T) -> bool {
        self.cancel_pending_entry(entry)
    }

    /// Cancel every pending timer. Returns how many were pending.
    pub fn cancel_all_pending(&self) -> usize {
        self.inner.cancel_all()
    }

    /// Alias of [`cancel_all_pending`](Self::cancel_all_pending).
    pub fn clear_pending(&self) -> usize {
        self.cancel_all_pending()
    }

    /// Empty the admitted sequence. Pending entries keep their timers.
    pub fn clear(&self) {
        self.inner.lock().admitted.clear();
    }

    /// Cancel all pending entries, then empty the admitted sequence.
    pub fn clear_all(&self) {
        self.cancel_all_pending();
        self.clear();
    }

    /// Release every outstanding timer. Idempotent; the queue stays usable.
    pub fn close(&self) {
        let cancelled = self.cancel_all_pending();
        debug!(cancelled, "queue closed");
    }

    // ── Queries ───────────────────────────────────────────────

    /// Number of admitted entries.
    pub fn size(&self) -> usize {
        self.inner.lock().admitted.len()
    }

    pub fn pending_size(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().admitted.is_empty()
    }

    pub fn is_pending_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        !self.is_pending_empty()
    }

    pub fn has_pending_entry(&self, entry: &T) -> bool {
        let key = self.key_of(entry);
        self.inner.lock().pending.contains_key(&key)
    }

    /// When the pending admission of `entry` is due, if it is pending.
    pub fn pending_deadline(&self, entry: &T) -> Option<Instant> {
        let key = self.key_of(entry);
        self.inner.lock().pending.get(&key).map(|r| r.timer.deadline())
    }

    /// Copy of the admitted sequence, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.lock().admitted.iter().map(|(_, v)| v.clone()).collect()
    }

    /// Copy of the pending values, in submission order.
    pub fn pending_to_vec(&self) -> Vec<T> {
        self.inner.lock().pending.values().map(|r| r.value.clone()).collect()
    }

    /// The configured default delay.
    pub fn enqueue_delay(&self) -> Duration {
        self.inner.default_delay
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.inner.policy
    }

    /// Non-owning handle that does not keep the queue alive.
    pub fn downgrade(&self) -> WeakQueue<T> {
        WeakQueue {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ── Listeners ─────────────────────────────────────────────

    /// Register `listener` for `kind`. Listeners run synchronously, in
    /// registration order, right after an entry is admitted, and may call
    /// back into the queue.
    ///
    /// A listener that captures a clone of this queue forms a reference
    /// cycle: the queue is then never dropped and its timers are only
    /// released by [`close`](Self::close). Capture [`downgrade`](Self::downgrade)
    /// instead.
    pub fn add_event_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let listener: Listener<T> = Arc::new(listener);
        self.inner.lock().listeners.add(kind, listener)
    }

    /// Unregister a listener. Unknown ids are ignored.
    pub fn remove_event_listener(&self, kind: EventKind, id: &ListenerId) -> bool {
        self.inner.lock().listeners.remove(kind, id)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner.lock().listeners.len(kind)
    }
}

impl<T> fmt::Debug for DelayedUniqueQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("DelayedUniqueQueue")
            .field("default_delay", &self.inner.default_delay)
            .field("policy", &self.inner.policy)
            .field("size", &state.admitted.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}

// ── Builder ───────────────────────────────────────────────────

/// Configures and constructs a [`DelayedUniqueQueue`].
pub struct QueueBuilder<T> {
    default_delay_ms: i64,
    policy: DuplicatePolicy,
    key_fn: KeyFn<T>,
    register_shutdown_hook: bool,
    registry: Option<ShutdownRegistry>,
}

impl<T> QueueBuilder<T>
where
    T: Clone + Send + 'static,
{
    pub fn with_key_fn(key_fn: KeyFn<T>) -> Self {
        Self {
            default_delay_ms: hush_core::config::DEFAULT_DELAY_MS as i64,
            policy: DuplicatePolicy::default(),
            key_fn,
            register_shutdown_hook: true,
            registry: None,
        }
    }

    pub fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Signed so that invalid input is reported by [`build`](Self::build)
    /// instead of being clamped.
    pub fn default_delay_ms(mut self, delay_ms: i64) -> Self {
        self.default_delay_ms = delay_ms;
        self
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether to register with a shutdown registry (default: true).
    pub fn register_shutdown_hook(mut self, enabled: bool) -> Self {
        self.register_shutdown_hook = enabled;
        self
    }

    /// Register with `registry` instead of [`ShutdownRegistry::global`].
    pub fn shutdown_registry(mut self, registry: ShutdownRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn apply_config(self, config: &QueueConfig) -> Self {
        let delay_ms = i64::try_from(config.default_delay_ms).unwrap_or(i64::MAX);
        self.default_delay_ms(delay_ms)
            .duplicate_policy(config.duplicate_policy)
            .register_shutdown_hook(config.shutdown_hook)
    }

    /// Validate the configuration and create the queue.
    ///
    /// Fails with [`QueueError::InvalidConfiguration`] for a negative delay
    /// and with [`QueueError::Runtime`] outside a tokio runtime.
    pub fn build(self) -> Result<DelayedUniqueQueue<T>, QueueError> {
        let delay_ms = u64::try_from(self.default_delay_ms).map_err(|_| {
            QueueError::InvalidConfiguration(format!(
                "default delay must be non-negative, got {}ms",
                self.default_delay_ms
            ))
        })?;
        let runtime = Handle::try_current().map_err(|e| QueueError::Runtime(e.to_string()))?;

        if delay_ms == 0 {
            warn!("default delay is zero: entries are admitted immediately and never collapsed");
        }

        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                pending: IndexMap::new(),
                admitted: VecDeque::new(),
                listeners: ListenerRegistry::new(),
                next_seq: 0,
            }),
            default_delay: Duration::from_millis(delay_ms),
            policy: self.policy,
            key_fn: self.key_fn,
            runtime,
        });

        if self.register_shutdown_hook {
            let hook: Arc<dyn Teardown> = inner.clone();
            self.registry
                .as_ref()
                .unwrap_or_else(|| ShutdownRegistry::global())
                .register(Arc::downgrade(&hook));
        }

        debug!(delay_ms, policy = %self.policy, "delayed unique queue created");
        Ok(DelayedUniqueQueue { inner })
    }
}
