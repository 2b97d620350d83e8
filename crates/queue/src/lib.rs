//! In-memory delayed unique queue.
//!
//! This crate provides:
//! - [`DelayedUniqueQueue`]: per-key debounced admission into a FIFO sequence
//! - [`TimerHandle`]: cancellable one-shot timers on the tokio runtime
//! - Enqueue listeners notified synchronously on every admission
//! - [`ShutdownRegistry`]: process-wide teardown of outstanding timers
//!
//! # Example
//! ```ignore
//! let queue = DelayedUniqueQueue::with_delay(Duration::from_secs(5))?;
//! queue.add_event_listener(EventKind::Enqueue, |entry: &String| {
//!     println!("notify: {entry}");
//! });
//! queue.submit("profile-updated".to_string(), None);
//! queue.submit("profile-updated".to_string(), None); // resets the 5s window
//! ```

pub mod delayed;
pub mod error;
pub mod key;
pub mod listener;
pub mod shutdown;
pub mod timer;

pub use delayed::{DelayedUniqueQueue, QueueBuilder, WeakQueue, DEFAULT_DELAY};
pub use error::QueueError;
pub use hush_core::DuplicatePolicy;
pub use key::{json_key, KeyFn};
pub use listener::{EventKind, Listener, ListenerId};
pub use shutdown::{ShutdownRegistry, Teardown};
pub use timer::{TimerHandle, MAX_DELAY};
