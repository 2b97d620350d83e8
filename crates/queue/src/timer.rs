//! Cancellable one-shot timers on the tokio runtime.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Longest delay a timer is armed for (about 30 years). Longer delays are
/// clamped so the deadline can never overflow `Instant`.
pub const MAX_DELAY: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Handle to a scheduled callback.
///
/// The timer is an external resource: it is cancelled by [`cancel`] and
/// also when the handle is dropped, so a handle can never be lost while its
/// callback is still armed.
///
/// [`cancel`]: TimerHandle::cancel
#[derive(Debug)]
pub struct TimerHandle {
    task: Option<JoinHandle<()>>,
    deadline: Instant,
}

impl TimerHandle {
    /// Run `callback` on `runtime` once `delay` has elapsed. Delays beyond
    /// [`MAX_DELAY`] are clamped to it.
    pub fn arm<F>(runtime: &Handle, delay: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        // Deadline is fixed now, not when the task is first polled.
        let deadline = Instant::now() + delay.min(MAX_DELAY);
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            callback();
        });
        Self {
            task: Some(task),
            deadline,
        }
    }

    /// Instant at which the callback is due.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Abort the timer. Has no effect if the callback already ran.
    pub fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Release the handle without aborting. Used by the callback itself once
    /// it is running, where cancelling would be pointless.
    pub(crate) fn detach(mut self) {
        self.task.take();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
