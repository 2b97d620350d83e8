//! Process shutdown hook.
//!
//! Queues register here at construction so outstanding timers can be
//! released before the process exits. Entries are held weakly: a queue that
//! is dropped without explicit teardown simply disappears from the registry.

use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use tracing::info;

/// Something that can release its resources on shutdown.
pub trait Teardown: Send + Sync {
    fn teardown(&self);
}

#[derive(Clone, Default)]
pub struct ShutdownRegistry {
    hooks: Arc<Mutex<Vec<Weak<dyn Teardown>>>>,
}

static GLOBAL: OnceLock<ShutdownRegistry> = OnceLock::new();

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The single process-wide registry.
    pub fn global() -> &'static ShutdownRegistry {
        GLOBAL.get_or_init(ShutdownRegistry::new)
    }

    /// Register a hook. Entries whose owners are gone are pruned here.
    pub fn register(&self, hook: Weak<dyn Teardown>) {
        let mut hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
        hooks.retain(|h| h.strong_count() > 0);
        hooks.push(hook);
    }

    /// Number of registered hooks whose owners are still alive.
    pub fn live_count(&self) -> usize {
        let hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
        hooks.iter().filter(|h| h.strong_count() > 0).count()
    }

    /// Tear down every live hook. Returns how many ran.
    ///
    /// Hooks stay registered, so running again is harmless.
    pub fn run(&self) -> usize {
        let live: Vec<Arc<dyn Teardown>> = {
            let mut hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
            hooks.retain(|h| h.strong_count() > 0);
            hooks.iter().filter_map(Weak::upgrade).collect()
        };
        for hook in &live {
            hook.teardown();
        }
        info!(hooks = live.len(), "shutdown hooks ran");
        live.len()
    }

    /// Wait for SIGINT or SIGTERM (Ctrl+C elsewhere), then [`run`](Self::run).
    pub async fn run_on_signal(&self) -> std::io::Result<usize> {
        os_signal().await?;
        info!("shutdown signal received");
        Ok(self.run())
    }
}

async fn os_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
