use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;

/// Cloneable handle polled by worker threads at loop-iteration boundaries.
///
/// Never consulted mid-read: a blocking device read in flight finishes
/// before the flag is observed again.
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ShutdownHandler {
    flag: ShutdownFlag,
    notify: Arc<Notify>,
}

impl ShutdownHandler {
    pub fn new() -> Self {
        Self {
            flag: ShutdownFlag::new(),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Installs the Ctrl-C listener and panic hook, returning the guard the
    /// rest of the application observes.
    pub async fn install(self) -> ShutdownGuard {
        let flag = self.flag.clone();
        let notify = Arc::clone(&self.notify);

        tokio::spawn(async move {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("failed to install Ctrl-C handler: {e}");
                return;
            }
            tracing::info!("shutdown requested via Ctrl-C");
            flag.set();
            notify.notify_waiters();
        });

        let original_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            tracing::error!("PANIC: {panic_info}");
            original_panic(panic_info);
        }));

        ShutdownGuard {
            flag: self.flag,
            notify: self.notify,
        }
    }
}

impl Default for ShutdownHandler {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ShutdownGuard {
    flag: ShutdownFlag,
    notify: Arc<Notify>,
}

impl ShutdownGuard {
    /// Handle for threads that poll instead of await.
    pub fn flag(&self) -> ShutdownFlag {
        self.flag.clone()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.is_set()
    }

    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a request landing in between
        // cannot be missed.
        notified.as_mut().enable();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }

    pub fn request_shutdown(&self) {
        self.flag.set();
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_starts_clear_and_latches() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
        assert!(flag.clone().is_set());
    }

    #[tokio::test]
    async fn request_shutdown_wakes_waiters() {
        let guard = ShutdownHandler::new().install().await;
        let worker_flag = guard.flag();
        assert!(!worker_flag.is_set());

        guard.request_shutdown();
        guard.wait().await;
        assert!(worker_flag.is_set());
    }
}
