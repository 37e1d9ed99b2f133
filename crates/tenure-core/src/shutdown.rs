//! Cooperative shutdown signal shared by the reconciler and the servers.

use std::time::Duration;
use tokio::sync::watch;

/// Fires the shutdown signal. Cloning is not needed: hand out
/// [`Shutdown`] handles via [`ShutdownTrigger::subscribe`].
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Observes the shutdown signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Shutdown {
    /// A handle that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered. Pends forever if the
    /// trigger was dropped without firing.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `duration` unless shutdown fires first. Returns `false` when
    /// interrupted.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_triggered();
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.triggered() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_trigger() {
        let (_trigger, mut shutdown) = channel();
        assert!(shutdown.sleep(Duration::from_secs(60)).await);
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_interrupts_sleep() {
        let (trigger, mut shutdown) = channel();
        let handle = tokio::spawn(async move { shutdown.sleep(Duration::from_secs(3600)).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.trigger();
        assert!(!handle.await.unwrap());
    }

    #[tokio::test]
    async fn subscribers_see_earlier_trigger() {
        let (trigger, _shutdown) = channel();
        trigger.trigger();
        let mut late = trigger.subscribe();
        assert!(late.is_triggered());
        late.triggered().await;
    }

    #[tokio::test(start_paused = true)]
    async fn never_handle_does_not_fire() {
        let mut shutdown = Shutdown::never();
        assert!(shutdown.sleep(Duration::from_secs(5)).await);
        assert!(!shutdown.is_triggered());
    }
}
