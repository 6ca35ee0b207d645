//! Injectable sleep provider for the poll loop.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records every requested wait and returns immediately.
#[derive(Debug, Default)]
pub struct ManualClock {
    waits: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn wait_count(&self) -> usize {
        self.waits.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Sum of all requested waits.
    pub fn elapsed(&self) -> Duration {
        self.waits()
            .into_iter()
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn sleep(&self, duration: Duration) {
        self.waits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        // Give other tasks (and cancellation) a chance to run.
        tokio::task::yield_now().await;
    }
}
