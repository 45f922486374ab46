//! Per-feature timer registry.
//!
//! Features never spawn timers directly; they go through their registry
//! so `disable()` can abort everything in one call.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Default)]
pub struct TimerRegistry {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` once after `delay`.
    pub fn timeout(&self, delay: Duration, f: impl FnOnce() + Send + 'static) {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });
        self.push(handle);
    }

    /// Run `f` every `period` until the registry is cleared.
    pub fn interval(&self, period: Duration, f: impl Fn() + Send + Sync + 'static) {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The immediate first tick would fire before the period.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                f();
            }
        });
        self.push(handle);
    }

    fn push(&self, handle: JoinHandle<()>) {
        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    pub fn active_count(&self) -> usize {
        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.len()
    }

    pub fn abort_all(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self
                .handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            handle.abort();
        }
    }
}
