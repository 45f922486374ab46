//! Per-feature resource registry.
//!
//! Every subscription, listener, and timer a feature acquires is tracked
//! here so `disable()` is exactly one `cleanup_all()` call, and the §8
//! leak invariants (no residual subscriptions, no residual overlays)
//! hold by construction.

use std::sync::{Mutex, PoisonError};

use crate::application::events::{EventBus, EventKind, HandlerId};
use crate::application::settings::{ListenerId, SettingsService};
use crate::features::timers::TimerRegistry;
use crate::infrastructure::observer::ObserverHandle;
use crate::infrastructure::websocket::SubscriptionHandle;
use std::sync::Arc;

#[derive(Default)]
pub struct FeatureResources {
    timers: TimerRegistry,
    cleanups: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl FeatureResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Register an arbitrary teardown closure.
    pub fn defer(&self, f: impl FnOnce() + Send + 'static) {
        let mut cleanups = self
            .cleanups
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cleanups.push(Box::new(f));
    }

    pub fn track_interceptor(&self, handle: SubscriptionHandle) {
        self.defer(move || handle.unsubscribe());
    }

    pub fn track_observer(&self, handle: ObserverHandle) {
        self.defer(move || handle.unregister());
    }

    pub fn track_bus(&self, bus: EventBus, kind: EventKind, id: HandlerId) {
        self.defer(move || bus.off(kind, id));
    }

    pub fn track_setting_listener(&self, settings: Arc<SettingsService>, key: &str, id: ListenerId) {
        let key = key.to_string();
        self.defer(move || settings.off_setting_change(&key, id));
    }

    /// Abort timers and run every teardown closure. Idempotent: a second
    /// call finds nothing left to do.
    pub fn cleanup_all(&self) {
        self.timers.abort_all();
        let cleanups: Vec<Box<dyn FnOnce() + Send>> = {
            let mut guard = self
                .cleanups
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        for cleanup in cleanups {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_cleanup_runs_each_closure_once() {
        let resources = FeatureResources::new();
        let count = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let count = Arc::clone(&count);
            resources.defer(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        resources.cleanup_all();
        resources.cleanup_all();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
