//! Centralized UI observer.
//!
//! One pump consumes the host bridge's [`UiEvent`] stream and multiplexes
//! it to every subscriber, whatever the feature count: raw batch
//! subscribers (optionally debounced), class-predicate subscribers
//! (invoked once per matching added element), and visibility/scroll
//! subscribers. Subscriber failures are logged and isolated. Unregister
//! handles are idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::ports::outbound::{MutationBatch, OverlaySink, UiEvent, UiNode, VisibilityState};

pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(150);

/// Hard cap on one-shot wait polling; busy-waiting is not supported.
pub const WAIT_MAX_ATTEMPTS: u32 = 50;

/// One-shot "wait for X": poll for elements carrying `class_name` at a
/// bounded cadence and resolve `None` on timeout. `attempts` is clamped
/// to [`WAIT_MAX_ATTEMPTS`].
pub async fn wait_for_nodes(
    overlay: &dyn OverlaySink,
    class_name: &str,
    attempts: u32,
    interval: Duration,
) -> Option<Vec<UiNode>> {
    let attempts = attempts.clamp(1, WAIT_MAX_ATTEMPTS);
    for attempt in 0..attempts {
        let nodes = overlay.query_nodes(class_name);
        if !nodes.is_empty() {
            return Some(nodes);
        }
        if attempt + 1 < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    None
}

pub type HandlerResult = anyhow::Result<()>;
pub type BatchHandler = Arc<dyn Fn(&MutationBatch) -> HandlerResult + Send + Sync>;
pub type NodeHandler = Arc<dyn Fn(&UiNode) -> HandlerResult + Send + Sync>;
pub type VisibilityHandler = Arc<dyn Fn(VisibilityState) -> HandlerResult + Send + Sync>;
pub type ScrollHandler = Arc<dyn Fn() -> HandlerResult + Send + Sync>;

/// Per-subscriber debounce opt-in.
#[derive(Debug, Clone, Copy)]
pub struct DebounceOptions {
    pub debounce: bool,
    pub delay: Duration,
}

impl Default for DebounceOptions {
    fn default() -> Self {
        Self {
            debounce: false,
            delay: DEFAULT_DEBOUNCE_DELAY,
        }
    }
}

impl DebounceOptions {
    pub fn debounced() -> Self {
        Self {
            debounce: true,
            delay: DEFAULT_DEBOUNCE_DELAY,
        }
    }

    pub fn debounced_with(delay: Duration) -> Self {
        Self {
            debounce: true,
            delay,
        }
    }
}

struct DebounceState {
    pending: Mutex<MutationBatch>,
    scheduled: AtomicBool,
    delay: Duration,
}

struct RawSubscriber {
    uid: Uuid,
    id: String,
    handler: BatchHandler,
    debounce: Option<Arc<DebounceState>>,
}

struct ClassSubscriber {
    uid: Uuid,
    id: String,
    class_name: String,
    handler: NodeHandler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriberKind {
    Raw,
    Class,
    Visibility,
    Scroll,
}

pub struct UiObserver {
    raw: Mutex<Vec<RawSubscriber>>,
    class_subs: Mutex<Vec<ClassSubscriber>>,
    visibility: Mutex<Vec<(Uuid, String, VisibilityHandler)>>,
    scroll: Mutex<Vec<(Uuid, String, ScrollHandler)>>,
}

impl UiObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            raw: Mutex::new(Vec::new()),
            class_subs: Mutex::new(Vec::new()),
            visibility: Mutex::new(Vec::new()),
            scroll: Mutex::new(Vec::new()),
        })
    }

    /// Start the pump. The observer stays alive for the page lifetime;
    /// dropping the returned handle does not stop it.
    pub fn start(self: &Arc<Self>, mut rx: UnboundedReceiver<UiEvent>) -> JoinHandle<()> {
        let observer = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                observer.handle_event(event);
            }
            tracing::debug!("UI event stream ended");
        })
    }

    pub fn handle_event(self: &Arc<Self>, event: UiEvent) {
        match event {
            UiEvent::Mutations(batch) => self.dispatch_mutations(batch),
            UiEvent::VisibilityChanged(state) => self.dispatch_visibility(state),
            UiEvent::Scrolled => self.dispatch_scroll(),
        }
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Subscribe to every mutation batch.
    pub fn register(
        self: &Arc<Self>,
        id: &str,
        handler: BatchHandler,
        options: DebounceOptions,
    ) -> ObserverHandle {
        let uid = Uuid::new_v4();
        let debounce = options.debounce.then(|| {
            Arc::new(DebounceState {
                pending: Mutex::new(MutationBatch::default()),
                scheduled: AtomicBool::new(false),
                delay: options.delay,
            })
        });
        if let Ok(mut raw) = self.raw.lock() {
            raw.push(RawSubscriber {
                uid,
                id: id.to_string(),
                handler,
                debounce,
            });
        }
        self.handle(uid, SubscriberKind::Raw)
    }

    /// Subscribe to added elements carrying a class; the handler runs once
    /// per matching element per batch.
    pub fn on_class(self: &Arc<Self>, id: &str, class_name: &str, handler: NodeHandler) -> ObserverHandle {
        let uid = Uuid::new_v4();
        if let Ok(mut subs) = self.class_subs.lock() {
            subs.push(ClassSubscriber {
                uid,
                id: id.to_string(),
                class_name: class_name.to_string(),
                handler,
            });
        }
        self.handle(uid, SubscriberKind::Class)
    }

    pub fn on_visibility(self: &Arc<Self>, id: &str, handler: VisibilityHandler) -> ObserverHandle {
        let uid = Uuid::new_v4();
        if let Ok(mut subs) = self.visibility.lock() {
            subs.push((uid, id.to_string(), handler));
        }
        self.handle(uid, SubscriberKind::Visibility)
    }

    pub fn on_scroll(self: &Arc<Self>, id: &str, handler: ScrollHandler) -> ObserverHandle {
        let uid = Uuid::new_v4();
        if let Ok(mut subs) = self.scroll.lock() {
            subs.push((uid, id.to_string(), handler));
        }
        self.handle(uid, SubscriberKind::Scroll)
    }

    fn handle(self: &Arc<Self>, uid: Uuid, kind: SubscriberKind) -> ObserverHandle {
        ObserverHandle {
            observer: Arc::downgrade(self),
            kind,
            uid,
            active: AtomicBool::new(true),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let raw = self.raw.lock().map(|l| l.len()).unwrap_or(0);
        let class = self.class_subs.lock().map(|l| l.len()).unwrap_or(0);
        let vis = self.visibility.lock().map(|l| l.len()).unwrap_or(0);
        let scroll = self.scroll.lock().map(|l| l.len()).unwrap_or(0);
        raw + class + vis + scroll
    }

    fn remove(&self, uid: Uuid, kind: SubscriberKind) {
        match kind {
            SubscriberKind::Raw => {
                if let Ok(mut subs) = self.raw.lock() {
                    subs.retain(|s| s.uid != uid);
                }
            }
            SubscriberKind::Class => {
                if let Ok(mut subs) = self.class_subs.lock() {
                    subs.retain(|s| s.uid != uid);
                }
            }
            SubscriberKind::Visibility => {
                if let Ok(mut subs) = self.visibility.lock() {
                    subs.retain(|(id, _, _)| *id != uid);
                }
            }
            SubscriberKind::Scroll => {
                if let Ok(mut subs) = self.scroll.lock() {
                    subs.retain(|(id, _, _)| *id != uid);
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    fn dispatch_mutations(self: &Arc<Self>, batch: MutationBatch) {
        // Class subscribers: one invocation per matching added element.
        let class_subs: Vec<(String, String, NodeHandler)> = match self.class_subs.lock() {
            Ok(subs) => subs
                .iter()
                .map(|s| (s.id.clone(), s.class_name.clone(), Arc::clone(&s.handler)))
                .collect(),
            Err(_) => Vec::new(),
        };
        for (id, class_name, handler) in &class_subs {
            for node in batch.added.iter().filter(|n| n.has_class(class_name)) {
                if let Err(e) = handler(node) {
                    tracing::warn!(subscriber = %id, class = %class_name, "class subscriber failed: {e}");
                }
            }
        }

        // Raw subscribers, debounced or immediate.
        let raw_subs: Vec<(String, BatchHandler, Option<Arc<DebounceState>>)> =
            match self.raw.lock() {
                Ok(subs) => subs
                    .iter()
                    .map(|s| {
                        (
                            s.id.clone(),
                            Arc::clone(&s.handler),
                            s.debounce.as_ref().map(Arc::clone),
                        )
                    })
                    .collect(),
                Err(_) => Vec::new(),
            };
        for (id, handler, debounce) in raw_subs {
            match debounce {
                None => {
                    if let Err(e) = handler(&batch) {
                        tracing::warn!(subscriber = %id, "mutation subscriber failed: {e}");
                    }
                }
                Some(state) => {
                    if let Ok(mut pending) = state.pending.lock() {
                        pending.merge(batch.clone());
                    }
                    if !state.scheduled.swap(true, Ordering::SeqCst) {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            tokio::time::sleep(state.delay).await;
                            state.scheduled.store(false, Ordering::SeqCst);
                            let coalesced = match state.pending.lock() {
                                Ok(mut pending) => std::mem::take(&mut *pending),
                                Err(_) => return,
                            };
                            if coalesced.is_empty() {
                                return;
                            }
                            if let Err(e) = handler(&coalesced) {
                                tracing::warn!(subscriber = %id, "debounced subscriber failed: {e}");
                            }
                        });
                    }
                }
            }
        }
    }

    fn dispatch_visibility(&self, state: VisibilityState) {
        let subs: Vec<(String, VisibilityHandler)> = match self.visibility.lock() {
            Ok(subs) => subs
                .iter()
                .map(|(_, id, h)| (id.clone(), Arc::clone(h)))
                .collect(),
            Err(_) => Vec::new(),
        };
        for (id, handler) in subs {
            if let Err(e) = handler(state) {
                tracing::warn!(subscriber = %id, "visibility subscriber failed: {e}");
            }
        }
    }

    fn dispatch_scroll(&self) {
        let subs: Vec<(String, ScrollHandler)> = match self.scroll.lock() {
            Ok(subs) => subs
                .iter()
                .map(|(_, id, h)| (id.clone(), Arc::clone(h)))
                .collect(),
            Err(_) => Vec::new(),
        };
        for (id, handler) in subs {
            if let Err(e) = handler() {
                tracing::warn!(subscriber = %id, "scroll subscriber failed: {e}");
            }
        }
    }
}

/// Idempotent unregister handle.
pub struct ObserverHandle {
    observer: Weak<UiObserver>,
    kind: SubscriberKind,
    uid: Uuid,
    active: AtomicBool,
}

impl ObserverHandle {
    pub fn unregister(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Some(observer) = self.observer.upgrade() {
                observer.remove(self.uid, self.kind);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::outbound::MemoryOverlay;
    use std::sync::atomic::AtomicU32;

    fn node(classes: &[&str]) -> UiNode {
        UiNode {
            node_id: 1,
            class_names: classes.iter().map(|c| c.to_string()).collect(),
            text: String::new(),
            attributes: Default::default(),
        }
    }

    fn batch(nodes: Vec<UiNode>) -> MutationBatch {
        MutationBatch {
            added: nodes,
            removed: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_class_subscriber_invoked_per_matching_element() {
        let observer = UiObserver::new();
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = Arc::clone(&count);
        let _handle = observer.on_class(
            "test",
            "TaskCard",
            Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        observer.handle_event(UiEvent::Mutations(batch(vec![
            node(&["TaskCard"]),
            node(&["TaskCard", "extra"]),
            node(&["Unrelated"]),
        ])));

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_raw_subscriber_receives_batches() {
        let observer = UiObserver::new();
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = Arc::clone(&count);
        let _handle = observer.register(
            "test",
            Arc::new(move |b| {
                count_clone.fetch_add(b.added.len() as u32, Ordering::SeqCst);
                Ok(())
            }),
            DebounceOptions::default(),
        );

        observer.handle_event(UiEvent::Mutations(batch(vec![node(&["a"]), node(&["b"])])));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_debounce_coalesces_batches() {
        let observer = UiObserver::new();
        let calls = Arc::new(AtomicU32::new(0));
        let nodes_seen = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let nodes_clone = Arc::clone(&nodes_seen);
        let _handle = observer.register(
            "test",
            Arc::new(move |b| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                nodes_clone.fetch_add(b.added.len() as u32, Ordering::SeqCst);
                Ok(())
            }),
            DebounceOptions::debounced_with(Duration::from_millis(50)),
        );

        for _ in 0..5 {
            observer.handle_event(UiEvent::Mutations(batch(vec![node(&["x"])])));
        }
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(nodes_seen.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let observer = UiObserver::new();
        let handle = observer.on_class("test", "X", Arc::new(|_| Ok(())));
        assert_eq!(observer.subscriber_count(), 1);
        handle.unregister();
        handle.unregister();
        assert_eq!(observer.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_subscriber_does_not_block_others() {
        let observer = UiObserver::new();
        let count = Arc::new(AtomicU32::new(0));
        let _bad = observer.register(
            "bad",
            Arc::new(|_| Err(anyhow::anyhow!("boom"))),
            DebounceOptions::default(),
        );
        let count_clone = Arc::clone(&count);
        let _good = observer.register(
            "good",
            Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            DebounceOptions::default(),
        );

        observer.handle_event(UiEvent::Mutations(batch(vec![node(&["x"])])));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_for_nodes_resolves_when_element_appears() {
        let overlay = Arc::new(MemoryOverlay::new());
        let overlay_writer = Arc::clone(&overlay);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            overlay_writer.add_page_node(node(&["TaskCard"]));
        });

        let found = wait_for_nodes(overlay.as_ref(), "TaskCard", 50, Duration::from_millis(10))
            .await
            .expect("nodes");
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_nodes_times_out_to_none() {
        let overlay = MemoryOverlay::new();
        let result = wait_for_nodes(&overlay, "NeverThere", 3, Duration::from_millis(5)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_visibility_and_scroll_dispatch() {
        let observer = UiObserver::new();
        let hidden = Arc::new(AtomicU32::new(0));
        let scrolls = Arc::new(AtomicU32::new(0));

        let hidden_clone = Arc::clone(&hidden);
        let _v = observer.on_visibility(
            "test",
            Arc::new(move |state| {
                if state == VisibilityState::Hidden {
                    hidden_clone.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }),
        );
        let scrolls_clone = Arc::clone(&scrolls);
        let _s = observer.on_scroll(
            "test",
            Arc::new(move || {
                scrolls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        observer.handle_event(UiEvent::VisibilityChanged(VisibilityState::Hidden));
        observer.handle_event(UiEvent::Scrolled);
        assert_eq!(hidden.load(Ordering::SeqCst), 1);
        assert_eq!(scrolls.load(Ordering::SeqCst), 1);
    }
}
