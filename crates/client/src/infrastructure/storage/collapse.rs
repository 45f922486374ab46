//! Per-UI-group collapse state.
//!
//! Panels remember whether each named group is folded. The map lives
//! under one document; writes coalesce like any other deferred write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::{keys, DocumentStore};

pub struct CollapseStates {
    store: Arc<DocumentStore>,
    states: Mutex<HashMap<String, bool>>,
}

impl CollapseStates {
    pub async fn load(store: Arc<DocumentStore>) -> Self {
        let states: HashMap<String, bool> = store
            .get_json(keys::KEY_COLLAPSE_STATES, keys::SETTINGS)
            .await
            .unwrap_or_default();
        Self {
            store,
            states: Mutex::new(states),
        }
    }

    pub fn is_collapsed(&self, group: &str) -> bool {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(group)
            .copied()
            .unwrap_or(false)
    }

    pub fn set_collapsed(&self, group: &str, collapsed: bool) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.insert(group.to_string(), collapsed);
        self.store
            .set_json_deferred(keys::KEY_COLLAPSE_STATES, &*states, keys::SETTINGS);
    }
}
