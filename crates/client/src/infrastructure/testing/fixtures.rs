//! Deterministic stand-ins for the outbound ports.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};

use crate::ports::outbound::{Clock, UiNode};

/// Manually-driven clock.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += delta;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Page node with a single class and text body.
pub fn node_with_class(node_id: u64, class_name: &str, text: &str) -> UiNode {
    UiNode {
        node_id,
        class_names: vec![class_name.to_string()],
        text: text.to_string(),
        attributes: Default::default(),
    }
}
