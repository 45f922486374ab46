//! Enhancement tracking sessions.
//!
//! A session is created on the first observed enhancement attempt for an
//! item and accumulates per-level attempt statistics, costs, streaks, and
//! milestones until the target level is reached or the user finalizes it.
//! A completed session can be extended to a new target; history and costs
//! are preserved across the extension.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::DomainError;
use crate::hrid::ItemHrid;

/// Milestone levels surfaced in the session summary.
pub const MILESTONE_LEVELS: [u8; 4] = [5, 10, 15, 20];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Tracking,
    Completed,
}

/// The most recent attempt, used to infer success/failure from the next
/// observed level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastAttempt {
    pub attempt_number: u64,
    pub level: u8,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelAttempts {
    pub success: u64,
    pub fail: u64,
    pub success_rate: f64,
}

impl LevelAttempts {
    fn recompute_rate(&mut self) {
        let total = self.success + self.fail;
        self.success_rate = if total == 0 {
            0.0
        } else {
            self.success as f64 / total as f64
        };
    }
}

/// Worker-computed expectations for the remainder of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPredictions {
    pub expected_attempts: f64,
    pub expected_protections: f64,
    /// Milliseconds.
    pub expected_time: f64,
    pub success_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementSession {
    pub id: String,
    pub state: SessionState,
    pub item_hrid: ItemHrid,
    pub item_name: String,
    pub start_level: u8,
    pub target_level: u8,
    pub current_level: u8,
    /// Levels at or above this use a protection item.
    pub protect_from: u8,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub last_update_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<LastAttempt>,
    #[serde(default)]
    pub attempts_per_level: BTreeMap<u8, LevelAttempts>,
    #[serde(default)]
    pub material_costs: f64,
    #[serde(default)]
    pub coin_cost: f64,
    #[serde(default)]
    pub coin_count: u64,
    #[serde(default)]
    pub protection_cost: f64,
    #[serde(default)]
    pub protection_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection_item_hrid: Option<ItemHrid>,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub total_successes: u64,
    #[serde(default)]
    pub total_failures: u64,
    #[serde(default)]
    pub longest_success_streak: u64,
    #[serde(default)]
    pub longest_failure_streak: u64,
    /// Positive while on a success streak, negative on a failure streak.
    #[serde(default)]
    pub current_streak: i64,
    #[serde(default)]
    pub milestones_reached: BTreeSet<u8>,
    #[serde(default)]
    pub total_xp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions: Option<SessionPredictions>,
}

impl EnhancementSession {
    pub fn new(
        id: impl Into<String>,
        item_hrid: ItemHrid,
        item_name: impl Into<String>,
        start_level: u8,
        target_level: u8,
        protect_from: u8,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            state: SessionState::Tracking,
            item_hrid,
            item_name: item_name.into(),
            start_level,
            target_level,
            current_level: start_level,
            protect_from,
            start_time: now,
            end_time: None,
            last_update_time: now,
            last_attempt: None,
            attempts_per_level: BTreeMap::new(),
            material_costs: 0.0,
            coin_cost: 0.0,
            coin_count: 0,
            protection_cost: 0.0,
            protection_count: 0,
            protection_item_hrid: None,
            total_cost: 0.0,
            total_successes: 0,
            total_failures: 0,
            longest_success_streak: 0,
            longest_failure_streak: 0,
            current_streak: 0,
            milestones_reached: BTreeSet::new(),
            total_xp: 0.0,
            predictions: None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.state == SessionState::Tracking
    }

    /// Resume predicate: a new attempt stream belongs to this session when
    /// the item matches, the observed level is within one step of the
    /// session's current level, and target/protection are unchanged.
    pub fn matches_resume(
        &self,
        item_hrid: &ItemHrid,
        observed_level: u8,
        target_level: u8,
        protect_from: u8,
    ) -> bool {
        self.is_tracking()
            && &self.item_hrid == item_hrid
            && self.target_level == target_level
            && self.protect_from == protect_from
            && observed_level.abs_diff(self.current_level) <= 1
    }

    fn total_attempts(&self) -> u64 {
        self.total_successes + self.total_failures
    }

    /// Record an attempt outcome observed at `level`. On success the item
    /// moves to `level + 1`; on failure it drops to the protected floor
    /// (or stays, when the protection item prevented the loss).
    pub fn record_attempt(
        &mut self,
        level: u8,
        success: bool,
        resulting_level: u8,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.is_tracking() {
            return Err(DomainError::invalid_state_transition(
                "completed session cannot record attempts",
            ));
        }

        let stats = self.attempts_per_level.entry(level).or_default();
        if success {
            stats.success += 1;
        } else {
            stats.fail += 1;
        }
        stats.recompute_rate();

        if success {
            self.total_successes += 1;
            self.current_streak = if self.current_streak > 0 {
                self.current_streak + 1
            } else {
                1
            };
            self.longest_success_streak = self
                .longest_success_streak
                .max(self.current_streak.unsigned_abs());
        } else {
            self.total_failures += 1;
            self.current_streak = if self.current_streak < 0 {
                self.current_streak - 1
            } else {
                -1
            };
            self.longest_failure_streak = self
                .longest_failure_streak
                .max(self.current_streak.unsigned_abs());
        }

        self.current_level = resulting_level;
        for milestone in MILESTONE_LEVELS {
            if resulting_level >= milestone {
                self.milestones_reached.insert(milestone);
            }
        }

        self.last_attempt = Some(LastAttempt {
            attempt_number: self.total_attempts(),
            level,
            timestamp: now,
        });
        self.last_update_time = now;

        if self.current_level >= self.target_level {
            self.state = SessionState::Completed;
            self.end_time = Some(now);
        }
        Ok(())
    }

    /// Enhancement XP credited for an attempt. Reference formula:
    /// `1.4 × (1 + wisdom) × (previous_level + 1) × (10 + item_level)` on
    /// success, 10% of that on failure.
    pub fn attempt_xp(previous_level: u8, item_level: u32, wisdom: f64, success: bool) -> f64 {
        let full = 1.4 * (1.0 + wisdom) * (previous_level as f64 + 1.0) * (10.0 + item_level as f64);
        if success {
            full
        } else {
            full * 0.1
        }
    }

    pub fn add_attempt_costs(&mut self, material_cost: f64, coin_cost: f64, coins_spent: u64) {
        self.material_costs += material_cost;
        self.coin_cost += coin_cost;
        self.coin_count += coins_spent;
        self.total_cost = self.material_costs + self.coin_cost + self.protection_cost;
    }

    pub fn add_protection_use(&mut self, protection_cost: f64, item_hrid: ItemHrid) {
        self.protection_cost += protection_cost;
        self.protection_count += 1;
        self.protection_item_hrid = Some(item_hrid);
        self.total_cost = self.material_costs + self.coin_cost + self.protection_cost;
    }

    /// Finalize an in-progress session without reaching the target.
    pub fn finalize(&mut self, now: DateTime<Utc>) {
        if self.state == SessionState::Tracking {
            self.state = SessionState::Completed;
            self.end_time = Some(now);
            self.last_update_time = now;
        }
    }

    /// Extend a completed session to a new target. Costs and attempt
    /// history are preserved; the session returns to tracking.
    pub fn extend_to(&mut self, new_target: u8, now: DateTime<Utc>) -> Result<(), DomainError> {
        if new_target <= self.current_level {
            return Err(DomainError::validation(format!(
                "extension target {new_target} is not above current level {}",
                self.current_level
            )));
        }
        self.target_level = new_target;
        self.state = SessionState::Tracking;
        self.end_time = None;
        self.last_update_time = now;
        Ok(())
    }
}
