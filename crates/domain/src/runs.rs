//! Completed and in-progress dungeon runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::hrid::ActionHrid;

/// Where a run record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunSource {
    /// Reconstructed from chat history.
    Chat,
    /// Observed live by the tracker.
    Live,
}

/// One completed dungeon run, as persisted to the `unifiedRuns` store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DungeonRun {
    pub timestamp: DateTime<Utc>,
    pub dungeon_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dungeon_hrid: Option<ActionHrid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<u8>,
    /// Sorted player names.
    pub team: Vec<String>,
    /// Authoritative duration in milliseconds.
    pub duration: u64,
    /// Wall-clock duration, when it differs from the authoritative one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracked_duration: Option<u64>,
    /// True iff `duration` was derived from two party-chat key-count
    /// messages rather than wall-clock.
    pub validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave_times: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_wave_time: Option<f64>,
    #[serde(default)]
    pub key_counts_map: HashMap<String, u64>,
    pub source: RunSource,
}

impl DungeonRun {
    /// Canonical team identity: sorted names joined with commas.
    pub fn team_key(&self) -> String {
        self.team.join(",")
    }

    /// Duplicate guard used when saving to the unified store: same team,
    /// timestamps within `timestamp_window_ms`, durations within
    /// `duration_window_ms`.
    pub fn is_duplicate_of(
        &self,
        other: &DungeonRun,
        timestamp_window_ms: i64,
        duration_window_ms: i64,
    ) -> bool {
        if self.team_key() != other.team_key() {
            return false;
        }
        let ts_delta = (self.timestamp - other.timestamp).num_milliseconds().abs();
        let dur_delta = (self.duration as i64 - other.duration as i64).abs();
        ts_delta <= timestamp_window_ms && dur_delta <= duration_window_ms
    }
}
