//! Reconstruct completed runs from rendered chat history.
//!
//! Chat lines look like `[<timestamp>] <body>` with either of the two
//! game timestamp formats. Runs reconstructed here are `validated`
//! (their duration comes from two key-count messages) and carry
//! `source = chat`.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::collections::HashMap;

use toolasha_domain::{DungeonRun, RunSource};
use toolasha_protocol::{parse_chat_timestamp, parse_key_counts};

static LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([^\]]+)\]\s*(.*)$").expect("chat line regex"));

#[derive(Debug)]
enum LineKind {
    BattleStarted { dungeon_name: String },
    KeyCount { counts: Vec<(String, u64)> },
    PartyFailed,
    BattleEnded,
    Other,
}

fn classify(body: &str) -> LineKind {
    let lower = body.to_lowercase();
    if lower.contains("battle started") {
        let dungeon_name = body
            .split_once(" - ")
            .map(|(_, name)| name.trim().to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        return LineKind::BattleStarted { dungeon_name };
    }
    if lower.starts_with("key count") {
        return LineKind::KeyCount {
            counts: parse_key_counts(body),
        };
    }
    if lower.contains("party has failed") || lower.contains("party failed") {
        return LineKind::PartyFailed;
    }
    if lower.contains("battle ended") {
        return LineKind::BattleEnded;
    }
    LineKind::Other
}

struct PendingRun {
    dungeon_name: String,
    first_key: Option<(NaiveDateTime, Vec<(String, u64)>)>,
}

/// Scan chat lines in display order and reconstruct completed runs.
pub fn backfill_runs(lines: &[String], year: i32) -> Vec<DungeonRun> {
    let mut runs = Vec::new();
    let mut pending: Option<PendingRun> = None;

    for line in lines {
        let Some(caps) = LINE_RE.captures(line) else {
            continue;
        };
        let (Some(ts_text), Some(body)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let Some(timestamp) = parse_chat_timestamp(ts_text.as_str(), year) else {
            continue;
        };

        match classify(body.as_str()) {
            LineKind::BattleStarted { dungeon_name } => {
                pending = Some(PendingRun {
                    dungeon_name,
                    first_key: None,
                });
            }
            LineKind::KeyCount { counts } => {
                let Some(state) = pending.as_mut() else {
                    continue;
                };
                if state.first_key.is_none() {
                    state.first_key = Some((timestamp, counts));
                    continue;
                }
                // Second key count: the validated end of the run.
                let Some(completed) = pending.take() else {
                    continue;
                };
                let Some((first_ts, _)) = completed.first_key else {
                    continue;
                };
                let duration = (timestamp - first_ts).num_milliseconds();
                if duration <= 0 {
                    continue;
                }
                let mut team: Vec<String> = counts.iter().map(|(name, _)| name.clone()).collect();
                team.sort();
                let key_counts_map: HashMap<String, u64> = counts.into_iter().collect();
                runs.push(DungeonRun {
                    timestamp: naive_to_utc(timestamp),
                    dungeon_name: completed.dungeon_name,
                    dungeon_hrid: None,
                    tier: None,
                    team,
                    duration: duration as u64,
                    tracked_duration: None,
                    validated: true,
                    wave_times: None,
                    avg_wave_time: None,
                    key_counts_map,
                    source: RunSource::Chat,
                });
            }
            LineKind::PartyFailed => {
                pending = None;
            }
            LineKind::BattleEnded => {
                // Without a second key count there is no validated
                // duration; the run cannot be reconstructed.
                pending = None;
            }
            LineKind::Other => {}
        }
    }
    runs
}

fn naive_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&naive)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reconstructs_validated_run() {
        let runs = backfill_runs(
            &lines(&[
                "[01/10 09:00:00 PM] Party battle started - Chimerical Den",
                "[01/10 09:00:10 PM] Key count - Alice: 3, Bob: 5",
                "[01/10 09:05:10 PM] Key count - Alice: 4, Bob: 6",
            ]),
            2026,
        );
        assert_eq!(runs.len(), 1);
        let run = &runs[0];
        assert_eq!(run.dungeon_name, "Chimerical Den");
        assert_eq!(run.duration, 300_000);
        assert!(run.validated);
        assert_eq!(run.team_key(), "Alice,Bob");
        assert_eq!(run.source, RunSource::Chat);
        assert_eq!(run.key_counts_map.get("Bob"), Some(&6));
    }

    #[test]
    fn test_failed_party_discards_pending() {
        let runs = backfill_runs(
            &lines(&[
                "[01/10 09:00:00 PM] Party battle started - Chimerical Den",
                "[01/10 09:00:10 PM] Key count - Alice: 3",
                "[01/10 09:02:00 PM] Your party has failed.",
                "[01/10 09:03:00 PM] Key count - Alice: 4",
            ]),
            2026,
        );
        assert!(runs.is_empty());
    }

    #[test]
    fn test_dash_format_timestamps() {
        let runs = backfill_runs(
            &lines(&[
                "[10-1 21:00:00] Party battle started - Pirate Cove",
                "[10-1 21:00:05] Key count - Alice: 1",
                "[10-1 21:04:05] Key count - Alice: 2",
            ]),
            2026,
        );
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].duration, 240_000);
    }

    #[test]
    fn test_unparseable_lines_skipped() {
        let runs = backfill_runs(
            &lines(&[
                "no timestamp here",
                "[yesterday] Party battle started - X",
                "[01/10 09:00:00 PM] Party battle started - Chimerical Den",
                "plain chatter",
                "[01/10 09:00:10 PM] Key count - Alice: 3",
                "[01/10 09:05:10 PM] Key count - Alice: 4",
            ]),
            2026,
        );
        assert_eq!(runs.len(), 1);
    }

    #[test]
    fn test_multiple_runs_in_history() {
        let runs = backfill_runs(
            &lines(&[
                "[01/10 09:00:00 PM] Party battle started - Chimerical Den",
                "[01/10 09:00:10 PM] Key count - Alice: 3",
                "[01/10 09:05:10 PM] Key count - Alice: 4",
                "[01/10 09:06:00 PM] Party battle started - Chimerical Den",
                "[01/10 09:06:10 PM] Key count - Alice: 4",
                "[01/10 09:11:40 PM] Key count - Alice: 5",
            ]),
            2026,
        );
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].duration, 330_000);
    }
}
