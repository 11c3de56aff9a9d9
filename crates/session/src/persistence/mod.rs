use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod store;

pub use store::{LeaderboardStore, LEADERBOARD_FORMAT_VERSION};

pub const ANONYMOUS_DISPLAY_NAME: &str = "Anonymous";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read/write leaderboard file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode leaderboard file {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("leaderboard file {path} is malformed at {json_path}: {message}")]
    Decode {
        path: PathBuf,
        json_path: String,
        message: String,
    },
    #[error("leaderboard file {path} has unsupported version {found}")]
    UnsupportedVersion { path: PathBuf, found: u32 },
    #[error("no persistence gateway installed")]
    NoGateway,
}

/// Shape handed to the leaderboard backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub display_name: String,
    pub statistic_value: u32,
}

impl ScoreRecord {
    /// `None` for a blank name: nothing is submitted without a player name.
    pub fn from_player_name(player_name: &str, score: u32, max_chars: usize) -> Option<Self> {
        let trimmed = player_name.trim();
        if trimmed.is_empty() {
            return None;
        }
        let display_name = trimmed.chars().take(max_chars).collect::<String>();
        Some(Self {
            display_name: display_name.trim_end().to_string(),
            statistic_value: score,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub display_name: String,
    pub statistic_value: u32,
}

pub type SaveResult = Result<(), PersistenceError>;
pub type LeaderboardResult = Result<Vec<LeaderboardEntry>, PersistenceError>;
pub type SaveCallback = Box<dyn FnOnce(SaveResult)>;
pub type LeaderboardCallback = Box<dyn FnOnce(LeaderboardResult)>;

/// Score storage backend. Completions may be delivered later from `poll`,
/// which the controller calls once per tick.
pub trait PersistenceGateway {
    fn save(&mut self, record: ScoreRecord, on_complete: SaveCallback);
    fn leaderboard(&mut self, max_results: usize, on_complete: LeaderboardCallback);
    fn poll(&mut self) {}
}

/// Orders records highest first; equal scores keep submission order.
pub fn rank_records(records: &[ScoreRecord], max_results: usize) -> Vec<LeaderboardEntry> {
    let mut ordered = records.iter().collect::<Vec<_>>();
    ordered.sort_by(|a, b| b.statistic_value.cmp(&a.statistic_value));
    ordered
        .into_iter()
        .take(max_results)
        .enumerate()
        .map(|(position, record)| LeaderboardEntry {
            rank: position as u32 + 1,
            display_name: if record.display_name.trim().is_empty() {
                ANONYMOUS_DISPLAY_NAME.to_string()
            } else {
                record.display_name.clone()
            },
            statistic_value: record.statistic_value,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, score: u32) -> ScoreRecord {
        ScoreRecord {
            display_name: name.to_string(),
            statistic_value: score,
        }
    }

    #[test]
    fn blank_names_are_not_submitted() {
        assert_eq!(ScoreRecord::from_player_name("", 10, 10), None);
        assert_eq!(ScoreRecord::from_player_name("   ", 10, 10), None);
    }

    #[test]
    fn names_are_trimmed_and_truncated_by_chars() {
        let record = ScoreRecord::from_player_name("  Maximilian Long  ", 50, 10).expect("record");
        assert_eq!(record.display_name, "Maximilian");
        let record = ScoreRecord::from_player_name("ÅsaÖberg-Ünal", 50, 4).expect("record");
        assert_eq!(record.display_name, "ÅsaÖ");
    }

    #[test]
    fn ranking_is_descending_with_stable_ties() {
        let records = vec![
            record("first", 300),
            record("second", 900),
            record("third", 300),
            record("", 100),
        ];
        let ranked = rank_records(&records, 10);
        let names = ranked
            .iter()
            .map(|entry| entry.display_name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["second", "first", "third", "Anonymous"]);
        assert_eq!(
            ranked.iter().map(|entry| entry.rank).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn ranking_honours_max_results() {
        let records = vec![record("a", 1), record("b", 2), record("c", 3)];
        let ranked = rank_records(&records, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].display_name, "c");
    }

    #[test]
    fn records_serialize_camel_case() {
        let json = serde_json::to_string(&record("Ada", 120)).expect("json");
        assert_eq!(json, r#"{"displayName":"Ada","statisticValue":120}"#);
    }
}
