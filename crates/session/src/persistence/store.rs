use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    rank_records, LeaderboardCallback, LeaderboardResult, PersistenceError, PersistenceGateway,
    SaveCallback, SaveResult, ScoreRecord,
};

pub const LEADERBOARD_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Deserialize, Serialize)]
struct LeaderboardFile {
    version: u32,
    records: Vec<ScoreRecord>,
}

enum Completion {
    Save(SaveCallback, SaveResult),
    Leaderboard(LeaderboardCallback, LeaderboardResult),
}

/// Local leaderboard backend: in memory, optionally mirrored to a JSON file.
///
/// Every submission is a separate entry, matching a backend that registers a
/// fresh player per run. Completions are queued and only delivered from
/// `poll`, so callers see the same asynchronous shape a remote service has.
pub struct LeaderboardStore {
    path: Option<PathBuf>,
    records: Vec<ScoreRecord>,
    completions: VecDeque<Completion>,
}

impl LeaderboardStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Vec::new(),
            completions: VecDeque::new(),
        }
    }

    /// Opens the file at `path`, starting empty if it does not exist yet.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let records = if path.exists() {
            read_records(path)?
        } else {
            Vec::new()
        };
        info!(path = %path.display(), entries = records.len(), "leaderboard_opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            records,
            completions: VecDeque::new(),
        })
    }

    pub fn records(&self) -> &[ScoreRecord] {
        &self.records
    }

    pub fn pending_completions(&self) -> usize {
        self.completions.len()
    }

    fn append(&mut self, record: ScoreRecord) -> SaveResult {
        self.records.push(record);
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        if let Err(error) = write_records(path, &self.records) {
            self.records.pop();
            return Err(error);
        }
        Ok(())
    }
}

impl PersistenceGateway for LeaderboardStore {
    fn save(&mut self, record: ScoreRecord, on_complete: SaveCallback) {
        debug!(
            player = %record.display_name,
            score = record.statistic_value,
            "leaderboard_save_requested"
        );
        let result = self.append(record);
        if let Err(error) = &result {
            warn!(error = %error, "leaderboard_save_failed");
        }
        self.completions
            .push_back(Completion::Save(on_complete, result));
    }

    fn leaderboard(&mut self, max_results: usize, on_complete: LeaderboardCallback) {
        let entries = rank_records(&self.records, max_results);
        self.completions
            .push_back(Completion::Leaderboard(on_complete, Ok(entries)));
    }

    fn poll(&mut self) {
        while let Some(completion) = self.completions.pop_front() {
            match completion {
                Completion::Save(callback, result) => callback(result),
                Completion::Leaderboard(callback, result) => callback(result),
            }
        }
    }
}

fn read_records(path: &Path) -> Result<Vec<ScoreRecord>, PersistenceError> {
    let raw = fs::read_to_string(path).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut deserializer = serde_json::Deserializer::from_str(&raw);
    let file = serde_path_to_error::deserialize::<_, LeaderboardFile>(&mut deserializer)
        .map_err(|error| PersistenceError::Decode {
            path: path.to_path_buf(),
            json_path: error.path().to_string(),
            message: error.into_inner().to_string(),
        })?;
    if file.version != LEADERBOARD_FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: file.version,
        });
    }
    Ok(file.records)
}

fn write_records(path: &Path, records: &[ScoreRecord]) -> Result<(), PersistenceError> {
    let file = LeaderboardFile {
        version: LEADERBOARD_FORMAT_VERSION,
        records: records.to_vec(),
    };
    let text = serde_json::to_string_pretty(&file).map_err(|source| PersistenceError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    replace_file_contents(path, text.as_bytes()).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes beside the target and renames over it, so readers never observe a
/// half-written leaderboard.
fn replace_file_contents(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let staging = staging_path_for(path);
    let written = File::create(&staging).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(error) = written {
        let _ = fs::remove_file(&staging);
        return Err(error);
    }

    if let Err(error) = fs::rename(&staging, path) {
        if !rename_blocked_by_existing_target(&error) {
            let _ = fs::remove_file(&staging);
            return Err(error);
        }
        // Some platforms refuse to rename over an existing file.
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                let _ = fs::remove_file(&staging);
                return Err(error);
            }
        }
        if let Err(error) = fs::rename(&staging, path) {
            let _ = fs::remove_file(&staging);
            return Err(error);
        }
    }
    Ok(())
}

fn rename_blocked_by_existing_target(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::AlreadyExists | io::ErrorKind::PermissionDenied
    )
}

fn staging_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("leaderboard.json");
    path.with_file_name(format!(".{file_name}.staging"))
}
