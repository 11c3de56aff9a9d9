use std::env;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;

pub mod app;
pub mod config;
pub mod controller;
pub mod persistence;
pub mod presentation;
pub mod rounds;
pub mod scheduler;
pub mod snapshot;
pub mod state;
pub mod tiers;

pub use app::{
    format_status, run_session_loop, AppError, CommandParseError, CommandRegistry, ConsoleCommand,
    ConsoleFlow, LoopConfig, LoopExit, SessionConsole,
};
pub use config::{
    load_session_config, load_session_config_or_default, parse_session_config, ConfigError,
    RoundLimit, SessionConfig,
};
pub use controller::{
    FinalizeOutcome, IgnoreReason, ResolveOutcome, RoundProgression, RoundResolution,
    SessionController,
};
pub use persistence::{
    rank_records, LeaderboardEntry, LeaderboardStore, PersistenceError, PersistenceGateway,
    SaveResult, ScoreRecord,
};
pub use presentation::{PresentationDriver, SceneKey};
pub use rounds::{FallbackRotation, MinigameKind, RoundSelector, ShuffleBag};
pub use scheduler::CancellationToken;
pub use snapshot::SnapshotHandle;
pub use state::{EndReason, LastOutcome, OutcomeSource, SessionPhase, SessionSnapshot, SessionState};
pub use tiers::{DifficultyTier, TierId, TierTable};

pub const DATA_DIR_ENV_VAR: &str = "DOORWAY_DATA_DIR";
pub const SEED_ENV_VAR: &str = "DOORWAY_SEED";
const DEFAULT_DATA_DIR: &str = "data";
const CONFIG_FILE_NAME: &str = "session.json";
const LEADERBOARD_FILE_NAME: &str = "leaderboard.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub config_file: PathBuf,
    pub leaderboard_file: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to create data directory at {path}: {source}")]
    CreateDataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{var} must be an unsigned integer, got '{value}'")]
    InvalidSeed { var: &'static str, value: String },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let data_dir = match env::var(DATA_DIR_ENV_VAR) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        Ok(_) | Err(env::VarError::NotPresent) => PathBuf::from(DEFAULT_DATA_DIR),
        Err(source) => {
            return Err(StartupError::EnvVar {
                var: DATA_DIR_ENV_VAR,
                source,
            })
        }
    };
    app_paths_in(data_dir)
}

fn app_paths_in(data_dir: PathBuf) -> Result<AppPaths, StartupError> {
    fs::create_dir_all(&data_dir).map_err(|source| StartupError::CreateDataDir {
        path: data_dir.clone(),
        source,
    })?;
    let data_dir = fs::canonicalize(&data_dir).unwrap_or(data_dir);

    Ok(AppPaths {
        config_file: data_dir.join(CONFIG_FILE_NAME),
        leaderboard_file: data_dir.join(LEADERBOARD_FILE_NAME),
        data_dir,
    })
}

/// `None` when unset: the shuffle bag then seeds from the OS.
pub fn resolve_round_seed() -> Result<Option<u64>, StartupError> {
    match env::var(SEED_ENV_VAR) {
        Ok(value) => parse_seed(&value).map(Some),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(StartupError::EnvVar {
            var: SEED_ENV_VAR,
            source,
        }),
    }
}

fn parse_seed(raw: &str) -> Result<u64, StartupError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| StartupError::InvalidSeed {
            var: SEED_ENV_VAR,
            value: raw.to_string(),
        })
}
