use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rounds::MinigameKind;
use crate::tiers::{standard_tiers, DifficultyTier, TierTable};

pub const DEFAULT_LIVES: u32 = 3;
pub const DEFAULT_TERMINAL_SCORE_MULTIPLIER: u32 = 2;
pub const DEFAULT_RESULT_DISPLAY_SECONDS: f32 = 2.5;
pub const DEFAULT_TIER_TRANSITION_SECONDS: f32 = 2.5;
pub const DEFAULT_ROUND_INTRO_SECONDS: f32 = 2.0;
pub const DEFAULT_MAX_DISPLAY_NAME_CHARS: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path} at {json_path}: {message}")]
    Parse {
        path: PathBuf,
        json_path: String,
        message: String,
    },
    #[error("tier table needs at least {minimum} tiers, found {found}")]
    TooFewTiers { found: usize, minimum: usize },
    #[error("tier table supports at most 255 tiers, found {found}")]
    TooManyTiers { found: usize },
    #[error("tier {tier} has an invalid time limit of {seconds}s")]
    InvalidTimeLimit { tier: String, seconds: f32 },
    #[error("tier {tier} must score more than tier {previous}")]
    BaseScoreNotIncreasing { tier: String, previous: String },
    #[error("tier {tier} cannot allow more time than tier {previous}")]
    TimeLimitIncreasing { tier: String, previous: String },
    #[error("terminal tier {tier} cannot declare required completions")]
    TerminalTierAdvances { tier: String },
    #[error("tier {tier} needs at least one required completion")]
    MissingCompletionRequirement { tier: String },
    #[error("lives must be at least 1 when enabled")]
    ZeroLives,
    #[error("terminal score multiplier must be at least 1")]
    ZeroMultiplier,
    #[error("terminal tier round limit must be at least 1")]
    ZeroRoundLimit,
    #[error("{field} must be a finite, non-negative number of seconds (got {seconds})")]
    InvalidDelay { field: &'static str, seconds: f32 },
    #[error("max display name length must be at least 1")]
    ZeroDisplayNameLength,
    #[error("minigame catalog cannot be empty")]
    EmptyMinigameCatalog,
}

/// How long the terminal tier runs before the session ends on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundLimit {
    #[default]
    Unbounded,
    Rounds(u32),
}

impl RoundLimit {
    pub fn is_reached(self, completed: u32) -> bool {
        match self {
            RoundLimit::Unbounded => false,
            RoundLimit::Rounds(limit) => completed >= limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub tiers: Vec<DifficultyTier>,
    /// `None` plays without lives; the session then ends only through the
    /// terminal round limit or an explicit finalize.
    pub lives: Option<u32>,
    pub terminal_tier_round_limit: RoundLimit,
    pub terminal_score_multiplier: u32,
    pub result_display_seconds: f32,
    pub tier_transition_seconds: f32,
    pub round_intro_seconds: f32,
    pub max_display_name_chars: usize,
    pub minigames: Vec<MinigameKind>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tiers: standard_tiers(),
            lives: Some(DEFAULT_LIVES),
            terminal_tier_round_limit: RoundLimit::Unbounded,
            terminal_score_multiplier: DEFAULT_TERMINAL_SCORE_MULTIPLIER,
            result_display_seconds: DEFAULT_RESULT_DISPLAY_SECONDS,
            tier_transition_seconds: DEFAULT_TIER_TRANSITION_SECONDS,
            round_intro_seconds: DEFAULT_ROUND_INTRO_SECONDS,
            max_display_name_chars: DEFAULT_MAX_DISPLAY_NAME_CHARS,
            minigames: MinigameKind::ALL.to_vec(),
        }
    }
}

impl SessionConfig {
    /// Checks every field and returns the validated tier table.
    pub fn validate(&self) -> Result<TierTable, ConfigError> {
        let table = TierTable::new(self.tiers.clone())?;
        if self.lives == Some(0) {
            return Err(ConfigError::ZeroLives);
        }
        if self.terminal_score_multiplier == 0 {
            return Err(ConfigError::ZeroMultiplier);
        }
        if self.terminal_tier_round_limit == RoundLimit::Rounds(0) {
            return Err(ConfigError::ZeroRoundLimit);
        }
        validate_delay("result_display_seconds", self.result_display_seconds)?;
        validate_delay("tier_transition_seconds", self.tier_transition_seconds)?;
        validate_delay("round_intro_seconds", self.round_intro_seconds)?;
        if self.max_display_name_chars == 0 {
            return Err(ConfigError::ZeroDisplayNameLength);
        }
        if self.minigames.is_empty() {
            return Err(ConfigError::EmptyMinigameCatalog);
        }
        Ok(table)
    }

    pub fn lives_enabled(&self) -> bool {
        self.lives.is_some()
    }
}

fn validate_delay(field: &'static str, seconds: f32) -> Result<(), ConfigError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ConfigError::InvalidDelay { field, seconds });
    }
    Ok(())
}

pub fn parse_session_config(raw: &str, path: &Path) -> Result<SessionConfig, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let config = serde_path_to_error::deserialize::<_, SessionConfig>(&mut deserializer)
        .map_err(|error| {
            let json_path = error.path().to_string();
            ConfigError::Parse {
                path: path.to_path_buf(),
                json_path,
                message: error.into_inner().to_string(),
            }
        })?;
    config.validate()?;
    Ok(config)
}

pub fn load_session_config(path: &Path) -> Result<SessionConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_session_config(&raw, path)
}

/// Missing file means defaults; anything present must parse.
pub fn load_session_config_or_default(path: &Path) -> Result<SessionConfig, ConfigError> {
    if !path.exists() {
        return Ok(SessionConfig::default());
    }
    load_session_config(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<SessionConfig, ConfigError> {
        parse_session_config(raw, Path::new("session.json"))
    }

    #[test]
    fn empty_object_yields_defaults() {
        let config = parse("{}").expect("defaults");
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.lives, Some(3));
        assert_eq!(config.terminal_tier_round_limit, RoundLimit::Unbounded);
    }

    #[test]
    fn null_lives_disables_hearts() {
        let config = parse(r#"{ "lives": null }"#).expect("no lives");
        assert!(!config.lives_enabled());
    }

    #[test]
    fn round_limit_accepts_both_forms() {
        let config = parse(r#"{ "terminal_tier_round_limit": { "rounds": 10 } }"#).expect("limit");
        assert_eq!(config.terminal_tier_round_limit, RoundLimit::Rounds(10));
        let config = parse(r#"{ "terminal_tier_round_limit": "unbounded" }"#).expect("unbounded");
        assert_eq!(config.terminal_tier_round_limit, RoundLimit::Unbounded);
    }

    #[test]
    fn parse_errors_report_json_path() {
        let err = parse(r#"{ "tiers": [ { "name": "Easy", "base_score": "lots", "time_limit_seconds": 30.0 } ] }"#)
            .expect_err("bad base score");
        match err {
            ConfigError::Parse { json_path, .. } => assert_eq!(json_path, "tiers[0].base_score"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = parse(r#"{ "hearts": 3 }"#).expect_err("unknown field");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn validation_rejects_degenerate_values() {
        assert!(matches!(
            parse(r#"{ "lives": 0 }"#).expect_err("zero lives"),
            ConfigError::ZeroLives
        ));
        assert!(matches!(
            parse(r#"{ "terminal_score_multiplier": 0 }"#).expect_err("zero multiplier"),
            ConfigError::ZeroMultiplier
        ));
        assert!(matches!(
            parse(r#"{ "terminal_tier_round_limit": { "rounds": 0 } }"#).expect_err("zero limit"),
            ConfigError::ZeroRoundLimit
        ));
        assert!(matches!(
            parse(r#"{ "result_display_seconds": -1.0 }"#).expect_err("negative delay"),
            ConfigError::InvalidDelay {
                field: "result_display_seconds",
                ..
            }
        ));
        assert!(matches!(
            parse(r#"{ "minigames": [] }"#).expect_err("no minigames"),
            ConfigError::EmptyMinigameCatalog
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config =
            load_session_config_or_default(&dir.path().join("absent.json")).expect("defaults");
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        fs::write(&path, r#"{ "lives": 5, "minigames": ["karate"] }"#).expect("write");
        let config = load_session_config(&path).expect("config");
        assert_eq!(config.lives, Some(5));
        assert_eq!(config.minigames, vec![MinigameKind::Karate]);
    }

    #[test]
    fn round_limit_reached_only_when_bounded() {
        assert!(!RoundLimit::Unbounded.is_reached(u32::MAX));
        assert!(!RoundLimit::Rounds(10).is_reached(9));
        assert!(RoundLimit::Rounds(10).is_reached(10));
    }
}
