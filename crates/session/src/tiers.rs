use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

pub const MIN_TIER_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TierId(pub u8);

impl TierId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DifficultyTier {
    pub name: String,
    pub base_score: u32,
    pub time_limit_seconds: f32,
    /// `None` only on the terminal tier, which never advances.
    #[serde(default)]
    pub required_completions: Option<u32>,
}

impl DifficultyTier {
    fn new(name: &str, base_score: u32, time_limit_seconds: f32, required: Option<u32>) -> Self {
        Self {
            name: name.to_string(),
            base_score,
            time_limit_seconds,
            required_completions: required,
        }
    }
}

pub(crate) fn standard_tiers() -> Vec<DifficultyTier> {
    vec![
        DifficultyTier::new("Easy", 100, 30.0, Some(6)),
        DifficultyTier::new("Medium", 200, 25.0, Some(6)),
        DifficultyTier::new("Hard", 300, 20.0, Some(6)),
        DifficultyTier::new("God", 500, 15.0, None),
    ]
}

/// Validated, immutable tier lookup. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    tiers: Vec<DifficultyTier>,
}

impl TierTable {
    pub fn new(tiers: Vec<DifficultyTier>) -> Result<Self, ConfigError> {
        validate_tiers(&tiers)?;
        Ok(Self { tiers })
    }

    pub fn terminal(&self) -> TierId {
        TierId((self.tiers.len() - 1) as u8)
    }

    pub fn is_terminal(&self, tier: TierId) -> bool {
        tier >= self.terminal()
    }

    pub fn next(&self, tier: TierId) -> Option<TierId> {
        if self.is_terminal(tier) {
            None
        } else {
            Some(TierId(tier.0 + 1))
        }
    }

    pub fn tier(&self, tier: TierId) -> &DifficultyTier {
        let index = tier.index().min(self.tiers.len() - 1);
        &self.tiers[index]
    }

    pub fn name_for(&self, tier: TierId) -> &str {
        &self.tier(tier).name
    }

    pub fn base_score_for(&self, tier: TierId) -> u32 {
        self.tier(tier).base_score
    }

    pub fn time_limit_for(&self, tier: TierId) -> f32 {
        self.tier(tier).time_limit_seconds
    }

    pub fn required_completions_for(&self, tier: TierId) -> Option<u32> {
        if self.is_terminal(tier) {
            return None;
        }
        self.tier(tier).required_completions
    }
}

fn validate_tiers(tiers: &[DifficultyTier]) -> Result<(), ConfigError> {
    if tiers.len() < MIN_TIER_COUNT {
        return Err(ConfigError::TooFewTiers {
            found: tiers.len(),
            minimum: MIN_TIER_COUNT,
        });
    }
    if tiers.len() > u8::MAX as usize {
        return Err(ConfigError::TooManyTiers { found: tiers.len() });
    }

    let terminal_index = tiers.len() - 1;
    for (index, tier) in tiers.iter().enumerate() {
        if !tier.time_limit_seconds.is_finite() || tier.time_limit_seconds <= 0.0 {
            return Err(ConfigError::InvalidTimeLimit {
                tier: tier.name.clone(),
                seconds: tier.time_limit_seconds,
            });
        }

        match (index == terminal_index, tier.required_completions) {
            (true, Some(_)) => {
                return Err(ConfigError::TerminalTierAdvances {
                    tier: tier.name.clone(),
                })
            }
            (false, None) | (false, Some(0)) => {
                return Err(ConfigError::MissingCompletionRequirement {
                    tier: tier.name.clone(),
                })
            }
            _ => {}
        }

        if index == 0 {
            continue;
        }
        let previous = &tiers[index - 1];
        if tier.base_score <= previous.base_score {
            return Err(ConfigError::BaseScoreNotIncreasing {
                tier: tier.name.clone(),
                previous: previous.name.clone(),
            });
        }
        if tier.time_limit_seconds > previous.time_limit_seconds {
            return Err(ConfigError::TimeLimitIncreasing {
                tier: tier.name.clone(),
                previous: previous.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_passes_validation() {
        let table = TierTable::new(standard_tiers()).expect("standard tiers");
        assert_eq!(table.terminal(), TierId(3));
        assert_eq!(table.base_score_for(TierId(1)), 200);
        assert_eq!(table.time_limit_for(TierId(2)), 20.0);
        assert_eq!(table.required_completions_for(TierId(0)), Some(6));
        assert_eq!(table.name_for(TierId(3)), "God");
    }

    #[test]
    fn terminal_tier_has_no_next_and_no_requirement() {
        let table = TierTable::new(standard_tiers()).expect("standard tiers");
        assert_eq!(table.next(TierId(2)), Some(TierId(3)));
        assert_eq!(table.next(TierId(3)), None);
        assert_eq!(table.required_completions_for(TierId(3)), None);
        assert!(table.is_terminal(TierId(3)));
        assert!(!table.is_terminal(TierId(0)));
    }

    #[test]
    fn out_of_range_lookup_clamps_to_terminal() {
        let table = TierTable::new(standard_tiers()).expect("standard tiers");
        assert_eq!(table.base_score_for(TierId(40)), 500);
    }

    #[test]
    fn rejects_fewer_than_four_tiers() {
        let mut tiers = standard_tiers();
        tiers.remove(1);
        let err = TierTable::new(tiers).expect_err("three tiers");
        assert!(matches!(
            err,
            ConfigError::TooFewTiers {
                found: 3,
                minimum: 4
            }
        ));
    }

    #[test]
    fn rejects_non_increasing_base_score() {
        let mut tiers = standard_tiers();
        tiers[2].base_score = 200;
        let err = TierTable::new(tiers).expect_err("flat score");
        assert!(matches!(err, ConfigError::BaseScoreNotIncreasing { .. }));
    }

    #[test]
    fn rejects_increasing_time_limit() {
        let mut tiers = standard_tiers();
        tiers[1].time_limit_seconds = 31.0;
        let err = TierTable::new(tiers).expect_err("longer limit");
        assert!(matches!(err, ConfigError::TimeLimitIncreasing { .. }));
    }

    #[test]
    fn equal_time_limits_are_allowed() {
        let mut tiers = standard_tiers();
        tiers[1].time_limit_seconds = 30.0;
        assert!(TierTable::new(tiers).is_ok());
    }

    #[test]
    fn rejects_terminal_requirement_and_missing_requirement() {
        let mut tiers = standard_tiers();
        tiers[3].required_completions = Some(10);
        assert!(matches!(
            TierTable::new(tiers).expect_err("terminal advances"),
            ConfigError::TerminalTierAdvances { .. }
        ));

        let mut tiers = standard_tiers();
        tiers[0].required_completions = Some(0);
        assert!(matches!(
            TierTable::new(tiers).expect_err("zero requirement"),
            ConfigError::MissingCompletionRequirement { .. }
        ));
    }

    #[test]
    fn rejects_non_positive_time_limit() {
        let mut tiers = standard_tiers();
        tiers[0].time_limit_seconds = 0.0;
        assert!(matches!(
            TierTable::new(tiers).expect_err("zero limit"),
            ConfigError::InvalidTimeLimit { .. }
        ));
    }
}
