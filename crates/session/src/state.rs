use crate::config::SessionConfig;
use crate::tiers::TierId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// No live session; the landing scene is up.
    #[default]
    Idle,
    /// Next round requested but not yet armed.
    BetweenRounds,
    AwaitingRoundResolution,
    PostRoundSequencing,
    TierTransition,
    SessionEndSequence,
}

impl SessionPhase {
    /// Only an armed round can be resolved.
    pub fn accepts_outcomes(self) -> bool {
        self == SessionPhase::AwaitingRoundResolution
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeSource {
    Reported,
    TimerExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastOutcome {
    pub success: bool,
    pub base_score: u32,
    pub bonus: u32,
    pub round_score: u32,
    pub source: OutcomeSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    LivesExhausted,
    TerminalTierCleared,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub total_score: u32,
    pub lives: Option<u32>,
    pub current_tier: TierId,
    pub completions_in_tier: u32,
    pub last_outcome: Option<LastOutcome>,
    pub remaining_timer: f64,
    pub timer_armed: bool,
    pub session_over: bool,
    /// Cleared only when a round is armed.
    pub resolution_in_flight: bool,
    pub rounds_played: u32,
    pub end_reason: Option<EndReason>,
}

impl SessionState {
    /// State for a session that has just started.
    pub fn fresh(config: &SessionConfig) -> Self {
        Self {
            total_score: 0,
            lives: config.lives,
            current_tier: TierId(0),
            completions_in_tier: 0,
            last_outcome: None,
            remaining_timer: 0.0,
            timer_armed: false,
            session_over: false,
            resolution_in_flight: true,
            rounds_played: 0,
            end_reason: None,
        }
    }

    /// Reset values with no live session behind them.
    pub fn idle(config: &SessionConfig) -> Self {
        Self {
            session_over: true,
            ..Self::fresh(config)
        }
    }

    pub fn disarm_timer(&mut self) {
        self.timer_armed = false;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub total_score: u32,
    pub lives: Option<u32>,
    pub tier: TierId,
    pub tier_name: String,
    pub completions_in_tier: u32,
    pub remaining_timer: f32,
    pub timer_armed: bool,
    pub last_outcome: Option<LastOutcome>,
    pub rounds_played: u32,
    pub session_over: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_starts_live_at_first_tier() {
        let state = SessionState::fresh(&SessionConfig::default());
        assert!(!state.session_over);
        assert_eq!(state.lives, Some(3));
        assert_eq!(state.current_tier, TierId(0));
        assert_eq!(state.total_score, 0);
        assert!(state.resolution_in_flight);
        assert!(!state.timer_armed);
    }

    #[test]
    fn idle_state_is_reset_but_over() {
        let config = SessionConfig {
            lives: None,
            ..SessionConfig::default()
        };
        let state = SessionState::idle(&config);
        assert!(state.session_over);
        assert_eq!(state.lives, None);
        assert_eq!(state.completions_in_tier, 0);
    }

    #[test]
    fn only_armed_rounds_accept_outcomes() {
        assert!(!SessionPhase::BetweenRounds.accepts_outcomes());
        assert!(SessionPhase::AwaitingRoundResolution.accepts_outcomes());
        assert!(!SessionPhase::PostRoundSequencing.accepts_outcomes());
        assert!(!SessionPhase::SessionEndSequence.accepts_outcomes());
        assert!(!SessionPhase::Idle.accepts_outcomes());
    }
}
