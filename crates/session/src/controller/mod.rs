//! The session controller: sole owner and writer of [`SessionState`].
//!
//! Every entry point returns a plain value and logs; nothing here panics or
//! returns an error across the public boundary. Waits are scheduled steps on
//! a cooperative [`Scheduler`] driven by [`SessionController::tick`].

use tracing::{debug, info, warn};

use crate::config::{ConfigError, SessionConfig};
use crate::persistence::{
    LeaderboardResult, PersistenceError, PersistenceGateway, SaveCallback, SaveResult,
    ScoreRecord,
};
use crate::presentation::{PresentationDriver, SceneDirector, SceneKey};
use crate::rounds::{FallbackRotation, MinigameKind, RoundSelector};
use crate::scheduler::{CancellationToken, Scheduler, TaskId};
use crate::snapshot::SnapshotHandle;
use crate::state::{
    EndReason, LastOutcome, OutcomeSource, SessionPhase, SessionSnapshot, SessionState,
};
use crate::tiers::{TierId, TierTable};

/// Countdown slack absorbed from summing `f32` frame deltas.
const TIMER_EXPIRY_EPSILON_SECONDS: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SequenceStep {
    BeginRound,
    ResultDisplayed,
    TransitionDisplayed,
}

/// What the post-round sequence decided after the result display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundProgression {
    ContinueSameTier,
    TierAdvanced { from: TierId, to: TierId },
    SessionEnded(EndReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoActiveSession,
    AlreadyResolved,
    NotAcceptingOutcomes(SessionPhase),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundResolution {
    pub round_score: u32,
    pub total_score: u32,
    pub lives_remaining: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Applied(RoundResolution),
    Ignored(IgnoreReason),
}

impl ResolveOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ResolveOutcome::Applied(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Finalized { final_score: u32, submitted: bool },
    AlreadyFinalized,
}

pub struct SessionController {
    config: SessionConfig,
    tiers: TierTable,
    state: SessionState,
    phase: SessionPhase,
    scenes: SceneDirector,
    selector: Option<Box<dyn RoundSelector>>,
    fallback_rounds: FallbackRotation,
    missing_selector_warned: bool,
    gateway: Option<Box<dyn PersistenceGateway>>,
    scheduler: Scheduler<SequenceStep>,
    session_token: CancellationToken,
    pending_round_start: Option<TaskId>,
    last_progression: Option<RoundProgression>,
    snapshots: SnapshotHandle,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        let tiers = config.validate()?;
        let state = SessionState::idle(&config);
        let fallback_rounds = FallbackRotation::new(&config.minigames);
        let session_token = CancellationToken::new();
        session_token.cancel();
        let controller = Self {
            config,
            tiers,
            state,
            phase: SessionPhase::Idle,
            scenes: SceneDirector::new(None),
            selector: None,
            fallback_rounds,
            missing_selector_warned: false,
            gateway: None,
            scheduler: Scheduler::new(),
            session_token,
            pending_round_start: None,
            last_progression: None,
            snapshots: SnapshotHandle::default(),
        };
        controller.publish_snapshot();
        Ok(controller)
    }

    pub fn with_presentation(mut self, driver: impl PresentationDriver + 'static) -> Self {
        self.scenes.set_driver(Box::new(driver));
        self
    }

    pub fn with_round_selector(mut self, selector: impl RoundSelector + 'static) -> Self {
        self.selector = Some(Box::new(selector));
        self
    }

    pub fn with_gateway(mut self, gateway: impl PersistenceGateway + 'static) -> Self {
        self.gateway = Some(Box::new(gateway));
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn total_score(&self) -> u32 {
        self.state.total_score
    }

    pub fn current_tier(&self) -> TierId {
        self.state.current_tier
    }

    pub fn current_tier_name(&self) -> &str {
        self.tiers.name_for(self.state.current_tier)
    }

    pub fn active_scene(&self) -> SceneKey {
        self.scenes.active_scene()
    }

    pub fn previous_scene(&self) -> Option<SceneKey> {
        self.scenes.previous_scene()
    }

    pub fn last_progression(&self) -> Option<RoundProgression> {
        self.last_progression
    }

    pub fn is_session_live(&self) -> bool {
        !self.state.session_over
    }

    pub fn pending_steps(&self) -> usize {
        self.scheduler.pending()
    }

    /// Token of the live session. Cancelled once that session restarts or finalizes.
    pub fn session_token(&self) -> CancellationToken {
        self.session_token.clone()
    }

    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            total_score: self.state.total_score,
            lives: self.state.lives,
            tier: self.state.current_tier,
            tier_name: self.current_tier_name().to_string(),
            completions_in_tier: self.state.completions_in_tier,
            remaining_timer: self.state.remaining_timer as f32,
            timer_armed: self.state.timer_armed,
            last_outcome: self.state.last_outcome,
            rounds_played: self.state.rounds_played,
            session_over: self.state.session_over,
        }
    }

    /// Starts a fresh session, discarding anything a previous one left scheduled.
    pub fn start_session(&mut self) {
        let was_live = !self.state.session_over;
        let stale_steps = self.cancel_pending_work();
        if was_live {
            info!(
                stale_steps,
                abandoned_score = self.state.total_score,
                "session_restarted"
            );
        }

        self.session_token = CancellationToken::new();
        self.state = SessionState::fresh(&self.config);
        self.last_progression = None;
        info!(
            lives = ?self.state.lives,
            tier = self.current_tier_name(),
            "session_started"
        );
        self.request_next_round();
        self.publish_snapshot();
    }

    /// Loads the upcoming minigame and arms its timer.
    pub fn load_next_round(&mut self) -> Option<MinigameKind> {
        if self.state.session_over || self.phase != SessionPhase::BetweenRounds {
            debug!(phase = ?self.phase, "load_next_round ignored: no round pending");
            return None;
        }
        self.cancel_pending_round_start();

        let minigame = self.take_upcoming_round();
        self.show_scene(SceneKey::Minigame(minigame));
        self.start_timer_externally();
        Some(minigame)
    }

    /// Arms the pending round. Returns `false` when no round is waiting to be armed.
    pub fn start_timer_externally(&mut self) -> bool {
        if self.state.session_over {
            debug!("start_timer ignored: no live session");
            return false;
        }
        if self.phase != SessionPhase::BetweenRounds {
            debug!(phase = ?self.phase, "start_timer ignored: round not pending");
            return false;
        }
        self.cancel_pending_round_start();

        let tier = self.state.current_tier;
        let time_limit_seconds = self.tiers.time_limit_for(tier);
        self.state.remaining_timer = f64::from(time_limit_seconds);
        self.state.timer_armed = true;
        self.state.resolution_in_flight = false;
        self.state.rounds_played = self.state.rounds_played.saturating_add(1);
        self.phase = SessionPhase::AwaitingRoundResolution;
        info!(
            round = self.state.rounds_played,
            tier = self.tiers.name_for(tier),
            time_limit_seconds,
            "round_armed"
        );
        self.publish_snapshot();
        true
    }

    pub fn resolve_outcome(&mut self, success: bool, time_bonus: u32) -> ResolveOutcome {
        self.resolve(success, time_bonus, OutcomeSource::Reported)
    }

    /// Ends the session. The player's name, when non-blank, goes to the gateway;
    /// the result of that save is only logged.
    pub fn finalize_session(&mut self, player_name: &str) -> FinalizeOutcome {
        self.finalize_session_with(player_name, |result| match result {
            Ok(()) => info!("score_saved"),
            Err(error) => warn!(error = %error, "score_save_failed"),
        })
    }

    /// Like [`finalize_session`](Self::finalize_session), reporting the save result
    /// to `on_saved`. The callback only runs when a save was attempted.
    pub fn finalize_session_with<F>(&mut self, player_name: &str, on_saved: F) -> FinalizeOutcome
    where
        F: FnOnce(SaveResult) + 'static,
    {
        if self.state.session_over {
            info!("finalize ignored: session already finalized");
            return FinalizeOutcome::AlreadyFinalized;
        }

        self.state.session_over = true;
        let cancelled_steps = self.cancel_pending_work();
        let final_score = self.state.total_score;
        let tier_reached = self.current_tier_name().to_string();

        let record = ScoreRecord::from_player_name(
            player_name,
            final_score,
            self.config.max_display_name_chars,
        );
        let submitted = match record {
            Some(record) => {
                info!(
                    player = %record.display_name,
                    final_score,
                    tier_reached = %tier_reached,
                    "score_submitted"
                );
                self.submit_score(record, Box::new(on_saved));
                true
            }
            None => {
                info!(final_score, "score not submitted: empty player name");
                false
            }
        };

        self.state = SessionState::idle(&self.config);
        self.phase = SessionPhase::Idle;
        self.last_progression = None;
        info!(cancelled_steps, "session_reset");
        self.show_scene(SceneKey::Landing);
        self.publish_snapshot();
        FinalizeOutcome::Finalized {
            final_score,
            submitted,
        }
    }

    pub fn leaderboard<F>(&mut self, max_results: usize, on_complete: F)
    where
        F: FnOnce(LeaderboardResult) + 'static,
    {
        match self.gateway.as_mut() {
            Some(gateway) => gateway.leaderboard(max_results, Box::new(on_complete)),
            None => {
                warn!("persistence gateway missing; leaderboard unavailable");
                on_complete(Err(PersistenceError::NoGateway));
            }
        }
    }

    /// Advances the session clock by one fixed step.
    pub fn tick(&mut self, dt_seconds: f32) {
        if !dt_seconds.is_finite() || dt_seconds <= 0.0 {
            return;
        }

        self.scheduler.advance(dt_seconds);
        self.advance_round_timer(dt_seconds);
        while let Some(step) = self.scheduler.pop_due() {
            self.run_step(step);
        }
        if let Some(gateway) = self.gateway.as_mut() {
            gateway.poll();
        }
        self.publish_snapshot();
    }

    fn advance_round_timer(&mut self, dt_seconds: f32) {
        if !self.state.timer_armed || self.state.resolution_in_flight {
            return;
        }
        self.state.remaining_timer = (self.state.remaining_timer - f64::from(dt_seconds)).max(0.0);
        if self.state.remaining_timer > TIMER_EXPIRY_EPSILON_SECONDS {
            return;
        }
        self.state.remaining_timer = 0.0;

        info!(
            round = self.state.rounds_played,
            tier = self.current_tier_name(),
            "round_timer_expired"
        );
        self.resolve(false, 0, OutcomeSource::TimerExpired);
    }

    fn resolve(&mut self, success: bool, time_bonus: u32, source: OutcomeSource) -> ResolveOutcome {
        if self.state.session_over {
            debug!(?source, "resolution ignored: no live session");
            return ResolveOutcome::Ignored(IgnoreReason::NoActiveSession);
        }
        if self.state.resolution_in_flight {
            info!(?source, success, "resolution ignored: round already resolved");
            return ResolveOutcome::Ignored(IgnoreReason::AlreadyResolved);
        }
        if !self.phase.accepts_outcomes() {
            info!(?source, phase = ?self.phase, "resolution ignored: no round in play");
            return ResolveOutcome::Ignored(IgnoreReason::NotAcceptingOutcomes(self.phase));
        }

        self.state.resolution_in_flight = true;
        self.state.disarm_timer();
        self.cancel_pending_round_start();

        let tier = self.state.current_tier;
        let base_score = self.tiers.base_score_for(tier);
        let round_score = self.round_score(tier, success, time_bonus);
        self.state.total_score = self.state.total_score.saturating_add(round_score);
        self.state.last_outcome = Some(LastOutcome {
            success,
            base_score,
            bonus: time_bonus,
            round_score,
            source,
        });

        if !success {
            if let Some(lives) = self.state.lives.as_mut() {
                *lives = lives.saturating_sub(1);
                if *lives == 0 {
                    self.state.end_reason = Some(EndReason::LivesExhausted);
                }
            }
        }

        info!(
            success,
            ?source,
            round_score,
            total_score = self.state.total_score,
            lives = ?self.state.lives,
            tier = self.tiers.name_for(tier),
            "round_resolved"
        );

        self.phase = SessionPhase::PostRoundSequencing;
        self.show_scene(SceneKey::RoundResult);
        self.scheduler.schedule(
            self.config.result_display_seconds,
            &self.session_token,
            SequenceStep::ResultDisplayed,
        );
        self.publish_snapshot();

        ResolveOutcome::Applied(RoundResolution {
            round_score,
            total_score: self.state.total_score,
            lives_remaining: self.state.lives,
        })
    }

    fn round_score(&self, tier: TierId, success: bool, time_bonus: u32) -> u32 {
        if !success {
            return 0;
        }
        let raw = self.tiers.base_score_for(tier).saturating_add(time_bonus);
        if self.tiers.is_terminal(tier) {
            raw.saturating_mul(self.config.terminal_score_multiplier)
        } else {
            raw
        }
    }

    fn run_step(&mut self, step: SequenceStep) {
        match step {
            SequenceStep::BeginRound => {
                self.pending_round_start = None;
                self.load_next_round();
            }
            SequenceStep::ResultDisplayed => self.finish_result_display(),
            SequenceStep::TransitionDisplayed => {
                if self.phase == SessionPhase::TierTransition {
                    self.request_next_round();
                } else {
                    debug!(phase = ?self.phase, "transition step ignored");
                }
            }
        }
    }

    fn finish_result_display(&mut self) {
        if self.phase != SessionPhase::PostRoundSequencing {
            debug!(phase = ?self.phase, "result step ignored");
            return;
        }
        if let Some(reason) = self.state.end_reason {
            self.enter_session_end(reason);
            return;
        }

        self.state.completions_in_tier = self.state.completions_in_tier.saturating_add(1);
        let tier = self.state.current_tier;
        let completions = self.state.completions_in_tier;
        let progression = match self.tiers.next(tier) {
            None if self.config.terminal_tier_round_limit.is_reached(completions) => {
                RoundProgression::SessionEnded(EndReason::TerminalTierCleared)
            }
            None => RoundProgression::ContinueSameTier,
            Some(next) => {
                let threshold_met = self
                    .tiers
                    .required_completions_for(tier)
                    .is_some_and(|required| completions >= required);
                if threshold_met {
                    RoundProgression::TierAdvanced {
                        from: tier,
                        to: next,
                    }
                } else {
                    RoundProgression::ContinueSameTier
                }
            }
        };
        self.last_progression = Some(progression);

        match progression {
            RoundProgression::ContinueSameTier => {
                debug!(
                    tier = self.tiers.name_for(tier),
                    completions,
                    required = ?self.tiers.required_completions_for(tier),
                    "tier_continues"
                );
                self.request_next_round();
            }
            RoundProgression::TierAdvanced { from, to } => {
                self.state.completions_in_tier = 0;
                self.state.current_tier = to;
                self.phase = SessionPhase::TierTransition;
                info!(
                    from = self.tiers.name_for(from),
                    to = self.tiers.name_for(to),
                    "tier_advanced"
                );
                self.show_scene(SceneKey::TierTransition(to));
                self.scheduler.schedule(
                    self.config.tier_transition_seconds,
                    &self.session_token,
                    SequenceStep::TransitionDisplayed,
                );
            }
            RoundProgression::SessionEnded(reason) => {
                self.state.end_reason = Some(reason);
                self.enter_session_end(reason);
            }
        }
    }

    fn enter_session_end(&mut self, reason: EndReason) {
        self.phase = SessionPhase::SessionEndSequence;
        self.state.disarm_timer();
        self.last_progression = Some(RoundProgression::SessionEnded(reason));
        info!(
            ?reason,
            total_score = self.state.total_score,
            rounds_played = self.state.rounds_played,
            "session_end_sequence"
        );
        self.show_scene(SceneKey::RunSummary);
        self.show_scene(SceneKey::NameEntry);
    }

    fn request_next_round(&mut self) {
        let upcoming = self.peek_upcoming_round();
        self.phase = SessionPhase::BetweenRounds;
        self.show_scene(SceneKey::RoundIntro(upcoming));
        let task = self.scheduler.schedule(
            self.config.round_intro_seconds,
            &self.session_token,
            SequenceStep::BeginRound,
        );
        self.pending_round_start = Some(task);
    }

    fn peek_upcoming_round(&mut self) -> MinigameKind {
        if let Some(selector) = self.selector.as_mut() {
            return selector.peek_next();
        }
        self.warn_missing_selector();
        self.fallback_rounds.peek_next()
    }

    fn take_upcoming_round(&mut self) -> MinigameKind {
        if let Some(selector) = self.selector.as_mut() {
            return selector.take_next();
        }
        self.warn_missing_selector();
        self.fallback_rounds.take_next()
    }

    fn warn_missing_selector(&mut self) {
        if !self.missing_selector_warned {
            warn!("round selector missing; using fallback rotation");
            self.missing_selector_warned = true;
        }
    }

    fn cancel_pending_round_start(&mut self) {
        if let Some(task) = self.pending_round_start.take() {
            self.scheduler.cancel(task);
        }
    }

    fn cancel_pending_work(&mut self) -> usize {
        self.session_token.cancel();
        self.pending_round_start = None;
        self.state.disarm_timer();
        self.scheduler.cancel_all()
    }

    fn submit_score(&mut self, record: ScoreRecord, on_saved: SaveCallback) {
        match self.gateway.as_mut() {
            Some(gateway) => gateway.save(record, on_saved),
            None => {
                warn!("persistence gateway missing; score not saved");
                on_saved(Err(PersistenceError::NoGateway));
            }
        }
    }

    /// Publishes first so a driver reading the snapshot handle sees the state
    /// that led to the scene.
    fn show_scene(&mut self, scene: SceneKey) {
        self.publish_snapshot();
        self.scenes.switch_to(scene);
    }

    fn publish_snapshot(&self) {
        self.snapshots.publish(self.snapshot());
    }
}
