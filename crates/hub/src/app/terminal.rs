use std::io::{self, Write};

use session::{PresentationDriver, SceneKey, SessionSnapshot, SnapshotHandle};
use tracing::warn;

/// Renders each scene as a few lines of text on stdout.
pub(crate) struct TerminalPresenter {
    snapshots: SnapshotHandle,
}

impl TerminalPresenter {
    pub(crate) fn new(snapshots: SnapshotHandle) -> Self {
        Self { snapshots }
    }
}

impl PresentationDriver for TerminalPresenter {
    fn load_scene(&mut self, scene: SceneKey) {
        let lines = scene_lines(scene, &self.snapshots.snapshot());
        let mut out = io::stdout().lock();
        for line in lines {
            if let Err(error) = writeln!(out, "{line}") {
                warn!(error = %error, %scene, "scene_render_failed");
                return;
            }
        }
        let _ = out.flush();
    }
}

fn scene_lines(scene: SceneKey, snapshot: &SessionSnapshot) -> Vec<String> {
    match scene {
        SceneKey::Landing => vec![
            "==== DOORWAY ====".to_string(),
            "'start' to play, 'board' for the leaderboard, 'quit' to leave".to_string(),
        ],
        SceneKey::RoundIntro(kind) => vec![
            format!("Next up: {}", kind.title()),
            format!("Mode: {}{}", snapshot.tier_name, lives_suffix(snapshot)),
        ],
        SceneKey::Minigame(kind) => vec![format!(
            "[{}] go! report with 'win [bonus]' or 'lose'",
            kind.title()
        )],
        SceneKey::RoundResult => {
            let headline = match snapshot.last_outcome {
                Some(outcome) if outcome.success => format!("+{} Points!", outcome.round_score),
                _ => "Failed!".to_string(),
            };
            vec![
                headline,
                format!("Total Score: {}{}", snapshot.total_score, lives_suffix(snapshot)),
            ]
        }
        SceneKey::TierTransition(_) => vec![format!("Level up! Mode: {}", snapshot.tier_name)],
        SceneKey::RunSummary => vec![
            "==== GAME OVER ====".to_string(),
            format!("Final Score: {}", snapshot.total_score),
            format!("Reached: {}", snapshot.tier_name),
        ],
        SceneKey::NameEntry => vec!["'name <your name>' to save your score, or 'skip'".to_string()],
    }
}

fn lives_suffix(snapshot: &SessionSnapshot) -> String {
    match snapshot.lives {
        Some(lives) => format!("  Lives: {lives}"),
        None => String::new(),
    }
}
