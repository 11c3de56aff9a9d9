use std::fmt;

use tracing::{info, warn};

use crate::rounds::MinigameKind;
use crate::tiers::TierId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SceneKey {
    #[default]
    Landing,
    RoundIntro(MinigameKind),
    Minigame(MinigameKind),
    RoundResult,
    TierTransition(TierId),
    RunSummary,
    NameEntry,
}

impl fmt::Display for SceneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneKey::Landing => f.write_str("LandingPage"),
            SceneKey::RoundIntro(_) => f.write_str("GameStart"),
            SceneKey::Minigame(kind) => f.write_str(kind.scene_name()),
            SceneKey::RoundResult => f.write_str("GameEnd"),
            SceneKey::TierTransition(_) => f.write_str("TempTransition"),
            SceneKey::RunSummary => f.write_str("ScoreScene"),
            SceneKey::NameEntry => f.write_str("NameInput"),
        }
    }
}

/// Scene layer the controller instructs. Calls are fire-and-forget; the
/// controller never waits on the driver beyond its own fixed delays.
pub trait PresentationDriver {
    fn load_scene(&mut self, scene: SceneKey);
}

/// Tracks which scene is up and forwards requests to the driver when one is
/// installed. Without a driver the requests are only logged.
pub(crate) struct SceneDirector {
    driver: Option<Box<dyn PresentationDriver>>,
    active_scene: SceneKey,
    previous_scene: Option<SceneKey>,
    missing_driver_warned: bool,
}

impl SceneDirector {
    pub(crate) fn new(driver: Option<Box<dyn PresentationDriver>>) -> Self {
        Self {
            driver,
            active_scene: SceneKey::Landing,
            previous_scene: None,
            missing_driver_warned: false,
        }
    }

    pub(crate) fn set_driver(&mut self, driver: Box<dyn PresentationDriver>) {
        self.driver = Some(driver);
        self.missing_driver_warned = false;
    }

    pub(crate) fn active_scene(&self) -> SceneKey {
        self.active_scene
    }

    pub(crate) fn previous_scene(&self) -> Option<SceneKey> {
        self.previous_scene
    }

    pub(crate) fn switch_to(&mut self, next_scene: SceneKey) {
        self.previous_scene = Some(self.active_scene);
        self.active_scene = next_scene;
        info!(scene = %next_scene, "scene_switched");

        match self.driver.as_mut() {
            Some(driver) => driver.load_scene(next_scene),
            None => {
                if !self.missing_driver_warned {
                    warn!(scene = %next_scene, "presentation driver missing; scene requests are logged only");
                    self.missing_driver_warned = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    struct RecordingDriver {
        loaded: Rc<RefCell<Vec<SceneKey>>>,
    }

    impl PresentationDriver for RecordingDriver {
        fn load_scene(&mut self, scene: SceneKey) {
            self.loaded.borrow_mut().push(scene);
        }
    }

    #[test]
    fn switch_tracks_active_and_previous_scene() {
        let loaded = Rc::new(RefCell::new(Vec::new()));
        let mut director = SceneDirector::new(Some(Box::new(RecordingDriver {
            loaded: Rc::clone(&loaded),
        })));

        director.switch_to(SceneKey::RoundIntro(MinigameKind::Karate));
        director.switch_to(SceneKey::Minigame(MinigameKind::Karate));

        assert_eq!(
            director.active_scene(),
            SceneKey::Minigame(MinigameKind::Karate)
        );
        assert_eq!(
            director.previous_scene(),
            Some(SceneKey::RoundIntro(MinigameKind::Karate))
        );
        assert_eq!(loaded.borrow().len(), 2);
    }

    #[test]
    fn missing_driver_still_tracks_scenes() {
        let mut director = SceneDirector::new(None);
        director.switch_to(SceneKey::RoundResult);
        director.switch_to(SceneKey::RunSummary);
        assert_eq!(director.active_scene(), SceneKey::RunSummary);
    }

    #[test]
    fn scene_names_match_scene_files() {
        assert_eq!(SceneKey::Landing.to_string(), "LandingPage");
        assert_eq!(SceneKey::RoundResult.to_string(), "GameEnd");
        assert_eq!(
            SceneKey::Minigame(MinigameKind::SliceEmAll).to_string(),
            "SliceEmAll"
        );
        assert_eq!(SceneKey::TierTransition(TierId(1)).to_string(), "TempTransition");
    }
}
