use session::{
    load_session_config_or_default, resolve_app_paths, resolve_round_seed, AppError,
    LeaderboardStore, LoopConfig, SessionController, ShuffleBag,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::terminal::TerminalPresenter;

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) controller: SessionController,
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    init_tracing();
    info!("=== Doorway Startup ===");

    let paths = resolve_app_paths()?;
    info!(
        data_dir = %paths.data_dir.display(),
        config_file = %paths.config_file.display(),
        leaderboard_file = %paths.leaderboard_file.display(),
        "startup"
    );

    let session_config = load_session_config_or_default(&paths.config_file)?;
    let store = LeaderboardStore::open(&paths.leaderboard_file)?;
    let selector = match resolve_round_seed()? {
        Some(seed) => {
            info!(seed, "round_order_seeded");
            ShuffleBag::seeded(&session_config.minigames, seed)
        }
        None => ShuffleBag::new(&session_config.minigames),
    };

    let controller = SessionController::new(session_config)?;
    let presenter = TerminalPresenter::new(controller.snapshot_handle());
    let controller = controller
        .with_presentation(presenter)
        .with_round_selector(selector)
        .with_gateway(store);

    Ok(AppWiring {
        config: LoopConfig::default(),
        controller,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
