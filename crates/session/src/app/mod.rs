mod console;
mod loop_runner;

pub use console::{
    format_status, CommandParseError, CommandRegistry, ConsoleCommand, ConsoleFlow,
    SessionConsole, DEFAULT_BOARD_SIZE,
};
pub use loop_runner::{run_session_loop, AppError, LoopConfig, LoopExit};
