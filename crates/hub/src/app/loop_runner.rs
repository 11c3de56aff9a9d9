use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::mpsc::{self, Sender};
use std::thread;

use session::{run_session_loop, AppError, LoopExit};
use tracing::{error, info, warn};

use super::bootstrap::AppWiring;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        config,
        mut controller,
    } = app;

    let (sender, receiver) = mpsc::channel();
    if let Err(err) = spawn_console_input(sender) {
        error!(error = %err, "startup_failed");
        return ExitCode::FAILURE;
    }

    println!("type 'help' for commands");
    let exit = run_session_loop(&config, &mut controller, &receiver, &mut io::stdout());
    info!(?exit, "shutdown");
    match exit {
        LoopExit::QuitRequested | LoopExit::InputClosed => ExitCode::SUCCESS,
    }
}

fn spawn_console_input(sender: Sender<String>) -> Result<(), AppError> {
    thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if sender.send(line).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        warn!(error = %error, "console_read_failed");
                        break;
                    }
                }
            }
        })
        .map(|_| ())
        .map_err(AppError::SpawnInput)
}
