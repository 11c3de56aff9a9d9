use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info};

use crate::controller::{FinalizeOutcome, ResolveOutcome, SessionController};
use crate::state::SessionSnapshot;

const MAX_PENDING_OUTPUT_LINES: usize = 256;
pub const DEFAULT_BOARD_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Start,
    Win { bonus: u32 },
    Lose,
    Timer,
    Next,
    Name { text: String },
    Skip,
    Status,
    Board { count: usize },
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}. usage: {usage}")]
pub struct CommandParseError {
    pub reason: String,
    pub usage: String,
}

impl CommandParseError {
    fn new(reason: impl Into<String>, usage: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            usage: usage.into(),
        }
    }
}

type ParseFn = dyn Fn(&[String]) -> Result<ConsoleCommand, CommandParseError>;

struct CommandSpec {
    name: String,
    help: String,
    arg_schema: String,
    parse: Box<ParseFn>,
}

pub struct CommandRegistry {
    specs: Vec<CommandSpec>,
    lookup_by_lower_name: HashMap<String, usize>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_session_builtins()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            specs: Vec::new(),
            lookup_by_lower_name: HashMap::new(),
        }
    }

    pub fn with_session_builtins() -> Self {
        let mut registry = Self::new();
        registry.insert("help", "List commands", "", parse_help_command);
        registry.insert("start", "Start a new session", "", parse_start_command);
        registry.insert("win", "Report a win for the current round", "[bonus:u32]", parse_win_command);
        registry.insert("lose", "Report a loss for the current round", "", parse_lose_command);
        registry.insert("timer", "Arm the pending round without loading it", "", parse_timer_command);
        registry.insert("next", "Load the pending round now", "", parse_next_command);
        registry.insert("name", "Submit score under a name and end the session", "<text...>", parse_name_command);
        registry.insert("skip", "End the session without submitting", "", parse_skip_command);
        registry.insert("status", "Show the session state", "", parse_status_command);
        registry.insert("board", "Show the leaderboard", "[count:usize]", parse_board_command);
        registry.insert("quit", "Quit", "", parse_quit_command);
        registry
    }

    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        help: impl Into<String>,
        arg_schema: impl Into<String>,
        parse: F,
    ) -> Result<(), String>
    where
        F: Fn(&[String]) -> Result<ConsoleCommand, CommandParseError> + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("command name cannot be empty".to_string());
        }
        if self
            .lookup_by_lower_name
            .contains_key(&name.to_ascii_lowercase())
        {
            return Err(format!("duplicate command registration: {name}"));
        }
        self.insert(name, help, arg_schema, parse);
        Ok(())
    }

    fn insert<F>(
        &mut self,
        name: impl Into<String>,
        help: impl Into<String>,
        arg_schema: impl Into<String>,
        parse: F,
    ) where
        F: Fn(&[String]) -> Result<ConsoleCommand, CommandParseError> + 'static,
    {
        let name = name.into();
        self.lookup_by_lower_name
            .insert(name.to_ascii_lowercase(), self.specs.len());
        self.specs.push(CommandSpec {
            name,
            help: help.into(),
            arg_schema: arg_schema.into(),
            parse: Box::new(parse),
        });
    }

    /// `Ok(None)` for a blank line.
    pub fn parse_line(&self, line: &str) -> Result<Option<ConsoleCommand>, CommandParseError> {
        let tokens = tokenize_line(line.trim()).map_err(|reason| CommandParseError::new(reason, "help"))?;
        let Some((command_name, args)) = tokens.split_first() else {
            return Ok(None);
        };
        let Some(index) = self
            .lookup_by_lower_name
            .get(&command_name.to_ascii_lowercase())
        else {
            return Err(CommandParseError::new(
                format!("unknown command '{command_name}'"),
                "help",
            ));
        };
        let spec = &self.specs[*index];
        (spec.parse)(args).map(Some)
    }

    /// Help output is in registration order.
    pub fn help_lines(&self) -> Vec<String> {
        self.specs
            .iter()
            .map(|spec| {
                if spec.arg_schema.is_empty() {
                    format!("{} - {}", spec.name, spec.help)
                } else {
                    format!("{} {} - {}", spec.name, spec.arg_schema, spec.help)
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleFlow {
    Continue,
    Quit,
}

/// Applies console lines to a controller and buffers the replies.
///
/// Leaderboard replies arrive through the gateway callback, so the buffer is
/// shared with those callbacks and drained by the host once per frame.
pub struct SessionConsole {
    registry: CommandRegistry,
    output: Rc<RefCell<VecDeque<String>>>,
}

impl Default for SessionConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConsole {
    pub fn new() -> Self {
        Self {
            registry: CommandRegistry::with_session_builtins(),
            output: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn submit_line(&mut self, controller: &mut SessionController, raw_line: &str) -> ConsoleFlow {
        match self.registry.parse_line(raw_line) {
            Ok(Some(command)) => {
                debug!(?command, "console_command");
                self.apply(controller, command)
            }
            Ok(None) => ConsoleFlow::Continue,
            Err(error) => {
                self.push_output(format!("error: {error}"));
                ConsoleFlow::Continue
            }
        }
    }

    pub fn drain_output_into(&self, out: &mut Vec<String>) {
        out.extend(self.output.borrow_mut().drain(..));
    }

    fn apply(&mut self, controller: &mut SessionController, command: ConsoleCommand) -> ConsoleFlow {
        match command {
            ConsoleCommand::Help => {
                for line in self.registry.help_lines() {
                    self.push_output(line);
                }
            }
            ConsoleCommand::Start => controller.start_session(),
            ConsoleCommand::Win { bonus } => self.report_resolution(controller.resolve_outcome(true, bonus)),
            ConsoleCommand::Lose => self.report_resolution(controller.resolve_outcome(false, 0)),
            ConsoleCommand::Timer => {
                if !controller.start_timer_externally() {
                    self.push_output("no round is waiting to be armed".to_string());
                }
            }
            ConsoleCommand::Next => {
                if controller.load_next_round().is_none() {
                    self.push_output("no round is pending".to_string());
                }
            }
            ConsoleCommand::Name { text } => {
                let outcome = controller.finalize_session(&text);
                self.report_finalize(outcome);
            }
            ConsoleCommand::Skip => {
                let outcome = controller.finalize_session("");
                self.report_finalize(outcome);
            }
            ConsoleCommand::Status => {
                let line = format_status(&controller.snapshot());
                self.push_output(line);
            }
            ConsoleCommand::Board { count } => {
                let output = Rc::clone(&self.output);
                controller.leaderboard(count, move |result| {
                    let mut output = output.borrow_mut();
                    match result {
                        Ok(entries) if entries.is_empty() => {
                            output.push_back("leaderboard is empty".to_string())
                        }
                        Ok(entries) => {
                            for entry in entries {
                                output.push_back(format!(
                                    "{:>3}. {:<10} {}",
                                    entry.rank, entry.display_name, entry.statistic_value
                                ));
                            }
                        }
                        Err(error) => output.push_back(format!("error: {error}")),
                    }
                });
            }
            ConsoleCommand::Quit => {
                info!(reason = "console_quit", "shutdown_requested");
                return ConsoleFlow::Quit;
            }
        }
        ConsoleFlow::Continue
    }

    fn report_resolution(&mut self, outcome: ResolveOutcome) {
        if let ResolveOutcome::Ignored(reason) = outcome {
            self.push_output(format!("outcome ignored: {reason:?}"));
        }
    }

    fn report_finalize(&mut self, outcome: FinalizeOutcome) {
        match outcome {
            FinalizeOutcome::Finalized {
                final_score,
                submitted,
            } => self.push_output(if submitted {
                format!("final score {final_score} submitted")
            } else {
                format!("final score {final_score} (not submitted)")
            }),
            FinalizeOutcome::AlreadyFinalized => {
                self.push_output("no session to finalize".to_string())
            }
        }
    }

    fn push_output(&self, line: String) {
        let mut output = self.output.borrow_mut();
        if output.len() == MAX_PENDING_OUTPUT_LINES {
            output.pop_front();
        }
        output.push_back(line);
    }
}

pub fn format_status(snapshot: &SessionSnapshot) -> String {
    let lives = match snapshot.lives {
        Some(lives) => lives.to_string(),
        None => "-".to_string(),
    };
    format!(
        "phase={:?} score={} lives={} tier={} completions={} timer={:.1}{} rounds={}",
        snapshot.phase,
        snapshot.total_score,
        lives,
        snapshot.tier_name,
        snapshot.completions_in_tier,
        snapshot.remaining_timer,
        if snapshot.timer_armed { "" } else { " (idle)" },
        snapshot.rounds_played,
    )
}

fn tokenize_line(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut pending_token = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                pending_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if pending_token {
                    tokens.push(std::mem::take(&mut current));
                    pending_token = false;
                }
            }
            _ => {
                current.push(ch);
                pending_token = true;
            }
        }
    }

    if in_quotes {
        return Err("unterminated quoted string".to_string());
    }
    if pending_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_help_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "help")?;
    Ok(ConsoleCommand::Help)
}

fn parse_start_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "start")?;
    Ok(ConsoleCommand::Start)
}

fn parse_win_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    let bonus = match args {
        [] => 0,
        [raw] => raw.parse::<u32>().map_err(|_| {
            CommandParseError::new(format!("invalid bonus '{raw}' (expected u32)"), "win [bonus]")
        })?,
        _ => {
            return Err(CommandParseError::new(
                "expected at most one argument [bonus]",
                "win [bonus]",
            ))
        }
    };
    Ok(ConsoleCommand::Win { bonus })
}

fn parse_lose_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "lose")?;
    Ok(ConsoleCommand::Lose)
}

fn parse_timer_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "timer")?;
    Ok(ConsoleCommand::Timer)
}

fn parse_next_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "next")?;
    Ok(ConsoleCommand::Next)
}

fn parse_name_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    if args.is_empty() {
        return Err(CommandParseError::new(
            "missing required argument <text...>",
            "name <text...>",
        ));
    }
    Ok(ConsoleCommand::Name {
        text: args.join(" "),
    })
}

fn parse_skip_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "skip")?;
    Ok(ConsoleCommand::Skip)
}

fn parse_status_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "status")?;
    Ok(ConsoleCommand::Status)
}

fn parse_board_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    let count = match args {
        [] => DEFAULT_BOARD_SIZE,
        [raw] => match raw.parse::<usize>() {
            Ok(count) if count > 0 => count,
            _ => {
                return Err(CommandParseError::new(
                    format!("invalid count '{raw}' (expected positive usize)"),
                    "board [count]",
                ))
            }
        },
        _ => {
            return Err(CommandParseError::new(
                "expected at most one argument [count]",
                "board [count]",
            ))
        }
    };
    Ok(ConsoleCommand::Board { count })
}

fn parse_quit_command(args: &[String]) -> Result<ConsoleCommand, CommandParseError> {
    require_no_args(args, "quit")?;
    Ok(ConsoleCommand::Quit)
}

fn require_no_args(args: &[String], usage: &str) -> Result<(), CommandParseError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(CommandParseError::new("unexpected extra arguments", usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::persistence::LeaderboardStore;
    use crate::state::SessionPhase;

    fn parse(line: &str) -> Result<Option<ConsoleCommand>, CommandParseError> {
        CommandRegistry::with_session_builtins().parse_line(line)
    }

    fn drain(console: &SessionConsole) -> Vec<String> {
        let mut lines = Vec::new();
        console.drain_output_into(&mut lines);
        lines
    }

    #[test]
    fn commands_match_case_insensitively() {
        assert_eq!(parse("START"), Ok(Some(ConsoleCommand::Start)));
        assert_eq!(parse("  Win 15 "), Ok(Some(ConsoleCommand::Win { bonus: 15 })));
        assert_eq!(parse("win"), Ok(Some(ConsoleCommand::Win { bonus: 0 })));
        assert_eq!(parse("Board"), Ok(Some(ConsoleCommand::Board { count: 5 })));
        assert_eq!(parse(""), Ok(None));
    }

    #[test]
    fn name_joins_words_and_quotes() {
        assert_eq!(
            parse("name Ada  Lovelace"),
            Ok(Some(ConsoleCommand::Name {
                text: "Ada Lovelace".to_string()
            }))
        );
        assert_eq!(
            parse("name \"Ada  L\""),
            Ok(Some(ConsoleCommand::Name {
                text: "Ada  L".to_string()
            }))
        );
    }

    #[test]
    fn bad_input_reports_reason_and_usage() {
        assert_eq!(
            parse("nope").expect_err("unknown").to_string(),
            "unknown command 'nope'. usage: help"
        );
        assert_eq!(
            parse("win lots").expect_err("bad bonus").to_string(),
            "invalid bonus 'lots' (expected u32). usage: win [bonus]"
        );
        assert_eq!(
            parse("board 0").expect_err("zero count").usage,
            "board [count]"
        );
        assert_eq!(
            parse("lose now").expect_err("extra").reason,
            "unexpected extra arguments"
        );
        assert!(parse("name \"oops").is_err());
    }

    #[test]
    fn help_lists_commands_in_registration_order() {
        let lines = CommandRegistry::with_session_builtins().help_lines();
        assert_eq!(lines[0], "help - List commands");
        assert_eq!(lines[2], "win [bonus:u32] - Report a win for the current round");
        assert_eq!(lines.last().map(String::as_str), Some("quit - Quit"));
    }

    #[test]
    fn register_rejects_duplicates_and_blank_names() {
        let mut registry = CommandRegistry::with_session_builtins();
        assert!(registry
            .register("QUIT", "again", "", |_| Ok(ConsoleCommand::Quit))
            .is_err());
        assert!(registry
            .register(" ", "blank", "", |_| Ok(ConsoleCommand::Quit))
            .is_err());
        registry
            .register("bail", "Alias for quit", "", |_| Ok(ConsoleCommand::Quit))
            .expect("custom command");
        assert_eq!(registry.parse_line("BAIL"), Ok(Some(ConsoleCommand::Quit)));
    }

    #[test]
    fn console_drives_a_session() {
        let mut controller = SessionController::new(SessionConfig::default())
            .expect("controller")
            .with_gateway(LeaderboardStore::in_memory());
        let mut console = SessionConsole::new();

        for line in ["start", "next", "win 15"] {
            assert_eq!(console.submit_line(&mut controller, line), ConsoleFlow::Continue);
        }
        assert_eq!(controller.total_score(), 115);
        assert_eq!(controller.phase(), SessionPhase::PostRoundSequencing);

        console.submit_line(&mut controller, "win");
        assert_eq!(drain(&console), vec!["outcome ignored: AlreadyResolved"]);

        console.submit_line(&mut controller, "name Ada");
        assert_eq!(drain(&console), vec!["final score 115 submitted"]);

        console.submit_line(&mut controller, "board 3");
        controller.tick(0.1);
        controller.tick(0.1);
        let board = drain(&console);
        assert_eq!(board.len(), 1);
        assert!(board[0].contains("Ada"));
        assert!(board[0].ends_with("115"));

        assert_eq!(console.submit_line(&mut controller, "quit"), ConsoleFlow::Quit);
    }

    #[test]
    fn console_reports_rejected_calls() {
        let mut controller = SessionController::new(SessionConfig::default()).expect("controller");
        let mut console = SessionConsole::new();

        console.submit_line(&mut controller, "next");
        console.submit_line(&mut controller, "skip");
        console.submit_line(&mut controller, "bogus");
        assert_eq!(
            drain(&console),
            vec![
                "no round is pending",
                "no session to finalize",
                "error: unknown command 'bogus'. usage: help",
            ]
        );
    }

    #[test]
    fn status_line_summarises_snapshot() {
        let mut controller = SessionController::new(SessionConfig::default()).expect("controller");
        controller.start_session();
        controller.load_next_round();
        let line = format_status(&controller.snapshot());
        assert!(line.contains("score=0"));
        assert!(line.contains("lives=3"));
        assert!(line.contains("tier=Easy"));
        assert!(line.contains("timer=30.0 "));
    }
}
