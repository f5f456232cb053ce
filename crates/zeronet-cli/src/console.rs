//! Interactive console commands.
//!
//! `start` starts the application, `exit` and `quit` shut it down. Any other
//! line is split on whitespace and sent to the center as a management
//! command.

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Exit,
    /// Forwarded to the center: first word is the command.
    Center { command: String, args: Vec<String> },
}

impl ConsoleCommand {
    /// Parses a console line; blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = words.next()?;
        let parsed = match command.to_ascii_lowercase().as_str() {
            "start" => ConsoleCommand::Start,
            "exit" | "quit" => ConsoleCommand::Exit,
            _ => ConsoleCommand::Center {
                command: command.to_string(),
                args: words.map(str::to_string).collect(),
            },
        };
        Some(parsed)
    }
}
