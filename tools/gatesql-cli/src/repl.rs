//! Interactive shell.
//!
//! Input accumulates over lines until the statement ends with `;`. Lines
//! starting with `.` are shell commands when no statement is pending.

use std::path::PathBuf;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, error};

use crate::errors::CliError;
use crate::session::{self, Session};

const PROMPT: &str = "gatesql> ";
const CONTINUATION_PROMPT: &str = "    ...> ";
const HISTORY_FILE: &str = ".gatesql_history";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DotCommand {
    Schema(String),
    Quit,
    Unknown(String),
}

impl DotCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let rest = line.strip_prefix('.')?;
        let mut words = rest.split_whitespace();
        Some(match words.next().unwrap_or_default() {
            "schema" => match words.next() {
                Some(table) => DotCommand::Schema(table.trim_end_matches(';').to_string()),
                None => DotCommand::Unknown(line.to_string()),
            },
            "quit" | "exit" => DotCommand::Quit,
            _ => DotCommand::Unknown(line.to_string()),
        })
    }
}

/// Lines of a statement that has not been terminated yet.
#[derive(Debug, Default)]
pub struct Pending {
    buffer: String,
}

impl Pending {
    pub fn is_empty(&self) -> bool {
        self.buffer.trim().is_empty()
    }

    /// Add a line; returns the statement once it ends with `;`.
    pub fn push(&mut self, line: &str) -> Option<String> {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(line);
        if self.buffer.trim_end().ends_with(';') {
            let statement = std::mem::take(&mut self.buffer);
            Some(statement.trim().to_string())
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

pub struct Repl {
    session: Session,
    editor: DefaultEditor,
    history_file: Option<PathBuf>,
}

impl Repl {
    pub fn new(session: Session) -> Result<Self, CliError> {
        let mut editor = DefaultEditor::new()?;
        let history_file = dirs::home_dir().map(|home| home.join(HISTORY_FILE));
        if let Some(path) = &history_file {
            if path.exists() {
                let _ = editor.load_history(path);
            }
        }
        Ok(Self {
            session,
            editor,
            history_file,
        })
    }

    pub fn run(mut self) -> Result<(), CliError> {
        let mut pending = Pending::default();
        loop {
            let prompt = if pending.is_empty() { PROMPT } else { CONTINUATION_PROMPT };
            match self.editor.readline(prompt) {
                Ok(line) => {
                    if pending.is_empty() {
                        if let Some(command) = DotCommand::parse(&line) {
                            let _ = self.editor.add_history_entry(line.trim());
                            match command {
                                DotCommand::Quit => break,
                                DotCommand::Schema(table) => self.execute(&session::schema_query(&table)),
                                DotCommand::Unknown(text) => println!("ERROR: unknown command {}", text),
                            }
                            continue;
                        }
                        if line.trim().is_empty() {
                            continue;
                        }
                    }
                    if let Some(statement) = pending.push(&line) {
                        let _ = self.editor.add_history_entry(statement.as_str());
                        self.execute(&statement);
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    pending.clear();
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    error!("Readline error: {}", e);
                    break;
                }
            }
        }

        self.save_history();
        self.session.close()
    }

    fn execute(&self, sql: &str) {
        if let Err(e) = self.session.execute(sql, &mut std::io::stdout()) {
            println!("ERROR: {}", e);
        }
    }

    fn save_history(&mut self) {
        if let Some(path) = &self.history_file {
            if let Err(e) = self.editor.save_history(path) {
                debug!(path = %path.display(), error = %e, "Could not save history");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_accumulates_until_semicolon() {
        let mut pending = Pending::default();
        assert!(pending.is_empty());
        assert_eq!(pending.push("SELECT 1,"), None);
        assert!(!pending.is_empty());
        assert_eq!(pending.push("  2;  "), Some("SELECT 1,\n  2;".to_string()));
        assert!(pending.is_empty());
        assert_eq!(pending.push("SELECT 3;"), Some("SELECT 3;".to_string()));
    }

    #[test]
    fn test_pending_clear() {
        let mut pending = Pending::default();
        pending.push("SELECT");
        pending.clear();
        assert!(pending.is_empty());
    }

    #[test]
    fn test_dot_commands() {
        assert_eq!(DotCommand::parse(".schema users"), Some(DotCommand::Schema("users".to_string())));
        assert_eq!(DotCommand::parse("  .schema users;"), Some(DotCommand::Schema("users".to_string())));
        assert_eq!(DotCommand::parse(".quit"), Some(DotCommand::Quit));
        assert_eq!(DotCommand::parse(".schema"), Some(DotCommand::Unknown(".schema".to_string())));
        assert_eq!(DotCommand::parse(".nope"), Some(DotCommand::Unknown(".nope".to_string())));
        assert_eq!(DotCommand::parse("SELECT 1;"), None);
    }
}
