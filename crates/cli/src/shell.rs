//! Executes shell commands against one tree of a database.

use std::fmt::Write as _;

use ember_storage::{Database, PageNum, StorageError};
use thiserror::Error;
use tracing::debug;

use crate::commands::{Command, CommandError, HELP};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("line editor: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Print(String),
    Quit,
}

pub struct Shell {
    db: Database,
    root: PageNum,
}

impl Shell {
    /// Bind a shell to the tree rooted at `root`. The root page must exist.
    pub fn new(mut db: Database, root: PageNum) -> Result<Self, CliError> {
        db.tree(root)?;
        Ok(Self { db, root })
    }

    /// Parse and run one input line.
    pub fn run_line(&mut self, line: &str) -> Result<Outcome, CliError> {
        let command = Command::parse(line)?;
        debug!(?command, "running command");
        self.execute(command)
    }

    pub fn execute(&mut self, command: Command) -> Result<Outcome, CliError> {
        let out = match command {
            Command::Quit => return Ok(Outcome::Quit),
            Command::Help => HELP.to_string(),
            Command::Add { key, value } => {
                self.db.tree(self.root)?.insert(key, value.as_bytes())?;
                "ok".to_string()
            }
            Command::Get(key) => match self.db.tree(self.root)?.get(key)? {
                Some(value) => String::from_utf8_lossy(&value).into_owned(),
                None => "(not found)".to_string(),
            },
            Command::Del(key) => {
                if self.db.tree(self.root)?.delete(key)? {
                    "deleted".to_string()
                } else {
                    "(not found)".to_string()
                }
            }
            Command::Scan => {
                let entries = self.db.tree(self.root)?.scan()?;
                if entries.is_empty() {
                    "(empty)".to_string()
                } else {
                    entries
                        .iter()
                        .map(|(key, value)| format!("{key}: {}", String::from_utf8_lossy(value)))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            Command::Print => self.db.tree(self.root)?.dump()?.trim_end().to_string(),
            Command::Last => {
                let mut tree = self.db.tree(self.root)?;
                format!(
                    "last key: {}, next row id: {}",
                    tree.last_key()?,
                    tree.next_row_id()?
                )
            }
            Command::Tables => {
                let tables = self.db.list_tables()?;
                if tables.is_empty() {
                    "(no tables)".to_string()
                } else {
                    let mut out = String::new();
                    for table in tables {
                        let _ = writeln!(
                            out,
                            "{} {} page {}: {}",
                            table.row_id, table.name, table.root_page, table.sql
                        );
                    }
                    out.trim_end().to_string()
                }
            }
        };
        Ok(Outcome::Print(out))
    }
}
