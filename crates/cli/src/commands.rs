//! Shell command parsing.

use thiserror::Error;

pub const HELP: &str = "\
commands:
  add <key> <value>   insert a key/value pair (value is the rest of the line)
  get <key>           look up a key
  del <key>           delete a key
  scan                list every entry in key order
  print               show the tree structure
  last                show the rightmost leaf size and the next row id
  tables              list catalog entries
  help                show this text
  quit                leave the shell";

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add { key: u64, value: String },
    Get(u64),
    Del(u64),
    Scan,
    Print,
    Last,
    Tables,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("'{command}' needs a {what}")]
    MissingArgument {
        command: &'static str,
        what: &'static str,
    },
    #[error("'{0}' is not a valid key")]
    BadKey(String),
    #[error("'{command}' takes no arguments")]
    UnexpectedArgument { command: &'static str },
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        match name.to_ascii_lowercase().as_str() {
            "" => Err(CommandError::Empty),
            "add" | "insert" => {
                let (key, value) = match rest.split_once(char::is_whitespace) {
                    Some((key, value)) => (key, value.trim_start()),
                    None => (rest, ""),
                };
                let key = parse_key("add", key)?;
                if value.is_empty() {
                    return Err(CommandError::MissingArgument {
                        command: "add",
                        what: "value",
                    });
                }
                Ok(Command::Add {
                    key,
                    value: value.to_string(),
                })
            }
            "get" => Ok(Command::Get(parse_key("get", rest)?)),
            "del" | "delete" => Ok(Command::Del(parse_key("del", rest)?)),
            "scan" => no_args("scan", rest, Command::Scan),
            "print" => no_args("print", rest, Command::Print),
            "last" => no_args("last", rest, Command::Last),
            "tables" => no_args("tables", rest, Command::Tables),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn parse_key(command: &'static str, arg: &str) -> Result<u64, CommandError> {
    if arg.is_empty() {
        return Err(CommandError::MissingArgument { command, what: "key" });
    }
    arg.parse()
        .map_err(|_| CommandError::BadKey(arg.to_string()))
}

fn no_args(command: &'static str, rest: &str, cmd: Command) -> Result<Command, CommandError> {
    if rest.is_empty() {
        Ok(cmd)
    } else {
        Err(CommandError::UnexpectedArgument { command })
    }
}
