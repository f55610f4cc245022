//! `ember`: an interactive shell over one B-tree of an ember database.
//!
//! ```bash
//! # create a database and drive its catalog tree
//! ember --create demo.db
//!
//! # reopen it with storage tracing
//! ember demo.db --log ember_storage=trace
//! ```

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ember_storage::{Database, PageNum, PagerOptions, MASTER_ROOT_PAGE};
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod shell;

use shell::{CliError, Outcome, Shell};

const PROMPT: &str = "ember> ";
const HISTORY_SIZE: usize = 1000;

/// Interactive shell over an ember database tree
#[derive(Parser, Debug)]
#[command(name = "ember", version)]
struct Args {
    /// Database file
    path: PathBuf,

    /// Create the database, replacing any existing file
    #[arg(long)]
    create: bool,

    /// Root page of the tree to drive
    #[arg(long, value_name = "PAGE", default_value_t = MASTER_ROOT_PAGE)]
    root: PageNum,

    /// Sync the file to disk after every page write
    #[arg(long)]
    sync: bool,

    /// Log filter, e.g. `debug` or `ember_storage=trace` (defaults to RUST_LOG, then `warn`)
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log.as_deref());

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(args: Args) -> Result<(), CliError> {
    let options = PagerOptions {
        sync_writes: args.sync,
    };
    let db = if args.create {
        info!(path = %args.path.display(), "creating database");
        Database::create_with_options(&args.path, options)?
    } else {
        info!(path = %args.path.display(), "opening database");
        Database::open_with_options(&args.path, options)?
    };
    let mut shell = Shell::new(db, args.root)?;

    let config = Config::builder()
        .history_ignore_space(true)
        .max_history_size(HISTORY_SIZE)?
        .build();
    let mut editor = DefaultEditor::with_config(config)?;
    loop {
        let line = match next_line(editor.readline(PROMPT))? {
            Input::Line(line) => line,
            Input::Skip => continue,
            Input::Done => return Ok(()),
        };
        let _ = editor.add_history_entry(line.as_str());

        match shell.run_line(&line) {
            Ok(Outcome::Print(text)) => println!("{text}"),
            Ok(Outcome::Quit) => return Ok(()),
            Err(e) => eprintln!("error: {e}"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Line(String),
    Skip,
    Done,
}

/// Classify one editor read. Ctrl-C drops the line being typed, Ctrl-D
/// ends the session.
fn next_line(read: rustyline::Result<String>) -> Result<Input, CliError> {
    match read {
        Ok(line) if line.trim().is_empty() => Ok(Input::Skip),
        Ok(line) => Ok(Input::Line(line)),
        Err(ReadlineError::Interrupted) => Ok(Input::Skip),
        Err(ReadlineError::Eof) => Ok(Input::Done),
        Err(e) => Err(e.into()),
    }
}
