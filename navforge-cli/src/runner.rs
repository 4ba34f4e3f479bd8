//! Common setup shared by the CLI commands.

use std::io::{IsTerminal, Write};
use std::path::Path;

use navforge::compile::{
    ContinueOrAbort, NavCompileOptions, NavDatabase, ProgressHandler, ResultFlags,
};
use navforge::logging;

use crate::error::CliError;

/// Runs compilation commands with logging and progress wiring.
pub struct CliRunner {
    _logging_guard: Option<logging::LoggingGuard>,
    quiet: bool,
}

impl CliRunner {
    /// Initializes logging; pass `quiet` to suppress the progress line.
    pub fn new(quiet: bool) -> Result<Self, CliError> {
        let guard = logging::init_logging(logging::default_log_dir(), logging::default_log_file())
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;
        Ok(Self {
            _logging_guard: Some(guard),
            quiet,
        })
    }

    /// Opens the output database and runs a full compile.
    pub fn compile(&self, options: &NavCompileOptions, output: &Path) -> Result<ResultFlags, CliError> {
        let mut conn = rusqlite::Connection::open(output).map_err(|e| CliError::OpenDatabase {
            path: output.display().to_string(),
            error: e.to_string(),
        })?;

        let show_progress = !self.quiet && std::io::stdout().is_terminal();
        let mut callback = move |current: u64, total: u64, message: &str| {
            if show_progress {
                let percent = if total > 0 { current * 100 / total } else { 0 };
                print!("\r[{percent:3}%] {message:<60}");
                let _ = std::io::stdout().flush();
            }
            ContinueOrAbort::Continue
        };

        let progress = ProgressHandler::new(Some(&mut callback));
        let mut database = NavDatabase::with_progress(options, progress);
        let result = database.create(&mut conn)?;

        if show_progress {
            println!();
        }

        for area in &database.errors().areas {
            eprintln!("Errors in scenery area \"{}\":", area.scenery_area);
            for error in &area.file_errors {
                eprintln!("  {}: {}", error.file.display(), error.message);
            }
        }

        Ok(result)
    }
}
