//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent
//! formatting and appropriate exit codes.

use std::fmt;
use std::process;

use navforge::compile::CompileError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Failed to open the output database
    OpenDatabase { path: String, error: String },
    /// Compilation failed
    Compile(CompileError),
    /// The compiled database failed basic validation
    ValidationFailed,
    /// The run was cancelled
    Aborted,
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {self}");

        match self {
            CliError::Compile(CompileError::SourceNotFound(_)) => {
                eprintln!();
                eprintln!("Check that the source database path points to a readable file.");
            }
            CliError::Compile(CompileError::Scenery(_)) => {
                eprintln!();
                eprintln!("Check the scenery configuration and that the base path contains");
                eprintln!("the expected directory layout.");
            }
            _ => {}
        }

        process::exit(match self {
            CliError::ValidationFailed => 2,
            CliError::Aborted => 130,
            _ => 1,
        })
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(message) => {
                write!(f, "Failed to initialize logging: {message}")
            }
            CliError::OpenDatabase { path, error } => {
                write!(f, "Failed to open output database \"{path}\": {error}")
            }
            CliError::Compile(error) => write!(f, "Compilation failed: {error}"),
            CliError::ValidationFailed => {
                write!(f, "Basic validation found tables below their minimum row counts")
            }
            CliError::Aborted => write!(f, "Compilation aborted"),
        }
    }
}

impl From<CompileError> for CliError {
    fn from(error: CompileError) -> Self {
        CliError::Compile(error)
    }
}
