//! CLI error types and exit codes

use thiserror::Error;

use spacesync_engine::SyncError;

/// Exit codes:
/// - 0: pass completed clean
/// - 1: pass completed but some items failed
/// - 2: pass aborted, or the CLI could not start at all
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pass aborted: {0}")]
    Aborted(#[from] SyncError),

    #[error("Pass completed with {failures} failed item(s)")]
    PassIncomplete { failures: usize },

    #[error("Connectivity check failed: {0}")]
    CheckFailed(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::PassIncomplete { .. } => 1,
            CliError::Config(_) | CliError::Aborted(_) | CliError::CheckFailed(_) => 2,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();
        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }
    }
}
