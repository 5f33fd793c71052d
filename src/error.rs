//! Application-wide error types.
//!
//! Every provisioning step returns `Result<_, AppError>`; only `main` turns
//! an error into a process exit.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("identity error: {0}")]
    Identity(String),

    #[error("cannot {action} {}: {source}", .path.display())]
    Fs {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("server config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("command `{program} {}` failed ({status}): {output}", .args.join(" "))]
    Command {
        program: String,
        args: Vec<String>,
        status: String,
        output: String,
    },
}

impl AppError {
    /// Wrap an I/O error with the action and path it happened on.
    pub fn fs(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Fs {
            action,
            path: path.into(),
            source,
        }
    }

    /// Process exit status for this error: 2 for usage mistakes, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Usage(_) => 2,
            _ => 1,
        }
    }
}
