use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    #[error("Tag store error: {0}")]
    Store(#[from] ctagnav_tag_store::TagStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The tag generator ran and exited unsuccessfully.
    #[error("`{command}` failed ({}): {output}", describe_status(.status))]
    BuildFailure {
        command: String,
        status: Option<i32>,
        output: String,
    },

    #[error("Tag generator `{program}` not found on PATH")]
    CommandNotFound { program: String },

    #[error("A tag build is already running")]
    ConcurrentBuildRejected,

    #[error("Background task failed: {0}")]
    Join(String),
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

impl From<tokio::task::JoinError> for IndexError {
    fn from(err: tokio::task::JoinError) -> Self {
        IndexError::Join(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
