use std::path::PathBuf;

/// Errors that can occur while registering or invoking hooks.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// Hook name is empty or whitespace.
    #[error("Hook: invalid hook name")]
    InvalidName,

    /// A hook with the same name is already registered.
    #[error("Hook: '{0}' is already registered")]
    Duplicate(String),

    /// The rule references a hook name the registry does not know.
    #[error("Hook: '{0}' is not registered")]
    Unresolved(String),

    /// External hook executable does not exist or is not a file.
    #[error("Hook: executable not found: {0}")]
    MissingExecutable(PathBuf),

    /// External hook process could not be started.
    #[error("Hook: failed to launch '{path}': {source}")]
    Launch {
        path: PathBuf,
        source: std::io::Error,
    },

    /// External hook exceeded the invocation timeout and was killed.
    #[error("Hook: '{hook}' timed out after {timeout_secs}s and was killed")]
    Timeout { hook: String, timeout_secs: u64 },

    /// External hook exited with a non-zero status.
    #[error("Hook: '{hook}' exited with status {code:?}")]
    ExitStatus { hook: String, code: Option<i32> },

    /// Payload serialization failed.
    #[error("Hook: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// In-process hook task panicked.
    #[error("Hook: '{0}' panicked during invocation")]
    Panicked(String),

    /// In-process hook returned an error.
    #[error("Hook: '{hook}' failed: {source}")]
    Failed {
        hook: String,
        source: anyhow::Error,
    },
}

/// Convenience `Result` alias for hook operations.
pub type Result<T> = std::result::Result<T, HookError>;
