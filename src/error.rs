use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Repository is not open: {0}")]
    RepositoryNotOpen(String),

    #[error("Could not resolve reference: {0}")]
    Resolution(String),

    #[error("No commits found between {good} and {bad}")]
    EmptyRange { good: String, bad: String },

    #[error("A rebase is already in progress. Use continue, skip, or abort.")]
    RebaseAlreadyInProgress,

    #[error("No rebase in progress")]
    RebaseNotInProgress,

    #[error("Invalid rebase instruction: {0}")]
    InvalidInstruction(String),

    #[error("No reflog found for ref: {0}")]
    NoReflog(String),

    #[error("Could not resolve reflog expression: {0}")]
    ExpressionResolution(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, Error>;
