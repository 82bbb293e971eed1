use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("not initialized: run 'tabledeck init'")]
    NotInitialized,

    #[error("unknown slot: {0}")]
    UnknownSlot(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("action '{action}' is not ready: waiting on {}", .missing.join(", "))]
    ActionNotReady { action: String, missing: Vec<String> },

    #[error("action '{action}' failed: {cause}")]
    ActionFailed { action: String, cause: String },

    #[error("input table '{0}' is empty: load it first")]
    EmptyInput(String),

    #[error("missing column '{column}' in table '{table}'")]
    MissingColumn { table: String, column: String },

    #[error("invalid name '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidName(String),

    #[error("duplicate action key: {0}")]
    DuplicateAction(String),

    #[error("duplicate slot: {0}")]
    DuplicateSlot(String),

    #[error("malformed csv: {0}")]
    MalformedCsv(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DeckError>;
