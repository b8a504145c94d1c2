use thiserror::Error;

pub type RecResult<T> = Result<T, RecError>;

#[derive(Error, Debug)]
pub enum RecError {
    /// Training data has no items or no users.
    #[error("Degenerate training input: {0}")]
    DegenerateInput(String),

    /// No snapshot has been installed yet.
    #[error("Model not ready: no snapshot installed")]
    NotReady,

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Unknown item: {0}")]
    UnknownItem(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A trained snapshot failed its consistency checks and was not installed.
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Data source error: {0}")]
    Source(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RecError {
    /// Short machine-readable code, used in API error bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            RecError::DegenerateInput(_) => "degenerate_input",
            RecError::NotReady => "not_ready",
            RecError::UnknownUser(_) => "unknown_user",
            RecError::UnknownItem(_) => "unknown_item",
            RecError::InvalidArgument(_) => "invalid_argument",
            RecError::InvalidSnapshot(_) => "invalid_snapshot",
            RecError::Numerical(_) => "numerical",
            RecError::Source(_) => "source",
            RecError::Config(_) => "config",
            RecError::Io(_) => "io",
            RecError::Internal(_) => "internal",
        }
    }
}

impl From<config::ConfigError> for RecError {
    fn from(e: config::ConfigError) -> Self {
        RecError::Config(e.to_string())
    }
}
