/// Result alias that carries the custom [`BreathworkError`] type.
pub type Result<T> = std::result::Result<T, BreathworkError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum BreathworkError {
    /// Free-form error used where no dedicated variant exists yet.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors (catalog file reads).
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The catalog file existed but did not parse as a valid catalog.
    #[error("invalid technique catalog: {0}")]
    Catalog(#[from] serde_json::Error),
    /// A technique id was requested that the loaded catalog does not know.
    #[error("unknown technique `{0}`")]
    UnknownTechnique(String),
    /// A mode key was requested that the loaded catalog does not know.
    #[error("unknown mode `{0}`")]
    UnknownMode(String),
    /// The audio output device could not be opened or configured.
    #[error("audio output unavailable: {0}")]
    Audio(String),
}

impl BreathworkError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for BreathworkError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for BreathworkError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
