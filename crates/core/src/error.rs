/// Result alias that carries the custom [`MindbeatError`] type.
pub type Result<T> = std::result::Result<T, MindbeatError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum MindbeatError {
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// A caller supplied a value outside the accepted domain.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// The configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
    /// A collaborator answered with JSON we could not decode.
    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),
    /// Capture, display or audio device failure.
    #[error("device error: {0}")]
    Device(String),
    /// The emotion classifier failed or produced no reading.
    #[error("classifier error: {0}")]
    Classifier(String),
    /// A network collaborator failed (timeout, transport, bad status).
    #[error("network error: {0}")]
    Network(String),
}

impl MindbeatError {
    pub fn device<T: Into<String>>(msg: T) -> Self {
        Self::Device(msg.into())
    }

    pub fn classifier<T: Into<String>>(msg: T) -> Self {
        Self::Classifier(msg.into())
    }

    pub fn network<T: Into<String>>(msg: T) -> Self {
        Self::Network(msg.into())
    }
}
