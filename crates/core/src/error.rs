/// Result alias that carries the custom [`AudioError`] type.
pub type Result<T> = std::result::Result<T, AudioError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// The platform refused or could not supply the requested capture stream:
    /// no device for the mode, the device would not open, or the stream would
    /// not start. Surfaced to the caller of `start` and never retried.
    #[error("audio acquisition failed: {0}")]
    Acquisition(String),
    /// Internal failure that does not fit a more specific variant, such as a
    /// poisoned lock guarding shared engine state.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl AudioError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Creates an acquisition error from a human readable cause.
    pub fn acquisition<T: Into<String>>(cause: T) -> Self {
        Self::Acquisition(cause.into())
    }
}

impl From<&str> for AudioError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for AudioError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
