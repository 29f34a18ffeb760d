use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is not connected")]
    NotConnected,
    #[error("client is already connected")]
    AlreadyConnected,
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
    #[error("gave up reconnecting after {attempts} failed attempts")]
    ReconnectExhausted { attempts: u32 },
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[source] anyhow::Error),
    #[error("server returned status {code}")]
    Status { code: u16 },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// True when the error came back with an HTTP status rather than a
    /// transport-level failure.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { code } => Some(*code),
            _ => None,
        }
    }
}
