use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded {code}: {error}")]
    Status { code: u16, error: String },

    #[error("socket error: {0}")]
    Socket(Box<tungstenite::Error>),

    #[error("could not decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("response is missing the {0} header")]
    MissingRevision(&'static str),
}

impl ClientError {
    /// The HTTP status for a non-2xx response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<tungstenite::Error> for ClientError {
    fn from(err: tungstenite::Error) -> Self {
        Self::Socket(Box::new(err))
    }
}
