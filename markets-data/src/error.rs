use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated in `markets-data`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Error)]
pub enum DataError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("failed to deserialise response: {0}")]
    Deserialise(String),

    #[error("exchange API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),

    #[error("unknown exchange: {0}")]
    UnknownExchange(String),
}

impl DataError {
    /// Determine if the upstream answered, but with a payload of an unexpected shape.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_malformed(&self) -> bool {
        match self {
            DataError::Deserialise(_) | DataError::Api { .. } => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DataError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Deserialise(value.to_string())
        } else {
            Self::Http(value.to_string())
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(value: serde_json::Error) -> Self {
        Self::Deserialise(value.to_string())
    }
}

impl From<url::ParseError> for DataError {
    fn from(value: url::ParseError) -> Self {
        Self::InvalidUrl(value.to_string())
    }
}
