use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestErrorKind {
    RateLimited,
    Auth,
    Server,
    ContextTooLong,
    Transport,
    Other,
}

impl RequestErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestErrorKind::RateLimited => "rate_limited",
            RequestErrorKind::Auth => "auth",
            RequestErrorKind::Server => "server",
            RequestErrorKind::ContextTooLong => "context_too_long",
            RequestErrorKind::Transport => "transport",
            RequestErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for RequestErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    /// Reply could not be decoded into the expected JSON shape.
    #[error("model output format error: {0}")]
    OutputFormat(String),
    #[error("model request failed ({kind}): {message}")]
    Request {
        kind: RequestErrorKind,
        message: String,
    },
}

impl ModelError {
    pub fn request(kind: RequestErrorKind, message: impl Into<String>) -> Self {
        ModelError::Request {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DictionaryError {
    #[error("invalid dictionary entry {term:?}: {reason}")]
    InvalidEntry { term: String, reason: String },
}

impl DictionaryError {
    pub(crate) fn invalid(term: &str, reason: impl Into<String>) -> Self {
        DictionaryError::InvalidEntry {
            term: term.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("{format} syntax error: {message}")]
    Syntax {
        format: &'static str,
        message: String,
    },
    #[error("{format} cannot represent value at {key:?}")]
    Unrepresentable { format: &'static str, key: String },
}

/// Everything that can fail a single work item.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("placeholder integrity violated after {attempts} attempts: {detail}")]
    PlaceholderIntegrity { attempts: u32, detail: String },
    #[error(transparent)]
    Parser(#[from] ParserError),
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ModelOutputFormat,
    ModelRateLimited,
    ModelAuth,
    ModelServer,
    ModelContextTooLong,
    ModelTransport,
    ModelRequest,
    PlaceholderIntegrity,
    Parser,
    Io,
}

impl ItemError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ItemError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ItemError::Model(ModelError::OutputFormat(_)) => ErrorKind::ModelOutputFormat,
            ItemError::Model(ModelError::Request { kind, .. }) => match kind {
                RequestErrorKind::RateLimited => ErrorKind::ModelRateLimited,
                RequestErrorKind::Auth => ErrorKind::ModelAuth,
                RequestErrorKind::Server => ErrorKind::ModelServer,
                RequestErrorKind::ContextTooLong => ErrorKind::ModelContextTooLong,
                RequestErrorKind::Transport => ErrorKind::ModelTransport,
                RequestErrorKind::Other => ErrorKind::ModelRequest,
            },
            ItemError::PlaceholderIntegrity { .. } => ErrorKind::PlaceholderIntegrity,
            ItemError::Parser(_) => ErrorKind::Parser,
            ItemError::Io { .. } => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_as_snake_case() {
        let err = ItemError::from(ModelError::request(RequestErrorKind::RateLimited, "429"));
        assert_eq!(err.kind(), ErrorKind::ModelRateLimited);
        assert_eq!(
            serde_json::to_string(&err.kind()).unwrap(),
            "\"model_rate_limited\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::PlaceholderIntegrity).unwrap(),
            "\"placeholder_integrity\""
        );
    }

    #[test]
    fn request_kinds_display_their_names() {
        assert_eq!(RequestErrorKind::ContextTooLong.to_string(), "context_too_long");
        assert_eq!(RequestErrorKind::RateLimited.to_string(), "rate_limited");
        let err = ModelError::request(RequestErrorKind::Auth, "401");
        assert!(err.to_string().contains("auth"), "{err}");
    }
}
