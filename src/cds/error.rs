use std::io;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
/// Failure of one retrieval against the archive.
pub enum RetrieveError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("request rejected: {0}")]
    InvalidRequest(String),

    #[error("job {job_id} failed: {message}")]
    Processing { job_id: String, message: String },

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("file I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RetrieveError {
    /// Maps a non-success HTTP status and its body to an error.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = error_message(body);

        match status {
            401 | 403 => RetrieveError::Authentication(message),
            500..=599 => RetrieveError::Server { status, message },
            _ => RetrieveError::InvalidRequest(format!("{} ({})", message, status)),
        }
    }

    /// Worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            RetrieveError::Server { .. } => true,
            RetrieveError::Network(e) => !e.is_decode(),
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorDocument {
    title: Option<String>,
    detail: Option<String>,
}

/// Pulls `title` and `detail` out of an archive error document, falling back to the raw body.
pub fn error_message(body: &str) -> String {
    let message = match serde_json::from_str::<ErrorDocument>(body) {
        Ok(ErrorDocument {
            title: Some(title),
            detail: Some(detail),
        }) if !detail.trim().is_empty() => format!("{}: {}", title, detail.trim()),
        Ok(ErrorDocument {
            title: Some(title), ..
        }) => title,
        Ok(ErrorDocument {
            detail: Some(detail),
            ..
        }) => detail,
        _ => body.trim().to_string(),
    };

    if message.is_empty() {
        "no details".to_string()
    } else {
        message
    }
}

// -- Tests -------------------------------------------------------------------
