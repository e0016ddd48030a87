//! Dispatch error classification for the retry engine.

use metrond_common::classify::is_retriable_io;
use metrond_common::retry::Classification;
use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status code: {0}")]
    Status(StatusCode),
}

/// Transient socket conditions and server-side backpressure statuses
/// (>=500, 429, 408) are retriable; anything else is permanent.
pub fn classify_send(err: &SendError) -> Classification {
    match err {
        SendError::Transport(e) => {
            if e.is_timeout() || is_retriable_io(e) {
                Classification::Retriable
            } else {
                Classification::NonRetriable
            }
        }
        SendError::Status(code) => {
            if code.is_server_error()
                || *code == StatusCode::TOO_MANY_REQUESTS
                || *code == StatusCode::REQUEST_TIMEOUT
            {
                Classification::Retriable
            } else {
                Classification::NonRetriable
            }
        }
    }
}
