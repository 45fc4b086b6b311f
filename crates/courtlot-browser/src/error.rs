use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("webdriver returned {error}: {message}")]
    Protocol { error: String, message: String },

    #[error("unexpected webdriver response: {0}")]
    Malformed(String),

    #[error("page already closed")]
    Closed,

    #[cfg(feature = "webdriver")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[cfg(feature = "webdriver")]
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BrowserError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
