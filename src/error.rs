use thiserror::Error;

/// Failure of an essential fetch. Only the market snapshot call surfaces this;
/// the decorative collaborators swallow their errors and degrade instead.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("could not decode response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl FetchError {
    pub fn from_send(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport(err)
        }
    }

    pub fn from_body(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Decode(err)
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }
}
