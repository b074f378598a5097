use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Push transport failure: {0}")]
    Transport(String),

    #[error("Fetch failure: {0}")]
    Fetch(String),

    #[error("Malformed payload: {0}")]
    PayloadMalformed(#[from] serde_json::Error),

    #[error("Control request failed: {0}")]
    ControlRequest(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ViewerError>;
