use thiserror::Error;

#[derive(Error, Debug)]
pub enum AccrualError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid accrual service base url: {0}")]
    InvalidBaseUrl(String),
}
