use crate::offers::OfferError;
use crate::scrape::ScrapeError;
use crate::vision::EmbedError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Embed(#[from] EmbedError),

    #[error("{0}")]
    Offers(#[from] OfferError),

    #[error("{0}")]
    Scrape(#[from] ScrapeError),

    #[error("Base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("bad multipart request: {0}")]
    Multipart(String),

    #[error("bad request: {0}")]
    Request(String),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Caused by what the client sent rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Embed(EmbedError::Decode(_))
                | AppError::Embed(EmbedError::TooSmall { .. })
                | AppError::Scrape(ScrapeError::InvalidUrl(_))
                | AppError::Base64(_)
                | AppError::Multipart(_)
                | AppError::Request(_)
        )
    }
}
