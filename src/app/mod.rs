pub mod errors;
mod service;

pub use errors::AppError;
pub use service::{lookup_link, App, HistoryResponse, LinkResponse, SearchResponse, DEFAULT_SESSION};
