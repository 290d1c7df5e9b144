use crate::models::Timeframe;
use crate::series::BarSeries;
use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// Series Provider Trait
// ---------------------------------------------------------------------------

/// Errors that can occur during data operations.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Data not found: {0}")]
    NotFound(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// A request for a bar series at a given timeframe over `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesRequest {
    pub timeframe: Timeframe,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Supplies secondary bar series, e.g. a coarser timeframe of the chart's
/// symbol. Calls are synchronous from the caller's point of view.
pub trait SeriesProvider: Send + Sync {
    fn request(&self, request: &SeriesRequest) -> Result<BarSeries, DataError>;
}
