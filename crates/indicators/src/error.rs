use chartbands_core::{DataError, Timeframe};

/// Errors raised while configuring an indicator.
///
/// Updates never fail; anything that could go wrong at runtime is rejected
/// here, at construction time.
#[derive(Debug, thiserror::Error)]
pub enum IndicatorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Source timeframe {requested} is not coarser than chart timeframe {chart}")]
    NotCoarser {
        requested: Timeframe,
        chart: Timeframe,
    },
    #[error("Secondary series unavailable: {0}")]
    Series(#[from] DataError),
}
