pub mod csv_loader;
pub mod resample;
pub mod writer;

use chartbands_core::{Bar, BarSeries, DataError, SeriesProvider, SeriesRequest, Timeframe};

/// Serves secondary series from bars already loaded in memory.
///
/// Requests at the base timeframe or any coarser one are answered by
/// resampling the base bars; finer timeframes cannot be derived and are
/// rejected.
#[derive(Debug, Clone)]
pub struct HistoryProvider {
    base: BarSeries,
}

impl HistoryProvider {
    pub fn new(base: BarSeries) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &BarSeries {
        &self.base
    }
}

impl SeriesProvider for HistoryProvider {
    fn request(&self, request: &SeriesRequest) -> Result<BarSeries, DataError> {
        let base_tf = self.base.timeframe();
        if request.timeframe.is_coarser_than(&base_tf) || request.timeframe == base_tf {
            // The bar covering `from` is included even if it starts earlier.
            let from = request.timeframe.bucket_start(request.from);
            let bars: Vec<Bar> = resample::resample(self.base.bars(), request.timeframe)
                .into_iter()
                .filter(|b| b.timestamp >= from && b.timestamp <= request.to)
                .collect();
            tracing::debug!(
                timeframe = %request.timeframe,
                from = %request.from,
                to = %request.to,
                bars = bars.len(),
                "Served secondary series"
            );
            Ok(BarSeries::from_bars(request.timeframe, bars))
        } else {
            Err(DataError::InvalidRequest(format!(
                "cannot derive {} bars from {} history",
                request.timeframe, base_tf
            )))
        }
    }
}
