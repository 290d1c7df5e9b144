pub mod aggregation;
pub mod atr;
pub mod error;
pub mod mtf;
pub mod rsi_bands;
pub mod session;
pub mod state;
pub mod vwap;

pub use error::IndicatorError;

use chartbands_core::{BarEvent, BarSeries, OutputSeries};

/// History depth assumed for indicators that do not ask for more.
pub const DEFAULT_MIN_HISTORY: usize = 1;

/// Trait for event-driven indicators hosted on a chart.
///
/// The host calls `update` once per bar event, passing the whole series with
/// the bar being updated at `bars.bar(0)`. Outputs are read back through
/// `lines()`, one value per bar.
pub trait Indicator: Send + Sync {
    /// Display name, e.g. `ATR`.
    fn name(&self) -> &str;

    /// Name including the main parameters, e.g. `RSIBands (14: 70/30)`.
    fn short_name(&self) -> String {
        self.name().to_string()
    }

    /// Process a bar event for the most recent bar of `bars`.
    fn update(&mut self, bars: &BarSeries, event: BarEvent);

    /// The output series, aligned with the bars seen so far.
    fn lines(&self) -> &[OutputSeries];

    /// Reset the indicator to its initial state.
    fn reset(&mut self);

    /// Bars of history the host should load before the indicator is useful.
    fn min_history(&self) -> usize {
        DEFAULT_MIN_HISTORY
    }

    /// Whether the indicator has produced a value for the current bar.
    fn is_ready(&self) -> bool {
        self.lines()
            .first()
            .is_some_and(|line| line.get(0).is_some())
    }
}
