use crate::state::Tiered;
use crate::{Indicator, IndicatorError};
use chartbands_core::{align_lines, BarEvent, BarSeries, OutputSeries};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

pub const DEFAULT_PERIOD: usize = 14;
pub const MAX_PERIOD: usize = 99_999;

/// Average True Range (ATR).
///
/// The average ramps from a simple mean over the first bars to a fixed-length
/// Wilder average once `period` bars have been seen. Plotted values are
/// rounded for display; `value()` keeps full precision.
#[derive(Debug, Clone)]
pub struct Atr {
    len: usize,
    state: Tiered<f64>,
    lines: Vec<OutputSeries>,
}

impl Atr {
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        if !(1..=MAX_PERIOD).contains(&period) {
            return Err(IndicatorError::InvalidConfig(format!(
                "ATR period must be in 1..={MAX_PERIOD}, got {period}"
            )));
        }
        Ok(Self {
            len: period,
            state: Tiered::new(0.0),
            lines: vec![OutputSeries::new("ATR")],
        })
    }

    /// Full-precision ATR of the current bar, if one has been computed.
    pub fn value(&self) -> Option<f64> {
        self.lines[0].get(0).map(|_| *self.state.live())
    }
}

/// Largest of the bar's range and its distance from the prior close.
pub fn true_range(high: f64, low: f64, prev_close: Option<f64>) -> f64 {
    match prev_close {
        Some(prev_c) => (low - prev_c)
            .abs()
            .max((high - low).max((high - prev_c).abs())),
        None => high - low,
    }
}

/// One smoothing step with `bars_seen` bars before the current one.
pub fn smooth(prev: f64, tr: f64, bars_seen: usize, period: usize) -> f64 {
    let n = (bars_seen + 1).min(period) as f64;
    ((n - 1.0) * prev + tr) / n
}

/// Round to 3 decimals below 1.0 and to 2 decimals otherwise, half to even.
pub fn round_for_display(value: f64) -> f64 {
    Decimal::from_f64(value)
        .and_then(|d| round_display(d).to_f64())
        .unwrap_or(value)
}

fn round_display(value: Decimal) -> Decimal {
    let dp = if value < Decimal::ONE { 3 } else { 2 };
    value.round_dp(dp)
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        "ATR"
    }

    fn short_name(&self) -> String {
        format!("ATR ({})", self.len)
    }

    fn update(&mut self, bars: &BarSeries, event: BarEvent) {
        let (Some(bars_seen), Some(bar)) = (bars.current_position(), bars.bar(0)) else {
            return;
        };
        align_lines(&mut self.lines, bars.len());

        let prev = self.state.begin(event);
        let tr = true_range(bar.high, bar.low, bars.bar(1).map(|b| b.close));
        let value = smooth(prev, tr, bars_seen, self.len);
        self.state.store(value);

        self.lines[0].set(0, round_for_display(value));
    }

    fn lines(&self) -> &[OutputSeries] {
        &self.lines
    }

    fn reset(&mut self) {
        self.state.reset(0.0);
        self.lines.iter_mut().for_each(OutputSeries::clear);
    }

    fn min_history(&self) -> usize {
        1000
    }
}
