use crate::models::{Bar, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Bar Series
// ---------------------------------------------------------------------------

/// An ordered bar history at a single timeframe.
///
/// Bars are stored oldest first. `bar(ago)` addresses them the way chart
/// hosts do, with 0 being the most recent bar; `at(position)` addresses them
/// chronologically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    timeframe: Timeframe,
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            bars: Vec::new(),
        }
    }

    /// Build a series from bars in any order; they are sorted by timestamp.
    pub fn from_bars(timeframe: Timeframe, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        Self { timeframe, bars }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// The bar `ago` bars before the most recent one.
    pub fn bar(&self, ago: usize) -> Option<&Bar> {
        self.bars
            .len()
            .checked_sub(ago + 1)
            .and_then(|pos| self.bars.get(pos))
    }

    pub fn at(&self, position: usize) -> Option<&Bar> {
        self.bars.get(position)
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Bar> {
        self.bars.last_mut()
    }

    /// Chronological position of the most recent bar.
    pub fn current_position(&self) -> Option<usize> {
        self.bars.len().checked_sub(1)
    }

    pub fn push(&mut self, bar: Bar) {
        self.bars.push(bar);
    }

    /// Position of the latest bar whose left edge is at or before `ts`.
    pub fn position_at_or_before(&self, ts: DateTime<Utc>) -> Option<usize> {
        self.bars
            .partition_point(|b| b.timestamp <= ts)
            .checked_sub(1)
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bar> {
        self.bars.iter()
    }
}

// ---------------------------------------------------------------------------
// Output Series
// ---------------------------------------------------------------------------

/// A named indicator output, one value per bar of the series it was computed
/// on. Slots without a value hold `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSeries {
    name: String,
    values: Vec<f64>,
}

impl OutputSeries {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value `ago` bars back, `NaN` if absent.
    pub fn value(&self, ago: usize) -> f64 {
        self.values
            .len()
            .checked_sub(ago + 1)
            .map_or(f64::NAN, |pos| self.values[pos])
    }

    /// Value `ago` bars back, `None` if absent or never written.
    pub fn get(&self, ago: usize) -> Option<f64> {
        Some(self.value(ago)).filter(|v| !v.is_nan())
    }

    /// Value at a chronological position, `NaN` if absent.
    pub fn at(&self, position: usize) -> f64 {
        self.values.get(position).copied().unwrap_or(f64::NAN)
    }

    /// Write the value `ago` bars back. Out-of-range writes are ignored.
    pub fn set(&mut self, ago: usize, value: f64) {
        if let Some(pos) = self.values.len().checked_sub(ago + 1) {
            self.values[pos] = value;
        }
    }

    /// Write at a chronological position. Out-of-range writes are ignored.
    pub fn set_at(&mut self, position: usize, value: f64) {
        if let Some(slot) = self.values.get_mut(position) {
            *slot = value;
        }
    }

    /// Grow (with `NaN`) or shrink to exactly `len` slots.
    pub fn align(&mut self, len: usize) {
        self.values.resize(len, f64::NAN);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Resize every line to `len` slots.
pub fn align_lines(lines: &mut [OutputSeries], len: usize) {
    for line in lines {
        line.align(len);
    }
}
