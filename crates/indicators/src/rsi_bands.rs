use crate::state::Tiered;
use crate::{Indicator, IndicatorError};
use chartbands_core::{align_lines, BarEvent, BarSeries, OutputSeries};
use serde::{Deserialize, Serialize};

/// Smoothed average gain (`p_*`) and loss (`n_*`) for each band.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandAccumulators {
    pub p_up: f64,
    pub n_up: f64,
    pub p_low: f64,
    pub n_low: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiBandsConfig {
    pub period: usize,
    pub upper_level: f64,
    pub lower_level: f64,
}

impl Default for RsiBandsConfig {
    fn default() -> Self {
        Self {
            period: 14,
            upper_level: 70.0,
            lower_level: 30.0,
        }
    }
}

impl RsiBandsConfig {
    pub fn validate(&self) -> Result<(), IndicatorError> {
        if !(1..=crate::atr::MAX_PERIOD).contains(&self.period) {
            return Err(IndicatorError::InvalidConfig(format!(
                "RSI band period must be in 1..={}, got {}",
                crate::atr::MAX_PERIOD,
                self.period
            )));
        }
        for (name, level) in [("upper", self.upper_level), ("lower", self.lower_level)] {
            if !(level > 0.0 && level < 100.0) {
                return Err(IndicatorError::InvalidConfig(format!(
                    "RSI {name} level must be strictly between 0 and 100, got {level}"
                )));
            }
        }
        Ok(())
    }
}

/// RSI Bands (Francois Bertrand, Stocks & Commodities, April 2008).
///
/// Instead of an oscillator, plots the closing prices at which the RSI would
/// reach the upper and lower levels on the current bar.
#[derive(Debug, Clone)]
pub struct RsiBands {
    config: RsiBandsConfig,
    state: Tiered<BandAccumulators>,
    lines: Vec<OutputSeries>,
}

impl RsiBands {
    pub fn new(config: RsiBandsConfig) -> Result<Self, IndicatorError> {
        config.validate()?;
        Ok(Self {
            config,
            state: Tiered::default(),
            lines: vec![
                OutputSeries::new("RSIBandUpper"),
                OutputSeries::new("RSIBandLower"),
            ],
        })
    }

    pub fn config(&self) -> &RsiBandsConfig {
        &self.config
    }

    /// Accumulators as of the last closed bar.
    pub fn committed(&self) -> &BandAccumulators {
        self.state.committed()
    }

    /// Accumulators including the current bar.
    pub fn live(&self) -> &BandAccumulators {
        self.state.live()
    }
}

/// Wilder smoothing step.
pub fn wilder(prev: f64, sample: f64, period: usize) -> f64 {
    ((period - 1) as f64 * prev + sample) / period as f64
}

/// Close that would put the RSI at `target_level`, given the average gain `p`
/// and loss `n` carried from the previous bar.
///
/// The first form assumes the bar closes up from `prev_close`, the second
/// that it closes down; which one applies is decided by where the previous
/// band sat relative to the previous close.
pub fn hypothetical_close(
    target_level: f64,
    p: f64,
    n: f64,
    prev_close: f64,
    prev_band: f64,
    period: usize,
) -> f64 {
    let period = period as f64;
    if prev_band > prev_close {
        prev_close + p - p * period - ((n * period) - n) * target_level / (target_level - 100.0)
    } else {
        prev_close - n - p + n * period + p * period + (100.0 * p) / target_level
            - (100.0 * p * period) / target_level
    }
}

/// Inputs shared by both band solves on one update.
struct Step {
    prev_close: f64,
    gain: f64,
    loss: f64,
    prev_upper: f64,
    prev_lower: f64,
    period: usize,
}

impl Step {
    /// Solve one band and advance whichever accumulator pair `prev_band`
    /// identifies. The match is exact against the previous plotted values;
    /// when both previous values are equal the upper pair wins, and `NaN`
    /// (nothing plotted yet) matches neither.
    fn solve(
        &self,
        level: f64,
        p: f64,
        n: f64,
        prev_band: f64,
        live: &mut BandAccumulators,
    ) -> f64 {
        let band = hypothetical_close(level, p, n, self.prev_close, prev_band, self.period);

        if prev_band == self.prev_upper {
            live.p_up = wilder(p, self.gain, self.period);
            live.n_up = wilder(n, self.loss, self.period);
        } else if prev_band == self.prev_lower {
            live.p_low = wilder(p, self.gain, self.period);
            live.n_low = wilder(n, self.loss, self.period);
        }

        band
    }
}

impl Indicator for RsiBands {
    fn name(&self) -> &str {
        "RSIBands"
    }

    fn short_name(&self) -> String {
        format!(
            "RSIBands ({}: {}/{})",
            self.config.period, self.config.upper_level, self.config.lower_level
        )
    }

    fn update(&mut self, bars: &BarSeries, event: BarEvent) {
        align_lines(&mut self.lines, bars.len());
        // Needs a prior close.
        let (Some(bar), Some(prev_bar)) = (bars.bar(0), bars.bar(1)) else {
            return;
        };

        let committed = self.state.begin(event);
        let mut live = *self.state.live();

        let diff = bar.close - prev_bar.close;
        let step = Step {
            prev_close: prev_bar.close,
            gain: if diff > 0.0 { diff } else { 0.0 },
            loss: if diff < 0.0 { -diff } else { 0.0 },
            prev_upper: self.lines[0].value(1),
            prev_lower: self.lines[1].value(1),
            period: self.config.period,
        };

        let upper = step.solve(
            self.config.upper_level,
            committed.p_up,
            committed.n_up,
            step.prev_upper,
            &mut live,
        );
        let lower = step.solve(
            self.config.lower_level,
            committed.p_low,
            committed.n_low,
            step.prev_lower,
            &mut live,
        );

        self.state.store(live);
        self.lines[0].set(0, upper);
        self.lines[1].set(0, lower);
    }

    fn lines(&self) -> &[OutputSeries] {
        &self.lines
    }

    fn reset(&mut self) {
        self.state.reset(BandAccumulators::default());
        self.lines.iter_mut().for_each(OutputSeries::clear);
    }
}
