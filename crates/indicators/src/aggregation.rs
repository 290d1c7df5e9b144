use crate::session::SessionClock;
use crate::state::Tiered;
use chartbands_core::{Bar, BarEvent, PriceSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the band coefficient is derived from the session sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdCalculation {
    /// Volume-weighted standard deviation of price around the VWAP.
    #[default]
    StandardDeviation,
    /// Root mean square of each bar's distance from the VWAP at that bar.
    VwapVariance,
}

/// Running sums for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionSums {
    /// Session the sums belong to (`None` for full history).
    pub session: Option<DateTime<Utc>>,
    pub price_volume: f64,
    pub volume: f64,
    pub price_sq_volume: f64,
    pub sq_deviation: f64,
    pub bars: usize,
}

/// VWAP and band coefficient for one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VwapSample {
    pub vwap: f64,
    pub coefficient: f64,
}

/// Session-scoped volume-weighted accumulation feeding the VWAP bands.
#[derive(Debug, Clone)]
pub struct SessionVwap {
    clock: SessionClock,
    source: PriceSource,
    calculation: StdCalculation,
    state: Tiered<SessionSums>,
}

impl SessionVwap {
    pub fn new(clock: SessionClock, source: PriceSource, calculation: StdCalculation) -> Self {
        Self {
            clock,
            source,
            calculation,
            state: Tiered::default(),
        }
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    /// Sums as of the last closed bar.
    pub fn committed(&self) -> &SessionSums {
        self.state.committed()
    }

    /// Sums including the current bar.
    pub fn live(&self) -> &SessionSums {
        self.state.live()
    }

    pub fn update(&mut self, bar: &Bar, event: BarEvent) -> VwapSample {
        let base = self.state.begin(event);
        let session = self.clock.session_start(bar.timestamp);
        let mut sums = if base.bars == 0 || base.session != session {
            SessionSums {
                session,
                ..SessionSums::default()
            }
        } else {
            base
        };

        let price = self.source.price(bar);
        sums.price_volume += price * bar.volume;
        sums.volume += bar.volume;
        sums.price_sq_volume += price * price * bar.volume;
        sums.bars += 1;

        let vwap = if sums.volume > 0.0 {
            sums.price_volume / sums.volume
        } else {
            price
        };
        let deviation = price - vwap;
        sums.sq_deviation += deviation * deviation;

        let coefficient = match self.calculation {
            StdCalculation::StandardDeviation if sums.volume > 0.0 => {
                (sums.price_sq_volume / sums.volume - vwap * vwap).max(0.0).sqrt()
            }
            StdCalculation::StandardDeviation => 0.0,
            StdCalculation::VwapVariance => (sums.sq_deviation / sums.bars as f64).sqrt(),
        };

        self.state.store(sums);
        VwapSample { vwap, coefficient }
    }

    pub fn reset(&mut self) {
        self.state.reset(SessionSums::default());
    }
}
