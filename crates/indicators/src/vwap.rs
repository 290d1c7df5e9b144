use crate::aggregation::{SessionVwap, StdCalculation, VwapSample};
use crate::session::{SessionClock, SessionMode};
use crate::{Indicator, IndicatorError};
use chartbands_core::{
    align_lines, BarEvent, BarSeries, ChangeOrigin, OutputSeries, PriceSource, Timeframe,
};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

pub const MAX_MULTIPLIER: f64 = 9999.0;

/// Output order: the VWAP, then an up/down pair per multiplier.
pub const LINE_NAMES: [&str; 9] = [
    "VWAP", "StdUp1", "StdDown1", "StdUp2", "StdDown2", "StdUp3", "StdDown3", "StdUp4",
    "StdDown4",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VwapConfig {
    pub session_mode: SessionMode,
    pub reset_period: Timeframe,
    pub use_custom_start_time: bool,
    /// Session start time of day (UTC), used when `use_custom_start_time` is set.
    pub custom_start_time: NaiveTime,
    pub source_price: PriceSource,
    pub std_calculation: StdCalculation,
    /// Band multipliers of the coefficient, innermost first.
    pub multipliers: [f64; 4],
}

impl Default for VwapConfig {
    fn default() -> Self {
        Self {
            session_mode: SessionMode::ByPeriod,
            reset_period: Timeframe::Daily,
            use_custom_start_time: false,
            custom_start_time: NaiveTime::MIN,
            source_price: PriceSource::Hlc3,
            std_calculation: StdCalculation::StandardDeviation,
            multipliers: [1.0, 2.0, 3.0, 4.0],
        }
    }
}

/// A setting that moves session boundaries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VwapSetting {
    ResetPeriod(Timeframe),
    UseCustomStartTime(bool),
    CustomStartTime(NaiveTime),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettingChange {
    pub setting: VwapSetting,
    pub origin: ChangeOrigin,
}

impl SettingChange {
    pub fn manual(setting: VwapSetting) -> Self {
        Self {
            setting,
            origin: ChangeOrigin::Manual,
        }
    }

    pub fn restore(setting: VwapSetting) -> Self {
        Self {
            setting,
            origin: ChangeOrigin::Restore,
        }
    }
}

impl VwapConfig {
    pub fn validate(&self) -> Result<(), IndicatorError> {
        for (i, m) in self.multipliers.iter().enumerate() {
            if !(0.0..=MAX_MULTIPLIER).contains(m) {
                return Err(IndicatorError::InvalidConfig(format!(
                    "band {} multiplier must be in 0..={MAX_MULTIPLIER}, got {m}",
                    i + 1
                )));
            }
        }
        Ok(())
    }

    pub fn clock(&self) -> SessionClock {
        let custom_start = self.use_custom_start_time.then_some(self.custom_start_time);
        SessionClock::new(self.session_mode, self.reset_period, custom_start)
    }

    /// Apply session settings. Returns true when a value was changed manually,
    /// meaning session history has to be recomputed; restored values only
    /// take effect on the next reset.
    pub fn apply(&mut self, changes: &[SettingChange]) -> bool {
        let mut needs_refresh = false;
        for change in changes {
            let changed = match change.setting {
                VwapSetting::ResetPeriod(period) => set_if_changed(&mut self.reset_period, period),
                VwapSetting::UseCustomStartTime(flag) => {
                    set_if_changed(&mut self.use_custom_start_time, flag)
                }
                VwapSetting::CustomStartTime(time) => set_if_changed(&mut self.custom_start_time, time),
            };
            needs_refresh |= changed && change.origin == ChangeOrigin::Manual;
        }
        needs_refresh
    }
}

fn set_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// Session VWAP with four pairs of standard-deviation bands.
#[derive(Debug, Clone)]
pub struct VwapBands {
    config: VwapConfig,
    aggregation: SessionVwap,
    lines: Vec<OutputSeries>,
}

impl VwapBands {
    pub fn new(config: VwapConfig) -> Result<Self, IndicatorError> {
        config.validate()?;
        let aggregation = aggregation_for(&config);
        Ok(Self {
            config,
            aggregation,
            lines: LINE_NAMES.iter().map(|name| OutputSeries::new(*name)).collect(),
        })
    }

    pub fn config(&self) -> &VwapConfig {
        &self.config
    }

    pub fn aggregation(&self) -> &SessionVwap {
        &self.aggregation
    }

    /// Apply session settings. When this returns true the indicator has been
    /// reset and the host must replay its history.
    pub fn apply_settings(&mut self, changes: &[SettingChange]) -> bool {
        let needs_refresh = self.config.apply(changes);
        if needs_refresh {
            self.reset();
        }
        needs_refresh
    }

    fn write(&mut self, sample: VwapSample) {
        self.lines[0].set(0, sample.vwap);
        for (k, mult) in self.config.multipliers.iter().enumerate() {
            let offset = mult * sample.coefficient;
            self.lines[1 + 2 * k].set(0, sample.vwap + offset);
            self.lines[2 + 2 * k].set(0, sample.vwap - offset);
        }
    }
}

fn aggregation_for(config: &VwapConfig) -> SessionVwap {
    SessionVwap::new(config.clock(), config.source_price, config.std_calculation)
}

impl Indicator for VwapBands {
    fn name(&self) -> &str {
        "VWAP"
    }

    fn short_name(&self) -> String {
        match self.config.session_mode {
            SessionMode::FullHistory => "VWAP (Full range)".to_string(),
            SessionMode::ByPeriod => format!("VWAP ({})", self.config.clock().step_period()),
        }
    }

    fn update(&mut self, bars: &BarSeries, event: BarEvent) {
        let Some(bar) = bars.bar(0) else {
            return;
        };
        align_lines(&mut self.lines, bars.len());
        let sample = self.aggregation.update(bar, event);
        self.write(sample);
    }

    fn lines(&self) -> &[OutputSeries] {
        &self.lines
    }

    fn reset(&mut self) {
        self.aggregation = aggregation_for(&self.config);
        self.lines.iter_mut().for_each(OutputSeries::clear);
    }
}
