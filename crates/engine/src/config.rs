use crate::HostError;
use chartbands_core::Timeframe;
use chartbands_indicators::atr;
use chartbands_indicators::rsi_bands::RsiBandsConfig;
use chartbands_indicators::vwap::VwapConfig;
use chartbands_indicators::IndicatorError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Chart setup read from TOML: the chart timeframe and the indicators to
/// attach, in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    pub chart: ChartSection,
    #[serde(default)]
    pub indicators: Vec<IndicatorConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSection {
    pub timeframe: Timeframe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorConfig {
    Atr {
        #[serde(default = "default_atr_period")]
        period: usize,
    },
    RsiBands {
        #[serde(flatten)]
        config: RsiBandsConfig,
        /// Compute on this coarser timeframe and project onto the chart.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_timeframe: Option<Timeframe>,
    },
    Vwap {
        #[serde(flatten)]
        config: VwapConfig,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_timeframe: Option<Timeframe>,
    },
}

fn default_atr_period() -> usize {
    atr::DEFAULT_PERIOD
}

impl IndicatorConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            IndicatorConfig::Atr { .. } => "atr",
            IndicatorConfig::RsiBands { .. } => "rsi_bands",
            IndicatorConfig::Vwap { .. } => "vwap",
        }
    }

    pub fn source_timeframe(&self) -> Option<Timeframe> {
        match self {
            IndicatorConfig::Atr { .. } => None,
            IndicatorConfig::RsiBands {
                source_timeframe, ..
            }
            | IndicatorConfig::Vwap {
                source_timeframe, ..
            } => *source_timeframe,
        }
    }

    /// Check parameter ranges and that any source timeframe is coarser than
    /// `chart`.
    pub fn validate(&self, chart: Timeframe) -> Result<(), IndicatorError> {
        match self {
            IndicatorConfig::Atr { period } => {
                if !(1..=atr::MAX_PERIOD).contains(period) {
                    return Err(IndicatorError::InvalidConfig(format!(
                        "ATR period must be in 1..={}, got {period}",
                        atr::MAX_PERIOD
                    )));
                }
            }
            IndicatorConfig::RsiBands { config, .. } => config.validate()?,
            IndicatorConfig::Vwap { config, .. } => config.validate()?,
        }
        match self.source_timeframe() {
            Some(requested) if !requested.is_coarser_than(&chart) => {
                Err(IndicatorError::NotCoarser { requested, chart })
            }
            _ => Ok(()),
        }
    }
}

impl ChartConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, HostError> {
        let config: ChartConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, HostError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            HostError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), HostError> {
        for indicator in &self.indicators {
            indicator.validate(self.chart.timeframe)?;
        }
        Ok(())
    }
}
