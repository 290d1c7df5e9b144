pub mod config;
pub mod host;
pub mod registry;
pub mod replay;

pub use config::{ChartConfig, IndicatorConfig};
pub use host::{ChartHost, SlotId};

use chartbands_core::DataError;
use chartbands_indicators::IndicatorError;

/// Errors raised by the reference host.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("No indicator attached in slot {0}")]
    UnknownSlot(usize),
    #[error("Indicator in slot {slot} is {found}, not {expected}")]
    WrongKind {
        slot: usize,
        expected: &'static str,
        found: &'static str,
    },
}
