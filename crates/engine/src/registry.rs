use crate::config::IndicatorConfig;
use crate::HostError;
use chartbands_core::{SeriesProvider, SeriesRequest, Timeframe};
use chartbands_indicators::atr::Atr;
use chartbands_indicators::mtf::Projected;
use chartbands_indicators::rsi_bands::RsiBands;
use chartbands_indicators::vwap::VwapBands;
use chartbands_indicators::Indicator;
use chrono::{DateTime, Utc};

/// Indicator kinds this host can build, with a one-line description.
pub const AVAILABLE: &[(&str, &str)] = &[
    ("atr", "Average True Range (Wilder smoothing, 2-decimal display)"),
    ("rsi_bands", "RSI Bands: closes that would put the RSI at the upper/lower level"),
    ("vwap", "Session VWAP with four standard-deviation band pairs"),
];

/// Where an indicator is built: the chart timeframe, the provider for
/// secondary series and the time range they must cover.
pub struct BuildContext<'a> {
    pub chart: Timeframe,
    pub provider: &'a dyn SeriesProvider,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl BuildContext<'_> {
    fn request(&self, timeframe: Timeframe) -> SeriesRequest {
        SeriesRequest {
            timeframe,
            from: self.from,
            to: self.to,
        }
    }
}

/// Build the indicator described by `config`, wrapped in a multi-timeframe
/// projection when a source timeframe is set.
pub fn build(config: &IndicatorConfig, ctx: &BuildContext<'_>) -> Result<Box<dyn Indicator>, HostError> {
    config.validate(ctx.chart)?;
    let indicator: Box<dyn Indicator> = match config {
        IndicatorConfig::Atr { period } => Box::new(Atr::new(*period)?),
        IndicatorConfig::RsiBands {
            config,
            source_timeframe,
        } => {
            let bands = RsiBands::new(*config)?;
            match source_timeframe {
                Some(tf) => Box::new(Projected::new(bands, ctx.provider, ctx.chart, ctx.request(*tf))?),
                None => Box::new(bands),
            }
        }
        IndicatorConfig::Vwap {
            config,
            source_timeframe,
        } => {
            let vwap = VwapBands::new(config.clone())?;
            match source_timeframe {
                Some(tf) => Box::new(Projected::new(vwap, ctx.provider, ctx.chart, ctx.request(*tf))?),
                None => Box::new(vwap),
            }
        }
    };
    Ok(indicator)
}
