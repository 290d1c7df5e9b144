use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Market Data
// ---------------------------------------------------------------------------

/// A single OHLCV bar. `timestamp` marks the left edge of the bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// A bar opened by a single trade.
    pub fn from_trade(timestamp: DateTime<Utc>, price: f64, volume: f64) -> Self {
        Self::new(timestamp, price, price, price, price, volume)
    }

    /// Fold a trade into a still-forming bar.
    pub fn absorb(&mut self, price: f64, volume: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }

    /// Merge a later bar into this one, keeping this bar's open and timestamp.
    pub fn merge(&mut self, later: &Bar) {
        self.high = self.high.max(later.high);
        self.low = self.low.min(later.low);
        self.close = later.close;
        self.volume += later.volume;
    }
}

/// A single trade print, used by hosts that build bars live.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub volume: f64,
}

/// Which price of a bar feeds a price-weighted computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Close,
    Open,
    High,
    Low,
    /// (high + low) / 2
    Hl2,
    /// (high + low + close) / 3
    #[default]
    Hlc3,
    /// (open + high + low + close) / 4
    Ohlc4,
}

impl PriceSource {
    pub fn price(&self, bar: &Bar) -> f64 {
        match self {
            PriceSource::Close => bar.close,
            PriceSource::Open => bar.open,
            PriceSource::High => bar.high,
            PriceSource::Low => bar.low,
            PriceSource::Hl2 => (bar.high + bar.low) / 2.0,
            PriceSource::Hlc3 => (bar.high + bar.low + bar.close) / 3.0,
            PriceSource::Ohlc4 => (bar.open + bar.high + bar.low + bar.close) / 4.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Timeframe
// ---------------------------------------------------------------------------

/// Timeframe for bars and session periods.
///
/// Textual form is `<count><unit>`: `30s`, `5m`, `4h`, `1d`, `1w`, `1M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    Second(u32),
    Minute(u32),
    Hour(u32),
    Daily,
    Weekly,
    Monthly,
}

/// Error parsing a timeframe string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timeframe '{0}' (expected e.g. 30s, 5m, 1h, 1d, 1w, 1M)")]
pub struct ParseTimeframeError(pub String);

impl Timeframe {
    /// Nominal length of one bar. Months count as 30 days.
    pub fn nominal_duration(&self) -> Duration {
        match *self {
            Timeframe::Second(n) => Duration::seconds(i64::from(n)),
            Timeframe::Minute(n) => Duration::minutes(i64::from(n)),
            Timeframe::Hour(n) => Duration::hours(i64::from(n)),
            Timeframe::Daily => Duration::days(1),
            Timeframe::Weekly => Duration::weeks(1),
            Timeframe::Monthly => Duration::days(30),
        }
    }

    pub fn is_coarser_than(&self, other: &Timeframe) -> bool {
        self.nominal_duration() > other.nominal_duration()
    }

    /// Left edge of the bucket containing `ts`.
    ///
    /// Fixed-length timeframes are aligned to the Unix epoch, weeks start on
    /// Monday 00:00 UTC and months on the first day at 00:00 UTC.
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Timeframe::Weekly => {
                let date = ts.date_naive();
                let monday =
                    date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
                monday.and_time(NaiveTime::MIN).and_utc()
            }
            Timeframe::Monthly => {
                let date = ts.date_naive();
                let first = date.with_day(1).unwrap_or(date);
                first.and_time(NaiveTime::MIN).and_utc()
            }
            _ => {
                let step = self.nominal_duration().num_seconds();
                let floored = ts.timestamp().div_euclid(step) * step;
                DateTime::from_timestamp(floored, 0).unwrap_or(ts)
            }
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::Second(n) => write!(f, "{n}s"),
            Timeframe::Minute(n) => write!(f, "{n}m"),
            Timeframe::Hour(n) => write!(f, "{n}h"),
            Timeframe::Daily => f.write_str("1d"),
            Timeframe::Weekly => f.write_str("1w"),
            Timeframe::Monthly => f.write_str("1M"),
        }
    }
}

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeframeError(s.to_string());
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(err)?;
        let (count, unit) = s.split_at(split);
        let count: u32 = if count.is_empty() {
            1
        } else {
            count.parse().map_err(|_| err())?
        };
        if count == 0 {
            return Err(err());
        }

        match (unit, count) {
            ("s", n) => Ok(Timeframe::Second(n)),
            ("m", n) => Ok(Timeframe::Minute(n)),
            ("h", n) => Ok(Timeframe::Hour(n)),
            ("d", 1) => Ok(Timeframe::Daily),
            ("w", 1) => Ok(Timeframe::Weekly),
            ("M", 1) => Ok(Timeframe::Monthly),
            _ => Err(err()),
        }
    }
}

impl TryFrom<String> for Timeframe {
    type Error = ParseTimeframeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}
