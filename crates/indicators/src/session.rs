use chartbands_core::Timeframe;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// How session-scoped accumulation is windowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Reset at every boundary of the reset period.
    #[default]
    ByPeriod,
    /// One session over the whole loaded range.
    FullHistory,
}

/// Maps timestamps to the session they belong to.
///
/// In `ByPeriod` mode sessions are buckets of `period`, shifted by the custom
/// start time of day when one is set:
/// `start(ts) = bucket_start(ts - offset) + offset`. All times are UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClock {
    mode: SessionMode,
    period: Timeframe,
    offset: Duration,
}

impl SessionClock {
    pub fn new(mode: SessionMode, period: Timeframe, custom_start: Option<NaiveTime>) -> Self {
        let offset = custom_start
            .map(|t| t.signed_duration_since(NaiveTime::MIN))
            .unwrap_or_else(Duration::zero);
        Self {
            mode,
            period,
            offset,
        }
    }

    pub fn full_history() -> Self {
        Self::new(SessionMode::FullHistory, Timeframe::Daily, None)
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// The period sessions step by; full-history sessions report daily.
    pub fn step_period(&self) -> Timeframe {
        match self.mode {
            SessionMode::FullHistory => Timeframe::Daily,
            SessionMode::ByPeriod => self.period,
        }
    }

    /// Start of the session containing `ts`, or `None` when a single session
    /// spans all history.
    pub fn session_start(&self, ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.mode {
            SessionMode::FullHistory => None,
            SessionMode::ByPeriod => Some(self.period.bucket_start(ts - self.offset) + self.offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap()
    }

    #[test]
    fn test_daily_sessions_reset_at_midnight() {
        let clock = SessionClock::new(SessionMode::ByPeriod, Timeframe::Daily, None);
        assert_eq!(clock.session_start(ts(5, 15, 0)), Some(ts(5, 0, 0)));
        assert_eq!(clock.session_start(ts(5, 23, 59)), Some(ts(5, 0, 0)));
        assert_eq!(clock.session_start(ts(6, 0, 0)), Some(ts(6, 0, 0)));
    }

    #[test]
    fn test_custom_start_time_shifts_sessions() {
        let start = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let clock = SessionClock::new(SessionMode::ByPeriod, Timeframe::Daily, Some(start));
        assert_eq!(clock.session_start(ts(5, 9, 30)), Some(ts(5, 9, 30)));
        assert_eq!(clock.session_start(ts(5, 9, 29)), Some(ts(4, 9, 30)));
        assert_eq!(clock.session_start(ts(6, 2, 0)), Some(ts(5, 9, 30)));
    }

    #[test]
    fn test_intraday_reset_period() {
        let clock = SessionClock::new(SessionMode::ByPeriod, Timeframe::Hour(4), None);
        assert_eq!(clock.session_start(ts(5, 7, 15)), Some(ts(5, 4, 0)));
    }

    #[test]
    fn test_full_history_never_crosses() {
        let clock = SessionClock::full_history();
        assert_eq!(clock.session_start(ts(5, 7, 15)), None);
        assert_eq!(clock.session_start(ts(28, 0, 0)), None);
        assert_eq!(clock.step_period(), Timeframe::Daily);
    }
}
