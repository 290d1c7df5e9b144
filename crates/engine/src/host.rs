use crate::config::IndicatorConfig;
use crate::registry::{self, BuildContext};
use crate::HostError;
use chartbands_core::{Bar, BarEvent, BarSeries, SeriesProvider, Tick, Timeframe};
use chartbands_indicators::vwap::SettingChange;
use chartbands_indicators::Indicator;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Handle to an attached indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

struct Slot {
    id: SlotId,
    config: IndicatorConfig,
    indicator: Box<dyn Indicator>,
}

/// A minimal chart: owns the bar series, builds bars from ticks and drives
/// every attached indicator with the matching [`BarEvent`].
pub struct ChartHost {
    bars: BarSeries,
    provider: Box<dyn SeriesProvider>,
    slots: Vec<Slot>,
    next_id: usize,
}

impl ChartHost {
    pub fn new(timeframe: Timeframe, provider: Box<dyn SeriesProvider>) -> Self {
        Self {
            bars: BarSeries::new(timeframe),
            provider,
            slots: Vec::new(),
            next_id: 0,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.bars.timeframe()
    }

    pub fn bars(&self) -> &BarSeries {
        &self.bars
    }

    /// Build an indicator and bring it up to date with the loaded history.
    pub fn attach(&mut self, config: IndicatorConfig) -> Result<SlotId, HostError> {
        let indicator = self.build(&config)?;
        let id = SlotId(self.next_id);
        self.next_id += 1;
        info!(
            slot = id.0,
            kind = config.kind(),
            indicator = %indicator.short_name(),
            bars = self.bars.len(),
            "Attached indicator"
        );
        self.slots.push(Slot {
            id,
            config,
            indicator,
        });
        Ok(id)
    }

    /// Remove an indicator, releasing everything it owns.
    pub fn detach(&mut self, id: SlotId) -> Result<(), HostError> {
        let index = self.index_of(id)?;
        let slot = self.slots.remove(index);
        debug!(slot = id.0, indicator = %slot.indicator.short_name(), "Detached indicator");
        Ok(())
    }

    /// Detach every indicator.
    pub fn teardown(&mut self) {
        debug!(indicators = self.slots.len(), "Tearing down chart");
        self.slots.clear();
    }

    pub fn indicator(&self, id: SlotId) -> Result<&dyn Indicator, HostError> {
        let index = self.index_of(id)?;
        Ok(self.slots[index].indicator.as_ref())
    }

    pub fn config(&self, id: SlotId) -> Result<&IndicatorConfig, HostError> {
        let index = self.index_of(id)?;
        Ok(&self.slots[index].config)
    }

    /// Attached indicators in attach order.
    pub fn indicators(&self) -> impl Iterator<Item = (SlotId, &dyn Indicator)> + '_ {
        self.slots.iter().map(|s| (s.id, s.indicator.as_ref()))
    }

    /// Append closed bars and feed each to every indicator as history.
    pub fn load_history(&mut self, bars: impl IntoIterator<Item = Bar>) -> usize {
        let mut loaded = 0;
        for bar in bars {
            if let Some(last) = self.bars.last() {
                if bar.timestamp <= last.timestamp {
                    warn!(timestamp = %bar.timestamp, last = %last.timestamp, "Dropping out-of-order history bar");
                    continue;
                }
            }
            self.bars.push(bar);
            self.dispatch(BarEvent::HistoricalBar);
            loaded += 1;
        }
        info!(loaded, total = self.bars.len(), "Loaded history");
        loaded
    }

    /// Fold a trade print into the series. A print in a new bucket opens a
    /// bar (`NewBar`); otherwise it updates the forming bar (`NewTick`).
    /// Prints older than the forming bar are dropped and return `None`.
    pub fn on_tick(&mut self, tick: Tick) -> Option<BarEvent> {
        let bucket = self.timeframe().bucket_start(tick.timestamp);
        let forming = self.bars.last().map(|b| b.timestamp);
        let event = match forming {
            Some(forming) if tick.timestamp < forming => {
                warn!(timestamp = %tick.timestamp, %forming, "Dropping out-of-order tick");
                return None;
            }
            Some(forming) if bucket <= forming => {
                if let Some(last) = self.bars.last_mut() {
                    last.absorb(tick.price, tick.volume);
                }
                BarEvent::NewTick
            }
            _ => {
                self.bars
                    .push(Bar::from_trade(bucket, tick.price, tick.volume));
                BarEvent::NewBar
            }
        };
        self.dispatch(event);
        Some(event)
    }

    /// Apply VWAP session settings to an attached VWAP indicator.
    ///
    /// A manual change that alters a value rebuilds the indicator and replays
    /// the loaded history; restored values are kept for the next rebuild.
    /// Returns whether a refresh happened.
    pub fn apply_vwap_settings(
        &mut self,
        id: SlotId,
        changes: &[SettingChange],
    ) -> Result<bool, HostError> {
        let index = self.index_of(id)?;
        let config = match &mut self.slots[index].config {
            IndicatorConfig::Vwap { config, .. } => config,
            other => {
                return Err(HostError::WrongKind {
                    slot: id.0,
                    expected: "vwap",
                    found: other.kind(),
                })
            }
        };
        if !config.apply(changes) {
            return Ok(false);
        }

        let config = self.slots[index].config.clone();
        let indicator = self.build(&config)?;
        self.slots[index].indicator = indicator;
        info!(
            slot = id.0,
            indicator = %self.slots[index].indicator.short_name(),
            bars = self.bars.len(),
            "Settings changed, recomputed history"
        );
        Ok(true)
    }

    fn index_of(&self, id: SlotId) -> Result<usize, HostError> {
        self.slots
            .iter()
            .position(|s| s.id == id)
            .ok_or(HostError::UnknownSlot(id.0))
    }

    fn dispatch(&mut self, event: BarEvent) {
        for slot in &mut self.slots {
            slot.indicator.update(&self.bars, event);
        }
    }

    /// Build from `config` and replay the loaded bars as history.
    fn build(&self, config: &IndicatorConfig) -> Result<Box<dyn Indicator>, HostError> {
        let ctx = BuildContext {
            chart: self.timeframe(),
            provider: self.provider.as_ref(),
            from: self.bars.first().map_or(DateTime::<Utc>::UNIX_EPOCH, |b| b.timestamp),
            to: DateTime::<Utc>::MAX_UTC,
        };
        let mut indicator = registry::build(config, &ctx)?;

        let mut replay = BarSeries::new(self.timeframe());
        for bar in self.bars.iter() {
            replay.push(*bar);
            indicator.update(&replay, BarEvent::HistoricalBar);
        }
        Ok(indicator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::bar_to_ticks;
    use chartbands_core::DataError;
    use chartbands_data::HistoryProvider;
    use chartbands_indicators::rsi_bands::RsiBandsConfig;
    use chartbands_indicators::vwap::{VwapConfig, VwapSetting};
    use chrono::{Duration, NaiveTime, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()
    }

    fn bars(n: i64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let px = 100.0 + (i as f64 * 0.4).sin() * 3.0;
                Bar::new(
                    start() + Duration::minutes(30 * i),
                    px,
                    px + 0.6,
                    px - 0.5,
                    px + 0.2,
                    10.0 + (i % 5) as f64,
                )
            })
            .collect()
    }

    fn host(all: &[Bar]) -> ChartHost {
        let provider = HistoryProvider::new(BarSeries::from_bars(Timeframe::Minute(30), all.to_vec()));
        ChartHost::new(Timeframe::Minute(30), Box::new(provider))
    }

    struct NoData;

    impl SeriesProvider for NoData {
        fn request(&self, _request: &chartbands_core::SeriesRequest) -> Result<BarSeries, DataError> {
            Err(DataError::NotFound("no secondary data".into()))
        }
    }

    #[test]
    fn test_attach_replays_history() {
        let all = bars(40);
        let mut host = host(&all);
        host.load_history(all.clone());
        let id = host.attach(IndicatorConfig::Atr { period: 14 }).unwrap();
        let atr = host.indicator(id).unwrap();
        assert_eq!(atr.lines()[0].len(), 40);
        assert!(atr.is_ready());
    }

    #[test]
    fn test_ticks_build_bars_and_match_history() {
        let all = bars(30);
        let config = IndicatorConfig::RsiBands {
            config: RsiBandsConfig::default(),
            source_timeframe: None,
        };

        let mut historical = host(&all);
        historical.load_history(all.clone());
        let expected = historical.attach(config.clone()).unwrap();

        let mut live = host(&all);
        live.load_history(all[..20].iter().copied());
        let id = live.attach(config).unwrap();
        let mut events = Vec::new();
        for bar in &all[20..] {
            for tick in bar_to_ticks(bar) {
                events.push(live.on_tick(tick).unwrap());
            }
        }

        assert_eq!(live.bars().len(), 30);
        assert_eq!(live.bars().bars(), historical.bars().bars());
        assert_eq!(events.iter().filter(|e| **e == BarEvent::NewBar).count(), 10);

        let got = live.indicator(id).unwrap().lines();
        let want = historical.indicator(expected).unwrap().lines();
        for (g, w) in got.iter().zip(want) {
            for pos in 0..30 {
                let (a, b) = (g.at(pos), w.at(pos));
                assert!((a.is_nan() && b.is_nan()) || (a - b).abs() < 1e-9, "{pos}: {a} vs {b}");
            }
        }
    }

    fn assert_same_lines(got: &[chartbands_core::OutputSeries], want: &[chartbands_core::OutputSeries]) {
        assert_eq!(got.len(), want.len());
        for (g, w) in got.iter().zip(want) {
            assert_eq!(g.len(), w.len());
            for pos in 0..g.len() {
                let (a, b) = (g.at(pos), w.at(pos));
                assert!(
                    (a.is_nan() && b.is_nan()) || (a - b).abs() < 1e-9,
                    "{} at {pos}: {a} vs {b}",
                    g.name()
                );
            }
        }
    }

    #[test]
    fn test_projected_vwap_live_matches_history() {
        let all = bars(40);
        let config = IndicatorConfig::Vwap {
            config: VwapConfig::default(),
            source_timeframe: Some(Timeframe::Hour(2)),
        };

        let mut historical = host(&all);
        historical.load_history(all.clone());
        let expected = historical.attach(config.clone()).unwrap();

        // Secondary bars exist only for the history; the rest arrives as ticks.
        let mut live = host(&all[..20]);
        live.load_history(all[..20].iter().copied());
        let id = live.attach(config).unwrap();
        for bar in &all[20..] {
            for tick in bar_to_ticks(bar) {
                live.on_tick(tick).unwrap();
            }
        }

        let got = live.indicator(id).unwrap().lines();
        assert_eq!(got[0].len(), 40);
        assert!(!got[0].at(39).is_nan());
        assert_same_lines(got, historical.indicator(expected).unwrap().lines());
    }

    #[test]
    fn test_projected_rsi_bands_follow_forming_bar() {
        let all = bars(40);
        let config = IndicatorConfig::RsiBands {
            config: RsiBandsConfig::default(),
            source_timeframe: Some(Timeframe::Hour(1)),
        };

        let mut historical = host(&all);
        historical.load_history(all.clone());
        let expected = historical.attach(config.clone()).unwrap();

        let mut live = host(&all[..30]);
        live.load_history(all[..30].iter().copied());
        let id = live.attach(config).unwrap();
        let mut seen = Vec::new();
        for bar in &all[30..] {
            for tick in bar_to_ticks(bar) {
                live.on_tick(tick).unwrap();
            }
            seen.push(live.indicator(id).unwrap().lines()[0].value(0));
        }

        // Past the served series the projection keeps moving.
        assert!(seen.iter().all(|v| !v.is_nan()));
        assert!(seen.windows(2).any(|pair| pair[0] != pair[1]));
        assert_same_lines(
            live.indicator(id).unwrap().lines(),
            historical.indicator(expected).unwrap().lines(),
        );
    }

    #[test]
    fn test_out_of_order_tick_is_dropped() {
        let all = bars(5);
        let mut host = host(&all);
        host.load_history(all.clone());
        let stale = Tick {
            timestamp: all[3].timestamp,
            price: 1.0,
            volume: 1.0,
        };
        assert_eq!(host.on_tick(stale), None);
        assert_eq!(host.bars().last(), all.last());
    }

    #[test]
    fn test_detach_and_teardown() {
        let all = bars(10);
        let mut host = host(&all);
        host.load_history(all.clone());
        let a = host.attach(IndicatorConfig::Atr { period: 5 }).unwrap();
        let b = host
            .attach(IndicatorConfig::Vwap {
                config: VwapConfig::default(),
                source_timeframe: None,
            })
            .unwrap();
        host.detach(a).unwrap();
        assert!(matches!(host.detach(a), Err(HostError::UnknownSlot(_))));
        assert_eq!(host.indicators().map(|(id, _)| id).collect::<Vec<_>>(), vec![b]);
        host.teardown();
        assert_eq!(host.indicators().count(), 0);
    }

    #[test]
    fn test_manual_vwap_change_recomputes() {
        let all = bars(60);
        let mut host = host(&all);
        host.load_history(all.clone());
        let id = host
            .attach(IndicatorConfig::Vwap {
                config: VwapConfig::default(),
                source_timeframe: None,
            })
            .unwrap();
        let before = host.indicator(id).unwrap().lines()[0].clone();

        let restored = [SettingChange::restore(VwapSetting::UseCustomStartTime(true))];
        assert!(!host.apply_vwap_settings(id, &restored).unwrap());
        assert_eq!(host.indicator(id).unwrap().lines()[0], before);

        let start_time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let manual = [SettingChange::manual(VwapSetting::CustomStartTime(start_time))];
        assert!(host.apply_vwap_settings(id, &manual).unwrap());

        let after = &host.indicator(id).unwrap().lines()[0];
        assert_eq!(after.len(), 60);
        // Sessions now start at 09:30, so 09:30 resets and midnight does not.
        let price = chartbands_core::PriceSource::Hlc3.price(&all[19]);
        assert!((after.at(19) - price).abs() < 1e-9);
        assert!((after.at(48) - before.at(48)).abs() > 1e-12);
    }

    #[test]
    fn test_vwap_settings_on_other_kind_fail() {
        let all = bars(5);
        let mut host = host(&all);
        let id = host.attach(IndicatorConfig::Atr { period: 3 }).unwrap();
        let change = [SettingChange::manual(VwapSetting::UseCustomStartTime(true))];
        assert!(matches!(
            host.apply_vwap_settings(id, &change),
            Err(HostError::WrongKind { found: "atr", .. })
        ));
    }

    #[test]
    fn test_failed_secondary_request_fails_attach() {
        let mut host = ChartHost::new(Timeframe::Minute(30), Box::new(NoData));
        host.load_history(bars(10));
        let err = host
            .attach(IndicatorConfig::Vwap {
                config: VwapConfig::default(),
                source_timeframe: Some(Timeframe::Hour(4)),
            })
            .err()
            .unwrap();
        assert!(matches!(err, HostError::Indicator(_)));
    }
}
