//! Multi-timeframe projection.
//!
//! A [`Projected`] indicator runs a nested indicator on a coarser series
//! obtained from a [`SeriesProvider`] and maps its outputs onto the chart's
//! finer bars:
//!
//! * a fine bar that starts exactly on a coarse bar copies the coarse outputs
//!   verbatim, and the fine bars since the previous coarse bar are
//!   re-interpolated between the two coarse samples by bar position;
//! * any other fine bar interpolates towards the next coarse sample by how
//!   many fine bars into the coarse bar it sits;
//! * fine bars inside the last coarse bar show that bar's outputs.
//!
//! Fine bars past the end of the served series are merged into coarse bars
//! of their own, so the nested indicator keeps running live: a new coarse
//! bucket reaches it as [`BarEvent::NewBar`], a change to the forming one as
//! [`BarEvent::NewTick`].

use crate::{Indicator, IndicatorError};
use chartbands_core::{
    align_lines, Bar, BarEvent, BarSeries, OutputSeries, SeriesProvider, SeriesRequest,
    Timeframe,
};
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

/// Linear interpolation from `a` (fraction 0) to `b` (fraction 1), clamped
/// to the pair. `NaN` if either sample is missing.
pub fn interpolate(a: f64, b: f64, fraction: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    let value = a + (b - a) * fraction;
    value.clamp(a.min(b), a.max(b))
}

/// First position in `bars` whose timestamp is at or after `ts`.
fn first_at_or_after(bars: &BarSeries, ts: DateTime<Utc>) -> usize {
    match bars.position_at_or_before(ts) {
        Some(pos) if bars.at(pos).is_some_and(|bar| bar.timestamp == ts) => pos,
        Some(pos) => pos + 1,
        None => 0,
    }
}

/// An indicator computed on a coarser timeframe and projected onto the chart.
#[derive(Debug)]
pub struct Projected<I> {
    nested: I,
    /// Coarse bars as served at construction.
    served: BarSeries,
    /// `served` plus the coarse bars built from later chart bars.
    coarse: BarSeries,
    lines: Vec<OutputSeries>,
}

impl<I: Indicator> Projected<I> {
    /// Request the coarse series and compute `nested` over all of it.
    ///
    /// Fails if `request.timeframe` is not coarser than `chart` or the
    /// provider cannot supply the series.
    pub fn new(
        nested: I,
        provider: &dyn SeriesProvider,
        chart: Timeframe,
        request: SeriesRequest,
    ) -> Result<Self, IndicatorError> {
        if !request.timeframe.is_coarser_than(&chart) {
            return Err(IndicatorError::NotCoarser {
                requested: request.timeframe,
                chart,
            });
        }
        let served = provider.request(&request)?;
        let lines = nested
            .lines()
            .iter()
            .map(|line| OutputSeries::new(line.name()))
            .collect();
        let mut projected = Self {
            nested,
            coarse: served.clone(),
            served,
            lines,
        };
        projected.replay();
        debug!(
            indicator = %projected.nested.short_name(),
            timeframe = %projected.coarse.timeframe(),
            coarse_bars = projected.coarse.len(),
            "Computed nested indicator on coarse series"
        );
        Ok(projected)
    }

    /// Recompute the nested indicator over the coarse series from scratch.
    fn replay(&mut self) {
        self.nested.reset();
        let mut replay = BarSeries::new(self.coarse.timeframe());
        for bar in self.coarse.iter() {
            replay.push(*bar);
            self.nested.update(&replay, BarEvent::HistoricalBar);
        }
    }

    /// Fold the chart's newest bar into the coarse series and pass the
    /// change on to the nested indicator.
    fn extend_coarse(&mut self, bars: &BarSeries, bar: &Bar, event: BarEvent) {
        let bucket = self.coarse.timeframe().bucket_start(bar.timestamp);
        match self.coarse.last().map(|last| last.timestamp) {
            Some(last) if bucket < last => {}
            Some(last) if bucket == last => {
                let in_bucket = &bars.bars()[first_at_or_after(bars, bucket)..];
                let Some((first, rest)) = in_bucket.split_first() else {
                    return;
                };
                let mut rebuilt = Bar {
                    timestamp: bucket,
                    ..*first
                };
                rest.iter().for_each(|fine| rebuilt.merge(fine));
                if let Some(forming) = self.coarse.last_mut() {
                    *forming = rebuilt;
                }
                self.nested.update(&self.coarse, BarEvent::NewTick);
            }
            _ => {
                self.coarse.push(Bar {
                    timestamp: bucket,
                    ..*bar
                });
                let event = match event {
                    BarEvent::HistoricalBar => BarEvent::HistoricalBar,
                    _ => BarEvent::NewBar,
                };
                trace!(bucket = %bucket, "Opened coarse bar from chart bars");
                self.nested.update(&self.coarse, event);
            }
        }
    }

    /// Fine bars the chart expects per coarse bar.
    fn bars_per_coarse(&self, chart: Timeframe) -> f64 {
        let coarse = self.coarse.timeframe().nominal_duration().num_milliseconds() as f64;
        let fine = chart.nominal_duration().num_milliseconds() as f64;
        (coarse / fine).max(1.0)
    }

    fn copy(&mut self, position: usize, coarse_pos: usize) {
        for (line, source) in self.lines.iter_mut().zip(self.nested.lines()) {
            line.set_at(position, source.at(coarse_pos));
        }
    }

    /// Re-interpolate the fine bars strictly between the previous coarse
    /// bar's fine position and `boundary`.
    fn backfill(&mut self, bars: &BarSeries, boundary: usize, coarse_pos: usize) {
        let anchor = coarse_pos
            .checked_sub(1)
            .and_then(|prev| self.coarse.at(prev))
            .and_then(|prev| bars.position_at_or_before(prev.timestamp));
        let Some(anchor) = anchor.filter(|&anchor| anchor < boundary) else {
            return;
        };
        let steps = (boundary - anchor) as f64;
        for (line, source) in self.lines.iter_mut().zip(self.nested.lines()) {
            let a = source.at(coarse_pos - 1);
            let b = source.at(coarse_pos);
            for j in anchor + 1..boundary {
                line.set_at(j, interpolate(a, b, (j - anchor) as f64 / steps));
            }
        }
    }

    fn between(&mut self, position: usize, coarse_pos: usize, fraction: f64) {
        for (line, source) in self.lines.iter_mut().zip(self.nested.lines()) {
            let value = interpolate(source.at(coarse_pos), source.at(coarse_pos + 1), fraction);
            line.set_at(position, value);
        }
    }
}

impl<I: Indicator> Indicator for Projected<I> {
    fn name(&self) -> &str {
        self.nested.name()
    }

    fn short_name(&self) -> String {
        format!("{} [{}]", self.nested.short_name(), self.coarse.timeframe())
    }

    fn update(&mut self, bars: &BarSeries, event: BarEvent) {
        let (Some(position), Some(bar)) = (bars.current_position(), bars.last()) else {
            return;
        };
        align_lines(&mut self.lines, bars.len());
        self.extend_coarse(bars, bar, event);

        let Some(coarse_pos) = self.coarse.position_at_or_before(bar.timestamp) else {
            trace!(timestamp = %bar.timestamp, "No coarse bar yet, skipping");
            return;
        };
        let Some(coarse_start) = self.coarse.at(coarse_pos).map(|c| c.timestamp) else {
            return;
        };
        let boundary = bars
            .position_at_or_before(coarse_start)
            .filter(|&pos| bars.at(pos).is_some_and(|b| b.timestamp == coarse_start));

        if coarse_pos + 1 < self.coarse.len() {
            if boundary == Some(position) {
                self.copy(position, coarse_pos);
                self.backfill(bars, position, coarse_pos);
            } else {
                let offset = match bars.position_at_or_before(coarse_start) {
                    Some(anchor) => position - anchor,
                    None => position + 1,
                };
                let fraction = offset as f64 / self.bars_per_coarse(bars.timeframe());
                self.between(position, coarse_pos, fraction);
            }
            return;
        }

        // The last coarse bar may still be changing: refresh every fine bar
        // that depends on it.
        for pos in first_at_or_after(bars, coarse_start)..=position {
            self.copy(pos, coarse_pos);
        }
        if let Some(boundary) = boundary {
            self.backfill(bars, boundary, coarse_pos);
        }
    }

    fn lines(&self) -> &[OutputSeries] {
        &self.lines
    }

    fn reset(&mut self) {
        self.coarse = self.served.clone();
        self.replay();
        self.lines.iter_mut().for_each(OutputSeries::clear);
    }

    fn min_history(&self) -> usize {
        self.nested.min_history()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rsi_bands::{RsiBands, RsiBandsConfig};
    use crate::vwap::{VwapBands, VwapConfig};
    use chartbands_core::{Bar, DataError};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    /// Serves a fixed coarse series.
    struct FixedProvider(BarSeries);

    impl SeriesProvider for FixedProvider {
        fn request(&self, _request: &SeriesRequest) -> Result<BarSeries, DataError> {
            Ok(self.0.clone())
        }
    }

    struct FailingProvider;

    impl SeriesProvider for FailingProvider {
        fn request(&self, request: &SeriesRequest) -> Result<BarSeries, DataError> {
            Err(DataError::NotFound(format!("{}", request.timeframe)))
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap()
    }

    /// 5-minute bars, optionally starting late.
    fn fine_bars(n: i64, offset: i64) -> Vec<Bar> {
        (offset..offset + n)
            .map(|i| {
                let px = 100.0 + (i as f64 * 0.7).sin() * 2.0 + i as f64 * 0.05;
                Bar::new(
                    start() + Duration::minutes(5 * i),
                    px,
                    px + 0.3,
                    px - 0.25,
                    px + 0.1,
                    50.0 + (i % 4) as f64 * 10.0,
                )
            })
            .collect()
    }

    /// Merge every `k` fine bars into one coarse bar.
    fn resample(fine: &[Bar], k: usize) -> BarSeries {
        let bars = fine
            .chunks(k)
            .map(|chunk| {
                let mut coarse = chunk[0];
                chunk[1..].iter().for_each(|b| coarse.merge(b));
                coarse
            })
            .collect();
        BarSeries::from_bars(Timeframe::Minute(5 * k as u32), bars)
    }

    fn request(tf: Timeframe) -> SeriesRequest {
        SeriesRequest {
            timeframe: tf,
            from: start(),
            to: start() + Duration::days(1),
        }
    }

    fn project<I: Indicator>(projected: &mut Projected<I>, fine: &[Bar]) -> BarSeries {
        let mut series = BarSeries::new(Timeframe::Minute(5));
        for b in fine {
            series.push(*b);
            projected.update(&series, BarEvent::HistoricalBar);
        }
        series
    }

    #[test]
    fn test_interpolate_is_bounded() {
        assert_eq!(interpolate(1.0, 3.0, 0.5), 2.0);
        assert_eq!(interpolate(3.0, 1.0, 0.25), 2.5);
        assert_eq!(interpolate(0.1, 0.7, 1.0), 0.7);
        assert!(interpolate(f64::NAN, 1.0, 0.5).is_nan());
    }

    #[test]
    fn test_boundary_exactness() {
        let fine = fine_bars(60, 0);
        let coarse = resample(&fine, 3);
        let nested = RsiBands::new(RsiBandsConfig::default()).unwrap();
        let provider = FixedProvider(coarse.clone());
        let mut projected =
            Projected::new(nested, &provider, Timeframe::Minute(5), request(Timeframe::Minute(15)))
                .unwrap();
        project(&mut projected, &fine);

        let nested_lines = projected.nested.lines();
        for (pos, bar) in fine.iter().enumerate() {
            let Some(c) = coarse.position_at_or_before(bar.timestamp) else {
                continue;
            };
            if coarse.at(c).unwrap().timestamp == bar.timestamp {
                for (line, source) in projected.lines().iter().zip(nested_lines) {
                    let expected = source.at(c);
                    let got = line.at(pos);
                    assert!(
                        (expected.is_nan() && got.is_nan()) || expected == got,
                        "boundary mismatch at {pos}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_interpolation_bounds() {
        let fine = fine_bars(90, 0);
        let coarse = resample(&fine, 6);
        let nested = VwapBands::new(VwapConfig::default()).unwrap();
        let provider = FixedProvider(coarse.clone());
        let mut projected =
            Projected::new(nested, &provider, Timeframe::Minute(5), request(Timeframe::Minute(30)))
                .unwrap();
        project(&mut projected, &fine);
        assert_eq!(projected.lines().len(), 9);

        let nested_lines = projected.nested.lines();
        for (pos, bar) in fine.iter().enumerate() {
            let c = coarse.position_at_or_before(bar.timestamp).unwrap();
            if coarse.at(c).unwrap().timestamp == bar.timestamp || c + 1 >= coarse.len() {
                continue;
            }
            for (line, source) in projected.lines().iter().zip(nested_lines) {
                let (a, b) = (source.at(c), source.at(c + 1));
                let v = line.at(pos);
                assert!(v >= a.min(b) && v <= a.max(b), "{v} outside [{a}, {b}]");
            }
        }
    }

    #[test]
    fn test_backfill_spreads_evenly_between_boundaries() {
        let fine = fine_bars(12, 0);
        let coarse = resample(&fine, 4);
        let nested = VwapBands::new(VwapConfig::default()).unwrap();
        let provider = FixedProvider(coarse);
        let mut projected =
            Projected::new(nested, &provider, Timeframe::Minute(5), request(Timeframe::Minute(20)))
                .unwrap();
        project(&mut projected, &fine);

        let vwap = &projected.lines()[0];
        let a = projected.nested.lines()[0].at(1);
        let b = projected.nested.lines()[0].at(2);
        // Fine bars 4 and 8 sit on coarse boundaries; 5..7 lie between.
        assert_eq!(vwap.at(4), a);
        assert_eq!(vwap.at(8), b);
        for (j, fraction) in [(5, 0.25), (6, 0.5), (7, 0.75)] {
            assert!((vwap.at(j) - (a + (b - a) * fraction)).abs() < 1e-9);
        }
    }

    fn assert_lines_match(got: &[OutputSeries], want: &[OutputSeries]) {
        assert_eq!(got.len(), want.len());
        for (g, w) in got.iter().zip(want) {
            assert_eq!(g.len(), w.len(), "{}", g.name());
            for pos in 0..g.len() {
                let (x, y) = (g.at(pos), w.at(pos));
                assert!(
                    (x.is_nan() && y.is_nan()) || (x - y).abs() < 1e-9,
                    "{} at {pos}: {x} vs {y}",
                    g.name()
                );
            }
        }
    }

    #[test]
    fn test_live_bars_extend_coarse_series() {
        let fine = fine_bars(12, 0);
        // Served coarse data stops after the first 8 fine bars.
        let provider = FixedProvider(resample(&fine[..8], 4));
        let nested = VwapBands::new(VwapConfig::default()).unwrap();
        let mut live =
            Projected::new(nested, &provider, Timeframe::Minute(5), request(Timeframe::Minute(20)))
                .unwrap();
        let mut series = BarSeries::new(Timeframe::Minute(5));
        for (i, b) in fine.iter().enumerate() {
            series.push(*b);
            let event = if i < 8 { BarEvent::HistoricalBar } else { BarEvent::NewBar };
            live.update(&series, event);
        }

        let full = resample(&fine, 4);
        assert_eq!(live.coarse.len(), 3);
        assert_eq!(live.coarse.at(2), full.at(2));
        let forming = live.nested.lines()[0].at(2);
        assert!(!forming.is_nan());
        for pos in 8..12 {
            assert_eq!(live.lines()[0].at(pos), forming);
        }

        let nested = VwapBands::new(VwapConfig::default()).unwrap();
        let mut reference = Projected::new(
            nested,
            &FixedProvider(full),
            Timeframe::Minute(5),
            request(Timeframe::Minute(20)),
        )
        .unwrap();
        project(&mut reference, &fine);
        assert_lines_match(live.lines(), reference.lines());
    }

    #[test]
    fn test_tick_rewrites_forming_coarse_bar() {
        let fine = fine_bars(9, 0);
        let provider = FixedProvider(resample(&fine[..8], 4));
        let nested = RsiBands::new(RsiBandsConfig::default()).unwrap();
        let mut projected =
            Projected::new(nested, &provider, Timeframe::Minute(5), request(Timeframe::Minute(20)))
                .unwrap();
        let mut series = project(&mut projected, &fine[..8]);
        series.push(fine[8]);
        projected.update(&series, BarEvent::NewBar);
        let committed_open = projected.coarse.at(2).unwrap().open;

        if let Some(last) = series.last_mut() {
            last.close += 1.5;
            last.high = last.high.max(last.close);
        }
        projected.update(&series, BarEvent::NewTick);

        assert_eq!(projected.coarse.len(), 3);
        let forming = projected.coarse.at(2).unwrap();
        assert_eq!(forming.open, committed_open);
        assert_eq!(forming.close, series.last().unwrap().close);
        for (line, source) in projected.lines().iter().zip(projected.nested.lines()) {
            let (got, want) = (line.at(8), source.at(2));
            assert!((got.is_nan() && want.is_nan()) || got == want);
        }
    }

    #[test]
    fn test_reset_drops_coarse_bars_built_live() {
        let fine = fine_bars(12, 0);
        let provider = FixedProvider(resample(&fine[..8], 4));
        let nested = VwapBands::new(VwapConfig::default()).unwrap();
        let mut projected =
            Projected::new(nested, &provider, Timeframe::Minute(5), request(Timeframe::Minute(20)))
                .unwrap();
        project(&mut projected, &fine);
        assert_eq!(projected.coarse.len(), 3);

        projected.reset();
        assert_eq!(projected.coarse.len(), 2);
        assert_eq!(projected.nested.lines()[0].len(), 2);
        assert!(projected.lines().iter().all(OutputSeries::is_empty));
    }

    #[test]
    fn test_interpolates_by_fine_bar_count() {
        let fine = fine_bars(12, 0);
        // A missing fine bar: the gap must not stretch the fraction.
        let gapped: Vec<Bar> = fine.iter().copied().filter(|b| b != &fine[2]).collect();
        let coarse = resample(&fine, 4);
        let nested = VwapBands::new(VwapConfig::default()).unwrap();
        let provider = FixedProvider(coarse);
        let mut projected =
            Projected::new(nested, &provider, Timeframe::Minute(5), request(Timeframe::Minute(20)))
                .unwrap();

        let mut series = BarSeries::new(Timeframe::Minute(5));
        for b in &gapped[..3] {
            series.push(*b);
            projected.update(&series, BarEvent::HistoricalBar);
        }
        // Fine bar 3 landed at position 2: two bars past the coarse start
        // out of four per coarse bar.
        let a = projected.nested.lines()[0].at(0);
        let b = projected.nested.lines()[0].at(1);
        assert!((projected.lines()[0].at(2) - interpolate(a, b, 0.5)).abs() < 1e-12);
        assert!((projected.lines()[0].at(1) - interpolate(a, b, 0.25)).abs() < 1e-12);
    }

    #[test]
    fn test_skips_before_coarse_series_starts() {
        let fine = fine_bars(10, 0);
        let coarse = resample(&fine_bars(8, 4), 4);
        let nested = VwapBands::new(VwapConfig::default()).unwrap();
        let provider = FixedProvider(coarse);
        let mut projected =
            Projected::new(nested, &provider, Timeframe::Minute(5), request(Timeframe::Minute(20)))
                .unwrap();
        project(&mut projected, &fine);

        let vwap = &projected.lines()[0];
        assert_eq!(vwap.len(), 10);
        assert!((0..4).all(|pos| vwap.at(pos).is_nan()));
        assert!(!vwap.at(4).is_nan());
    }

    #[test]
    fn test_rejects_finer_or_equal_timeframe() {
        let nested = VwapBands::new(VwapConfig::default()).unwrap();
        let provider = FixedProvider(BarSeries::new(Timeframe::Minute(5)));
        let err =
            Projected::new(nested, &provider, Timeframe::Minute(5), request(Timeframe::Minute(5)))
                .unwrap_err();
        assert!(matches!(err, IndicatorError::NotCoarser { .. }));
    }

    #[test]
    fn test_provider_failure_is_a_config_error() {
        let nested = RsiBands::new(RsiBandsConfig::default()).unwrap();
        let err =
            Projected::new(nested, &FailingProvider, Timeframe::Minute(5), request(Timeframe::Hour(1)))
                .unwrap_err();
        assert!(matches!(err, IndicatorError::Series(_)));
    }

    #[test]
    fn test_warm_up_silence() {
        let nested = VwapBands::new(VwapConfig::default()).unwrap();
        let provider = FixedProvider(resample(&fine_bars(8, 0), 4));
        let mut projected =
            Projected::new(nested, &provider, Timeframe::Minute(5), request(Timeframe::Minute(20)))
                .unwrap();
        projected.update(&BarSeries::new(Timeframe::Minute(5)), BarEvent::HistoricalBar);
        assert!(projected.lines().iter().all(OutputSeries::is_empty));
    }
}
