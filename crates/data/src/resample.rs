use chartbands_core::{Bar, Timeframe};

/// Aggregate chronologically ordered bars into `timeframe` buckets.
///
/// Each output bar is stamped with its bucket's left edge and takes the first
/// open, the extreme high/low, the last close and the summed volume of the
/// bars it covers. Empty buckets produce no bar.
pub fn resample(bars: &[Bar], timeframe: Timeframe) -> Vec<Bar> {
    let mut out: Vec<Bar> = Vec::new();
    for bar in bars {
        let bucket = timeframe.bucket_start(bar.timestamp);
        match out.last_mut() {
            Some(current) if current.timestamp == bucket => current.merge(bar),
            _ => out.push(Bar {
                timestamp: bucket,
                ..*bar
            }),
        }
    }
    out
}
