use chartbands_core::{BarSeries, DataError, OutputSeries};
use std::io::Write;

/// One output column: a header and the series it reads from.
#[derive(Debug, Clone, Copy)]
pub struct Column<'a> {
    pub header: &'a str,
    pub series: &'a OutputSeries,
}

/// Write one row per bar: timestamp, OHLCV, then each column's value.
/// Unwritten (`NaN`) values are left empty.
pub fn write_csv<W: Write>(out: W, bars: &BarSeries, columns: &[Column<'_>]) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_writer(out);

    let mut header = vec!["timestamp", "open", "high", "low", "close", "volume"];
    header.extend(columns.iter().map(|c| c.header));
    writer.write_record(&header).map_err(csv_error)?;

    for (position, bar) in bars.iter().enumerate() {
        let mut record = vec![
            bar.timestamp.to_rfc3339(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
        ];
        record.extend(columns.iter().map(|c| {
            let value = c.series.at(position);
            if value.is_nan() {
                String::new()
            } else {
                value.to_string()
            }
        }));
        writer.write_record(&record).map_err(csv_error)?;
    }

    writer.flush()?;
    Ok(())
}

fn csv_error(e: csv::Error) -> DataError {
    DataError::ParseError(format!("CSV write error: {}", e))
}
