use chartbands_core::{Bar, DataError, Tick};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::path::Path;

/// Load OHLCV bars from a CSV file.
///
/// Expected columns (case-insensitive, flexible ordering):
/// `timestamp` (or `date`, `datetime`, `time`), `open`, `high`, `low`,
/// `close` and optionally `volume`. Missing volume reads as zero.
///
/// Supports common date formats.
pub fn load_bars_from_csv(path: &Path) -> Result<Vec<Bar>, DataError> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| DataError::ParseError(format!("Failed to read headers: {}", e)))?
        .clone();

    let col_map = resolve_bar_columns(&headers)?;

    let mut bars = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| DataError::ParseError(format!("CSV record error: {}", e)))?;

        let timestamp = parse_timestamp(field(&record, col_map.timestamp)?)?;
        let open = parse_number(field(&record, col_map.open)?, "open")?;
        let high = parse_number(field(&record, col_map.high)?, "high")?;
        let low = parse_number(field(&record, col_map.low)?, "low")?;
        let close = parse_number(field(&record, col_map.close)?, "close")?;
        let volume = match col_map.volume {
            Some(idx) => parse_number(field(&record, idx)?, "volume")?,
            None => 0.0,
        };

        bars.push(Bar::new(timestamp, open, high, low, close, volume));
    }

    // Sort by timestamp
    bars.sort_by_key(|b| b.timestamp);
    tracing::debug!(path = %path.display(), bars = bars.len(), "Loaded bars from CSV");
    Ok(bars)
}

/// Load trade prints from a CSV file.
///
/// Expected columns: `timestamp`, `price` (or `last`) and optionally `volume`.
pub fn load_ticks_from_csv(path: &Path) -> Result<Vec<Tick>, DataError> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| DataError::ParseError(format!("Failed to read headers: {}", e)))?
        .clone();

    let ts_col = find_column(&headers, &["timestamp", "date", "datetime", "time"])
        .ok_or_else(|| DataError::ParseError("No timestamp column found".into()))?;
    let price_col = find_column(&headers, &["price", "last"])
        .ok_or_else(|| DataError::ParseError("No price column found".into()))?;
    let vol_col = find_column(&headers, &["volume", "vol", "size"]);

    let mut ticks = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| DataError::ParseError(format!("CSV record error: {}", e)))?;

        let timestamp = parse_timestamp(field(&record, ts_col)?)?;
        let price = parse_number(field(&record, price_col)?, "price")?;
        let volume = match vol_col {
            Some(idx) => parse_number(field(&record, idx)?, "volume")?,
            None => 0.0,
        };

        ticks.push(Tick {
            timestamp,
            price,
            volume,
        });
    }

    // Stable sort keeps prints with equal timestamps in file order.
    ticks.sort_by_key(|t| t.timestamp);
    Ok(ticks)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

struct BarColumnMap {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, DataError> {
    if !path.exists() {
        return Err(DataError::NotFound(format!(
            "CSV file not found: {}",
            path.display()
        )));
    }
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| DataError::ParseError(format!("Failed to open CSV: {}", e)))
}

fn resolve_bar_columns(headers: &csv::StringRecord) -> Result<BarColumnMap, DataError> {
    let ts = find_column(headers, &["timestamp", "date", "datetime", "time"])
        .ok_or_else(|| DataError::ParseError("No timestamp column found".into()))?;
    let open = find_column(headers, &["open", "o"])
        .ok_or_else(|| DataError::ParseError("No open column found".into()))?;
    let high = find_column(headers, &["high", "h"])
        .ok_or_else(|| DataError::ParseError("No high column found".into()))?;
    let low = find_column(headers, &["low", "l"])
        .ok_or_else(|| DataError::ParseError("No low column found".into()))?;
    let close = find_column(headers, &["close", "c"])
        .ok_or_else(|| DataError::ParseError("No close column found".into()))?;
    let volume = find_column(headers, &["volume", "vol", "v"]);

    Ok(BarColumnMap {
        timestamp: ts,
        open,
        high,
        low,
        close,
        volume,
    })
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers.iter().position(|header| {
        let h = header.trim().to_lowercase();
        names.iter().any(|name| h == *name)
    })
}

fn field<'r>(record: &'r csv::StringRecord, idx: usize) -> Result<&'r str, DataError> {
    record.get(idx).ok_or_else(|| {
        DataError::ParseError(format!(
            "Record on line {} has no column {}",
            record.position().map(|p| p.line()).unwrap_or_default(),
            idx + 1
        ))
    })
}

fn parse_number(s: &str, field: &str) -> Result<f64, DataError> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|e| DataError::ParseError(format!("Failed to parse {} '{}': {}", field, s, e)))?;
    if !value.is_finite() {
        return Err(DataError::ParseError(format!(
            "Non-finite {} '{}'",
            field, s
        )));
    }
    Ok(value)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DataError> {
    let s = s.trim();

    // Try RFC 3339 / ISO 8601 with timezone
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Common formats (without timezone, assume UTC)
    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
        "%Y%m%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
    ];

    for fmt in &formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }

    // Date only
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }

    // Try Unix timestamp (seconds)
    if let Ok(ts) = s.parse::<i64>() {
        if let Some(dt) = DateTime::from_timestamp(ts, 0) {
            return Ok(dt);
        }
    }

    Err(DataError::ParseError(format!(
        "Unable to parse timestamp: '{}'",
        s
    )))
}
