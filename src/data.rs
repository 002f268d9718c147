//! Data loading
//!
//! Loads OHLCV candles from CSV exports and resamples them into a higher
//! timeframe for the trend filter.
//!
//! Expected columns: `datetime,open,high,low,close,volume`. The datetime may
//! be RFC 3339, `%Y-%m-%d %H:%M:%S` or the terminal's `%Y.%m.%d %H:%M`
//! export format (naive values are taken as UTC).

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use itertools::Itertools;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::Candle;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y.%m.%d %H:%M"];

// =============================================================================
// CSV Data Loading
// =============================================================================

/// Load OHLCV data from CSV file
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;
    let candles = read_csv(file)?;
    info!("Loaded {} candles from {}", candles.len(), path.display());
    Ok(candles)
}

/// Parse OHLCV records from any reader. Rows failing OHLC validation are
/// skipped with a warning; unparsable rows are an error.
pub fn read_csv(source: impl Read) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_reader(source);
    let mut candles: Vec<Candle> = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let datetime = parse_datetime(dt_str)
            .with_context(|| format!("Failed to parse datetime: {}", dt_str))?;

        let field = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .with_context(|| format!("Missing {} column", name))?
                .trim()
                .parse::<f64>()
                .with_context(|| format!("Failed to parse {} on row {}", name, row_idx + 1))
        };
        let open = field(1, "open")?;
        let high = field(2, "high")?;
        let low = field(3, "low")?;
        let close = field(4, "close")?;
        let volume = field(5, "volume").unwrap_or(0.0);

        match Candle::new(datetime, open, high, low, close, volume) {
            Ok(candle) => candles.push(candle),
            Err(e) => warn!("Skipping row {}: {}", row_idx + 1, e),
        }
    }

    let before = candles.len();
    candles.sort_by_key(|c| c.datetime);
    candles.dedup_by_key(|c| c.datetime);
    if candles.len() < before {
        warn!("Dropped {} duplicate timestamps", before - candles.len());
    }

    Ok(candles)
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        .context("unrecognised datetime format")
}

// =============================================================================
// Resampling
// =============================================================================

/// Aggregate candles into `minutes`-wide buckets aligned to midnight UTC.
/// The last bucket may be incomplete, like a forming broker candle.
pub fn resample(candles: &[Candle], minutes: u32) -> Vec<Candle> {
    if minutes == 0 {
        return candles.to_vec();
    }
    let width = i64::from(minutes) * 60;

    candles
        .iter()
        .chunk_by(|c| {
            let secs = c.datetime.timestamp();
            secs - secs.rem_euclid(width)
        })
        .into_iter()
        .filter_map(|(bucket, group)| {
            let group: Vec<&Candle> = group.collect();
            let first = group.first()?;
            let last = group.last()?;
            let datetime = DateTime::from_timestamp(bucket, 0)?;
            Some(Candle::new_unchecked(
                datetime,
                first.open,
                group.iter().map(|c| c.high).fold(f64::MIN, f64::max),
                group.iter().map(|c| c.low).fold(f64::MAX, f64::min),
                last.close,
                group.iter().map(|c| c.volume).sum(),
            ))
        })
        .collect()
}

/// Minutes between the first two candles, if they look like a regular series
pub fn infer_timeframe_minutes(candles: &[Candle]) -> Option<u32> {
    let (a, b) = (candles.first()?, candles.get(1)?);
    let minutes = (b.datetime - a.datetime).num_minutes();
    u32::try_from(minutes).ok().filter(|m| *m > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CSV: &str = "\
datetime,open,high,low,close,volume
2025-01-06 00:15:00,2001.0,2003.0,2000.5,2002.0,120
2025-01-06T00:00:00Z,2000.0,2002.0,1999.0,2001.0,100
2025.01.06 00:30,2002.0,2004.5,2001.0,2004.0,90
2025-01-06 00:45:00,2004.0,2003.0,2005.0,2004.5,80
2025-01-06 01:00:00,2004.5,2006.0,2004.0,2005.5,70
";

    #[test]
    fn test_read_csv_formats_order_and_validation() {
        let candles = read_csv(CSV.as_bytes()).unwrap();
        // The 00:45 row has high < low and is skipped
        assert_eq!(candles.len(), 4);
        assert_eq!(
            candles[0].datetime,
            Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap()
        );
        assert_eq!(candles[2].close, 2004.0);
        assert_eq!(infer_timeframe_minutes(&candles), Some(15));
    }

    #[test]
    fn test_read_csv_rejects_garbage() {
        let bad = "datetime,open,high,low,close,volume\nyesterday,1,2,0.5,1.5,1\n";
        assert!(read_csv(bad.as_bytes()).is_err());
    }

    #[test]
    fn test_resample_hourly() {
        let candles = read_csv(CSV.as_bytes()).unwrap();
        let hourly = resample(&candles, 60);
        assert_eq!(hourly.len(), 2);

        let first = &hourly[0];
        assert_eq!(first.open, 2000.0);
        assert_eq!(first.high, 2004.5);
        assert_eq!(first.low, 1999.0);
        assert_eq!(first.close, 2004.0);
        assert_eq!(first.volume, 310.0);

        assert_eq!(
            hourly[1].datetime,
            Utc.with_ymd_and_hms(2025, 1, 6, 1, 0, 0).unwrap()
        );
    }
}
