//! CSV candle source and trade ledger writer.
//!
//! Candle files live at `<base_path>/<SYMBOL>_<timeframe>.csv` with the header
//! `timestamp,open,high,low,close,volume`.

use crate::domain::error::BarsmithError;
use crate::domain::ohlcv::{Candle, Timeframe};
use crate::domain::position::Trade;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CandleRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn csv_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.base_path.join(format!("{symbol}_{timeframe}.csv"))
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or a bare date
/// (midnight).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl DataPort for CsvAdapter {
    fn fetch_candles(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>, BarsmithError> {
        let path = self.csv_path(symbol, timeframe);
        let content = fs::read_to_string(&path).map_err(|e| BarsmithError::DataSource {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut candles = Vec::new();

        for (line, result) in rdr.deserialize::<CandleRow>().enumerate() {
            let row = result.map_err(|e| BarsmithError::DataSource {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            let timestamp =
                parse_timestamp(&row.timestamp).ok_or_else(|| BarsmithError::DataSource {
                    reason: format!(
                        "{}: row {}: invalid timestamp '{}'",
                        path.display(),
                        line + 1,
                        row.timestamp
                    ),
                })?;

            let date = timestamp.date();
            if date < start || date > end {
                continue;
            }

            candles.push(Candle {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }
}

/// Write the trade ledger as CSV with a header row.
pub fn write_trades<W: Write>(writer: W, trades: &[Trade]) -> Result<(), BarsmithError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for trade in trades {
        wtr.serialize(trade).map_err(csv_io_error)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_trades_csv(path: &Path, trades: &[Trade]) -> Result<(), BarsmithError> {
    write_trades(fs::File::create(path)?, trades)
}

fn csv_io_error(e: csv::Error) -> BarsmithError {
    BarsmithError::Io(std::io::Error::other(e))
}
