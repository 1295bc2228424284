//! Historical data port.

use crate::domain::error::BarsmithError;
use crate::domain::ohlcv::{Candle, Timeframe};
use chrono::NaiveDate;

pub trait DataPort {
    /// Candles for `symbol` with timestamps dated within `[start, end]`,
    /// ordered by timestamp. An empty result is not an error here; the
    /// engine reports it as `NoData`.
    fn fetch_candles(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>, BarsmithError>;
}
