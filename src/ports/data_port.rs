//! Price data access port trait.

use crate::domain::error::AllocsimError;
use crate::domain::price_table::PriceTable;
use chrono::NaiveDate;

pub trait PriceDataPort {
    /// Adjusted closes for `tickers` between the two dates, inclusive. Column
    /// order follows `tickers`.
    fn fetch_prices(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceTable, AllocsimError>;

    fn list_tickers(&self) -> Result<Vec<String>, AllocsimError>;

    /// First date, last date and number of valid quotes for `ticker`.
    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, AllocsimError>;
}
