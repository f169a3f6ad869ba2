//! Quote provider port trait.

use crate::domain::error::TradeDeskError;
use crate::domain::quote::QuoteBar;

pub trait QuotePort {
    /// Most recent `outputsize` daily bars for `symbol`, oldest first.
    ///
    /// `Ok(None)` means the provider has nothing for the symbol, which is
    /// not the same thing as an empty series.
    fn fetch_daily(
        &self,
        symbol: &str,
        outputsize: usize,
    ) -> Result<Option<Vec<QuoteBar>>, TradeDeskError>;
}
