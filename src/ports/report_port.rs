//! Report generation port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::AllocsimError;
use crate::domain::meta::MetaResult;
use crate::domain::strategy::SubStrategyResult;

/// Port for writing backtest results.
pub trait ReportPort {
    fn write_strategy(&self, result: &SubStrategyResult) -> Result<(), AllocsimError>;

    fn write_meta(&self, result: &MetaResult) -> Result<(), AllocsimError>;

    /// Default implementation: every sub-strategy, then every meta variant.
    fn write(&self, result: &BacktestResult) -> Result<(), AllocsimError> {
        for strategy in &result.strategies {
            self.write_strategy(strategy)?;
        }
        for variant in &result.meta.variants {
            self.write_meta(variant)?;
        }
        Ok(())
    }
}
