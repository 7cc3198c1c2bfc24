//! CSV report writer.
//!
//! One directory per run. Sub-strategy files are prefixed with the strategy
//! name, meta files with `meta_<label>`.

use crate::domain::error::AllocsimError;
use crate::domain::meta::MetaResult;
use crate::domain::strategy::SubStrategyResult;
use crate::domain::weights::WeightTable;
use crate::ports::report_port::ReportPort;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct CsvReportAdapter {
    output_dir: PathBuf,
}

impl CsvReportAdapter {
    /// Creates `output_dir` if it does not exist yet.
    pub fn new(output_dir: PathBuf) -> Result<Self, AllocsimError> {
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn path(&self, prefix: &str, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.csv", file_stem(prefix), suffix))
    }
}

/// Strategy names may hold anything; keep file names portable.
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn csv_err(e: csv::Error) -> AllocsimError {
    AllocsimError::Io(std::io::Error::other(e))
}

fn write_rows(
    path: &Path,
    header: &[String],
    rows: impl Iterator<Item = Vec<String>>,
) -> Result<(), AllocsimError> {
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    wtr.write_record(header).map_err(csv_err)?;
    for row in rows {
        wtr.write_record(&row).map_err(csv_err)?;
    }
    wtr.flush()?;
    debug!(path = %path.display(), "report written");
    Ok(())
}

fn write_weights(path: &Path, table: &WeightTable) -> Result<(), AllocsimError> {
    let mut header = vec!["date".to_string()];
    header.extend(table.instruments().iter().cloned());
    header.push("cash".to_string());
    let rows = (0..table.len()).map(|i| {
        let mut row = vec![table.dates()[i].to_string()];
        row.extend(table.row(i).iter().map(f64::to_string));
        row.push(table.cash(i).to_string());
        row
    });
    write_rows(path, &header, rows)
}

/// date plus one column per named series.
fn write_series(
    path: &Path,
    dates: &[NaiveDate],
    series: &[(&str, &[f64])],
) -> Result<(), AllocsimError> {
    let mut header = vec!["date".to_string()];
    header.extend(series.iter().map(|(name, _)| name.to_string()));
    let rows = dates.iter().enumerate().map(|(i, date)| {
        let mut row = vec![date.to_string()];
        row.extend(series.iter().map(|(_, values)| values[i].to_string()));
        row
    });
    write_rows(path, &header, rows)
}

impl ReportPort for CsvReportAdapter {
    fn write_strategy(&self, result: &SubStrategyResult) -> Result<(), AllocsimError> {
        let sim = &result.simulation;
        write_series(
            &self.path(&result.name, "nav"),
            &sim.dates,
            &[
                ("nav", sim.nav.as_slice()),
                ("cash", sim.cash.as_slice()),
                ("benchmark_nav", result.benchmark.nav.as_slice()),
            ],
        )?;
        write_weights(&self.path(&result.name, "weights"), &result.targets)?;
        write_weights(&self.path(&result.name, "realized"), &result.realized)?;

        let mut header = vec!["date".to_string()];
        header.extend(sim.instruments.iter().cloned());
        let rows = sim.dates.iter().zip(&sim.positions).map(|(date, shares)| {
            let mut row = vec![date.to_string()];
            row.extend(shares.iter().map(f64::to_string));
            row
        });
        write_rows(&self.path(&result.name, "positions"), &header, rows)
    }

    fn write_meta(&self, result: &MetaResult) -> Result<(), AllocsimError> {
        let prefix = format!("meta_{}", result.label);
        let sim = &result.simulation;
        write_series(
            &self.path(&prefix, "nav"),
            &sim.dates,
            &[("nav", sim.nav.as_slice()), ("cash", sim.cash.as_slice())],
        )?;
        write_weights(&self.path(&prefix, "weights"), &result.targets)?;
        write_weights(&self.path(&prefix, "flattened"), &result.flattened)?;

        let current = &result.current;
        let mut header = vec!["instrument".to_string(), "weight".to_string()];
        header.extend(current.contributions.iter().map(|c| c.strategy.clone()));
        let mut rows: Vec<Vec<String>> = current
            .weights
            .iter()
            .map(|(instrument, weight)| {
                let mut row = vec![instrument.to_string(), weight.to_string()];
                row.extend(
                    current
                        .contributions
                        .iter()
                        .map(|c| c.weights.weight(instrument).to_string()),
                );
                row
            })
            .collect();
        let mut cash_row = vec!["cash".to_string(), current.weights.cash().to_string()];
        cash_row.extend(current.contributions.iter().map(|c| c.weights.cash().to_string()));
        rows.push(cash_row);
        write_rows(&self.path(&prefix, "current"), &header, rows.into_iter())
    }
}
