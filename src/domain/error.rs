//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for allocsim.
#[derive(Debug, thiserror::Error)]
pub enum AllocsimError {
    #[error("price data error: {reason}")]
    PriceData { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no price data for {ticker}")]
    NoData { ticker: String },

    #[error("insufficient price history for {ticker}: have {rows} rows, need {minimum}")]
    InsufficientData {
        ticker: String,
        rows: usize,
        minimum: usize,
    },

    #[error(
        "sub-strategy NAV series have unequal lengths ({})",
        describe_lengths(.lengths)
    )]
    DataAlignment { lengths: Vec<(String, usize)> },

    #[error(
        "sub-strategy {other} diverges from {reference} at row {row}: {reference_date} vs {other_date}"
    )]
    DateMismatch {
        reference: String,
        other: String,
        row: usize,
        reference_date: NaiveDate,
        other_date: NaiveDate,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AllocsimError {
    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        AllocsimError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing(section: &str, key: &str) -> Self {
        AllocsimError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}

fn describe_lengths(lengths: &[(String, usize)]) -> String {
    lengths
        .iter()
        .map(|(name, len)| format!("{name}: {len}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<&AllocsimError> for std::process::ExitCode {
    fn from(err: &AllocsimError) -> Self {
        let code: u8 = match err {
            AllocsimError::Io(_) => 1,
            AllocsimError::ConfigParse { .. }
            | AllocsimError::ConfigMissing { .. }
            | AllocsimError::ConfigInvalid { .. } => 2,
            AllocsimError::PriceData { .. } => 3,
            AllocsimError::NoData { .. } | AllocsimError::InsufficientData { .. } => 5,
            AllocsimError::DataAlignment { .. } | AllocsimError::DateMismatch { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
