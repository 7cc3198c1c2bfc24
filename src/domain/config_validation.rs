//! Configuration parsing and validation.
//!
//! Everything here runs before any price data is loaded. The typed readers
//! (`parse_*`) are shared by the strategy and meta constructors so a bad
//! value is reported the same way wherever it appears.

use crate::domain::calendar::{CalendarConfig, RebalanceUnit};
use crate::domain::error::AllocsimError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::collections::HashSet;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Prefix of sub-strategy section names: `[strategy.<id>]`.
pub const STRATEGY_PREFIX: &str = "strategy.";

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), AllocsimError> {
    let start_date = parse_date(config, "backtest", "start_date")?;
    let end_date = parse_date(config, "backtest", "end_date")?;
    if start_date >= end_date {
        return Err(AllocsimError::invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    parse_count(config, "backtest", "warmup_months", 24)?;
    Ok(())
}

/// Strategy sections exist, carry a kind, and resolve to unique names.
pub fn validate_strategy_sections(config: &dyn ConfigPort) -> Result<(), AllocsimError> {
    let sections = strategy_sections(config);
    if sections.is_empty() {
        return Err(AllocsimError::missing("strategy.<id>", "kind"));
    }
    let mut seen = HashSet::new();
    for section in &sections {
        require_string(config, section, "kind")?;
        let name = strategy_name(config, section);
        if !seen.insert(name.clone()) {
            return Err(AllocsimError::invalid(
                section,
                "name",
                format!("duplicate strategy name '{name}'"),
            ));
        }
    }
    Ok(())
}

/// `[strategy.*]` sections in file order.
pub fn strategy_sections(config: &dyn ConfigPort) -> Vec<String> {
    config
        .sections()
        .into_iter()
        .filter(|s| s.starts_with(STRATEGY_PREFIX) && s.len() > STRATEGY_PREFIX.len())
        .collect()
}

/// Display name of a strategy section: its `name` key, else the section id.
pub fn strategy_name(config: &dyn ConfigPort, section: &str) -> String {
    config
        .get_string(section, "name")
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| {
            section
                .strip_prefix(STRATEGY_PREFIX)
                .unwrap_or(section)
                .to_string()
        })
}

pub fn parse_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<NaiveDate, AllocsimError> {
    let value = require_string(config, section, key)?;
    NaiveDate::parse_from_str(&value, DATE_FORMAT).map_err(|_| {
        AllocsimError::invalid(
            section,
            key,
            format!("invalid {key} format, expected YYYY-MM-DD"),
        )
    })
}

/// Non-blank string value.
pub fn require_string(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, AllocsimError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(AllocsimError::missing(section, key)),
    }
}

/// Non-empty instrument list without duplicates.
pub fn parse_instruments(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Vec<String>, AllocsimError> {
    let list = config
        .get_list(section, key)
        .ok_or_else(|| AllocsimError::missing(section, key))?;
    if list.is_empty() {
        return Err(AllocsimError::invalid(section, key, "instrument list is empty"));
    }
    let mut seen = HashSet::new();
    for ticker in &list {
        if !seen.insert(ticker.as_str()) {
            return Err(AllocsimError::invalid(
                section,
                key,
                format!("instrument '{ticker}' listed twice"),
            ));
        }
    }
    Ok(list)
}

/// Integer value, `default` when absent. Rejects non-numeric text instead of
/// silently falling back.
pub fn parse_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, AllocsimError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AllocsimError::invalid(section, key, format!("'{raw}' is not an integer"))),
    }
}

pub fn parse_float(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, AllocsimError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(AllocsimError::invalid(section, key, format!("'{raw}' is not a number"))),
        },
    }
}

/// Non-negative integer.
pub fn parse_count(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<usize, AllocsimError> {
    let value = parse_int(config, section, key, default)?;
    usize::try_from(value)
        .map_err(|_| AllocsimError::invalid(section, key, format!("{key} must be non-negative")))
}

/// Strictly positive integer.
pub fn parse_positive(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<usize, AllocsimError> {
    let value = parse_count(config, section, key, default)?;
    if value == 0 {
        return Err(AllocsimError::invalid(section, key, format!("{key} must be positive")));
    }
    Ok(value)
}

/// Number of holdings: 1 <= K < universe.
pub fn parse_selected(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    universe: usize,
) -> Result<usize, AllocsimError> {
    let k = parse_positive(config, section, key, default)?;
    if k >= universe {
        return Err(AllocsimError::invalid(
            section,
            key,
            format!("{key} = {k} must be smaller than the universe size {universe}"),
        ));
    }
    Ok(k)
}

pub fn parse_calendar(
    config: &dyn ConfigPort,
    section: &str,
) -> Result<CalendarConfig, AllocsimError> {
    let defaults = CalendarConfig::default();
    let unit = match config.get_string(section, "rebalance_unit") {
        None => defaults.unit,
        Some(raw) => raw
            .parse::<RebalanceUnit>()
            .map_err(|reason| AllocsimError::invalid(section, "rebalance_unit", reason))?,
    };
    Ok(CalendarConfig {
        unit,
        frequency: parse_positive(config, section, "rebalance_freq", defaults.frequency as i64)?,
        shift: parse_count(config, section, "rebalance_shift", defaults.shift as i64)?,
    })
}

pub fn parse_f64_list(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: &[f64],
) -> Result<Vec<f64>, AllocsimError> {
    let Some(list) = config.get_list(section, key) else {
        return Ok(default.to_vec());
    };
    list.iter()
        .map(|item| match item.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(AllocsimError::invalid(section, key, format!("'{item}' is not a number"))),
        })
        .collect()
}

/// List of positive integers.
pub fn parse_usize_list(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: &[usize],
) -> Result<Vec<usize>, AllocsimError> {
    let Some(list) = config.get_list(section, key) else {
        return Ok(default.to_vec());
    };
    list.iter()
        .map(|item| match item.parse::<usize>() {
            Ok(v) if v > 0 => Ok(v),
            _ => Err(AllocsimError::invalid(
                section,
                key,
                format!("'{item}' is not a positive integer"),
            )),
        })
        .collect()
}

/// Weights that pair up with `expected` entries: same length, none negative,
/// positive sum.
pub fn check_weights(
    section: &str,
    key: &str,
    weights: &[f64],
    expected: usize,
) -> Result<(), AllocsimError> {
    if weights.len() != expected {
        return Err(AllocsimError::invalid(
            section,
            key,
            format!("expected {expected} weights, found {}", weights.len()),
        ));
    }
    if weights.iter().any(|&w| w < 0.0) {
        return Err(AllocsimError::invalid(section, key, "weights must be non-negative"));
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(AllocsimError::invalid(section, key, "weights must have a positive sum"));
    }
    Ok(())
}

/// Instrument that must not already appear in `universe`.
pub fn parse_extra_instrument(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    universe: &[String],
) -> Result<String, AllocsimError> {
    let ticker = require_string(config, section, key)?;
    if universe.contains(&ticker) {
        return Err(AllocsimError::invalid(
            section,
            key,
            format!("'{ticker}' is already part of the traded universe"),
        ));
    }
    Ok(ticker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn valid_backtest_config_passes() {
        let config = make_config(
            r#"
[backtest]
start_date = 2015-01-01
end_date = 2024-12-31
warmup_months = 12
"#,
        );
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn start_date_after_end_date_fails() {
        let config = make_config("[backtest]\nstart_date = 2024-01-01\nend_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, AllocsimError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn invalid_date_format_fails() {
        let config = make_config("[backtest]\nstart_date = 01/02/2020\nend_date = 2024-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, AllocsimError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn missing_end_date_fails() {
        let config = make_config("[backtest]\nstart_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, AllocsimError::ConfigMissing { key, .. } if key == "end_date"));
    }

    #[test]
    fn negative_warmup_fails() {
        let config = make_config(
            "[backtest]\nstart_date = 2020-01-01\nend_date = 2024-01-01\nwarmup_months = -3\n",
        );
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, AllocsimError::ConfigInvalid { key, .. } if key == "warmup_months"));
    }

    #[test]
    fn strategy_sections_in_file_order() {
        let config = make_config(
            "[backtest]\nstart_date = 2020-01-01\n[strategy.b]\nkind = breakout\n[strategy.a]\nkind = canary\n",
        );
        assert_eq!(strategy_sections(&config), vec!["strategy.b", "strategy.a"]);
        assert!(validate_strategy_sections(&config).is_ok());
    }

    #[test]
    fn no_strategy_sections_fails() {
        let config = make_config("[backtest]\nstart_date = 2020-01-01\n");
        assert!(matches!(
            validate_strategy_sections(&config),
            Err(AllocsimError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn duplicate_strategy_names_fail() {
        let config = make_config(
            "[strategy.one]\nkind = breakout\nname = trend\n[strategy.two]\nkind = breakout\nname = trend\n",
        );
        let err = validate_strategy_sections(&config).unwrap_err();
        assert!(matches!(err, AllocsimError::ConfigInvalid { key, .. } if key == "name"));
    }

    #[test]
    fn strategy_without_kind_fails() {
        let config = make_config("[strategy.one]\nname = trend\n");
        let err = validate_strategy_sections(&config).unwrap_err();
        assert!(matches!(err, AllocsimError::ConfigMissing { key, .. } if key == "kind"));
    }

    #[test]
    fn strategy_name_defaults_to_id() {
        let config = make_config("[strategy.haa]\nkind = canary\n[strategy.x]\nname = Bonds\n");
        assert_eq!(strategy_name(&config, "strategy.haa"), "haa");
        assert_eq!(strategy_name(&config, "strategy.x"), "Bonds");
    }

    #[test]
    fn calendar_defaults_and_overrides() {
        let config = make_config("[s]\nrebalance_unit = week\nrebalance_freq = 2\n[t]\nx = 1\n");
        let calendar = parse_calendar(&config, "s").unwrap();
        assert_eq!(calendar.unit, RebalanceUnit::Week);
        assert_eq!(calendar.frequency, 2);
        assert_eq!(calendar.shift, 0);
        assert_eq!(parse_calendar(&config, "t").unwrap(), CalendarConfig::default());
    }

    #[test]
    fn zero_frequency_rejected() {
        let config = make_config("[s]\nrebalance_freq = 0\n");
        let err = parse_calendar(&config, "s").unwrap_err();
        assert!(matches!(err, AllocsimError::ConfigInvalid { key, .. } if key == "rebalance_freq"));
    }

    #[test]
    fn negative_shift_rejected() {
        let config = make_config("[s]\nrebalance_shift = -1\n");
        let err = parse_calendar(&config, "s").unwrap_err();
        assert!(matches!(err, AllocsimError::ConfigInvalid { key, .. } if key == "rebalance_shift"));
    }

    #[test]
    fn unknown_unit_rejected() {
        let config = make_config("[s]\nrebalance_unit = fortnight\n");
        let err = parse_calendar(&config, "s").unwrap_err();
        assert!(matches!(err, AllocsimError::ConfigInvalid { key, .. } if key == "rebalance_unit"));
    }

    #[test]
    fn non_numeric_integer_rejected() {
        let config = make_config("[s]\nselected = three\n");
        assert!(parse_int(&config, "s", "selected", 1).is_err());
        assert_eq!(parse_int(&config, "s", "absent", 7).unwrap(), 7);
    }

    #[test]
    fn selected_must_be_below_universe() {
        let config = make_config("[s]\nselected = 3\n");
        assert_eq!(parse_selected(&config, "s", "selected", 1, 4).unwrap(), 3);
        let err = parse_selected(&config, "s", "selected", 1, 3).unwrap_err();
        assert!(matches!(err, AllocsimError::ConfigInvalid { key, .. } if key == "selected"));
        let zero = make_config("[s]\nselected = 0\n");
        assert!(parse_selected(&zero, "s", "selected", 1, 4).is_err());
    }

    #[test]
    fn instruments_reject_empty_and_duplicates() {
        let config = make_config("[s]\na = SPY, TLT\nb = ,\nc = SPY, SPY\n");
        assert_eq!(parse_instruments(&config, "s", "a").unwrap(), vec!["SPY", "TLT"]);
        assert!(parse_instruments(&config, "s", "b").is_err());
        assert!(parse_instruments(&config, "s", "c").is_err());
        assert!(matches!(
            parse_instruments(&config, "s", "d"),
            Err(AllocsimError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn lists_parse_and_default() {
        let config = make_config("[s]\nlookbacks = 1, 3, 6\nweights = 0.5, x\nbad = 2, 0\n");
        assert_eq!(parse_usize_list(&config, "s", "lookbacks", &[]).unwrap(), vec![1, 3, 6]);
        assert_eq!(parse_usize_list(&config, "s", "absent", &[12]).unwrap(), vec![12]);
        assert!(parse_usize_list(&config, "s", "bad", &[]).is_err());
        assert!(parse_f64_list(&config, "s", "weights", &[]).is_err());
    }

    #[test]
    fn weights_must_pair_up_with_positive_sum() {
        assert!(check_weights("s", "w", &[1.0, 2.0], 2).is_ok());
        assert!(check_weights("s", "w", &[1.0], 2).is_err());
        assert!(check_weights("s", "w", &[0.0, 0.0], 2).is_err());
        assert!(check_weights("s", "w", &[-1.0, 2.0], 2).is_err());
    }

    #[test]
    fn extra_instrument_must_be_outside_universe() {
        let config = make_config("[s]\nsafe = IEF\nproxy = SPY\n");
        let universe = vec!["SPY".to_string(), "EFA".to_string()];
        assert_eq!(parse_extra_instrument(&config, "s", "safe", &universe).unwrap(), "IEF");
        assert!(parse_extra_instrument(&config, "s", "proxy", &universe).is_err());
    }
}
