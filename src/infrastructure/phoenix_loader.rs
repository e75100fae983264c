//! Loads the static phoenix target list (§4.8) from an external text table.
//!
//! The table is plain text, one trading day per line:
//! `YYYY-MM-DD,SYMBOL1,SYMBOL2,...`. Blank lines and lines starting with `#`
//! are ignored. This mirrors the "curated target list maintained outside the
//! codebase" note in §9 — the theme is a human judgment call, not a computed
//! gate, so the file format stays as close to hand-editable as possible.

use crate::domain::alpha::phoenix::PhoenixTargetList;
use crate::domain::errors::BarStoreError;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

pub fn parse_target_list(raw: &str) -> PhoenixTargetList {
    let mut by_day: HashMap<NaiveDate, Vec<String>> = HashMap::new();
    for (line_no, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split(',').map(str::trim);
        let Some(day_field) = fields.next() else { continue };
        let Ok(day) = NaiveDate::parse_from_str(day_field, "%Y-%m-%d") else {
            warn!(line_no, day_field, "skipping unparseable phoenix target list line");
            continue;
        };
        let symbols: Vec<String> = fields.filter(|s| !s.is_empty()).map(str::to_string).collect();
        if symbols.is_empty() {
            continue;
        }
        by_day.entry(day).or_default().extend(symbols);
    }
    PhoenixTargetList::new(by_day)
}

pub async fn load_target_list(path: &Path) -> Result<PhoenixTargetList, BarStoreError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| BarStoreError::CacheIo {
        symbol: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(parse_target_list(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multi_symbol_lines_and_skips_comments() {
        let raw = "# header\n2024-03-04,005930,000660\n\n2024-03-05,035720\n";
        let list = parse_target_list(raw);
        let day1 = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(list.targets_for(day1), &["005930".to_string(), "000660".to_string()]);
        assert_eq!(list.targets_for(day2), &["035720".to_string()]);
    }

    #[test]
    fn skips_lines_with_unparseable_dates() {
        let raw = "not-a-date,005930\n2024-03-04,000660\n";
        let list = parse_target_list(raw);
        assert!(list.targets_for(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()).contains(&"000660".to_string()));
        assert_eq!(list.targets_for(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()).len(), 1);
    }

    #[test]
    fn empty_input_yields_empty_list() {
        assert!(parse_target_list("").is_empty());
    }
}
