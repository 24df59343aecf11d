//! Filename-driven report classification.
//!
//! Maps a raw filename to a logical report type, a destination group, a
//! store id, and a business-date key. Matching is against the basename
//! only, case-insensitive, first pattern wins. Classification never fails:
//! an unrecognized name degrades to `unknown` with the caller's group hint.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::{LogicalType, ReportGroup};

/// Store id used when the filename carries no usable digit run.
pub const FALLBACK_STORE_ID: &str = "0000";

/// Result of classifying one filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub logical_type: LogicalType,
    pub group: ReportGroup,
    pub store_id: String,
    pub date_key: Option<String>,
}

/// Recognized filename prefixes, in precedence order. First match wins;
/// a weekly prefix overrides any group hint.
const PREFIX_RULES: &[(&str, LogicalType, ReportGroup)] = &[
    ("daily sales kpi", LogicalType::DailyKpi, ReportGroup::Daily),
    ("weekly sales kpi", LogicalType::WeeklyKpi, ReportGroup::Weekly),
    ("salebydeptuk", LogicalType::SaleByDeptUk, ReportGroup::Daily),
    ("soldmovement", LogicalType::SoldMovement, ReportGroup::Daily),
    ("storerecap", LogicalType::StoreRecap, ReportGroup::Recap),
];

/// Classify a filename into `{logical_type, group, store_id, date_key}`.
///
/// `hint` is the group the caller was uploading into; it only applies when
/// no prefix matches.
pub fn classify(filename: &str, hint: ReportGroup) -> Classification {
    let base = basename(filename);
    let lower = base.to_lowercase();

    let (logical_type, group) = PREFIX_RULES
        .iter()
        .find(|(prefix, _, _)| lower.starts_with(prefix))
        .map(|(_, ty, group)| (*ty, *group))
        .unwrap_or((LogicalType::Unknown, hint));

    let (store_id, date_key) = extract_ids(base);

    Classification {
        logical_type,
        group,
        store_id,
        date_key,
    }
}

/// Strip any path prefix, forward- or backslash-separated.
pub fn basename(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
}

fn digit_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("digit run pattern"))
}

/// Pull the store id and date key out of one scan of the filename's digit
/// runs. The run consumed by the store id is not reused as a date key, so a
/// combined store+serial run like `43401511` is not misread as a date.
fn extract_ids(name: &str) -> (String, Option<String>) {
    let runs: Vec<&str> = digit_run_regex()
        .find_iter(name)
        .map(|m| m.as_str())
        .collect();

    let store_idx = store_id_index(&runs);
    let store_id = store_idx
        .map(|i| runs[i][..4].to_string())
        .unwrap_or_else(|| FALLBACK_STORE_ID.to_string());

    let date_key = runs
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != store_idx)
        .find(|(_, run)| run.len() >= 8)
        .map(|(_, run)| run[..8].to_string());

    (store_id, date_key)
}

/// Pick the run supplying the store id: a 4-digit run not starting with
/// `20` beats any 4-digit run, which beats the year-free leading window of
/// a longer run. Index into `runs`, or `None` for the `0000` fallback.
fn store_id_index(runs: &[&str]) -> Option<usize> {
    runs.iter()
        .position(|run| run.len() == 4 && !run.starts_with("20"))
        .or_else(|| runs.iter().position(|run| run.len() == 4))
        .or_else(|| {
            runs.iter()
                .position(|run| run.len() > 4 && !run.starts_with("20"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_kpi_full_name() {
        let c = classify(
            "Daily Sales KPI by Store-en-us-4340_20251102_083000.xlsx",
            ReportGroup::Weekly,
        );
        assert_eq!(c.logical_type, LogicalType::DailyKpi);
        assert_eq!(c.group, ReportGroup::Daily);
        assert_eq!(c.store_id, "4340");
        assert_eq!(c.date_key, Some("20251102".to_string()));
    }

    #[test]
    fn test_weekly_overrides_group_hint() {
        let c = classify("Weekly Sales KPI by Store-4340.xlsx", ReportGroup::Daily);
        assert_eq!(c.logical_type, LogicalType::WeeklyKpi);
        assert_eq!(c.group, ReportGroup::Weekly);
    }

    #[test]
    fn test_prefix_matching_is_case_insensitive() {
        let c = classify("SALEBYDEPTUK_4340.xlsx", ReportGroup::Daily);
        assert_eq!(c.logical_type, LogicalType::SaleByDeptUk);
        assert_eq!(c.group, ReportGroup::Daily);
    }

    #[test]
    fn test_storerecap_routes_to_recap_group() {
        let c = classify("StoreRecap_4340_20251102.xlsx", ReportGroup::Daily);
        assert_eq!(c.logical_type, LogicalType::StoreRecap);
        assert_eq!(c.group, ReportGroup::Recap);
        assert_eq!(c.store_id, "4340");
        assert_eq!(c.date_key, Some("20251102".to_string()));
    }

    #[test]
    fn test_unknown_falls_back_to_hint() {
        let c = classify("quarterly-summary.xlsx", ReportGroup::Recap);
        assert_eq!(c.logical_type, LogicalType::Unknown);
        assert_eq!(c.group, ReportGroup::Recap);
    }

    #[test]
    fn test_no_digits_defaults() {
        let c = classify("notes.xlsx", ReportGroup::Daily);
        assert_eq!(c.store_id, FALLBACK_STORE_ID);
        assert_eq!(c.date_key, None);
    }

    #[test]
    fn test_store_id_prefers_non_year_run() {
        // "2025" is a 4-digit run but looks like a year; "4340" wins even
        // though it appears later.
        let c = classify("report-2025-store-4340.xlsx", ReportGroup::Daily);
        assert_eq!(c.store_id, "4340");
    }

    #[test]
    fn test_store_id_accepts_year_like_run_when_alone() {
        let c = classify("report-2025.xlsx", ReportGroup::Daily);
        assert_eq!(c.store_id, "2025");
    }

    #[test]
    fn test_combined_store_serial_run() {
        // An 8-digit store+serial run yields the store id but no date key:
        // the run is consumed by the store id.
        let c = classify("soldmovement43401511.xls", ReportGroup::Daily);
        assert_eq!(c.logical_type, LogicalType::SoldMovement);
        assert_eq!(c.group, ReportGroup::Daily);
        assert_eq!(c.store_id, "4340");
        assert_eq!(c.date_key, None);
    }

    #[test]
    fn test_date_key_from_long_timestamp_run() {
        // First 8 digits of a longer run, per the original convention.
        let c = classify("storerecap-4340-202511021530.xlsx", ReportGroup::Daily);
        assert_eq!(c.store_id, "4340");
        assert_eq!(c.date_key, Some("20251102".to_string()));
    }

    #[test]
    fn test_date_only_name_keeps_fallback_store() {
        let c = classify("report_20251102.xlsx", ReportGroup::Daily);
        assert_eq!(c.store_id, FALLBACK_STORE_ID);
        assert_eq!(c.date_key, Some("20251102".to_string()));
    }

    #[test]
    fn test_path_prefix_is_stripped() {
        let c = classify(
            "uploads/2026/Daily Sales KPI by Store-4340_20251102.xlsx",
            ReportGroup::Daily,
        );
        assert_eq!(c.logical_type, LogicalType::DailyKpi);
        let c = classify(r"C:\exports\storerecap_4340.xlsx", ReportGroup::Daily);
        assert_eq!(c.logical_type, LogicalType::StoreRecap);
    }

    #[test]
    fn test_classification_never_fails_on_odd_input() {
        for name in ["", "...", "   ", "日報_店舗.xlsx", "a/b/c/"] {
            let c = classify(name, ReportGroup::Daily);
            assert_eq!(c.logical_type, LogicalType::Unknown);
            assert_eq!(c.store_id, FALLBACK_STORE_ID);
        }
    }
}
