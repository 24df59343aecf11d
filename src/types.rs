//! Core domain types shared across the crate.

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Coarse report bucket. Controls which ledger partition a record lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportGroup {
    Daily,
    Weekly,
    Recap,
}

impl ReportGroup {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Recap => "recap",
        }
    }

    pub const ALL: [ReportGroup; 3] = [Self::Daily, Self::Weekly, Self::Recap];
}

impl FromStr for ReportGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "recap" => Ok(Self::Recap),
            other => Err(format!(
                "Unknown report group '{other}' (expected daily, weekly, or recap)"
            )),
        }
    }
}

/// Fine-grained report kind inferred from the filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalType {
    #[serde(rename = "daily_kpi")]
    DailyKpi,
    #[serde(rename = "salebydeptUK")]
    SaleByDeptUk,
    #[serde(rename = "soldmovement")]
    SoldMovement,
    #[serde(rename = "storerecap")]
    StoreRecap,
    #[serde(rename = "weekly_kpi")]
    WeeklyKpi,
    #[serde(rename = "unknown")]
    Unknown,
}

impl LogicalType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::DailyKpi => "daily_kpi",
            Self::SaleByDeptUk => "salebydeptUK",
            Self::SoldMovement => "soldmovement",
            Self::StoreRecap => "storerecap",
            Self::WeeklyKpi => "weekly_kpi",
            Self::Unknown => "unknown",
        }
    }
}

/// One processed file. The natural ledger key is
/// `(store_id, group, date_key, logical_type)`; writing twice with the same
/// key merges into the existing document instead of duplicating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub store_id: String,
    /// 8-digit `YYYYMMDD` business date from the filename. Stays `None` when
    /// the filename carries no date; such records never reach the calendar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_key: Option<String>,
    pub group: ReportGroup,
    pub logical_type: LogicalType,
    pub filename: String,
    pub sheet_name: String,
    pub row_count: usize,
    /// RFC 3339 capture timestamp.
    pub processed_at: String,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
    /// Username of the session that produced the record, when one is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
}

impl UploadRecord {
    /// Document id inside the per-store subcollection. Falls back to the
    /// logical type alone when the filename carried no date key, so
    /// reprocessing a dateless file merges into one document.
    pub fn doc_id(&self) -> String {
        match &self.date_key {
            Some(key) => format!("{}_{}", key, self.logical_type.label()),
            None => self.logical_type.label().to_string(),
        }
    }

    /// Calendar date the report covers, when the date key parses as one.
    pub fn business_date(&self) -> Option<NaiveDate> {
        self.date_key.as_deref().and_then(parse_date_key)
    }
}

/// Parse an 8-digit `YYYYMMDD` key into a calendar date.
pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    if key.len() != 8 || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = key[0..4].parse().ok()?;
    let month: u32 = key[4..6].parse().ok()?;
    let day: u32 = key[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Per-day upload status on the calendar view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Uploaded,
    Missing,
    TodayPending,
    Future,
}

/// One day cell on the calendar. Derived per render, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarCell {
    pub date: NaiveDate,
    pub status: DayStatus,
}

/// User role as stored on the account document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    #[serde(rename = "Store Manager")]
    StoreManager,
    Store,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::StoreManager => "Store Manager",
            Self::Store => "Store",
        }
    }
}

/// Account document stored at `users/{username}`. Credentials are SHA-256
/// digests; the plaintext password never leaves the login call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub username: String,
    pub password_sha256: String,
    pub role: Role,
    pub display_name: String,
}

/// Active session, persisted to the state directory between invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub username: String,
    pub role: Role,
    pub display_name: String,
    pub login_at: chrono::DateTime<chrono::Utc>,
    pub last_active: chrono::DateTime<chrono::Utc>,
}

/// Per-group subcollection names under `stores/{storeId}/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collections {
    #[serde(default = "default_daily_sub")]
    pub daily: String,
    #[serde(default = "default_weekly_sub")]
    pub weekly: String,
    #[serde(default = "default_recap_sub")]
    pub recap: String,
}

fn default_daily_sub() -> String {
    "daily_kpi".to_string()
}

fn default_weekly_sub() -> String {
    "weekly_kpi".to_string()
}

fn default_recap_sub() -> String {
    "recap_kpi".to_string()
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            daily: default_daily_sub(),
            weekly: default_weekly_sub(),
            recap: default_recap_sub(),
        }
    }
}

/// Configuration stored in `~/.storekpi/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_store_root")]
    pub store_root: String,
    #[serde(default = "default_users_root")]
    pub users_root: String,
    #[serde(default = "default_summary_feed")]
    pub summary_feed: String,
    #[serde(default)]
    pub collections: Collections,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_minutes: i64,
    /// Overrides the default database location. Useful for shared stores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

fn default_store_root() -> String {
    "stores".to_string()
}

fn default_users_root() -> String {
    "users".to_string()
}

fn default_summary_feed() -> String {
    "public/kpi_reports".to_string()
}

fn default_session_timeout() -> i64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_root: default_store_root(),
            users_root: default_users_root(),
            summary_feed: default_summary_feed(),
            collections: Collections::default(),
            session_timeout_minutes: default_session_timeout(),
            db_path: None,
        }
    }
}

impl Config {
    /// Subcollection name for a report group.
    pub fn subcollection(&self, group: ReportGroup) -> &str {
        match group {
            ReportGroup::Daily => &self.collections.daily,
            ReportGroup::Weekly => &self.collections.weekly,
            ReportGroup::Recap => &self.collections.recap,
        }
    }
}
