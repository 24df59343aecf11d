use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, Utc};
use clap::{Parser, Subcommand};

use storekpi::calendar;
use storekpi::runner;
use storekpi::state::{create_or_update_config, AppState};
use storekpi::types::{DayStatus, ReportGroup, Session};

#[derive(Parser)]
#[command(
    name = "storekpi",
    version,
    about = "KPI upload processing and calendar coverage tracking for retail stores"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in as a configured user
    Login { username: String },
    /// End the current session
    Logout,
    /// Ingest a workbook or a zip of workbooks into a report group
    Ingest {
        /// Report group the upload belongs to: daily, weekly, or recap
        group: ReportGroup,
        /// Path to a .xlsx/.xls/.xlsm/.ods workbook or a .zip archive
        path: PathBuf,
    },
    /// Show the daily-upload calendar for a month
    Calendar {
        /// Month to render as YYYY-MM; defaults to the current month
        month: Option<String>,
        /// Store id to report on; defaults to the session's store
        #[arg(long)]
        store: Option<String>,
    },
    /// List ledger entries for a report group
    Records {
        group: ReportGroup,
        /// Store id to report on; defaults to the session's store
        #[arg(long)]
        store: Option<String>,
    },
    /// Create the stock user accounts when absent
    SeedUsers,
    /// Update stored configuration
    Config {
        /// Subcollection name for daily records
        #[arg(long)]
        daily_collection: Option<String>,
        /// Subcollection name for weekly records
        #[arg(long)]
        weekly_collection: Option<String>,
        /// Subcollection name for recap records
        #[arg(long)]
        recap_collection: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(err) = run(cli.command).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Login { username } => cmd_login(&username).await,
        Command::Logout => cmd_logout(),
        Command::Ingest { group, path } => cmd_ingest(group, &path).await,
        Command::Calendar { month, store } => cmd_calendar(month.as_deref(), store).await,
        Command::Records { group, store } => cmd_records(group, store).await,
        Command::SeedUsers => cmd_seed_users().await,
        Command::Config {
            daily_collection,
            weekly_collection,
            recap_collection,
        } => cmd_config(daily_collection, weekly_collection, recap_collection),
    }
}

async fn cmd_login(username: &str) -> Result<(), String> {
    let state = AppState::init()?;
    let password = prompt_password()?;

    let session = state
        .sessions
        .login(username, &password)
        .await
        .map_err(|e| e.to_string())?;

    println!(
        "Logged in as {} ({})",
        session.display_name,
        session.role.label()
    );
    Ok(())
}

fn cmd_logout() -> Result<(), String> {
    let state = AppState::init()?;
    state.sessions.logout();
    println!("Logged out");
    Ok(())
}

async fn cmd_ingest(group: ReportGroup, path: &Path) -> Result<(), String> {
    let state = AppState::init()?;
    let session = state.sessions.resume(Utc::now());
    let uploaded_by = session.as_ref().map(|s| s.username.clone());

    // Expiry watchdog runs beside the batch; the operation guard below
    // keeps it from clearing the session while writes are in flight.
    tokio::spawn(state.sessions.clone().run_watchdog());
    let guard = state.sessions.begin_operation();

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("Not a file path: {}", path.display()))?;

    let report = runner::run_batch(
        state.ledger.clone(),
        group,
        filename,
        bytes,
        uploaded_by,
    )
    .await;
    drop(guard);

    println!("{}", report.summary_line());
    for record in &report.succeeded {
        println!(
            "  + [{} | {}] {} ({} rows)",
            record.group.label(),
            record.logical_type.label(),
            record.filename,
            record.row_count
        );
    }
    for failure in &report.failed {
        println!("  - {}: {}", failure.name, failure.message);
    }

    if report.succeeded.is_empty() && !report.failed.is_empty() {
        return Err(format!("no files processed ({})", report.summary_line()));
    }
    Ok(())
}

async fn cmd_calendar(month: Option<&str>, store: Option<String>) -> Result<(), String> {
    let state = AppState::init()?;
    let session = state.sessions.resume(Utc::now());
    state.sessions.mark_activity(Utc::now());

    let store_id = resolve_store(store, session.as_ref())?;
    let today = Local::now().date_naive();
    let (year, month) = match month {
        Some(raw) => parse_month(raw)?,
        None => (today.year(), today.month()),
    };

    let uploaded = state
        .ledger
        .uploaded_dates(&store_id)
        .await
        .map_err(|e| e.to_string())?;
    let grid = calendar::derive_month(year, month, &uploaded, today);
    if grid.is_empty() {
        return Err(format!("{year}-{month:02} is not a valid month"));
    }

    println!("Daily KPI uploads for store {store_id}, {year}-{month:02}");
    println!(" Mon  Tue  Wed  Thu  Fri  Sat  Sun");
    for week in grid.chunks(7) {
        let mut line = String::new();
        for cell in week {
            match cell {
                Some(cell) => {
                    let marker = match cell.status {
                        DayStatus::Uploaded => '+',
                        DayStatus::Missing => '!',
                        DayStatus::TodayPending => '*',
                        DayStatus::Future => '.',
                    };
                    line.push_str(&format!(" {:>2}{} ", cell.date.day(), marker));
                }
                None => line.push_str("     "),
            }
        }
        println!("{line}");
    }
    println!("  + uploaded   ! missing   * today   . future");
    Ok(())
}

async fn cmd_records(group: ReportGroup, store: Option<String>) -> Result<(), String> {
    let state = AppState::init()?;
    let session = state.sessions.resume(Utc::now());
    state.sessions.mark_activity(Utc::now());

    let store_id = resolve_store(store, session.as_ref())?;
    let records = state
        .ledger
        .records_for_group(&store_id, group)
        .await
        .map_err(|e| e.to_string())?;

    if records.is_empty() {
        println!("No {} records for store {store_id}", group.label());
        return Ok(());
    }

    println!("{} records for store {store_id}:", group.label());
    for record in records {
        println!(
            "  {}  {:<14} {} ({} rows)",
            record.date_key.as_deref().unwrap_or("--------"),
            record.logical_type.label(),
            record.filename,
            record.row_count
        );
    }
    Ok(())
}

async fn cmd_seed_users() -> Result<(), String> {
    let state = AppState::init()?;
    let created = state
        .sessions
        .seed_default_users()
        .await
        .map_err(|e| e.to_string())?;
    println!("Seeded {created} user(s)");
    Ok(())
}

fn cmd_config(
    daily: Option<String>,
    weekly: Option<String>,
    recap: Option<String>,
) -> Result<(), String> {
    let config = create_or_update_config(|config| {
        if let Some(daily) = daily {
            config.collections.daily = daily;
        }
        if let Some(weekly) = weekly {
            config.collections.weekly = weekly;
        }
        if let Some(recap) = recap {
            config.collections.recap = recap;
        }
    })?;

    println!(
        "Collections: {}/{{storeId}}/{} | {} | {}",
        config.store_root,
        config.collections.daily,
        config.collections.weekly,
        config.collections.recap
    );
    Ok(())
}

fn parse_month(raw: &str) -> Result<(i32, u32), String> {
    let invalid = || format!("Invalid month '{raw}' (expected YYYY-MM)");
    let (year, month) = raw.split_once('-').ok_or_else(invalid)?;
    let year = year.parse().map_err(|_| invalid())?;
    let month = month.parse().map_err(|_| invalid())?;
    Ok((year, month))
}

fn prompt_password() -> Result<String, String> {
    eprint!("Password: ");
    std::io::stderr().flush().ok();
    let mut password = String::new();
    std::io::stdin()
        .read_line(&mut password)
        .map_err(|e| format!("Failed to read password: {e}"))?;
    Ok(password.trim_end_matches(['\r', '\n']).to_string())
}

/// Store scope for queries: an explicit `--store` wins; otherwise the
/// session's username when it leads with a store id (e.g. "4340", "4340s").
fn resolve_store(flag: Option<String>, session: Option<&Session>) -> Result<String, String> {
    if let Some(store) = flag {
        return Ok(store);
    }
    if let Some(session) = session {
        let digits: String = session
            .username
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.len() == 4 {
            return Ok(digits);
        }
    }
    Err("No store id in scope; pass --store <id> or log in as a store user".to_string())
}
