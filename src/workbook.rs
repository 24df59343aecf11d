//! Workbook decoding and row extraction.
//!
//! Decodes spreadsheet bytes through calamine and produces a normalized
//! 2-D row set. Daily KPI sheets are windowed to a fixed cell range; every
//! other report type takes the full sheet. The extractor is a structural
//! filter only: no numeric or semantic validation of cell contents.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use serde_json::Value;

use crate::error::ProcessError;
use crate::types::LogicalType;

/// Fixed window decoded for daily KPI sheets: columns A-Z, rows 1-23.
/// The boundaries are an external contract with the report template.
pub const DAILY_KPI_WINDOW: ((u32, u32), (u32, u32)) = ((0, 0), (22, 25));

/// How much of the sheet the extractor keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    /// The fixed A1:Z23 window. Used exactly for `daily_kpi`.
    Ranged,
    /// Every row of the sheet.
    Full,
}

impl ExtractMode {
    pub fn for_type(logical_type: LogicalType) -> Self {
        match logical_type {
            LogicalType::DailyKpi => Self::Ranged,
            _ => Self::Full,
        }
    }
}

/// First sheet of a decoded workbook, normalized.
#[derive(Debug, Clone)]
pub struct DecodedSheet {
    pub sheet_name: String,
    pub rows: Vec<Vec<Value>>,
}

/// Decode workbook bytes and extract the first sheet.
///
/// The format is auto-detected (xlsx, xls, xlsm, ods), matching the set of
/// extensions accepted by the batch runner.
pub fn decode_workbook(bytes: &[u8], mode: ExtractMode) -> Result<DecodedSheet, ProcessError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| ProcessError::WorkbookDecode(e.to_string()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(ProcessError::EmptyWorkbook)?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ProcessError::WorkbookDecode(e.to_string()))?;

    let rows = match mode {
        ExtractMode::Ranged => {
            let (start, end) = DAILY_KPI_WINDOW;
            normalize_rows(&range.range(start, end))
        }
        ExtractMode::Full => normalize_rows(&range),
    };

    Ok(DecodedSheet { sheet_name, rows })
}

/// Convert a decoded range to JSON rows, dropping rows that are entirely
/// empty. Order among kept rows is preserved.
pub fn normalize_rows(range: &Range<Data>) -> Vec<Vec<Value>> {
    range
        .rows()
        .filter(|row| !row_is_empty(row))
        .map(|row| row.iter().map(cell_to_value).collect())
        .collect()
}

fn row_is_empty(row: &[Data]) -> bool {
    row.iter().all(|cell| match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    })
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(n) => Value::from(*n),
        Data::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::Bool(b) => Value::Bool(*b),
        Data::Error(e) => Value::String(format!("#ERR({:?})", e)),
        Data::DateTime(dt) => Value::String(dt.to_string()),
        Data::DateTimeIso(s) => Value::String(s.clone()),
        Data::DurationIso(s) => Value::String(s.clone()),
    }
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------
