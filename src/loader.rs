//! Loading, cleaning and numeric normalization of the raw sales table.

use crate::config::NumberFormatting;
use crate::data_utils::{float_values, string_values, trim_text_columns};
use crate::error::{ReportError, Result};
use crate::schema::BoundSchema;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDateTime, Timelike};
use polars::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods"];

/// Load the first sheet of a workbook, or a csv file.
pub fn load(path: &Path) -> Result<DataFrame> {
    load_sheet(path, None)
}

/// Load `sheet` (or the first sheet) of a workbook, or a csv file. The first
/// row is the header row.
pub fn load_sheet(path: &Path, sheet: Option<&str>) -> Result<DataFrame> {
    if !path.is_file() {
        return Err(ReportError::Load(format!(
            "input file not found: {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let df = if extension == "csv" {
        load_csv(path)?
    } else if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
        load_workbook(path, sheet)?
    } else {
        return Err(ReportError::Load(format!(
            "not a recognized spreadsheet format: {}",
            path.display()
        )));
    };

    info!(
        rows = df.height(),
        columns = df.width(),
        path = %path.display(),
        "Loaded sales table"
    );
    Ok(df)
}

/// Text cells are trimmed like workbook cells, so blanks read as null.
fn load_csv(path: &Path) -> Result<DataFrame> {
    let df = LazyCsvReader::new(path)
        .with_infer_schema_length(Some(1000))
        .finish()
        .and_then(|lf| lf.collect())
        .map_err(|e| ReportError::Load(format!("Failed to read {}: {}", path.display(), e)))?;
    trim_text_columns(&df)
}

enum Cell {
    Empty,
    Number(f64),
    Date(NaiveDateTime),
    Text(String),
}

impl Cell {
    fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::Float(n) => Cell::Number(*n),
            Data::Int(n) => Cell::Number(*n as f64),
            Data::DateTime(dt) if dt.is_duration() => Cell::Number(dt.as_f64()),
            Data::DateTime(dt) => match dt.as_datetime() {
                Some(value) => Cell::Date(value),
                None => Cell::Number(dt.as_f64()),
            },
            Data::Bool(b) => Cell::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(trimmed.to_string())
                }
            }
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Date(dt) if dt.num_seconds_from_midnight() == 0 => Some(dt.format("%Y-%m-%d").to_string()),
            Cell::Date(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
        }
    }
}

fn load_workbook(path: &Path, sheet: Option<&str>) -> Result<DataFrame> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| ReportError::Load(format!("Failed to open {}: {}", path.display(), e)))?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook.sheet_names().first().cloned().ok_or_else(|| {
            ReportError::Load(format!("{} contains no sheets", path.display()))
        })?,
    };

    let range = workbook.worksheet_range(&sheet_name).map_err(|e| {
        ReportError::Load(format!(
            "Failed to read sheet '{}' of {}: {}",
            sheet_name,
            path.display(),
            e
        ))
    })?;

    let mut rows = range.rows();
    let header_row = rows.next().ok_or_else(|| {
        ReportError::Load(format!(
            "sheet '{}' of {} has no header row",
            sheet_name,
            path.display()
        ))
    })?;

    let mut seen = HashSet::new();
    let mut headers = Vec::with_capacity(header_row.len());
    for (idx, cell) in header_row.iter().enumerate() {
        let header = Cell::from_data(cell)
            .as_text()
            .unwrap_or_else(|| format!("column_{}", idx + 1));
        if !seen.insert(header.clone()) {
            return Err(ReportError::Load(format!(
                "duplicate header '{}' in sheet '{}'",
                header, sheet_name
            )));
        }
        headers.push(header);
    }

    let mut columns: Vec<Vec<Cell>> = headers.iter().map(|_| Vec::new()).collect();
    for row in rows {
        for (idx, column) in columns.iter_mut().enumerate() {
            column.push(row.get(idx).map(Cell::from_data).unwrap_or(Cell::Empty));
        }
    }

    let series = headers
        .iter()
        .zip(columns)
        .map(|(header, cells)| column_series(header, cells))
        .collect::<Result<Vec<Series>>>()?;

    DataFrame::new(series)
        .map_err(|e| ReportError::Load(format!("Failed to build table from {}: {}", path.display(), e)))
}

/// Columns holding only numbers become Float64, only dates a millisecond
/// Datetime, anything else String. Empty cells are null and do not count.
fn column_series(header: &str, cells: Vec<Cell>) -> Result<Series> {
    let filled: Vec<&Cell> = cells.iter().filter(|c| !matches!(c, Cell::Empty)).collect();

    if !filled.is_empty() && filled.iter().all(|c| matches!(c, Cell::Number(_))) {
        let values: Vec<Option<f64>> = cells
            .iter()
            .map(|c| match c {
                Cell::Number(n) => Some(*n),
                _ => None,
            })
            .collect();
        return Ok(Series::new(header, values));
    }

    if !filled.is_empty() && filled.iter().all(|c| matches!(c, Cell::Date(_))) {
        let millis: Vec<Option<i64>> = cells
            .iter()
            .map(|c| match c {
                Cell::Date(dt) => Some(dt.and_utc().timestamp_millis()),
                _ => None,
            })
            .collect();
        return Ok(Series::new(header, millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?);
    }

    let values: Vec<Option<String>> = cells.iter().map(Cell::as_text).collect();
    Ok(Series::new(header, values))
}

/// Drop rows whose salesperson email is null or blank. The input is not
/// modified and survivors keep their relative order.
pub fn clean(table: &DataFrame, schema: &BoundSchema) -> Result<DataFrame> {
    let emails = string_values(table, schema.salesperson_email())?;
    let keep: BooleanChunked = emails.iter().map(Option::is_some).collect();
    let cleaned = table.filter(&keep)?;

    let dropped = table.height() - cleaned.height();
    if dropped > 0 {
        warn!(
            dropped,
            column = schema.salesperson_email(),
            "Dropped rows with missing salesperson email"
        );
    }
    debug!("Data after cleaning:\n{}", cleaned.head(Some(5)));
    Ok(cleaned)
}

/// Result of `format_columns`: the table plus how many cells were replaced
/// by the zero sentinel.
#[derive(Debug, Clone)]
pub struct FormattedTable {
    pub table: DataFrame,
    pub coerced: usize,
}

/// Coerce currency and percentage columns to rounded Float64. Missing or
/// unparseable cells become 0.0 and are counted, never fatal.
pub fn format_columns(
    table: &DataFrame,
    schema: &BoundSchema,
    numbers: &NumberFormatting,
) -> Result<FormattedTable> {
    let mut out = table.clone();
    let mut coerced = 0;

    for column in schema.currency_columns() {
        let (values, replaced) = numeric_values(table, column)?;
        coerced += replaced;
        let rounded: Vec<f64> = values
            .into_iter()
            .map(|v| round_to(v, numbers.currency_decimals))
            .collect();
        out.with_column(Series::new(column, rounded))?;
    }

    for column in schema.percent_columns() {
        let (values, replaced) = numeric_values(table, column)?;
        coerced += replaced;
        let scaled: Vec<f64> = values
            .into_iter()
            .map(|v| round_to(v * numbers.percent_scale, numbers.percent_decimals))
            .collect();
        out.with_column(Series::new(column, scaled))?;
    }

    if coerced > 0 {
        warn!(coerced, "Replaced missing or unparseable numeric values with 0");
    }
    Ok(FormattedTable {
        table: out,
        coerced,
    })
}

/// Values of a numeric column with nulls replaced by 0.0, plus the number of
/// replacements. Text columns are parsed leniently ("$1,250.50", "25%").
fn numeric_values(table: &DataFrame, column: &str) -> Result<(Vec<f64>, usize)> {
    let raw: Vec<Option<f64>> = if table.column(column)?.dtype() == &DataType::String {
        string_values(table, column)?
            .into_iter()
            .map(|v| v.as_deref().and_then(parse_number))
            .collect()
    } else {
        float_values(table, column)?
    };
    let replaced = raw.iter().filter(|v| v.map_or(true, |n| !n.is_finite())).count();
    let values = raw
        .into_iter()
        .map(|v| v.filter(|n| n.is_finite()).unwrap_or(0.0))
        .collect();
    Ok((values, replaced))
}

/// Parse a loosely formatted number. A trailing '%' divides by 100.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let (body, percent) = match trimmed.strip_suffix('%') {
        Some(rest) => (rest, true),
        None => (trimmed, false),
    };
    let (body, negative) = match body.trim().strip_prefix('(').and_then(|b| b.strip_suffix(')')) {
        Some(inner) => (inner, true),
        None => (body.trim(), false),
    };
    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    let value = if negative { -value } else { value };
    Some(if percent { value / 100.0 } else { value })
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
