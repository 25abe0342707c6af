//! Presentation rules for rendered workbooks.
//!
//! A `StylePlan` is derived only from the frame contents and the column
//! kinds, so rendering the same subset twice produces the same plan.

use crate::config::NumberFormatting;
use crate::data_utils::{datetime_values, float_values, string_values};
use crate::error::Result;
use crate::schema::{BoundSchema, ColumnKind};
use polars::prelude::*;

pub const MAX_COLUMN_WIDTH: usize = 30;
pub const COLUMN_PADDING: usize = 2;
pub const HEADER_FILL: u32 = 0x006400;
pub const DATE_FORMAT: &str = "yyyy-mm-dd";

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStyle {
    pub header: String,
    pub kind: ColumnKind,
    pub width: f64,
    pub num_format: Option<String>,
}

impl ColumnStyle {
    pub fn is_numeric(&self) -> bool {
        self.kind != ColumnKind::Text
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StylePlan {
    pub columns: Vec<ColumnStyle>,
    pub freeze_rows: u32,
    pub autofilter: bool,
}

impl StylePlan {
    pub fn for_frame(
        frame: &DataFrame,
        schema: &BoundSchema,
        numbers: &NumberFormatting,
    ) -> Result<Self> {
        let columns = frame
            .get_columns()
            .iter()
            .map(|series| {
                let header = series.name().to_string();
                let kind = schema.kind_of(&header, series.dtype());
                let longest = display_values(frame, &header, kind, numbers)?
                    .iter()
                    .map(|cell| cell.chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0);
                Ok(ColumnStyle {
                    width: (longest + COLUMN_PADDING).min(MAX_COLUMN_WIDTH) as f64,
                    num_format: num_format(kind, numbers),
                    header,
                    kind,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            columns,
            freeze_rows: 1,
            autofilter: frame.width() > 0,
        })
    }
}

/// Excel number format for a column kind; `None` keeps "General".
pub fn num_format(kind: ColumnKind, numbers: &NumberFormatting) -> Option<String> {
    match kind {
        ColumnKind::Currency => Some(format!("#,##0{}", decimal_places(numbers.currency_decimals))),
        ColumnKind::Percent => Some(format!(
            "0{}\"%\"",
            decimal_places(numbers.percent_decimals)
        )),
        ColumnKind::Count => Some("#,##0".to_string()),
        ColumnKind::Date => Some(DATE_FORMAT.to_string()),
        ColumnKind::Number | ColumnKind::Text => None,
    }
}

fn decimal_places(decimals: u32) -> String {
    if decimals == 0 {
        String::new()
    } else {
        format!(".{}", "0".repeat(decimals as usize))
    }
}

/// Cell text as a reader will see it, used for column widths and email tables.
pub fn display_values(
    frame: &DataFrame,
    column: &str,
    kind: ColumnKind,
    numbers: &NumberFormatting,
) -> Result<Vec<String>> {
    if kind == ColumnKind::Text {
        return Ok(string_values(frame, column)?
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect());
    }
    if kind == ColumnKind::Date {
        return Ok(datetime_values(frame, column)?
            .into_iter()
            .map(|v| v.map(|dt| dt.format("%Y-%m-%d").to_string()).unwrap_or_default())
            .collect());
    }
    Ok(float_values(frame, column)?
        .into_iter()
        .map(|v| v.map(|n| display_number(n, kind, numbers)).unwrap_or_default())
        .collect())
}

pub fn display_number(value: f64, kind: ColumnKind, numbers: &NumberFormatting) -> String {
    match kind {
        ColumnKind::Currency => format_grouped(value, numbers.currency_decimals),
        ColumnKind::Percent => format!("{:.*}%", numbers.percent_decimals as usize, value),
        ColumnKind::Count => format_grouped(value, 0),
        ColumnKind::Number | ColumnKind::Date | ColumnKind::Text => {
            if value.fract() == 0.0 && value.abs() < 1e15 {
                format!("{}", value as i64)
            } else {
                value.to_string()
            }
        }
    }
}

/// Fixed decimals with thousands separators: 1234567.891 -> "1,234,567.89".
pub fn format_grouped(value: f64, decimals: u32) -> String {
    let fixed = format!("{:.*}", decimals as usize, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(fixed.len() + int_part.len() / 3);
    for (idx, ch) in int_part.chars().enumerate() {
        if idx > 0 && (int_part.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }

    let is_zero = fixed.chars().all(|c| c == '0' || c == '.');
    if value < 0.0 && !is_zero {
        format!("-{}", grouped)
    } else {
        grouped
    }
}
