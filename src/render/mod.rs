//! Workbook rendering for salesperson and manager reports.

pub mod paths;
pub mod style;

pub use paths::{sanitize_component, ArtifactPaths};
pub use style::{ColumnStyle, StylePlan};

use crate::config::{CategorySheet, NumberFormatting};
use crate::data_utils::{
    datetime_values, drop_columns, filter_equals, float_values, sort_descending_by, string_values,
};
use crate::error::{ReportError, Result};
use crate::model::{PeriodLabel, Recipient, RenderedArtifact, ReportSummary};
use crate::pivot::{manager_pivots, summarize};
use crate::schema::{BoundSchema, ColumnKind};
use chrono::{Datelike, NaiveDateTime, Timelike};
use polars::prelude::*;
use rust_xlsxwriter::{Color, ExcelDateTime, Format, FormatAlign, Workbook, Worksheet};
use std::path::Path;
use tracing::{debug, info, warn};

pub const DETAIL_SHEET: &str = "Detail";
pub const OTHER_SHEET: &str = "Other";
pub const ALL_DATA_SHEET: &str = "All Data";

const MAX_SHEET_NAME_LEN: usize = 31;
const INVALID_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// One worksheet to be written.
#[derive(Debug, Clone)]
pub struct SheetData {
    pub name: String,
    pub frame: DataFrame,
}

impl SheetData {
    pub fn new(name: impl Into<String>, frame: DataFrame) -> Self {
        Self {
            name: name.into(),
            frame,
        }
    }
}

pub struct ReportRenderer<'a> {
    schema: &'a BoundSchema,
    category_sheets: &'a [CategorySheet],
    numbers: NumberFormatting,
    paths: ArtifactPaths,
}

impl<'a> ReportRenderer<'a> {
    pub fn new(
        schema: &'a BoundSchema,
        category_sheets: &'a [CategorySheet],
        numbers: NumberFormatting,
        output_dir: &Path,
    ) -> Self {
        Self {
            schema,
            category_sheets,
            numbers,
            paths: ArtifactPaths::new(output_dir),
        }
    }

    pub fn render_salesperson_report(
        &mut self,
        subset: &DataFrame,
        recipient: &Recipient,
        period: &PeriodLabel,
    ) -> Result<RenderedArtifact> {
        let build = || -> Result<(Vec<SheetData>, ReportSummary)> {
            let sheets = self.salesperson_sheets(subset)?;
            let summary = summarize(subset, self.schema, self.category_sheets)?;
            Ok((sheets, summary))
        };
        let (sheets, summary) = build().map_err(|e| render_error(recipient, e))?;
        let path = self.paths.claim(recipient, period);
        write_workbook(&path, &sheets, self.schema, &self.numbers)
            .map_err(|e| render_error(recipient, e))?;

        info!(
            recipient = %recipient.email,
            rows = subset.height(),
            sheets = sheets.len(),
            path = %path.display(),
            "Rendered salesperson report"
        );
        Ok(RenderedArtifact {
            path,
            recipient: recipient.clone(),
            period: period.clone(),
            summary,
        })
    }

    /// `subset` must already be in global ranking order.
    pub fn render_manager_report(
        &mut self,
        subset: &DataFrame,
        recipient: &Recipient,
        period: &PeriodLabel,
    ) -> Result<RenderedArtifact> {
        let build = || -> Result<(Vec<SheetData>, ReportSummary)> {
            let pivots = manager_pivots(subset, self.schema, self.category_sheets)?;
            let mut summary = summarize(subset, self.schema, self.category_sheets)?;
            let mut sheets: Vec<SheetData> = pivots
                .iter()
                .map(|p| SheetData::new(p.title.clone(), p.table.clone()))
                .collect();
            sheets.push(SheetData::new(
                ALL_DATA_SHEET,
                drop_columns(subset, &self.schema.email_columns())?,
            ));
            summary.pivots = pivots;
            Ok((sheets, summary))
        };
        let (sheets, summary) = build().map_err(|e| render_error(recipient, e))?;
        let path = self.paths.claim(recipient, period);
        write_workbook(&path, &sheets, self.schema, &self.numbers)
            .map_err(|e| render_error(recipient, e))?;

        info!(
            recipient = %recipient.email,
            rows = subset.height(),
            sheets = sheets.len(),
            path = %path.display(),
            "Rendered manager report"
        );
        Ok(RenderedArtifact {
            path,
            recipient: recipient.clone(),
            period: period.clone(),
            summary,
        })
    }

    /// Sheets of a salesperson workbook: identity columns removed, one sheet
    /// per configured category plus "Other" for the rest, or a single
    /// "Detail" sheet when there is no category column.
    pub fn salesperson_sheets(&self, subset: &DataFrame) -> Result<Vec<SheetData>> {
        let detail = drop_columns(subset, &self.schema.identity_columns())?;
        let metric = self.schema.ranking_metric();

        let category = match self.schema.category() {
            Some(category) if !self.category_sheets.is_empty() => category,
            _ => {
                return Ok(vec![SheetData::new(
                    DETAIL_SHEET,
                    sort_descending_by(&detail, metric)?,
                )])
            }
        };

        let mut sheets = Vec::with_capacity(self.category_sheets.len() + 1);
        for sheet in self.category_sheets.iter() {
            let rows = filter_equals(&detail, category, &sheet.value)?;
            let sorted = sort_descending_by(&rows, &sheet.sort_by)?;
            let drops: Vec<&str> = sheet.drop_columns.iter().map(String::as_str).collect();
            sheets.push(SheetData::new(sheet.value.clone(), drop_columns(&sorted, &drops)?));
        }

        let listed: Vec<&str> = self.category_sheets.iter().map(|s| s.value.as_str()).collect();
        let unlisted: BooleanChunked = string_values(&detail, category)?
            .iter()
            .map(|v| v.as_deref().map_or(true, |c| !listed.contains(&c)))
            .collect();
        let other = detail.filter(&unlisted)?;
        if other.height() > 0 {
            debug!(rows = other.height(), "Rows outside the configured categories");
            sheets.push(SheetData::new(OTHER_SHEET, sort_descending_by(&other, metric)?));
        }
        Ok(sheets)
    }
}

fn render_error(recipient: &Recipient, err: ReportError) -> ReportError {
    match err {
        ReportError::Render(msg) => ReportError::Render(format!("{}: {}", recipient, msg)),
        other => ReportError::Render(format!("{}: {}", recipient, other)),
    }
}

/// Write `sheets` to `path` and return the style plan applied to each sheet.
/// An existing file is replaced.
pub fn write_workbook(
    path: &Path,
    sheets: &[SheetData],
    schema: &BoundSchema,
    numbers: &NumberFormatting,
) -> Result<Vec<StylePlan>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        warn!(path = %path.display(), "Replacing report file from an earlier run");
    }

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(style::HEADER_FILL))
        .set_align(FormatAlign::Left);

    let mut workbook = Workbook::new();
    let mut used_names: Vec<String> = Vec::with_capacity(sheets.len());
    let mut plans = Vec::with_capacity(sheets.len());

    for sheet in sheets {
        let name = unique_sheet_name(&sheet.name, &used_names);
        let plan = StylePlan::for_frame(&sheet.frame, schema, numbers)?;
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&name)?;
        write_sheet(worksheet, &sheet.frame, &plan, &header_format)?;
        used_names.push(name);
        plans.push(plan);
    }

    workbook.save(path)?;
    Ok(plans)
}

fn write_sheet(
    worksheet: &mut Worksheet,
    frame: &DataFrame,
    plan: &StylePlan,
    header_format: &Format,
) -> Result<()> {
    for (idx, column) in plan.columns.iter().enumerate() {
        let col = idx as u16;
        worksheet.write_string_with_format(0, col, column.header.as_str(), header_format)?;
        worksheet.set_column_width(col, column.width)?;

        let mut format = Format::new();
        if column.is_numeric() {
            format = format.set_align(FormatAlign::Right);
        }
        if let Some(num_format) = &column.num_format {
            format = format.set_num_format(num_format);
        }

        match column.kind {
            ColumnKind::Text => {
                for (row, value) in string_values(frame, &column.header)?.into_iter().enumerate() {
                    if let Some(value) = value {
                        worksheet.write_string(row as u32 + 1, col, value.as_str())?;
                    }
                }
            }
            ColumnKind::Date => {
                for (row, value) in datetime_values(frame, &column.header)?.into_iter().enumerate() {
                    if let Some(value) = value {
                        let cell = excel_datetime(&value)?;
                        worksheet.write_datetime_with_format(row as u32 + 1, col, &cell, &format)?;
                    }
                }
            }
            _ => {
                for (row, value) in float_values(frame, &column.header)?.into_iter().enumerate() {
                    if let Some(value) = value {
                        worksheet.write_number_with_format(row as u32 + 1, col, value, &format)?;
                    }
                }
            }
        }
    }

    if plan.freeze_rows > 0 {
        worksheet.set_freeze_panes(plan.freeze_rows, 0)?;
    }
    if plan.autofilter && !plan.columns.is_empty() {
        let last_col = (plan.columns.len() - 1) as u16;
        worksheet.autofilter(0, 0, frame.height() as u32, last_col)?;
    }
    Ok(())
}

fn excel_datetime(value: &NaiveDateTime) -> Result<ExcelDateTime> {
    let cell = ExcelDateTime::from_ymd(value.year() as u16, value.month() as u8, value.day() as u8)?
        .and_hms(value.hour() as u16, value.minute() as u8, value.second())?;
    Ok(cell)
}

/// Excel sheet names: at most 31 characters, none of `[]:*?/\`, unique
/// ignoring case.
fn unique_sheet_name(raw: &str, used: &[String]) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if INVALID_SHEET_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'');
    let base: String = if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned.chars().take(MAX_SHEET_NAME_LEN).collect()
    };

    let taken = |name: &str| used.iter().any(|u| u.eq_ignore_ascii_case(name));
    if !taken(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let suffix = format!(" ({})", n);
        let keep = MAX_SHEET_NAME_LEN - suffix.chars().count();
        let candidate = format!("{}{}", base.chars().take(keep).collect::<String>(), suffix);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
