//! Aggregate views: pivot tables for manager reports and the top-line
//! summary that feeds both email bodies.

use crate::config::CategorySheet;
use crate::data_utils::{drop_columns, filter_equals, reorder_rows, string_values};
use crate::error::Result;
use crate::model::{CategoryTotals, PivotView, ReportSummary, SalesRecord};
use crate::schema::{BoundSchema, VisibilityRule, AVERAGE_PREFIX};
use itertools::Itertools;
use polars::prelude::*;

pub const ROW_COUNT_COLUMN: &str = "# Rows";
pub const VISIBLE_COUNT_COLUMN: &str = "# Visible Items";

fn visible_expr(rule: &VisibilityRule) -> Expr {
    rule.visible_values
        .iter()
        .map(|value| col(&rule.column).eq(lit(value.as_str())).fill_null(lit(false)))
        .reduce(|acc, expr| acc.or(expr))
        .unwrap_or_else(|| lit(false))
}

/// Group `table` by `dimension` (ascending) with the sum of sales and ranking
/// metric, the average margin, and row / visible-item counts.
pub fn summarize_by(table: &DataFrame, schema: &BoundSchema, dimension: &str) -> Result<DataFrame> {
    let mut aggs = vec![
        col(schema.sales()).sum().alias(schema.sales()),
        col(schema.ranking_metric()).sum().alias(schema.ranking_metric()),
    ];
    if let Some(margin) = schema.margin() {
        aggs.push(col(margin).mean().alias(&format!("{}{}", AVERAGE_PREFIX, margin)));
    }
    aggs.push(len().alias(ROW_COUNT_COLUMN));
    if let Some(rule) = schema.visibility() {
        aggs.push(
            visible_expr(rule)
                .cast(DataType::UInt32)
                .sum()
                .alias(VISIBLE_COUNT_COLUMN),
        );
    }

    let grouped = table
        .clone()
        .lazy()
        .group_by_stable([col(dimension)])
        .agg(aggs)
        .collect()?;

    let keys = string_values(&grouped, dimension)?;
    reorder_rows(&grouped, |a, b| match (&keys[a], &keys[b]) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    })
}

/// Pivot views for a manager workbook: one per configured category, or a
/// single overall view when the table has no category column.
pub fn manager_pivots(
    subset: &DataFrame,
    schema: &BoundSchema,
    category_sheets: &[CategorySheet],
) -> Result<Vec<PivotView>> {
    let dimension = schema.salesperson_name();
    match schema.category() {
        Some(category) if !category_sheets.is_empty() => category_sheets
            .iter()
            .map(|sheet| {
                let rows = filter_equals(subset, category, &sheet.value)?;
                let mut table = summarize_by(&rows, schema, dimension)?;
                let drops: Vec<&str> = sheet.drop_columns.iter().map(String::as_str).collect();
                if !drops.is_empty() {
                    table = drop_columns(&table, &drops)?;
                }
                Ok(PivotView {
                    title: format!("{} Summary", sheet.value),
                    table,
                })
            })
            .collect(),
        _ => Ok(vec![PivotView {
            title: "Summary".to_string(),
            table: summarize_by(subset, schema, dimension)?,
        }]),
    }
}

/// Top-line totals plus per-category totals. Configured categories are
/// always listed (possibly with zero rows), others follow in first-seen order.
pub fn summarize(
    subset: &DataFrame,
    schema: &BoundSchema,
    category_sheets: &[CategorySheet],
) -> Result<ReportSummary> {
    let records = SalesRecord::from_table(subset, schema)?;

    let mut categories: Vec<CategoryTotals> = Vec::new();
    if schema.category().is_some() {
        let seen = records.iter().filter_map(|r| r.category.clone()).unique();
        let order = category_sheets
            .iter()
            .map(|s| s.value.clone())
            .chain(seen)
            .unique();
        for category in order {
            let in_category = records
                .iter()
                .filter(|r| r.category.as_deref() == Some(category.as_str()));
            let (rows, sales, opportunity) = in_category.fold((0, 0.0, 0.0), |acc, r| {
                (acc.0 + 1, acc.1 + r.sales, acc.2 + r.ranking_metric)
            });
            categories.push(CategoryTotals {
                category,
                rows,
                sales,
                opportunity,
            });
        }
    }

    Ok(ReportSummary {
        rows: records.len(),
        salespeople: records.iter().map(|r| &r.salesperson_email).unique().count(),
        visible_items: records.iter().filter(|r| r.visible).count(),
        total_sales: records.iter().map(|r| r.sales).sum(),
        total_opportunity: records.iter().map(|r| r.ranking_metric).sum(),
        categories,
        pivots: Vec::new(),
    })
}
