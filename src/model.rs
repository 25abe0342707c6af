use crate::data_utils::{float_values, string_values};
use crate::error::Result;
use crate::schema::BoundSchema;
use chrono::{DateTime, Local, TimeZone};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    SalesRep,
    Manager,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::SalesRep => write!(f, "sales rep"),
            Role::Manager => write!(f, "manager"),
        }
    }
}

/// Someone who receives exactly one report per role per run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub role: Role,
    pub email: String,
    pub name: String,
}

impl Recipient {
    pub fn sales_rep(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: Role::SalesRep,
            email: email.into(),
            name: name.into(),
        }
    }

    pub fn manager(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: Role::Manager,
            email: email.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} <{}>", self.role, self.name, self.email)
    }
}

/// Reporting interval label, e.g. "Jun, 2025".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodLabel(String);

impl PeriodLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn from_date<Tz: TimeZone>(date: &DateTime<Tz>, format: &str) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self(date.format(format).to_string())
    }

    pub fn current(format: &str) -> Self {
        Self::from_date(&Local::now(), format)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed view of one cleaned, formatted row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub salesperson_email: String,
    pub sales: f64,
    pub ranking_metric: f64,
    pub category: Option<String>,
    pub visible: bool,
}

impl SalesRecord {
    /// Read every row of `table`. Rows without a salesperson email are skipped;
    /// a cleaned table has none.
    pub fn from_table(table: &DataFrame, schema: &BoundSchema) -> Result<Vec<SalesRecord>> {
        let emails = string_values(table, schema.salesperson_email())?;
        let sales = float_values(table, schema.sales())?;
        let metric = float_values(table, schema.ranking_metric())?;
        let category = match schema.category() {
            Some(column) => Some(string_values(table, column)?),
            None => None,
        };
        let visibility = match schema.visibility() {
            Some(rule) => Some((string_values(table, &rule.column)?, &rule.visible_values)),
            None => None,
        };

        let mut records = Vec::with_capacity(table.height());
        for row in 0..table.height() {
            let Some(email) = emails[row].clone() else {
                continue;
            };
            records.push(SalesRecord {
                salesperson_email: email,
                sales: sales[row].unwrap_or(0.0),
                ranking_metric: metric[row].unwrap_or(0.0),
                category: category.as_ref().and_then(|c| c[row].clone()),
                visible: visibility.as_ref().is_some_and(|(values, visible)| {
                    values[row].as_ref().is_some_and(|v| visible.contains(v))
                }),
            });
        }
        Ok(records)
    }
}

/// Totals for one category value within a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub category: String,
    pub rows: usize,
    pub sales: f64,
    pub opportunity: f64,
}

/// A titled aggregate table shown in a manager workbook and email.
#[derive(Debug, Clone)]
pub struct PivotView {
    pub title: String,
    pub table: DataFrame,
}

/// Top-line numbers for the email body.
#[derive(Debug, Clone, Default)]
pub struct ReportSummary {
    pub rows: usize,
    pub salespeople: usize,
    pub visible_items: usize,
    pub total_sales: f64,
    pub total_opportunity: f64,
    pub categories: Vec<CategoryTotals>,
    pub pivots: Vec<PivotView>,
}

/// A written workbook waiting to be mailed. The file stays on disk after
/// sending.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub path: PathBuf,
    pub recipient: Recipient,
    pub period: PeriodLabel,
    pub summary: ReportSummary,
}
