//! Schema binding between the raw sales table and the logical report fields.
//!
//! The source workbook is addressed by header name only. `bind` checks every
//! configured header against the loaded table once, so a layout change shows
//! up as a `SchemaMismatch` at load time instead of a report built from the
//! wrong column.

use crate::error::{ReportError, Result};
use itertools::Itertools;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Email/name header pair for one level of the management hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierColumns {
    pub email: String,
    pub name: String,
}

impl TierColumns {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
        }
    }
}

/// Marks rows as "visible items" when `column` holds one of `visible_values`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisibilityRule {
    pub column: String,
    pub visible_values: Vec<String>,
}

/// Logical field name -> physical header name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnMapping {
    pub salesperson_email: String,
    pub salesperson_name: String,
    /// Only these pairs are treated as manager sources.
    pub manager_tiers: Vec<TierColumns>,
    pub sales: String,
    /// Ranking metric used to order manager reports.
    pub ranking_metric: String,
    pub margin: Option<String>,
    pub category: Option<String>,
    pub visibility: Option<VisibilityRule>,
    /// Extra currency columns besides `sales` and `ranking_metric`.
    pub currency_columns: Vec<String>,
    /// Extra percentage columns besides `margin`.
    pub percent_columns: Vec<String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            salesperson_email: "Sales Rep Email".to_string(),
            salesperson_name: "Sales Rep Name".to_string(),
            manager_tiers: vec![TierColumns::new("Manager Email", "Manager Name")],
            sales: "$ Gross Sales (TTM)".to_string(),
            ranking_metric: "$ Opp to Floor".to_string(),
            margin: None,
            category: Some("Category".to_string()),
            visibility: None,
            currency_columns: Vec::new(),
            percent_columns: Vec::new(),
        }
    }
}

/// How a column is presented in rendered workbooks and email tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Text,
    Currency,
    Percent,
    Count,
    Number,
    Date,
}

/// Prefix given to averaged percentage columns in pivot views.
pub const AVERAGE_PREFIX: &str = "Avg ";
/// Prefix given to count columns in pivot views.
pub const COUNT_PREFIX: &str = "# ";

/// A `ColumnMapping` that has been checked against a concrete table.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSchema {
    mapping: ColumnMapping,
}

impl BoundSchema {
    /// Validate `mapping` against the headers of `table`.
    pub fn bind(table: &DataFrame, mapping: &ColumnMapping) -> Result<Self> {
        let available: Vec<&str> = table.get_column_names();

        let overlap: Vec<&String> = mapping
            .percent_columns
            .iter()
            .chain(mapping.margin.iter())
            .filter(|c| {
                mapping.currency_columns.contains(c)
                    || **c == mapping.sales
                    || **c == mapping.ranking_metric
            })
            .collect();
        if !overlap.is_empty() {
            return Err(ReportError::SchemaMismatch(format!(
                "column(s) configured as both currency and percentage: {}",
                overlap.iter().join(", ")
            )));
        }

        let missing: Vec<String> = Self::required_columns(mapping)
            .into_iter()
            .filter(|name| !available.contains(&name.as_str()))
            .unique()
            .collect();

        if !missing.is_empty() {
            return Err(ReportError::SchemaMismatch(format!(
                "missing column(s) {} (available: {})",
                missing.iter().map(|m| format!("'{}'", m)).join(", "),
                available.iter().map(|a| format!("'{}'", a)).join(", ")
            )));
        }

        Ok(Self {
            mapping: mapping.clone(),
        })
    }

    /// Check additional headers referenced outside the mapping (sheet layouts).
    pub fn check_columns<'a, I>(table: &DataFrame, columns: I, context: &str) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let available = table.get_column_names();
        let missing: Vec<&str> = columns
            .into_iter()
            .filter(|name| !available.contains(name))
            .unique()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ReportError::SchemaMismatch(format!(
                "{} refers to missing column(s) {}",
                context,
                missing.iter().map(|m| format!("'{}'", m)).join(", ")
            )))
        }
    }

    fn required_columns(mapping: &ColumnMapping) -> Vec<String> {
        let mut required = vec![
            mapping.salesperson_email.clone(),
            mapping.salesperson_name.clone(),
        ];
        for tier in &mapping.manager_tiers {
            required.push(tier.email.clone());
            required.push(tier.name.clone());
        }
        required.push(mapping.sales.clone());
        required.push(mapping.ranking_metric.clone());
        required.extend(mapping.margin.iter().cloned());
        required.extend(mapping.category.iter().cloned());
        required.extend(mapping.visibility.iter().map(|v| v.column.clone()));
        required.extend(mapping.currency_columns.iter().cloned());
        required.extend(mapping.percent_columns.iter().cloned());
        required
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn salesperson_email(&self) -> &str {
        &self.mapping.salesperson_email
    }

    pub fn salesperson_name(&self) -> &str {
        &self.mapping.salesperson_name
    }

    pub fn manager_tiers(&self) -> &[TierColumns] {
        &self.mapping.manager_tiers
    }

    pub fn sales(&self) -> &str {
        &self.mapping.sales
    }

    pub fn ranking_metric(&self) -> &str {
        &self.mapping.ranking_metric
    }

    pub fn margin(&self) -> Option<&str> {
        self.mapping.margin.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.mapping.category.as_deref()
    }

    pub fn visibility(&self) -> Option<&VisibilityRule> {
        self.mapping.visibility.as_ref()
    }

    /// Sales, ranking metric, then any extra currency columns, without repeats.
    pub fn currency_columns(&self) -> Vec<&str> {
        std::iter::once(self.sales())
            .chain(std::iter::once(self.ranking_metric()))
            .chain(self.mapping.currency_columns.iter().map(String::as_str))
            .unique()
            .collect()
    }

    pub fn percent_columns(&self) -> Vec<&str> {
        self.margin()
            .into_iter()
            .chain(self.mapping.percent_columns.iter().map(String::as_str))
            .unique()
            .collect()
    }

    pub fn email_columns(&self) -> Vec<&str> {
        std::iter::once(self.salesperson_email())
            .chain(self.manager_tiers().iter().map(|t| t.email.as_str()))
            .unique()
            .collect()
    }

    /// Columns that identify people rather than describe the sale.
    pub fn identity_columns(&self) -> Vec<&str> {
        let mut cols = vec![self.salesperson_email(), self.salesperson_name()];
        for tier in self.manager_tiers() {
            cols.push(tier.email.as_str());
            cols.push(tier.name.as_str());
        }
        cols.into_iter().unique().collect()
    }

    pub fn kind_of(&self, column: &str, dtype: &DataType) -> ColumnKind {
        if self.currency_columns().contains(&column) {
            return ColumnKind::Currency;
        }
        let percent = self.percent_columns();
        if percent.contains(&column)
            || column
                .strip_prefix(AVERAGE_PREFIX)
                .is_some_and(|base| percent.contains(&base))
        {
            return ColumnKind::Percent;
        }
        if matches!(dtype, DataType::Date | DataType::Datetime(_, _)) {
            return ColumnKind::Date;
        }
        if column.starts_with(COUNT_PREFIX) && dtype.is_numeric() {
            return ColumnKind::Count;
        }
        if dtype.is_numeric() {
            ColumnKind::Number
        } else {
            ColumnKind::Text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> ColumnMapping {
        ColumnMapping {
            margin: Some("Margin".to_string()),
            category: None,
            ..ColumnMapping::default()
        }
    }

    fn table() -> DataFrame {
        df![
            "Sales Rep Email" => ["a@x.com"],
            "Sales Rep Name" => ["Ann"],
            "Manager Email" => ["m@x.com"],
            "Manager Name" => ["Max"],
            "$ Gross Sales (TTM)" => [100.0],
            "$ Opp to Floor" => [10.0],
            "Margin" => [0.25]
        ]
        .unwrap()
    }

    #[test]
    fn test_bind_accepts_matching_headers() {
        let schema = BoundSchema::bind(&table(), &mapping()).unwrap();
        assert_eq!(schema.salesperson_email(), "Sales Rep Email");
        assert_eq!(schema.currency_columns(), vec!["$ Gross Sales (TTM)", "$ Opp to Floor"]);
        assert_eq!(schema.percent_columns(), vec!["Margin"]);
    }

    #[test]
    fn test_bind_reports_every_missing_column() {
        let mut m = mapping();
        m.category = Some("Category".to_string());
        m.currency_columns = vec!["$ Opp to Target".to_string()];
        let err = BoundSchema::bind(&table(), &m).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, ReportError::SchemaMismatch(_)));
        assert!(msg.contains("'Category'"));
        assert!(msg.contains("'$ Opp to Target'"));
        assert!(msg.contains("available"));
    }

    #[test]
    fn test_bind_rejects_column_in_both_numeric_roles() {
        let mut m = mapping();
        m.percent_columns = vec!["$ Opp to Floor".to_string()];
        assert!(matches!(
            BoundSchema::bind(&table(), &m),
            Err(ReportError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_kind_of() {
        let schema = BoundSchema::bind(&table(), &mapping()).unwrap();
        assert_eq!(schema.kind_of("$ Opp to Floor", &DataType::Float64), ColumnKind::Currency);
        assert_eq!(schema.kind_of("Margin", &DataType::Float64), ColumnKind::Percent);
        assert_eq!(schema.kind_of("Avg Margin", &DataType::Float64), ColumnKind::Percent);
        assert_eq!(schema.kind_of("# Rows", &DataType::UInt32), ColumnKind::Count);
        assert_eq!(schema.kind_of("Item #", &DataType::Float64), ColumnKind::Number);
        assert_eq!(schema.kind_of("Sales Rep Name", &DataType::String), ColumnKind::Text);
        assert_eq!(
            schema.kind_of("Last Sale Date", &DataType::Datetime(TimeUnit::Milliseconds, None)),
            ColumnKind::Date
        );
    }
}
