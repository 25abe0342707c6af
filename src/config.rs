//! Run configuration.
//!
//! Resolution order: JSON file (optional), then environment (after `.env` is
//! loaded by the binary), then command-line overrides applied by `main`.
//! The resolved config is immutable for the rest of the run.

use crate::error::{ReportError, Result};
use crate::schema::ColumnMapping;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_INPUT_FILE_NAME: &str = "Sales_Report_Temp.xlsx";
pub const DEFAULT_OUTPUT_FOLDER: &str = "Filtered_Reports";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            username: None,
            password: None,
        }
    }
}

/// One sheet of the salesperson workbook (and one pivot of the manager
/// workbook), selected by the value of the category column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategorySheet {
    pub value: String,
    /// Rows are ordered descending by this column.
    pub sort_by: String,
    #[serde(default)]
    pub drop_columns: Vec<String>,
}

/// Rounding and scaling applied to numeric columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberFormatting {
    pub currency_decimals: u32,
    pub percent_decimals: u32,
    /// Multiplier from the source representation to 0-100 points.
    pub percent_scale: f64,
}

impl Default for NumberFormatting {
    fn default() -> Self {
        Self {
            currency_decimals: 2,
            percent_decimals: 1,
            percent_scale: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub input_path: PathBuf,
    pub sheet_name: Option<String>,
    pub output_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub sender: Option<String>,
    pub smtp: SmtpSettings,
    pub test_mode: bool,
    pub test_recipient: Option<String>,
    /// When set, messages are written here as .eml files instead of sent.
    pub dry_run_outbox: Option<PathBuf>,
    pub dashboard_link: Option<String>,
    pub report_title: String,
    pub signature: String,
    /// chrono format string for the period label.
    pub period_format: String,
    pub recipient_limit: Option<usize>,
    pub columns: ColumnMapping,
    pub category_sheets: Vec<CategorySheet>,
    pub currency_decimals: u32,
    pub percent_decimals: u32,
    pub percent_scale: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        let columns = ColumnMapping::default();
        let category_sheets = vec![
            CategorySheet {
                value: "Basement".to_string(),
                sort_by: columns.ranking_metric.clone(),
                drop_columns: Vec::new(),
            },
            CategorySheet {
                value: "Attic".to_string(),
                sort_by: columns.sales.clone(),
                drop_columns: vec![columns.ranking_metric.clone()],
            },
        ];
        Self {
            input_path: PathBuf::from(DEFAULT_INPUT_FILE_NAME),
            sheet_name: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_FOLDER),
            log_dir: Some(PathBuf::from("logs")),
            sender: None,
            smtp: SmtpSettings::default(),
            test_mode: false,
            test_recipient: None,
            dry_run_outbox: None,
            dashboard_link: None,
            report_title: "Attic and Basement Report".to_string(),
            signature: "Pricing Team".to_string(),
            period_format: "%b, %Y".to_string(),
            recipient_limit: None,
            columns,
            category_sheets,
            currency_decimals: 2,
            percent_decimals: 1,
            percent_scale: 100.0,
        }
    }
}

impl ReportConfig {
    /// Load from a JSON file; absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReportError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ReportError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    pub fn number_formatting(&self) -> NumberFormatting {
        NumberFormatting {
            currency_decimals: self.currency_decimals,
            percent_decimals: self.percent_decimals,
            percent_scale: self.percent_scale,
        }
    }

    /// Every column the category sheets refer to.
    pub fn category_sheet_columns(&self) -> Vec<&str> {
        self.category_sheets
            .iter()
            .flat_map(|sheet| {
                std::iter::once(sheet.sort_by.as_str())
                    .chain(sheet.drop_columns.iter().map(String::as_str))
            })
            .collect()
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overlay values from any key lookup; split out so tests do not have to
    /// touch the process environment.
    pub fn apply_vars<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(main_folder) = var("MAIN_FOLDER") {
            let main_folder = PathBuf::from(main_folder);
            if self.input_path.is_relative() {
                self.input_path = main_folder.join(&self.input_path);
            }
            if self.output_dir.is_relative() {
                self.output_dir = main_folder.join(&self.output_dir);
            }
        }
        if let Some(sender) = var("EMAIL_USER") {
            self.sender = Some(sender);
        }
        if let Some(host) = var("SMTP_SERVER") {
            self.smtp.host = host;
        }
        if let Some(port) = var("SMTP_PORT") {
            self.smtp.port = port
                .trim()
                .parse()
                .map_err(|_| ReportError::Config(format!("SMTP_PORT is not a port: {}", port)))?;
        }
        if let Some(user) = var("SMTP_USERNAME") {
            self.smtp.username = Some(user);
        }
        if let Some(password) = var("SMTP_PASSWORD") {
            self.smtp.password = Some(password);
        }
        if let Some(test_email) = var("TEST_EMAIL") {
            self.test_recipient = Some(test_email);
        }
        if let Some(flag) = var("REPORT_TEST_MODE") {
            self.test_mode = parse_flag(&flag).ok_or_else(|| {
                ReportError::Config(format!("REPORT_TEST_MODE is not a boolean: {}", flag))
            })?;
        }
        if let Some(link) = var("DASHBOARD_LINK") {
            self.dashboard_link = Some(link);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_path.as_os_str().is_empty() {
            return Err(ReportError::Config("input path is empty".to_string()));
        }
        if self.test_mode && self.test_recipient.as_deref().map_or(true, str::is_empty) {
            return Err(ReportError::Config(
                "test mode is on but no test recipient is configured (TEST_EMAIL)".to_string(),
            ));
        }
        if self.dry_run_outbox.is_none() && self.sender.as_deref().map_or(true, str::is_empty) {
            return Err(ReportError::Config(
                "no sender address configured (EMAIL_USER)".to_string(),
            ));
        }
        if self.period_format.trim().is_empty() {
            return Err(ReportError::Config("period format is empty".to_string()));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
