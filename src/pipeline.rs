//! One reporting run, from input file to sent emails.

use crate::config::ReportConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::loader::{clean, format_columns, load_sheet};
use crate::mailer::Mailer;
use crate::model::{PeriodLabel, Recipient, Role};
use crate::partition::{sort_for_managers, subset_for_manager, subset_for_salesperson};
use crate::recipients::RecipientDirectory;
use crate::render::ReportRenderer;
use crate::schema::BoundSchema;
use polars::prelude::DataFrame;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
    Delivered { path: PathBuf },
    RenderFailed { error: String },
    DispatchFailed { path: PathBuf, error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecipientOutcome {
    pub recipient: Recipient,
    pub rows: usize,
    pub status: OutcomeStatus,
}

impl RecipientOutcome {
    pub fn artifact(&self) -> Option<&Path> {
        match &self.status {
            OutcomeStatus::Delivered { path } | OutcomeStatus::DispatchFailed { path, .. } => {
                Some(path)
            }
            OutcomeStatus::RenderFailed { .. } => None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self.status, OutcomeStatus::Delivered { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub period: PeriodLabel,
    pub rows_loaded: usize,
    pub rows_dropped: usize,
    pub values_coerced: usize,
    pub salespeople: usize,
    pub managers: usize,
    pub outcomes: Vec<RecipientOutcome>,
}

impl RunSummary {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn render_failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::RenderFailed { .. }))
            .count()
    }

    pub fn dispatch_failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::DispatchFailed { .. }))
            .count()
    }

    pub fn artifacts(&self) -> Vec<&Path> {
        self.outcomes.iter().filter_map(RecipientOutcome::artifact).collect()
    }

    pub fn outcomes_for(&self, role: Role) -> impl Iterator<Item = &RecipientOutcome> {
        self.outcomes.iter().filter(move |o| o.recipient.role == role)
    }

    pub fn is_clean(&self) -> bool {
        self.render_failures() == 0 && self.dispatch_failures() == 0
    }

    pub fn log(&self) {
        info!(
            run_id = %self.run_id,
            period = %self.period,
            rows_loaded = self.rows_loaded,
            rows_dropped = self.rows_dropped,
            values_coerced = self.values_coerced,
            salespeople = self.salespeople,
            managers = self.managers,
            delivered = self.delivered(),
            render_failures = self.render_failures(),
            dispatch_failures = self.dispatch_failures(),
            "Run finished"
        );
        for outcome in &self.outcomes {
            match &outcome.status {
                OutcomeStatus::Delivered { .. } => {}
                OutcomeStatus::RenderFailed { error } => {
                    warn!(recipient = %outcome.recipient, error = %error, "Report not rendered")
                }
                OutcomeStatus::DispatchFailed { path, error } => warn!(
                    recipient = %outcome.recipient,
                    path = %path.display(),
                    error = %error,
                    "Report rendered but not sent"
                ),
            }
        }
    }
}

/// Run with the period label taken from today's date.
pub fn run(config: &ReportConfig, mailer: &dyn Mailer) -> Result<RunSummary> {
    let period = PeriodLabel::current(&config.period_format);
    run_for_period(config, mailer, period)
}

/// Only load, schema and configuration problems return `Err`; everything
/// that goes wrong for a single recipient ends up in the summary.
pub fn run_for_period(
    config: &ReportConfig,
    mailer: &dyn Mailer,
    period: PeriodLabel,
) -> Result<RunSummary> {
    config.validate()?;
    let run_id = Uuid::new_v4();
    info!(
        run_id = %run_id,
        period = %period,
        input = %config.input_path.display(),
        test_mode = config.test_mode,
        "Run started"
    );

    let raw = load_sheet(&config.input_path, config.sheet_name.as_deref())?;
    let schema = BoundSchema::bind(&raw, &config.columns)?;
    if schema.category().is_some() {
        BoundSchema::check_columns(&raw, config.category_sheet_columns(), "category sheet layout")?;
    }

    let cleaned = clean(&raw, &schema)?;
    let formatted = format_columns(&cleaned, &schema, &config.number_formatting())?;
    let table = formatted.table;
    info!(rows = table.height(), columns = table.width(), "Table ready");

    let directory = RecipientDirectory::build(&table, &schema, config.recipient_limit)?;
    for email in directory.dual_role_emails() {
        info!(email, "Address is both a salesperson and a manager; sending both reports");
    }

    let mut summary = RunSummary {
        run_id,
        period: period.clone(),
        rows_loaded: raw.height(),
        rows_dropped: raw.height() - table.height(),
        values_coerced: formatted.coerced,
        salespeople: directory.salespeople().len(),
        managers: directory.managers().len(),
        outcomes: Vec::with_capacity(directory.len()),
    };

    if directory.is_empty() {
        info!("No recipients found; nothing to send");
        summary.log();
        return Ok(summary);
    }

    std::fs::create_dir_all(&config.output_dir)?;
    let mut renderer = ReportRenderer::new(
        &schema,
        &config.category_sheets,
        config.number_formatting(),
        &config.output_dir,
    );
    let dispatcher = Dispatcher::new(config, &schema, mailer);

    for recipient in directory.salespeople() {
        let subset = subset_for_salesperson(&table, &schema, &recipient.email);
        summary
            .outcomes
            .push(process_recipient(&mut renderer, &dispatcher, recipient, subset, &period));
    }

    let sorted = sort_for_managers(&table, schema.ranking_metric())?;
    for recipient in directory.managers() {
        let subset = subset_for_manager(&sorted, &schema, &recipient.email);
        summary
            .outcomes
            .push(process_recipient(&mut renderer, &dispatcher, recipient, subset, &period));
    }

    summary.log();
    Ok(summary)
}

fn process_recipient(
    renderer: &mut ReportRenderer<'_>,
    dispatcher: &Dispatcher<'_>,
    recipient: &Recipient,
    subset: Result<DataFrame>,
    period: &PeriodLabel,
) -> RecipientOutcome {
    let subset = match subset {
        Ok(subset) => subset,
        Err(err) => return render_failed(recipient, 0, err.to_string()),
    };
    let rows = subset.height();

    let rendered = match recipient.role {
        Role::SalesRep => renderer.render_salesperson_report(&subset, recipient, period),
        Role::Manager => renderer.render_manager_report(&subset, recipient, period),
    };
    let artifact = match rendered {
        Ok(artifact) => artifact,
        Err(err) => return render_failed(recipient, rows, err.to_string()),
    };

    let sent = match recipient.role {
        Role::SalesRep => dispatcher.send_salesperson_email(&artifact),
        Role::Manager => dispatcher.send_manager_email(&artifact),
    };
    let status = match sent {
        Ok(()) => OutcomeStatus::Delivered {
            path: artifact.path,
        },
        Err(err) => OutcomeStatus::DispatchFailed {
            path: artifact.path,
            error: err.to_string(),
        },
    };
    RecipientOutcome {
        recipient: recipient.clone(),
        rows,
        status,
    }
}

fn render_failed(recipient: &Recipient, rows: usize, error: String) -> RecipientOutcome {
    error!(recipient = %recipient, error = %error, "Failed to render report");
    RecipientOutcome {
        recipient: recipient.clone(),
        rows,
        status: OutcomeStatus::RenderFailed { error },
    }
}
