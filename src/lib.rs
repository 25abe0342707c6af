pub mod compose;
pub mod config;
pub mod data_utils;
pub mod dispatch;
pub mod error;
pub mod loader;
pub mod mailer;
pub mod model;
pub mod observability;
pub mod partition;
pub mod pipeline;
pub mod pivot;
pub mod recipients;
pub mod render;
pub mod schema;

pub use config::ReportConfig;
pub use error::{ReportError, Result};
pub use mailer::{Mailer, OutboxMailer, OutgoingEmail, SmtpMailer};
pub use pipeline::{run, run_for_period, OutcomeStatus, RecipientOutcome, RunSummary};
