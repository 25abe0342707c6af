//! Mail transports.

use crate::config::SmtpSettings;
use crate::error::{ReportError, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{FileTransport, Message, SmtpTransport, Transport};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const DRY_RUN_SENDER: &str = "pricing-reports@localhost";

/// One message ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachment: PathBuf,
}

pub trait Mailer {
    fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

/// Plain SMTP relay, optionally authenticated.
pub struct SmtpMailer {
    sender: String,
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(sender: &str, settings: &SmtpSettings) -> Self {
        let mut builder = SmtpTransport::builder_dangerous(settings.host.as_str()).port(settings.port);
        if let (Some(user), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        Self {
            sender: sender.to_string(),
            transport: builder.build(),
        }
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let message = build_message(&self.sender, email)?;
        self.transport
            .send(&message)
            .map_err(|e| ReportError::Dispatch(format!("SMTP send to {} failed: {}", email.to, e)))?;
        Ok(())
    }
}

/// Writes each message as an `.eml` file instead of sending it.
pub struct OutboxMailer {
    sender: String,
    dir: PathBuf,
}

impl OutboxMailer {
    pub fn new(dir: &Path, sender: Option<&str>) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            sender: sender.unwrap_or(DRY_RUN_SENDER).to_string(),
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Mailer for OutboxMailer {
    fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let message = build_message(&self.sender, email)?;
        let id = FileTransport::new(&self.dir)
            .send(&message)
            .map_err(|e| ReportError::Dispatch(format!("Writing message for {} failed: {}", email.to, e)))?;
        debug!(to = %email.to, id = %id, dir = %self.dir.display(), "Wrote message to outbox");
        Ok(())
    }
}

/// MIME message: HTML body plus the workbook as an attachment.
pub fn build_message(sender: &str, email: &OutgoingEmail) -> Result<Message> {
    let from: Mailbox = sender
        .parse()
        .map_err(|e| ReportError::Dispatch(format!("Invalid sender address '{}': {}", sender, e)))?;
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|e| ReportError::Dispatch(format!("Invalid recipient address '{}': {}", email.to, e)))?;

    let bytes = std::fs::read(&email.attachment).map_err(|e| {
        ReportError::Dispatch(format!(
            "Cannot read attachment {}: {}",
            email.attachment.display(),
            e
        ))
    })?;
    let filename = email
        .attachment
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report.xlsx".to_string());
    let content_type = ContentType::parse(XLSX_CONTENT_TYPE)
        .map_err(|e| ReportError::Dispatch(format!("Bad attachment content type: {}", e)))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.as_str())
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::html(email.html_body.clone()))
                .singlepart(Attachment::new(filename).body(bytes, content_type)),
        )
        .map_err(|e| ReportError::Dispatch(format!("Cannot build message for {}: {}", email.to, e)))
}
