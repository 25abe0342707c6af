use crate::compose::{Composer, EmailContent};
use crate::config::ReportConfig;
use crate::error::{ReportError, Result};
use crate::mailer::{Mailer, OutgoingEmail};
use crate::model::RenderedArtifact;
use crate::schema::BoundSchema;
use tracing::{error, info};

/// Composes the message for a rendered artifact and hands it to a `Mailer`.
/// Failures are reported once and never retried.
pub struct Dispatcher<'a> {
    composer: Composer,
    mailer: &'a dyn Mailer,
    redirect_to: Option<String>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(config: &ReportConfig, schema: &BoundSchema, mailer: &'a dyn Mailer) -> Self {
        let redirect_to = if config.test_mode {
            config.test_recipient.clone()
        } else {
            None
        };
        Self {
            composer: Composer::new(config, schema),
            mailer,
            redirect_to,
        }
    }

    pub fn send_salesperson_email(&self, artifact: &RenderedArtifact) -> Result<()> {
        let content = self.composer.salesperson(artifact)?;
        self.deliver(artifact, content)
    }

    pub fn send_manager_email(&self, artifact: &RenderedArtifact) -> Result<()> {
        let content = self.composer.manager(artifact)?;
        self.deliver(artifact, content)
    }

    fn deliver(&self, artifact: &RenderedArtifact, content: EmailContent) -> Result<()> {
        let intended = artifact.recipient.email.as_str();
        let to = match &self.redirect_to {
            Some(test_recipient) => {
                info!(
                    intended,
                    redirected_to = %test_recipient,
                    "Test mode: redirecting email"
                );
                test_recipient.clone()
            }
            None => intended.to_string(),
        };

        let email = OutgoingEmail {
            to,
            subject: content.subject,
            html_body: content.html_body,
            attachment: artifact.path.clone(),
        };

        match self.mailer.send(&email) {
            Ok(()) => {
                info!(
                    role = %artifact.recipient.role,
                    to = %email.to,
                    attachment = %artifact.path.display(),
                    "Email sent"
                );
                Ok(())
            }
            Err(err) => {
                let err = match err {
                    ReportError::Dispatch(msg) => ReportError::Dispatch(msg),
                    other => ReportError::Dispatch(other.to_string()),
                };
                error!(
                    role = %artifact.recipient.role,
                    recipient = intended,
                    error = %err,
                    "Failed to send email"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PeriodLabel, Recipient, ReportSummary};
    use crate::schema::ColumnMapping;
    use polars::prelude::*;
    use std::cell::RefCell;
    use std::path::PathBuf;

    #[derive(Default)]
    struct Recorder {
        sent: RefCell<Vec<OutgoingEmail>>,
        fail: bool,
    }

    impl Mailer for Recorder {
        fn send(&self, email: &OutgoingEmail) -> Result<()> {
            if self.fail {
                return Err(ReportError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "relay down",
                )));
            }
            self.sent.borrow_mut().push(email.clone());
            Ok(())
        }
    }

    fn schema() -> BoundSchema {
        let table = df![
            "Sales Rep Email" => ["a@x.com"],
            "Sales Rep Name" => ["Ann"],
            "Manager Email" => ["m@x.com"],
            "Manager Name" => ["Max"],
            "$ Gross Sales (TTM)" => [1.0],
            "$ Opp to Floor" => [1.0]
        ]
        .unwrap();
        let mapping = ColumnMapping {
            category: None,
            ..ColumnMapping::default()
        };
        BoundSchema::bind(&table, &mapping).unwrap()
    }

    fn artifact() -> RenderedArtifact {
        RenderedArtifact {
            path: PathBuf::from("/tmp/Ann_Jun_2025.xlsx"),
            recipient: Recipient::sales_rep("a@x.com", "Ann"),
            period: PeriodLabel::new("Jun, 2025"),
            summary: ReportSummary::default(),
        }
    }

    #[test]
    fn test_sends_to_recipient() {
        let recorder = Recorder::default();
        let dispatcher = Dispatcher::new(&ReportConfig::default(), &schema(), &recorder);
        dispatcher.send_salesperson_email(&artifact()).unwrap();

        let sent = recorder.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@x.com");
        assert_eq!(sent[0].attachment, PathBuf::from("/tmp/Ann_Jun_2025.xlsx"));
    }

    #[test]
    fn test_test_mode_redirects() {
        let recorder = Recorder::default();
        let config = ReportConfig {
            test_mode: true,
            test_recipient: Some("qa@x.com".to_string()),
            ..ReportConfig::default()
        };
        let dispatcher = Dispatcher::new(&config, &schema(), &recorder);
        dispatcher.send_salesperson_email(&artifact()).unwrap();
        assert_eq!(recorder.sent.borrow()[0].to, "qa@x.com");
    }

    #[test]
    fn test_transport_failure_is_dispatch_error() {
        let recorder = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let dispatcher = Dispatcher::new(&ReportConfig::default(), &schema(), &recorder);
        let err = dispatcher.send_salesperson_email(&artifact()).unwrap_err();
        assert!(matches!(err, ReportError::Dispatch(_)));
        assert!(!err.is_fatal());
    }
}
