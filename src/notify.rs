//! Lead notifications to the admissions team.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::SmtpConfig;
use crate::error::NotifyError;
use crate::store::LeadRecord;

/// Receives every captured lead exactly once per capture transition.
#[async_trait]
pub trait LeadNotifier: Send + Sync {
    async fn notify(&self, lead: &LeadRecord) -> Result<(), NotifyError>;
}

/// Notifier that only writes the lead to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl LeadNotifier for LogNotifier {
    async fn notify(&self, lead: &LeadRecord) -> Result<(), NotifyError> {
        tracing::info!(
            session_id = %lead.session_id,
            platform = %lead.platform,
            name = %lead.name,
            country = %lead.target_country,
            "New lead captured"
        );
        Ok(())
    }
}

/// Emails each lead to the configured team inboxes.
pub struct SmtpNotifier {
    config: SmtpConfig,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl SmtpNotifier {
    /// Validate addresses up front so a typo fails at startup, not at the
    /// first capture.
    pub fn new(config: SmtpConfig) -> Result<Self, NotifyError> {
        let from = parse_mailbox(&config.from_address)?;
        let recipients = config
            .recipients
            .iter()
            .map(|r| parse_mailbox(r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            config,
            from,
            recipients,
        })
    }

    fn build_message(&self, lead: &LeadRecord) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject_line(lead));
        for to in &self.recipients {
            builder = builder.to(to.clone());
        }
        builder
            .body(render_body(lead))
            .map_err(|e| NotifyError::Build(e.to_string()))
    }
}

#[async_trait]
impl LeadNotifier for SmtpNotifier {
    async fn notify(&self, lead: &LeadRecord) -> Result<(), NotifyError> {
        let email = self.build_message(lead)?;

        let transport = SmtpTransport::relay(&self.config.host)
            .map_err(|e| NotifyError::Delivery(format!("SMTP relay error: {e}")))?
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.expose_secret().to_string(),
            ))
            .build();

        // lettre's SmtpTransport is blocking.
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| NotifyError::Delivery(format!("SMTP task failed: {e}")))?
            .map_err(|e| NotifyError::Delivery(format!("SMTP send failed: {e}")))?;

        tracing::info!(
            session_id = %lead.session_id,
            recipients = self.recipients.len(),
            "Lead notification sent"
        );
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|e: lettre::address::AddressError| NotifyError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

fn subject_line(lead: &LeadRecord) -> String {
    format!("New lead: {} ({})", lead.name, lead.target_country)
}

/// Plain-text summary of a lead for the team inbox.
pub fn render_body(lead: &LeadRecord) -> String {
    let optional = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    format!(
        "A new student lead was captured.\n\n\
         Name: {}\n\
         Email: {}\n\
         Phone: {}\n\
         Destination: {}\n\
         Intake: {}\n\
         Study level: {}\n\
         GPA/Grades: {}\n\
         Field of study: {}\n\n\
         Platform: {}\n\
         Session: {}\n\
         Captured at: {}\n",
        lead.name,
        lead.email,
        lead.phone,
        lead.target_country,
        optional(&lead.preferred_intake),
        lead.study_level
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".to_string()),
        optional(&lead.gpa_grades),
        optional(&lead.study_field),
        lead.platform,
        lead.session_id,
        lead.captured_at.to_rfc3339(),
    )
}
