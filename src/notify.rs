use std::sync::Arc;
use std::thread;
use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::{debug, warn};
use crate::config::MailConfig;

pub const MAIL_SUBJECT: &str = "New message from modem";

pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;
    fn notify(&self, text: &str) -> Result<()>;
}

/// Fan-out to every configured sink. Delivery is best effort.
#[derive(Clone, Default)]
pub struct Notifiers {
    sinks: Vec<Arc<dyn Notifier>>
}
impl Notifiers {
    pub fn new(sinks: Vec<Arc<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    /// One detached thread per sink; nothing waits on them.
    pub fn broadcast(&self, text: String) {
        if text.is_empty() {
            return;
        }

        for sink in &self.sinks {
            let sink = Arc::clone(sink);
            let text = text.clone();
            thread::spawn(move || match sink.notify(&text) {
                Ok(()) => debug!("Delivered notification via {}", sink.name()),
                Err(e) => warn!("Failed to notify via {}: {e:#}", sink.name())
            });
        }
    }
}

/// HTML mail over an implicit-TLS SMTP relay.
pub struct MailNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    to: Mailbox
}
impl MailNotifier {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let transport = SmtpTransport::relay(&config.server)
            .with_context(|| format!("Invalid mail server {}", config.server))?
            .port(config.port)
            .credentials(Credentials::new(config.from.clone(), config.password.clone()))
            .build();

        Ok(Self {
            transport,
            from: config.from.parse().context("Invalid mail sender address")?,
            to: config.to.parse().context("Invalid mail recipient address")?
        })
    }
}
impl Notifier for MailNotifier {
    fn name(&self) -> &'static str {
        "mail"
    }

    fn notify(&self, text: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(MAIL_SUBJECT)
            .header(ContentType::TEXT_HTML)
            .body(text.replace('\n', "<br>"))
            .context("Failed to build mail")?;

        self.transport.send(&message).context("Failed to send mail")?;
        Ok(())
    }
}
