// # Email Notifier
//
// This crate provides an SMTP email notifier for zcnotify.
//
// ## Behaviour
//
// - One message per configured recipient per change event
// - Subject: `[ZCNOTIFY] <KIND> "<instance name>"`
// - Body: the JSON transport record, indented with four spaces
// - STARTTLS required when `ssl = true`; otherwise STARTTLS is used
//   whenever the server offers it
// - Credentials are only sent encrypted, except to a loopback server
// - SMTP timeout of 30 seconds, so a dead server resolves to an error
// - No retries (a failure is reported to the dispatcher, which logs it)
//
// ## Security Requirements
//
// - SMTP passwords NEVER appear in logs or `Debug` output
// - Addresses are parsed at startup; bad syntax is a configuration error

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, warn};
use zcnotify_core::config::{EmailConfig, ZcnotifyConfig};
use zcnotify_core::model::ChangeEvent;
use zcnotify_core::registry::NotifierRegistry;
use zcnotify_core::traits::{Notifier, NotifierFactory, NotifierKind};
use zcnotify_core::{Error, Result};

/// SMTP command timeout
const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment switch for dry-run mode
const MODE_ENV: &str = "ZCNOTIFY_MODE";

/// Subject line for a change event
pub fn subject_for(event: &ChangeEvent) -> String {
    format!("[ZCNOTIFY] {} {:?}", event.kind, event.entry.instance_name())
}

/// Message body for a change event
pub fn body_for(event: &ChangeEvent) -> Result<String> {
    event.to_pretty_json()
}

/// How the SMTP session is protected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encryption {
    /// STARTTLS must succeed before anything else is sent
    Required,
    /// STARTTLS when the server offers it, plain text otherwise
    Opportunistic,
}

fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Pick the encryption for a recipient
///
/// Credentials never travel in plain text to a remote server, so an
/// authenticated non-`ssl` recipient still requires STARTTLS unless the
/// server is on loopback.
fn encryption_for(host: &str, ssl: bool, authenticated: bool) -> Encryption {
    if ssl || (authenticated && !is_loopback(host)) {
        Encryption::Required
    } else {
        Encryption::Opportunistic
    }
}

/// One resolved recipient with its own transport
struct Recipient {
    label: String,
    from: Mailbox,
    to: Mailbox,
    host: String,
    port: u16,
    encryption: Encryption,
    /// ⚠️ Holds the SMTP credentials; NEVER log this value
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

// Custom Debug implementation that hides the transport and its credentials
impl std::fmt::Debug for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recipient")
            .field("label", &self.label)
            .field("from", &self.from.to_string())
            .field("to", &self.to.to_string())
            .field("host", &self.host)
            .field("port", &self.port)
            .field("encryption", &self.encryption)
            .field("credentials", &"<REDACTED>")
            .finish()
    }
}

impl Recipient {
    fn from_config(label: &str, config: &EmailConfig) -> Result<Self> {
        let parse = |field: &str, address: &str| {
            address.parse::<Mailbox>().map_err(|e| {
                Error::config(format!(
                    "email config '{}': invalid {} address '{}': {}",
                    label, field, address, e
                ))
            })
        };

        let from = parse("from", &config.from)?;
        let to = parse("to", &config.to)?;
        let (host, port) = config.smtp_endpoint()?;

        let authenticated = !config.password.is_empty();
        let encryption = encryption_for(&host, config.ssl, authenticated);

        let tls_parameters = TlsParameters::new(host.clone()).map_err(|e| {
            Error::config(format!(
                "email config '{}': cannot use STARTTLS with {}: {}",
                label, host, e
            ))
        })?;
        let tls = match encryption {
            Encryption::Required => Tls::Required(tls_parameters),
            Encryption::Opportunistic => Tls::Opportunistic(tls_parameters),
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host.clone())
            .port(port)
            .tls(tls)
            .timeout(Some(DEFAULT_SMTP_TIMEOUT));
        if authenticated {
            builder = builder.credentials(Credentials::new(
                config.from.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            label: label.to_string(),
            from,
            to,
            host,
            port,
            encryption,
            transport: builder.build(),
        })
    }

    fn message(&self, subject: &str, body: &str) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| Error::notify("email", format!("cannot build message: {}", e)))
    }
}

/// SMTP email notifier
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the notifier builds every message but only logs
/// it. Enabled from the factory with `ZCNOTIFY_MODE=dry-run`.
#[derive(Debug)]
pub struct EmailNotifier {
    recipients: Vec<Recipient>,
    dry_run: bool,
}

impl EmailNotifier {
    /// Create a notifier for every recipient in `configs`
    ///
    /// # Returns
    ///
    /// - `Ok(EmailNotifier)`: All recipients parsed and transports built
    /// - `Err(Error)`: No recipients, or a recipient is misconfigured
    pub fn new(configs: &BTreeMap<String, EmailConfig>, dry_run: bool) -> Result<Self> {
        if configs.is_empty() {
            return Err(Error::config("Email notifier requires at least one recipient"));
        }

        let recipients = configs
            .iter()
            .map(|(label, config)| Recipient::from_config(label, config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            recipients,
            dry_run,
        })
    }

    /// Number of configured recipients
    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    /// Send the event to every recipient
    ///
    /// A failed recipient does not stop delivery to the others; the call
    /// fails if at least one recipient failed.
    async fn notify(&self, event: &ChangeEvent) -> Result<()> {
        let subject = subject_for(event);
        let body = body_for(event)?;
        let mut failed = Vec::new();

        for recipient in &self.recipients {
            let message = recipient.message(&subject, &body)?;

            if self.dry_run {
                info!(
                    "[DRY-RUN] Would send {:?} to {} via {}:{}",
                    subject, recipient.to, recipient.host, recipient.port
                );
                continue;
            }

            match recipient.transport.send(message).await {
                Ok(_) => debug!("Sent {:?} to {}", subject, recipient.to),
                Err(e) => {
                    warn!(
                        "Failed to send notification email to {} ({}): {}",
                        recipient.to, recipient.label, e
                    );
                    failed.push(recipient.label.as_str());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::notify(
                "email",
                format!(
                    "{} of {} recipient(s) failed: {}",
                    failed.len(),
                    self.recipients.len(),
                    failed.join(", ")
                ),
            ))
        }
    }

    fn kind(&self) -> NotifierKind {
        NotifierKind::Email
    }
}

/// Factory for creating email notifiers
pub struct EmailFactory;

impl NotifierFactory for EmailFactory {
    fn create(&self, config: &ZcnotifyConfig) -> Result<Box<dyn Notifier>> {
        let dry_run = std::env::var(MODE_ENV)
            .unwrap_or_default()
            .to_lowercase()
            == "dry-run";

        if dry_run {
            warn!("Email notifier running in DRY-RUN mode - no mail will be sent");
        }

        Ok(Box::new(EmailNotifier::new(&config.email, dry_run)?))
    }
}

/// Register the email notifier with a registry
///
/// # Example
///
/// ```rust
/// use zcnotify_core::NotifierRegistry;
/// use zcnotify_core::traits::NotifierKind;
///
/// let mut registry = NotifierRegistry::with_builtin();
/// zcnotify_notifier_email::register(&mut registry);
/// assert!(registry.has_notifier(NotifierKind::Email));
/// ```
pub fn register(registry: &mut NotifierRegistry) {
    registry.register_notifier(NotifierKind::Email, Box::new(EmailFactory));
}
