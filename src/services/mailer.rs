//! Credentials email delivery with bounded retry.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor, message::Mailbox};
use tracing::{error, info, warn};

use crate::config::SmtpConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_credentials(&self, to: &str, username: &str, password: &str) -> Result<()>;
}

/// Retry schedule for credential emails. The sleep between attempts is an
/// await point, so aborting the job task stops the sequence cleanly.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(60),
        }
    }
}

pub async fn send_credentials_with_retry(
    mailer: &dyn Mailer,
    retry: RetryPolicy,
    to: &str,
    username: &str,
    password: &str,
) -> Result<()> {
    let mut attempt = 0;

    loop {
        attempt += 1;
        match mailer.send_credentials(to, username, password).await {
            Ok(()) => {
                info!("Credentials email sent to {to} after {} retries", attempt - 1);
                return Ok(());
            }
            Err(err) => {
                error!("Attempt {attempt} - failed to send credentials email to {to}: {err:#}");
                if attempt >= retry.max_attempts {
                    return Err(err.context(format!(
                        "Giving up after {} attempts to send email to {to}",
                        retry.max_attempts
                    )));
                }
                warn!("Retrying in {} seconds...", retry.delay.as_secs());
                tokio::time::sleep(retry.delay).await;
            }
        }
    }
}

/// SMTP delivery via STARTTLS. Host and credentials come from config or the
/// SMTP_* environment variables.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    portal_url: String,
}

impl SmtpMailer {
    pub fn from_config(config: &SmtpConfig) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .context("Invalid SMTP host")?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        let from = config
            .from
            .parse()
            .with_context(|| format!("Invalid SMTP sender address: {}", config.from))?;

        Ok(Self {
            transport,
            from,
            portal_url: config.portal_url.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_credentials(&self, to: &str, username: &str, password: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to
                .parse()
                .with_context(|| format!("Invalid recipient address: {to}"))?)
            .subject("NO-REPLY: Dein neuer Kadro-Zugang")
            .header(ContentType::TEXT_HTML)
            .body(credentials_body(username, password, &self.portal_url))
            .context("Failed to build credentials email")?;

        self.transport
            .send(message)
            .await
            .context("SMTP send failed")?;

        Ok(())
    }
}

/// Logs instead of sending; used in development and tests.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_credentials(&self, to: &str, username: &str, _password: &str) -> Result<()> {
        info!(to_email = %to, username = %username, "credentials email send stub");
        Ok(())
    }
}

fn credentials_body(username: &str, password: &str, portal_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<title>Dein neuer Kadro-Zugang</title>
</head>
<body>
    <p style="color:red;"><b>HINWEIS:</b> Diese E-Mail wurde automatisch erzeugt. Bitte nicht antworten!</p>
    <p>Willkommen im Team!</p>
    <p>Dein Zugang zu <b>Kadro</b>, unserem HR- und ERP-System, ist eingerichtet:</p>
    <ul>
        <li>Anmeldung: <a href="{portal_url}">{portal_url}</a></li>
        <li><b>Benutzername:</b> {username}</li>
        <li><b>Passwort:</b> {password}</li>
    </ul>
    <p><b>WICHTIG:</b> Das Passwort l&auml;uft in <b>5 Tagen</b> ab. Bitte &auml;ndere es direkt nach der ersten Anmeldung.</p>
    <p>Bei Fragen hilft der IT-Support weiter.</p>
    <p>Viele Gr&uuml;&szlig;e<br>Dein IT-Service-Team</p>
</body>
</html>
"#
    )
}
