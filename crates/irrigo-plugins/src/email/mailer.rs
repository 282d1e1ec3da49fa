// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Irrigo.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// SMTP relay settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub use_tls: bool,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_owned(),
            smtp_port: 587,
            use_tls: true,
        }
    }
}

/// A fully addressed message, credentials included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    /// Display name of the sender (the system name)
    pub sender_name: String,
    /// SMTP login, also used as the sender address
    pub username: String,
    pub password: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SmtpMailer {
    settings: MailSettings,
}

impl SmtpMailer {
    #[must_use]
    pub fn new(settings: MailSettings) -> Self {
        Self { settings }
    }

    fn transport(&self, mail: &OutgoingMail) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let creds = Credentials::new(mail.username.clone(), mail.password.clone());
        let host = &self.settings.smtp_host;

        let transport = if self.settings.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .with_context(|| format!("Failed to create SMTP relay: {host}"))?
                .port(self.settings.smtp_port)
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .port(self.settings.smtp_port)
                .credentials(creds)
                .build()
        };
        Ok(transport)
    }
}

/// Attachment part for a readable file, `None` otherwise
async fn attachment_part(path: &Path) -> Result<Option<SinglePart>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("Skipping attachment {}: {e}", path.display());
            return Ok(None);
        }
    };
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_owned());
    let content_type = ContentType::parse("application/octet-stream")
        .map_err(|e| anyhow!("Invalid attachment content type: {e}"))?;

    Ok(Some(Attachment::new(filename).body(bytes, content_type)))
}

pub(crate) async fn build_message(mail: &OutgoingMail) -> Result<Message> {
    let address: Address = mail
        .username
        .parse()
        .with_context(|| format!("Invalid sender address: {}", mail.username))?;
    let from = Mailbox::new(Some(mail.sender_name.clone()), address);
    let to: Mailbox = mail
        .recipient
        .parse()
        .with_context(|| format!("Invalid recipient address: {}", mail.recipient))?;

    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(mail.body.clone()));
    if let Some(path) = &mail.attachment
        && let Some(part) = attachment_part(path).await?
    {
        parts = parts.singlepart(part);
    }

    Message::builder()
        .from(from)
        .to(to)
        .subject(mail.subject.as_str())
        .multipart(parts)
        .context("Failed to build email message")
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        let message = build_message(&mail).await?;
        self.transport(&mail)?
            .send(message)
            .await
            .with_context(|| format!("Failed to send email to {}", mail.recipient))?;
        info!(recipient = %mail.recipient, subject = %mail.subject, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn mail() -> OutgoingMail {
        OutgoingMail {
            sender_name: "Garden".to_owned(),
            username: "garden@example.com".to_owned(),
            password: "secret".to_owned(),
            recipient: "owner@example.com".to_owned(),
            subject: "Report from Irrigo".to_owned(),
            body: "System was powered on.".to_owned(),
            attachment: None,
        }
    }

    #[tokio::test]
    async fn test_message_headers() {
        let message = build_message(&mail()).await.unwrap();
        let text = String::from_utf8(message.formatted()).unwrap();

        assert!(text.contains("From: \"Garden\" <garden@example.com>") || text.contains("From: Garden <garden@example.com>"));
        assert!(text.contains("To: owner@example.com"));
        assert!(text.contains("Subject: Report from Irrigo"));
        assert!(text.contains("System was powered on."));
    }

    #[tokio::test]
    async fn test_attachment_is_included() {
        let mut file = tempfile::Builder::new().suffix(".log").tempfile().unwrap();
        writeln!(file, "2025-06-01 10:00:00 INFO [x] hello").unwrap();
        let name = file
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();

        let mut with_file = mail();
        with_file.attachment = Some(file.path().to_path_buf());
        let text = String::from_utf8(build_message(&with_file).await.unwrap().formatted()).unwrap();

        assert!(text.contains("application/octet-stream"));
        assert!(text.contains(&name));
    }

    #[tokio::test]
    async fn test_missing_attachment_is_skipped() {
        let mut missing = mail();
        missing.attachment = Some(PathBuf::from("/nonexistent/events.log"));
        let text = String::from_utf8(build_message(&missing).await.unwrap().formatted()).unwrap();

        assert!(!text.contains("application/octet-stream"));
    }

    #[tokio::test]
    async fn test_invalid_recipient() {
        let mut bad = mail();
        bad.recipient = "not an address".to_owned();
        assert!(build_message(&bad).await.is_err());
    }
}
