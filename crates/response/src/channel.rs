//! Notification Channels
//!
//! A channel delivers one text message to one recipient. The dispatcher
//! bounds every call with its own timeout and records the outcome, so
//! implementations only report success or the reason for failure.

use crate::error::NotifyError;
use async_trait::async_trait;
use lettre::address::AddressError;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};
use water_model::ChannelKind;

/// A delivery channel for emergency notifications
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Which contact of a team this channel uses
    fn kind(&self) -> ChannelKind;

    /// Deliver `message` to `recipient`
    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    channel: &'a str,
    recipient: &'a str,
    message: &'a str,
}

/// Posts notifications as JSON to an HTTP gateway (chat or SMS providers)
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    kind: ChannelKind,
    url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(kind: ChannelKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            channel: self.kind.as_str(),
            recipient,
            message,
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!("{} gateway {} returned {}", self.kind, self.url, status);
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("{} notification delivered to {} via {}", self.kind, recipient, self.url);
        Ok(())
    }
}

/// Sends notifications as plain-text email through an SMTP relay
#[derive(Debug)]
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailChannel {
    /// Port 465 always uses implicit TLS; other ports upgrade with STARTTLS
    /// when `starttls` is set and stay plaintext otherwise.
    pub fn new(
        host: &str,
        port: u16,
        starttls: bool,
        from: &str,
        credentials: Option<(String, String)>,
    ) -> Result<Self, NotifyError> {
        let sender: Mailbox = from
            .parse()
            .map_err(|e: AddressError| NotifyError::Address(format!("{}: {}", from, e)))?;

        let mut builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| NotifyError::Smtp(e.to_string()))?
                .port(port)
        } else if starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| NotifyError::Smtp(e.to_string()))?
                .port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port)
        };
        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from: sender,
        })
    }
}

/// First line of the message, used as the email subject
fn email_subject(message: &str) -> &str {
    message
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("Leak alert")
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|e: AddressError| NotifyError::Address(format!("{}: {}", recipient, e)))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email_subject(message))
            .body(message.to_string())
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        debug!("email notification delivered to {}", recipient);
        Ok(())
    }
}

/// Writes notifications to the log instead of an external provider; the
/// demo fallback for channels with no provider configured
#[derive(Debug, Clone)]
pub struct LogChannel {
    kind: ChannelKind,
    latency: Duration,
}

impl LogChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            latency: Duration::ZERO,
        }
    }

    /// Simulated provider round trip
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        info!(
            "Sending {} alert to {} ({} chars)",
            self.kind,
            recipient,
            message.chars().count()
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Behavior {
    Succeed,
    Fail(String),
    Hang,
}

/// Channel double with a fixed outcome that records every message
#[derive(Debug)]
pub struct ScriptedChannel {
    kind: ChannelKind,
    behavior: Behavior,
    sent: Mutex<Vec<(String, String)>>,
}

impl ScriptedChannel {
    fn with_behavior(kind: ChannelKind, behavior: Behavior) -> Self {
        Self {
            kind,
            behavior,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(kind: ChannelKind) -> Self {
        Self::with_behavior(kind, Behavior::Succeed)
    }

    pub fn failing(kind: ChannelKind, reason: &str) -> Self {
        Self::with_behavior(kind, Behavior::Fail(reason.to_string()))
    }

    /// Never completes; only the dispatcher timeout ends the call
    pub fn hanging(kind: ChannelKind) -> Self {
        Self::with_behavior(kind, Behavior::Hang)
    }

    /// `(recipient, message)` pairs received so far
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationChannel for ScriptedChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<(), NotifyError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((recipient.to_string(), message.to_string()));
        }
        match &self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(reason) => Err(NotifyError::Delivery(reason.clone())),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}
