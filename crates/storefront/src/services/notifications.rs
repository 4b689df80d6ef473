//! Asynchronous e-mail notifications.
//!
//! Write paths hand a [`Notification`] to the [`NotificationDispatcher`]
//! after their transaction has committed. Dispatching never blocks and never
//! fails the caller: the notification is queued on a bounded channel, or
//! logged and dropped if the queue is full.
//!
//! A background worker drains the queue and delivers each notification in
//! its own task: render the askama templates, hand the message to a
//! [`Mailer`], and retry with exponential backoff until the attempt budget
//! is spent. Final failures are logged at `error` level, which the Sentry
//! tracing layer turns into events.

use std::sync::Arc;
use std::time::Duration;

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use bazaar_core::{Email, OrderId, ProductId};

use crate::config::{EmailConfig, NotificationConfig};

// =============================================================================
// Templates
// =============================================================================

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml {
    order_id: OrderId,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText {
    order_id: OrderId,
}

#[derive(Template)]
#[template(path = "email/back_in_stock.html")]
struct BackInStockHtml<'a> {
    product_name: &'a str,
}

#[derive(Template)]
#[template(path = "email/back_in_stock.txt")]
struct BackInStockText<'a> {
    product_name: &'a str,
}

// =============================================================================
// Notifications
// =============================================================================

/// Errors that can occur when rendering or sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// The mailer could not take the message.
    #[error("Mailer unavailable: {0}")]
    Unavailable(String),
}

/// Something a user should be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// An order was placed.
    OrderConfirmed { to: Email, order_id: OrderId },
    /// A product the user subscribed to has stock again.
    BackInStock {
        to: Email,
        product_id: ProductId,
        product_name: String,
    },
}

impl Notification {
    /// Recipient address.
    #[must_use]
    pub const fn recipient(&self) -> &Email {
        match self {
            Self::OrderConfirmed { to, .. } | Self::BackInStock { to, .. } => to,
        }
    }

    /// Short label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OrderConfirmed { .. } => "order_confirmed",
            Self::BackInStock { .. } => "back_in_stock",
        }
    }

    /// Render the message from the email templates.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Template` if a template fails to render.
    pub fn render(&self) -> Result<EmailMessage, NotifyError> {
        let (subject, text, html) = match self {
            Self::OrderConfirmed { order_id, .. } => (
                "Your Order Confirmation".to_string(),
                OrderConfirmationText {
                    order_id: *order_id,
                }
                .render()?,
                OrderConfirmationHtml {
                    order_id: *order_id,
                }
                .render()?,
            ),
            Self::BackInStock { product_name, .. } => (
                format!("Product Available: {product_name}"),
                BackInStockText { product_name }.render()?,
                BackInStockHtml { product_name }.render()?,
            ),
        };

        Ok(EmailMessage {
            to: self.recipient().clone(),
            subject,
            text: text.trim_end().to_string(),
            html,
        })
    }
}

/// A rendered multipart email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: Email,
    pub subject: String,
    /// Plain text body.
    pub text: String,
    /// HTML body.
    pub html: String,
}

// =============================================================================
// Mailers
// =============================================================================

/// Delivers rendered emails.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Send one message. Called again on failure until the retry budget is
    /// spent, so implementations should not retry internally.
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}

/// Mailer sending through an SMTP relay.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    /// Create a mailer from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the relay address is invalid.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| NotifyError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(message
                .to
                .as_str()
                .parse()
                .map_err(|_| NotifyError::InvalidAddress(message.to.to_string()))?)
            .subject(&message.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(message.html.clone()),
                    ),
            )?;

        self.transport.send(email).await?;

        info!(to = %message.to, subject = %message.subject, "Email sent successfully");
        Ok(())
    }
}

/// Mailer that writes messages to the log. Used when SMTP is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            body = %message.text,
            "Email (not sent, SMTP not configured)"
        );
        Ok(())
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Delivery attempts and backoff for one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt `attempt` (1-based):
    /// `base_delay × 2^(attempt - 1)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

impl From<&NotificationConfig> for RetryPolicy {
    fn from(config: &NotificationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.retry_base_delay,
        }
    }
}

/// Cloneable handle for queueing notifications.
#[derive(Clone)]
pub struct NotificationDispatcher {
    queue: mpsc::Sender<Notification>,
}

/// The background task delivering queued notifications.
pub struct NotificationWorker {
    handle: JoinHandle<()>,
}

impl NotificationDispatcher {
    /// Start the delivery worker and return a handle to it.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(mailer: Arc<dyn Mailer>, config: &NotificationConfig) -> (Self, NotificationWorker) {
        let (queue, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let policy = RetryPolicy::from(config);

        info!(
            queue_capacity = config.queue_capacity,
            max_attempts = policy.max_attempts,
            "Spawning notification worker"
        );
        let handle = tokio::spawn(run_worker(receiver, mailer, policy));

        (Self { queue }, NotificationWorker { handle })
    }

    /// Queue a notification for delivery. Never blocks.
    ///
    /// Returns `false` if the notification was dropped because the queue is
    /// full or the worker has stopped.
    pub fn dispatch(&self, notification: Notification) -> bool {
        match self.queue.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    kind = dropped.kind(),
                    to = %dropped.recipient(),
                    "Notification queue full, dropping notification"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                warn!(
                    kind = dropped.kind(),
                    to = %dropped.recipient(),
                    "Notification worker stopped, dropping notification"
                );
                false
            }
        }
    }
}

impl NotificationWorker {
    /// Wait until every dispatcher handle has been dropped and every queued
    /// notification has been delivered or given up on.
    pub async fn finish(self) {
        if let Err(e) = self.handle.await {
            error!(error = %e, "Notification worker panicked");
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<Notification>,
    mailer: Arc<dyn Mailer>,
    policy: RetryPolicy,
) {
    let mut deliveries = JoinSet::new();

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Some(notification) => {
                    deliveries.spawn(deliver(Arc::clone(&mailer), notification, policy));
                }
                None => break,
            },
            Some(joined) = deliveries.join_next(), if !deliveries.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "Notification delivery task failed");
                }
            }
        }
    }

    while let Some(joined) = deliveries.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Notification delivery task failed");
        }
    }
    info!("Notification worker stopped");
}

/// Deliver one notification, retrying per `policy`. Returns whether it was
/// delivered.
async fn deliver(mailer: Arc<dyn Mailer>, notification: Notification, policy: RetryPolicy) -> bool {
    let message = match notification.render() {
        Ok(message) => message,
        Err(e) => {
            error!(error = %e, kind = notification.kind(), "Failed to render notification");
            return false;
        }
    };

    let mut attempt = 1;
    loop {
        match mailer.send(&message).await {
            Ok(()) => {
                debug!(kind = notification.kind(), attempt, "Notification delivered");
                return true;
            }
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    error = %e,
                    kind = notification.kind(),
                    attempt,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Notification delivery failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!(
                    error = %e,
                    kind = notification.kind(),
                    to = %message.to,
                    attempts = attempt,
                    "Notification delivery failed, giving up"
                );
                return false;
            }
        }
    }
}
