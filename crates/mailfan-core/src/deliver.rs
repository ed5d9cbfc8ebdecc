//! Delivery seam: the transport capability used by the dispatch engine.
//!
//! One authenticated session per call; sessions are never shared or
//! pooled across tasks.

use crate::config::{Config, Security};
use crate::error::TaskErrorKind;
use mailfan_smtp::connection::{connect, connect_tls};
use mailfan_smtp::{Address, Client};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Failure of one delivery attempt, tagged by session phase.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Opening the session (TCP, TLS, greeting, EHLO) failed.
    #[error("connection failed: {0}")]
    Connect(#[source] mailfan_smtp::Error),

    /// The server rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(#[source] mailfan_smtp::Error),

    /// The mail transaction was rejected.
    #[error("send failed: {0}")]
    Send(#[source] mailfan_smtp::Error),
}

impl DeliveryError {
    /// Maps the delivery failure onto the task error taxonomy.
    #[must_use]
    pub const fn kind(&self) -> TaskErrorKind {
        match self {
            Self::Connect(_) => TaskErrorKind::Connect,
            Self::Auth(_) => TaskErrorKind::Auth,
            Self::Send(_) => TaskErrorKind::Send,
        }
    }
}

/// Transport capability: submits one rendered message per call over a
/// fresh session.
pub trait Mailer: Clone + Send + Sync + 'static {
    /// Delivers one rendered message to one recipient.
    fn deliver(
        &self,
        from: &Address,
        to: &Address,
        message: &[u8],
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Production mailer: opens an authenticated (optionally TLS) SMTP
/// session per delivery, bounded by the configured timeout.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    config: Arc<Config>,
}

impl SmtpMailer {
    /// Creates a mailer over the run configuration.
    #[must_use]
    pub const fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

impl Mailer for SmtpMailer {
    fn deliver(
        &self,
        from: &Address,
        to: &Address,
        message: &[u8],
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send {
        async move {
            let config = &self.config;

            let stream = match config.security {
                Security::Tls => connect_tls(&config.server, config.port, config.timeout).await,
                Security::None => connect(&config.server, config.port, config.timeout).await,
            }
            .map_err(DeliveryError::Connect)?;

            let client = Client::from_stream(stream)
                .await
                .map_err(DeliveryError::Connect)?;
            let client = client.ehlo("localhost").await.map_err(DeliveryError::Connect)?;
            let client = client
                .login(&config.username, &config.password)
                .await
                .map_err(DeliveryError::Auth)?;

            let client = client
                .mail_from(from.clone())
                .await
                .map_err(DeliveryError::Send)?;
            let client = client.rcpt_to(to.clone()).await.map_err(DeliveryError::Send)?;
            let client = client.data().await.map_err(DeliveryError::Send)?;
            let client = client
                .send_message(message)
                .await
                .map_err(DeliveryError::Send)?;

            // The server accepted the message; a failing QUIT is not a
            // delivery failure.
            if let Err(e) = client.quit().await {
                debug!("QUIT after accepted message failed: {e}");
            }

            Ok(())
        }
    }
}
