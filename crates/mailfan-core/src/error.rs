//! Error types for the core library.
//!
//! Two tiers, deliberately separate: [`Error`] is fatal and aborts the
//! whole run before dispatch; [`TaskError`] is scoped to one recipient
//! and never crosses the task boundary.

use std::fmt;

/// Result type alias for fatal, run-aborting errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors. These indicate the input is invalid for every
/// recipient, so the run stops before anyone is contacted.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A recipient line with no extractable email address.
    #[error("No email address in recipient line: {0:?}")]
    RecipientLine(String),

    /// No usable sender address anywhere.
    #[error(
        "No sender address: set --from-email, add a From header to the template, \
         or use an @-qualified username"
    )]
    MissingSender,

    /// The resolved sender address is not a valid address.
    #[error("Invalid sender address: {0}")]
    InvalidSender(String),

    /// The template cannot produce a message for any recipient.
    #[error("Template structure: {0}")]
    Structure(String),

    /// MIME parsing of the template failed.
    #[error("Template parse: {0}")]
    Mime(#[from] mailfan_mime::Error),

    /// I/O error reading input files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification of a per-recipient task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskErrorKind {
    /// Opening the transport session failed.
    Connect,
    /// The server rejected the credentials.
    Auth,
    /// Submitting the message failed.
    Send,
    /// Per-recipient rendering failed to parse or decode content.
    Parse,
    /// Per-recipient rendering hit a structural problem.
    Structure,
}

impl fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Auth => write!(f, "auth"),
            Self::Send => write!(f, "send"),
            Self::Parse => write!(f, "parse"),
            Self::Structure => write!(f, "structure"),
        }
    }
}

/// A failure scoped to a single recipient.
///
/// Carries the error kind, the recipient display string, and the
/// original cause. Harvested and logged by the engine; never retried,
/// never propagated past the task boundary.
#[derive(Debug, thiserror::Error)]
#[error("{kind} failed for {recipient}: {source}")]
pub struct TaskError {
    /// What phase of the task failed.
    pub kind: TaskErrorKind,
    /// Display string of the affected recipient.
    pub recipient: String,
    /// The underlying cause.
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl TaskError {
    /// Wraps a cause with its kind and recipient context.
    pub fn new(
        kind: TaskErrorKind,
        recipient: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            kind,
            recipient: recipient.into(),
            source: source.into(),
        }
    }
}

/// Errors from rendering one message. Terminal: a broken template fails
/// identically for every recipient.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Decoding or re-parsing template content failed.
    #[error("{0}")]
    Mime(#[from] mailfan_mime::Error),

    /// The template is structurally unusable.
    #[error("{0}")]
    Structure(String),
}

impl RenderError {
    /// Maps the render failure onto the task error taxonomy.
    #[must_use]
    pub const fn kind(&self) -> TaskErrorKind {
        match self {
            Self::Mime(_) => TaskErrorKind::Parse,
            Self::Structure(_) => TaskErrorKind::Structure,
        }
    }
}
