//! Run-wide configuration.

use std::time::Duration;

/// Default SMTP submission port (implicit TLS).
pub const DEFAULT_PORT: u16 = 465;
/// Default per-operation network timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default concurrent task ceiling.
pub const DEFAULT_MAX_TASKS: usize = 10;

/// Transport security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// Implicit TLS from the first byte (port 465 style).
    Tls,
    /// Plain TCP, no encryption.
    None,
}

/// Immutable run-wide settings.
///
/// Created once at startup and shared read-only across all tasks.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)] // Independent feature toggles
pub struct Config {
    /// Mail server hostname.
    pub server: String,
    /// Mail server port.
    pub port: u16,
    /// Login username.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Transport security mode.
    pub security: Security,
    /// Per network operation timeout.
    pub timeout: Duration,
    /// Concurrent task ceiling.
    pub max_tasks: usize,
    /// Upper bound for the random pre-send delay.
    pub delay: Option<Duration>,
    /// Subject for every message; rendered output carries a Subject only
    /// when this is set.
    pub subject: Option<String>,
    /// CC header value, set verbatim; rendered output carries a Cc only
    /// when this is set.
    pub cc: Option<String>,
    /// Sender address override.
    pub from_email: Option<String>,
    /// Sender display name.
    pub from_name: Option<String>,
    /// Shuffle the recipient list before dispatch.
    pub shuffle: bool,
    /// Substitute `%To_Name%` in subject and body parts.
    pub replace_tokens: bool,
    /// Strip `x-*` and `delivered-to` headers.
    pub clean_headers: bool,
    /// Regenerate the Message-ID per message.
    pub random_message_id: bool,
    /// Synthesize a text/plain part for html-only templates.
    pub generate_plaintext: bool,
    /// Re-encode rewritten body parts as base64.
    pub encode_base64: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            security: Security::Tls,
            timeout: DEFAULT_TIMEOUT,
            max_tasks: DEFAULT_MAX_TASKS,
            delay: None,
            subject: None,
            cc: None,
            from_email: None,
            from_name: None,
            shuffle: true,
            replace_tokens: true,
            clean_headers: true,
            random_message_id: true,
            generate_plaintext: true,
            encode_base64: true,
        }
    }
}
