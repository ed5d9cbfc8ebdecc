//! SMTP connection management with type-state pattern.

mod client;
mod stream;

pub use client::{
    Authenticated, Client, Connected, Data, MailTransaction, RecipientAdded,
};
pub use stream::{SmtpStream, connect, connect_tls};

use crate::command::AuthMechanism;

/// Server capabilities from the greeting and EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// AUTH mechanisms advertised in the EHLO response.
    pub auth_mechanisms: Vec<AuthMechanism>,
}
