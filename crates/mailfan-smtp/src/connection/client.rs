//! Type-state SMTP client.
//!
//! The type parameter tracks the protocol phase, so a message body can
//! only be written after `MAIL FROM`/`RCPT TO`/`DATA` have been accepted.

use super::{ServerInfo, SmtpStream};
use crate::command::{AuthMechanism, Command};
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, Reply, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::marker::PhantomData;
use tracing::{debug, trace};

/// Type-state marker for connected state.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// SMTP client with type-state pattern.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    server_info: ServerInfo,
    _state: PhantomData<State>,
}

impl Client<Connected> {
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or if the server
    /// rejects the connection.
    pub async fn from_stream(mut stream: SmtpStream) -> Result<Self> {
        let greeting = Self::read_reply(&mut stream).await?;
        if !greeting.is_success() {
            return Err(Error::smtp(greeting.code.as_u16(), greeting.message_text()));
        }

        // Extract hostname from greeting (first word after code)
        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                auth_mechanisms: Vec::new(),
            },
            _state: PhantomData,
        })
    }

    /// Sends EHLO and records the advertised AUTH mechanisms.
    ///
    /// # Errors
    ///
    /// Returns an error if the EHLO command fails.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        let cmd = Command::Ehlo {
            hostname: client_hostname.to_string(),
        };
        let reply = self.send_command(cmd).await?;

        if !reply.is_success() {
            return Err(Error::smtp(reply.code.as_u16(), reply.message_text()));
        }

        // First line is the greeting; the rest are extension keywords
        let mut mechanisms = Vec::new();
        for line in reply.message.iter().skip(1) {
            let mut words = line.split_whitespace();
            if words.next().is_some_and(|kw| kw.eq_ignore_ascii_case("AUTH")) {
                for word in words {
                    match word.to_uppercase().as_str() {
                        "PLAIN" => mechanisms.push(AuthMechanism::Plain),
                        "LOGIN" => mechanisms.push(AuthMechanism::Login),
                        _ => {}
                    }
                }
            }
        }
        debug!("Server {} offers AUTH {:?}", self.server_info.hostname, mechanisms);

        self.server_info.auth_mechanisms = mechanisms;
        Ok(self)
    }

    /// Authenticates with the first mechanism both sides support.
    ///
    /// Prefers PLAIN; falls back to LOGIN. When the server advertised no
    /// mechanisms at all, PLAIN is attempted anyway.
    ///
    /// # Errors
    ///
    /// Returns an error if no mechanism is available or authentication
    /// fails.
    pub async fn login(self, username: &str, password: &str) -> Result<Client<Authenticated>> {
        let offered = &self.server_info.auth_mechanisms;
        if offered.is_empty() || offered.contains(&AuthMechanism::Plain) {
            self.auth_plain(username, password).await
        } else if offered.contains(&AuthMechanism::Login) {
            self.auth_login(username, password).await
        } else {
            Err(Error::NoAuthMechanism)
        }
    }

    /// Authenticates using the PLAIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_plain(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        // PLAIN response: \0username\0password
        let credentials = format!("\0{username}\0{password}");
        let encoded = STANDARD.encode(credentials.as_bytes());

        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(encoded),
        };
        let reply = self.send_command(cmd).await?;

        if !reply.is_success() {
            return Err(Error::smtp(reply.code.as_u16(), reply.message_text()));
        }

        Ok(self.transition())
    }

    /// Authenticates using the LOGIN challenge-response mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        let reply = self.send_command(cmd).await?;
        if reply.code != ReplyCode::AUTH_CONTINUE {
            return Err(Error::smtp(reply.code.as_u16(), reply.message_text()));
        }

        let reply = self
            .send_line(&STANDARD.encode(username.as_bytes()))
            .await?;
        if reply.code != ReplyCode::AUTH_CONTINUE {
            return Err(Error::smtp(reply.code.as_u16(), reply.message_text()));
        }

        let reply = self
            .send_line(&STANDARD.encode(password.as_bytes()))
            .await?;
        if !reply.is_success() {
            return Err(Error::smtp(reply.code.as_u16(), reply.message_text()));
        }

        Ok(self.transition())
    }
}

impl Client<Authenticated> {
    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the MAIL FROM command fails.
    pub async fn mail_from(mut self, from: Address) -> Result<Client<MailTransaction>> {
        let reply = self.send_command(Command::MailFrom { from }).await?;

        if !reply.is_success() {
            return Err(Error::smtp(reply.code.as_u16(), reply.message_text()));
        }

        Ok(self.transition())
    }
}

impl Client<MailTransaction> {
    /// Adds a recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: Address) -> Result<Client<RecipientAdded>> {
        let reply = self.send_command(Command::RcptTo { to }).await?;

        if !reply.is_success() {
            return Err(Error::smtp(reply.code.as_u16(), reply.message_text()));
        }

        Ok(self.transition())
    }
}

impl Client<RecipientAdded> {
    /// Adds another recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: Address) -> Result<Self> {
        let reply = self.send_command(Command::RcptTo { to }).await?;

        if !reply.is_success() {
            return Err(Error::smtp(reply.code.as_u16(), reply.message_text()));
        }

        Ok(self)
    }

    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns an error if the DATA command fails.
    pub async fn data(mut self) -> Result<Client<Data>> {
        let reply = self.send_command(Command::Data).await?;

        if reply.code != ReplyCode::START_DATA {
            return Err(Error::smtp(reply.code.as_u16(), reply.message_text()));
        }

        Ok(self.transition())
    }
}

impl Client<Data> {
    /// Sends the message content and completes the transaction.
    ///
    /// Line endings are normalized to CRLF, lines starting with `.` are
    /// byte-stuffed, and the terminating `.` line is appended.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails or the server rejects the message.
    pub async fn send_message(mut self, message: &[u8]) -> Result<Client<Authenticated>> {
        for line in message.split(|&b| b == b'\n') {
            let line = if line.last() == Some(&b'\r') {
                &line[..line.len() - 1]
            } else {
                line
            };

            // Byte-stuff lines starting with '.'
            if line.first() == Some(&b'.') {
                self.stream.write_all(b".").await?;
            }

            self.stream.write_all(line).await?;
            self.stream.write_all(b"\r\n").await?;
        }

        self.stream.write_all(b".\r\n").await?;

        let reply = Self::read_reply(&mut self.stream).await?;
        if !reply.is_success() {
            return Err(Error::smtp(reply.code.as_u16(), reply.message_text()));
        }

        Ok(self.transition())
    }
}

// Common implementation for all states
impl<S> Client<S> {
    /// Returns the server information.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send_command(Command::Quit).await?;

        if !reply.is_success() && reply.code != ReplyCode::CLOSING {
            return Err(Error::smtp(reply.code.as_u16(), reply.message_text()));
        }

        Ok(())
    }

    fn transition<T>(self) -> Client<T> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            _state: PhantomData,
        }
    }

    async fn send_command(&mut self, cmd: Command) -> Result<Reply> {
        self.stream.write_all(&cmd.serialize()).await?;
        let reply = Self::read_reply(&mut self.stream).await?;
        trace!("SMTP reply {}", reply.code);
        Ok(reply)
    }

    /// Sends a bare line (AUTH LOGIN challenge responses).
    async fn send_line(&mut self, line: &str) -> Result<Reply> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        Self::read_reply(&mut self.stream).await
    }

    async fn read_reply(stream: &mut SmtpStream) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = stream.read_line().await?;
            if line.is_empty() {
                return Err(Error::Protocol("Connection closed by server".into()));
            }

            let is_last = is_last_reply_line(&line);
            lines.push(line);

            if is_last {
                break;
            }
        }

        parse_reply(&lines)
    }
}
