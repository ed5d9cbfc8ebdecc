//! # mailfan-smtp
//!
//! SMTP submission client implementing the client side of RFC 5321,
//! slimmed to what a mail dispatcher needs.
//!
//! ## Features
//!
//! - **Type-state connection management**: Compile-time enforcement of
//!   valid SMTP state transitions
//! - **Implicit TLS or plaintext sessions** (pure-Rust TLS via rustls)
//! - **Authentication**: PLAIN and LOGIN, chosen from the EHLO response
//! - **Per-operation timeout**: every network read/write is bounded
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use mailfan_smtp::{Address, Client, connection::connect_tls};
//!
//! # async fn run() -> mailfan_smtp::Result<()> {
//! let stream = connect_tls("smtp.example.com", 465, Duration::from_secs(30)).await?;
//! let client = Client::from_stream(stream).await?;
//! let client = client.ehlo("localhost").await?;
//! let client = client.login("user@example.com", "password").await?;
//!
//! let from = Address::new("sender@example.com")?;
//! let to = Address::new("recipient@example.com")?;
//!
//! let client = client.mail_from(from).await?;
//! let client = client.rcpt_to(to).await?;
//! let client = client.data().await?;
//! let client = client.send_message(b"Subject: Test\r\n\r\nHello!\r\n").await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Connection states
//!
//! ```text
//! Connected ── login() ──▶ Authenticated ── mail_from() ──▶ MailTransaction
//!     ──▶ RecipientAdded ── data() ──▶ Data ── send_message() ──▶ Authenticated
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::AuthMechanism;
pub use connection::{Client, ServerInfo, SmtpStream};
pub use error::{Error, Result};
pub use types::{Address, Reply, ReplyCode};
