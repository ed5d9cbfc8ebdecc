//! # mailfan-mime
//!
//! MIME message parsing and rewriting library for mailfan.
//!
//! ## Features
//!
//! - **Ordered headers**: headers are an explicit ordered list of
//!   `(name, value)` pairs, so rewritten messages serialize
//!   deterministically
//! - **Recursive multipart**: nested `multipart/*` containers are parsed
//!   into a part tree and serialized back with their boundaries
//! - **Encoding/Decoding**: Base64, Quoted-Printable decoding, RFC 2047
//!   header encoding
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailfan_mime::Message;
//!
//! let raw = "From: sender@example.com\r\n\
//!            Subject: Test\r\n\
//!            Content-Type: text/plain\r\n\
//!            \r\n\
//!            Hello, World!";
//!
//! let mut message = Message::parse(raw)?;
//! message.headers.set("Subject", "Rewritten");
//! let bytes = message.to_bytes()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod header;
mod message;

pub mod encoding;

pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Body, Message, Part, TransferEncoding};
