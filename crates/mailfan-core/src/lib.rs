//! # mailfan-core
//!
//! Core logic for the mailfan dispatcher:
//!
//! - **Recipient source**: parses `(email, display-name)` pairs from raw
//!   lines, with an optional batch-level shuffle
//! - **Template renderer**: a pure function turning the shared MIME
//!   template plus one recipient into a ready-to-send message
//! - **Dispatch engine**: a bounded worker pool that streams recipients
//!   into render-and-send tasks, harvests completions without blocking
//!   on the slowest task, and isolates per-task failures
//! - **Delivery seam**: the transport capability boundary, implemented
//!   over `mailfan-smtp` in production and mocked in tests
//!
//! There is intentionally no retry anywhere: a failed recipient is
//! logged and the batch moves on.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod deliver;
pub mod engine;
mod error;
pub mod recipient;
pub mod template;

pub use config::{Config, DEFAULT_MAX_TASKS, DEFAULT_PORT, DEFAULT_TIMEOUT, Security};
pub use deliver::{DeliveryError, Mailer, SmtpMailer};
pub use engine::{DispatchSummary, Dispatcher, State, StopHandle};
pub use error::{Error, RenderError, Result, TaskError, TaskErrorKind};
pub use recipient::{Recipient, shuffle};
pub use template::{NAME_TOKEN, Sender, Template};
