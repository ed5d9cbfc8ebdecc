//! mailfan - concurrent personalized mail dispatcher.
//!
//! Reads a recipient list and a MIME template, renders a personalized
//! copy per recipient, and submits them concurrently over authenticated
//! SMTP.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use mailfan_core::{
    Config, Dispatcher, Recipient, Security, Sender, SmtpMailer, Template, shuffle,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Sends a personalized copy of a MIME template to each recipient.
#[derive(Parser)]
#[command(about, version)]
#[allow(clippy::struct_excessive_bools)] // Independent feature toggles
struct Args {
    /// Recipient list: one entry per line (`Name <email>`, `email<TAB>Name`,
    /// or bare email)
    #[arg(long, short = 'f')]
    targets: PathBuf,

    /// MIME template file used as the basis for every message
    #[arg(long, short = 'm')]
    template: PathBuf,

    /// Mail server hostname
    #[arg(long, short = 's')]
    server: String,

    /// Login username
    #[arg(long, short = 'u')]
    user: String,

    /// Login password
    #[arg(long, short = 'p')]
    password: String,

    /// Mail server port
    #[arg(long, default_value_t = mailfan_core::DEFAULT_PORT)]
    port: u16,

    /// Connect without TLS
    #[arg(long)]
    no_tls: bool,

    /// Per network operation timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Maximum concurrent send tasks
    #[arg(long, default_value_t = mailfan_core::DEFAULT_MAX_TASKS)]
    tasks: usize,

    /// Upper bound in seconds for the random pre-send delay
    #[arg(long)]
    delay: Option<f64>,

    /// Sender address (overrides the template From header)
    #[arg(long)]
    from_email: Option<String>,

    /// Sender display name
    #[arg(long)]
    from_name: Option<String>,

    /// Subject override; %To_Name% is substituted per recipient
    #[arg(long)]
    subject: Option<String>,

    /// CC header value, set verbatim
    #[arg(long)]
    cc: Option<String>,

    /// Keep the recipient list in file order
    #[arg(long)]
    no_shuffle: bool,

    /// Do not re-encode rewritten body parts as base64
    #[arg(long)]
    no_encode: bool,

    /// Do not synthesize a text/plain part for html-only templates
    #[arg(long)]
    no_plaintext: bool,

    /// Do not substitute %To_Name% tokens
    #[arg(long)]
    no_replace: bool,

    /// Keep the template Message-ID instead of regenerating it
    #[arg(long)]
    no_message_id: bool,

    /// Keep x-* and delivered-to headers
    #[arg(long)]
    no_clean_headers: bool,

    /// Verbose logging
    #[arg(long, short = 'd')]
    debug: bool,
}

impl Args {
    fn into_config(self) -> (Config, PathBuf, PathBuf) {
        let config = Config {
            server: self.server,
            port: self.port,
            username: self.user,
            password: self.password,
            security: if self.no_tls {
                Security::None
            } else {
                Security::Tls
            },
            timeout: Duration::from_secs(self.timeout),
            max_tasks: self.tasks.max(1),
            delay: self
                .delay
                .filter(|seconds| *seconds > 0.0)
                .map(Duration::from_secs_f64),
            subject: self.subject,
            cc: self.cc,
            from_email: self.from_email,
            from_name: self.from_name,
            shuffle: !self.no_shuffle,
            replace_tokens: !self.no_replace,
            clean_headers: !self.no_clean_headers,
            random_message_id: !self.no_message_id,
            generate_plaintext: !self.no_plaintext,
            encode_base64: !self.no_encode,
        };
        (config, self.targets, self.template)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_directive = if args.debug {
        "mailfan=debug,mailfan_core=debug,mailfan_smtp=debug"
    } else {
        "mailfan=info,mailfan_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (config, targets_path, template_path) = args.into_config();

    // Load and parse inputs; any failure here is fatal and happens
    // before a single recipient is contacted.
    let targets_text = std::fs::read_to_string(&targets_path)
        .with_context(|| format!("reading recipient list {}", targets_path.display()))?;
    let mut recipients =
        Recipient::parse_all(&targets_text).context("parsing recipient list")?;
    if recipients.is_empty() {
        warn!("Recipient list {} is empty", targets_path.display());
        return Ok(());
    }

    let template_text = std::fs::read_to_string(&template_path)
        .with_context(|| format!("reading template {}", template_path.display()))?;
    let template = Template::parse(&template_text).context("parsing template")?;
    template.validate().context("validating template")?;

    let config = Arc::new(config);
    let sender = Sender::resolve(&template, &config).context("resolving sender")?;
    info!("Sending as {} via {}:{}", sender.email, config.server, config.port);

    if config.shuffle {
        shuffle(&mut recipients);
    }

    let mailer = SmtpMailer::new(Arc::clone(&config));
    let (engine, stop) = Dispatcher::new(config, Arc::new(template), sender, mailer);

    // Ctrl-C requests a soft-stop: in-flight sends finish, the rest are
    // cancelled.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after in-flight sends");
            stop.stop();
        }
    });

    let summary = engine.run(recipients).await;
    info!(
        "{} sent, {} failed, {} cancelled",
        summary.sent, summary.failed, summary.cancelled
    );

    Ok(())
}
