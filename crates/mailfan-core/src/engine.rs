//! The dispatch engine: bounded concurrent render-and-send.
//!
//! A single control loop owns the recipient source and all task
//! bookkeeping; workers report completion only through their join
//! handles, so no shared in-flight set or mutex exists.

use crate::config::Config;
use crate::deliver::Mailer;
use crate::error::{TaskError, TaskErrorKind};
use crate::recipient::Recipient;
use crate::template::{Sender, Template};
use mailfan_smtp::Address;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Engine lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Created, not yet running.
    Idle,
    /// Admitting recipients and harvesting completions.
    Running,
    /// Soft-stopped: no further admissions, in-flight tasks finishing.
    Draining,
    /// Run finished. Terminal: a stopped engine does not resume.
    Stopped,
}

/// Outcome counters for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Messages accepted by the server.
    pub sent: usize,
    /// Per-recipient failures (logged, never aborting).
    pub failed: usize,
    /// Recipients never attempted due to soft-stop.
    pub cancelled: usize,
}

impl DispatchSummary {
    /// Number of recipients for which a send was actually attempted.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.sent + self.failed
    }
}

/// Requests a soft-stop of a running dispatch.
///
/// Recipients not yet submitted are cancelled; tasks already executing
/// run to completion and are harvested normally.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Signals the engine to stop admitting recipients.
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

/// Result of one render-and-send task.
struct TaskOutcome {
    recipient: String,
    result: Result<(), TaskError>,
}

/// The dispatch engine.
///
/// Pulls recipients from the source on the control thread only, keeps
/// at most `max_tasks` render-and-send tasks in flight, and harvests
/// completions as they arrive without blocking on the slowest task.
#[derive(Debug)]
pub struct Dispatcher<M: Mailer> {
    config: Arc<Config>,
    template: Arc<Template>,
    sender: Sender,
    mailer: M,
    stop: watch::Receiver<bool>,
    state: State,
}

impl<M: Mailer> Dispatcher<M> {
    /// Creates an engine and its stop handle.
    pub fn new(
        config: Arc<Config>,
        template: Arc<Template>,
        sender: Sender,
        mailer: M,
    ) -> (Self, StopHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                config,
                template,
                sender,
                mailer,
                stop: rx,
                state: State::Idle,
            },
            StopHandle { tx },
        )
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Runs the dispatch to completion: a single submit → drain pass.
    ///
    /// Every recipient is attempted exactly once (barring soft-stop),
    /// every in-flight task is harvested, and per-task failures never
    /// abort the batch.
    pub async fn run(mut self, recipients: Vec<Recipient>) -> DispatchSummary {
        self.state = State::Running;
        info!(
            "Dispatching to {} recipients ({} concurrent tasks max)",
            recipients.len(),
            self.config.max_tasks
        );

        let mut source = recipients.into_iter();
        let mut inflight: JoinSet<TaskOutcome> = JoinSet::new();
        let mut summary = DispatchSummary::default();

        loop {
            // Soft-stop: cancel everything not yet submitted.
            if self.state == State::Running && *self.stop.borrow() {
                self.state = State::Draining;
                for recipient in source.by_ref() {
                    info!("Cancelled: {recipient}");
                    summary.cancelled += 1;
                }
            }

            // Admission: refill the pool up to its ceiling.
            while self.state == State::Running && inflight.len() < self.config.max_tasks {
                let Some(recipient) = source.next() else { break };
                self.spawn(&mut inflight, recipient);
            }

            // Wait for the first completion. `None` means the pool is
            // empty, and admission above has already drained the source.
            let Some(joined) = inflight.join_next().await else {
                break;
            };

            match joined {
                Ok(outcome) => match outcome.result {
                    Ok(()) => {
                        info!("Sent to {}", outcome.recipient);
                        summary.sent += 1;
                    }
                    Err(task_error) => {
                        error!("{task_error}");
                        summary.failed += 1;
                    }
                },
                Err(join_error) => {
                    // A worker panic is a task failure, not an engine failure.
                    error!("Worker task failed: {join_error}");
                    summary.failed += 1;
                }
            }
        }

        self.state = State::Stopped;
        info!(
            "Dispatch finished: {} sent, {} failed, {} cancelled",
            summary.sent, summary.failed, summary.cancelled
        );
        summary
    }

    fn spawn(&self, inflight: &mut JoinSet<TaskOutcome>, recipient: Recipient) {
        let config = Arc::clone(&self.config);
        let template = Arc::clone(&self.template);
        let sender = self.sender.clone();
        let mailer = self.mailer.clone();

        debug!("Submitting task for {recipient}");
        inflight.spawn(async move {
            let display = recipient.to_string();
            let result = send_one(&config, &template, &sender, &mailer, &recipient).await;
            TaskOutcome {
                recipient: display,
                result,
            }
        });
    }
}

/// One worker body: jitter, render, deliver over a fresh session.
async fn send_one<M: Mailer>(
    config: &Config,
    template: &Template,
    sender: &Sender,
    mailer: &M,
    recipient: &Recipient,
) -> Result<(), TaskError> {
    // Uniform random pre-send delay decorrelates concurrent sends.
    if let Some(delay) = config.delay {
        let bound = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        if bound > 0 {
            let jitter = rand::thread_rng().gen_range(0..=bound);
            tokio::time::sleep(Duration::from_millis(jitter)).await;
        }
    }

    let message = template.render(sender, recipient, config).map_err(|e| {
        let kind = e.kind();
        TaskError::new(kind, recipient.to_string(), e)
    })?;

    let from = Address::new(&sender.email)
        .map_err(|e| TaskError::new(TaskErrorKind::Send, recipient.to_string(), e))?;
    let to = Address::new(&recipient.email)
        .map_err(|e| TaskError::new(TaskErrorKind::Send, recipient.to_string(), e))?;

    mailer.deliver(&from, &to, &message).await.map_err(|e| {
        let kind = e.kind();
        TaskError::new(kind, recipient.to_string(), e)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::deliver::DeliveryError;
    use std::collections::HashSet;
    use std::future::Future;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TEMPLATE: &str = concat!(
        "From: news@corp.example\r\n",
        "Subject: Hello\r\n",
        "Content-Type: text/plain; charset=utf-8\r\n",
        "\r\n",
        "Hi %To_Name%\r\n"
    );

    /// Scripted mailer: tracks concurrency, optionally blocks on a gate,
    /// fails selected recipients.
    #[derive(Clone)]
    struct MockMailer {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        delivered: Arc<Mutex<Vec<String>>>,
        fail: Arc<HashSet<String>>,
        gate: Option<watch::Receiver<bool>>,
    }

    impl MockMailer {
        fn new() -> Self {
            Self {
                active: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
                delivered: Arc::new(Mutex::new(Vec::new())),
                fail: Arc::new(HashSet::new()),
                gate: None,
            }
        }

        fn failing(addresses: &[&str]) -> Self {
            let mut mailer = Self::new();
            mailer.fail = Arc::new(addresses.iter().map(ToString::to_string).collect());
            mailer
        }

        fn gated(gate: watch::Receiver<bool>) -> Self {
            let mut mailer = Self::new();
            mailer.gate = Some(gate);
            mailer
        }
    }

    impl Mailer for MockMailer {
        fn deliver(
            &self,
            _from: &Address,
            to: &Address,
            _message: &[u8],
        ) -> impl Future<Output = Result<(), DeliveryError>> + Send {
            let this = self.clone();
            let to = to.to_string();
            async move {
                let now = this.active.fetch_add(1, Ordering::SeqCst) + 1;
                this.peak.fetch_max(now, Ordering::SeqCst);

                if let Some(gate) = &this.gate {
                    let mut gate = gate.clone();
                    let _ = gate.wait_for(|released| *released).await;
                } else {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }

                this.active.fetch_sub(1, Ordering::SeqCst);

                if this.fail.contains(&to) {
                    return Err(DeliveryError::Send(mailfan_smtp::Error::smtp(
                        550,
                        "mailbox unavailable",
                    )));
                }

                this.delivered.lock().unwrap().push(to);
                Ok(())
            }
        }
    }

    fn recipients(count: usize) -> Vec<Recipient> {
        (0..count)
            .map(|i| Recipient {
                email: format!("user{i}@example.com"),
                name: Some(format!("User {i}")),
            })
            .collect()
    }

    fn dispatcher(max_tasks: usize, mailer: MockMailer) -> (Dispatcher<MockMailer>, StopHandle) {
        let config = Arc::new(Config {
            max_tasks,
            encode_base64: false,
            ..Config::default()
        });
        let template = Arc::new(Template::parse(TEMPLATE).unwrap());
        let sender = Sender {
            email: "news@corp.example".to_string(),
            name: None,
        };
        Dispatcher::new(config, template, sender, mailer)
    }

    #[test]
    fn test_engine_starts_idle() {
        let (engine, _stop) = dispatcher(2, MockMailer::new());
        assert_eq!(engine.state(), State::Idle);
    }

    #[tokio::test]
    async fn test_concurrency_bound_respected() {
        let mailer = MockMailer::new();
        let peak = Arc::clone(&mailer.peak);
        let delivered = Arc::clone(&mailer.delivered);
        let (engine, _stop) = dispatcher(3, mailer);

        let summary = engine.run(recipients(20)).await;

        assert_eq!(summary.sent, 20);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.cancelled, 0);
        assert!(peak.load(Ordering::SeqCst) <= 3);

        // Every recipient attempted exactly once
        let mut seen = delivered.lock().unwrap().clone();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 20);
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let mailer = MockMailer::failing(&["user7@example.com"]);
        let (engine, _stop) = dispatcher(4, mailer);

        let summary = engine.run(recipients(12)).await;

        assert_eq!(summary.sent, 11);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 0);
        assert_eq!(summary.attempted(), 12);
    }

    #[tokio::test]
    async fn test_soft_stop_cancels_pending_and_drains_inflight() {
        let (gate_tx, gate_rx) = watch::channel(false);
        let mailer = MockMailer::gated(gate_rx);
        let active = Arc::clone(&mailer.active);
        let (engine, stop) = dispatcher(2, mailer);

        let run = tokio::spawn(engine.run(recipients(10)));

        // Wait until both workers are blocked inside deliver
        for _ in 0..200 {
            if active.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(active.load(Ordering::SeqCst), 2);

        stop.stop();
        gate_tx.send(true).unwrap();

        let summary = run.await.unwrap();
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.cancelled, 8);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn test_jitter_delay_applies() {
        let mailer = MockMailer::new();
        let (mut engine, _stop) = dispatcher(2, mailer);
        engine.config = Arc::new(Config {
            max_tasks: 2,
            delay: Some(Duration::from_millis(10)),
            encode_base64: false,
            ..Config::default()
        });

        let summary = engine.run(recipients(4)).await;
        assert_eq!(summary.sent, 4);
    }
}
