//! Lane fan-out, join and the single retry pass.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use courtlot_core::{DispatchItem, LaneLogs, Outcome, Progress, ProtocolLog, partition};
use courtlot_site::{SessionFactory, SiteSession};
use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::{Attempt, Protocol, ProtocolError};

/// Progress sink, called synchronously after every item.
///
/// First-pass events count `current` up to `total`. Retry-pass events keep
/// `current == total` and say `retry <n>/<m>:` in the message.
pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Final result for one input item.
#[derive(Debug, Clone)]
pub struct Report<I, O> {
    pub item: I,
    pub outcome: Outcome<O>,
    /// Whether the item went through the retry pass.
    pub retried: bool,
}

/// Outcome counts over a set of reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub success: usize,
    pub login_failed: usize,
    pub errors: usize,
}

impl Tally {
    pub fn of<I, O>(reports: &[Report<I, O>]) -> Self {
        reports.iter().fold(Self::default(), |mut t, r| {
            match r.outcome {
                Outcome::Success(_) => t.success += 1,
                Outcome::LoginFailed => t.login_failed += 1,
                Outcome::Error(_) => t.errors += 1,
            }
            t
        })
    }

    pub fn all_succeeded(&self) -> bool {
        self.login_failed == 0 && self.errors == 0
    }
}

/// Runs a protocol over many items on a bounded number of sessions.
#[derive(Clone)]
pub struct Dispatcher {
    sessions: Arc<dyn SessionFactory>,
    logs: Arc<dyn LaneLogs>,
    concurrency: usize,
    progress: Option<ProgressFn>,
}

impl Dispatcher {
    pub fn new(sessions: Arc<dyn SessionFactory>, logs: Arc<dyn LaneLogs>) -> Self {
        Self {
            sessions,
            logs,
            concurrency: 1,
            progress: None,
        }
    }

    /// Number of lanes; values below one run a single lane.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run `protocol` over `items` and return one report per item, in input
    /// order.
    ///
    /// Items are dealt to lanes by index modulo the concurrency. Each lane
    /// opens one session and works through its items in order. After every
    /// lane has finished, items that ended in `LoginFailed` or `Error` are run
    /// once more, in input order, on one fresh session. If that session
    /// cannot be launched, those items keep their first-pass outcome.
    pub async fn run<P: Protocol>(
        &self,
        protocol: Arc<P>,
        items: Vec<P::Item>,
    ) -> Vec<Report<P::Item, P::Output>> {
        let total = items.len();
        if total == 0 {
            return Vec::new();
        }

        let indexed: Vec<(usize, P::Item)> = items.iter().cloned().enumerate().collect();
        let lanes = partition(indexed, self.concurrency);
        info!(items = total, lanes = lanes.len(), "dispatch started");

        // ── First pass ──

        let done = Arc::new(AtomicUsize::new(0));
        let mut set = JoinSet::new();
        for (lane, group) in lanes.into_iter().enumerate() {
            let plain: Vec<P::Item> = group.iter().map(|(_, item)| item.clone()).collect();
            let name = protocol.lane_name(lane, &plain);
            let pass = Pass {
                sessions: self.sessions.clone(),
                logs: self.logs.clone(),
                progress: self.progress.clone(),
                done: done.clone(),
                total,
                retry_of: None,
            };
            set.spawn(pass.run(protocol.clone(), name, group));
        }

        let mut slots: Vec<Option<Outcome<P::Output>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(buffer) => {
                    for (index, outcome) in buffer {
                        slots[index] = Some(outcome);
                    }
                }
                Err(e) => error!(error = %e, "lane task failed"),
            }
        }
        let mut outcomes: Vec<Outcome<P::Output>> = slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Outcome::Error("lane task ended early".into())))
            .collect();

        // ── Retry pass ──

        let failed: Vec<(usize, P::Item)> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_failure())
            .map(|(index, _)| (index, items[index].clone()))
            .collect();
        let mut retried = vec![false; total];

        if !failed.is_empty() {
            info!(items = failed.len(), "retry pass started");
            let name = protocol.retry_name();
            let log = self.logs.open(&name);
            let pass = Pass {
                sessions: self.sessions.clone(),
                logs: self.logs.clone(),
                progress: self.progress.clone(),
                done: Arc::new(AtomicUsize::new(0)),
                total: failed.len(),
                retry_of: Some(total),
            };
            let second = match pass.open(log.as_ref()).await {
                Ok(session) => pass.run_on(protocol.clone(), session, log.clone(), failed).await,
                Err(_) => {
                    log.warn("retry pass skipped; first-pass outcomes kept");
                    warn!(items = failed.len(), "retry pass skipped");
                    Vec::new()
                }
            };
            for (index, outcome) in second {
                retried[index] = true;
                if !outcome.is_failure() {
                    let item = &items[index];
                    let message = format!(
                        "resolved on retry: no {} {}",
                        item.sequence_no(),
                        protocol.describe(item)
                    );
                    log.info(&message);
                    info!(sequence_no = item.sequence_no(), "resolved on retry");
                }
                outcomes[index] = outcome;
            }
        }

        let reports: Vec<_> = items
            .into_iter()
            .zip(outcomes)
            .zip(retried)
            .map(|((item, outcome), retried)| Report {
                item,
                outcome,
                retried,
            })
            .collect();
        let tally = Tally::of(&reports);
        info!(
            success = tally.success,
            login_failed = tally.login_failed,
            errors = tally.errors,
            "dispatch finished"
        );
        reports
    }
}

/// Everything one pass needs, owned so it can move into a lane task.
struct Pass {
    sessions: Arc<dyn SessionFactory>,
    logs: Arc<dyn LaneLogs>,
    progress: Option<ProgressFn>,
    done: Arc<AtomicUsize>,
    total: usize,
    /// First-pass item count, set on the retry pass.
    retry_of: Option<usize>,
}

impl Pass {
    /// First-pass lane: a launch failure marks every item `Error` so the
    /// retry pass picks them up.
    async fn run<P: Protocol>(
        self,
        protocol: Arc<P>,
        name: String,
        items: Vec<(usize, P::Item)>,
    ) -> Vec<(usize, Outcome<P::Output>)> {
        let log = self.logs.open(&name);
        match self.open(log.as_ref()).await {
            Ok(session) => self.run_on(protocol, session, log, items).await,
            Err(detail) => items
                .into_iter()
                .map(|(index, item)| {
                    self.tick(&*protocol, &item);
                    (index, Outcome::Error(detail.clone()))
                })
                .collect(),
        }
    }

    async fn open(&self, log: &dyn ProtocolLog) -> Result<Box<dyn SiteSession>, String> {
        self.sessions.open().await.map_err(|e| {
            let detail = format!("session launch failed: {e}");
            log.error(&detail);
            error!(error = %e, "session launch failed");
            detail
        })
    }

    /// Run every item on `session` in order, then close it.
    async fn run_on<P: Protocol>(
        self,
        protocol: Arc<P>,
        session: Box<dyn SiteSession>,
        log: Arc<dyn ProtocolLog>,
        items: Vec<(usize, P::Item)>,
    ) -> Vec<(usize, Outcome<P::Output>)> {
        let mut buffer = Vec::with_capacity(items.len());
        for (index, item) in items {
            log.info("");
            log.info("=== start ===");
            log.info(&format!("member: {}", protocol.describe(&item)));

            let run = AssertUnwindSafe(protocol.run(session.as_ref(), &item, log.as_ref()))
                .catch_unwind()
                .await;
            let outcome = match run {
                Ok(Ok(Attempt::Completed(value))) => Outcome::Success(value),
                Ok(Ok(Attempt::LoginRejected)) => {
                    log.warn(&format!("login failed: {}", protocol.describe(&item)));
                    warn!(sequence_no = item.sequence_no(), "login failed");
                    Outcome::LoginFailed
                }
                Ok(Err(e)) => {
                    log.error(&format!("error: {e}"));
                    warn!(sequence_no = item.sequence_no(), error = %e, "item failed");
                    if let Err(e) = session.logout().await {
                        log.warn(&format!("logout after error failed: {e}"));
                    }
                    Outcome::Error(e.to_string())
                }
                Err(panic) => {
                    let e = ProtocolError::Panicked(panic_message(panic.as_ref()));
                    log.error(&format!("error: {e}"));
                    error!(sequence_no = item.sequence_no(), error = %e, "item panicked");
                    Outcome::Error(e.to_string())
                }
            };
            log.info(&format!("=== end: {} ===", outcome.label()));
            self.tick(&*protocol, &item);
            buffer.push((index, outcome));
        }

        if let Err(e) = session.close().await {
            log.warn(&format!("session close failed: {e}"));
            warn!(error = %e, "session close failed");
        }
        buffer
    }

    fn tick<P: Protocol>(&self, protocol: &P, item: &P::Item) {
        let current = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(progress) = &self.progress else {
            return;
        };
        let event = match self.retry_of {
            None => Progress::new(current, self.total, protocol.describe(item)),
            Some(first) => Progress::new(
                first,
                first,
                format!("retry {current}/{}: {}", self.total, protocol.describe(item)),
            ),
        };
        progress(event);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
