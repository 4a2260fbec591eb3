//! The producer scheduler and the parallel writer pool.
//!
//! Producers run as independent tasks, each owning its model, mapping chain,
//! and format. They coordinate only through the governors in
//! [`crate::governor`] and a bounded write queue whose capacity equals the
//! writer-pool size, so back-pressure from a slow sink propagates all the way
//! up to record generation and memory stays bounded regardless of the rate
//! mismatch between generation and delivery.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::AvalonError;
use crate::governor::{CountBudget, Dispatcher, Grant, RateGovernor};
use crate::{Format, Mapping, Medium, Model, Payload, Record, RecordSource};

/// A producer is retired after this many consecutive `Model::next` failures.
pub const MAX_CONSECUTIVE_MODEL_ERRORS: u32 = 100;

/// A producer is retired after this many consecutive failures of one mapping.
pub const MAX_CONSECUTIVE_MAPPING_ERRORS: u32 = 100;

/// The pipeline aborts after this many consecutive format failures.
pub const MAX_CONSECUTIVE_FORMAT_ERRORS: u32 = 100;

/// The pipeline aborts after this many consecutive write failures on one
/// medium instance.
pub const MAX_MEDIUM_FAILURES: u32 = 10;

/// Pipeline-level knobs resolved from the CLI.
pub struct PipelineConfig {
    /// Total records to emit; `None` runs until cancelled.
    pub number: Option<u64>,
    /// Global records-per-second cap.
    pub rate: Option<f64>,
    /// Records requested per batch; the final batch is clipped to the budget.
    pub batch_size: u64,
    /// Writer-pool size; also the write-queue capacity.
    pub writers: usize,
    /// How long queued writes may drain after cancellation.
    pub drain_timeout: Duration,
}

/// One mapping in a producer's chain, labelled for error scoping.
pub struct NamedMapping {
    pub name: String,
    pub mapping: Box<dyn Mapping>,
}

/// Everything one producer worker owns.
pub struct ProducerSetup {
    /// Model title, for diagnostics.
    pub title: String,
    pub weight: u32,
    pub model: Box<dyn Model>,
    pub mappings: Vec<NamedMapping>,
    pub format: Box<dyn Format>,
}

impl std::fmt::Debug for ProducerSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerSetup")
            .field("title", &self.title)
            .field("weight", &self.weight)
            .field("mappings", &self.mappings.len())
            .finish()
    }
}

#[derive(Debug)]
pub struct PipelineReport {
    pub emitted: u64,
}

struct WriteJob {
    payload: Payload,
    size: u64,
}

/// First fatal error wins; setting it also cancels the pipeline.
struct Fatal {
    slot: Mutex<Option<AvalonError>>,
}

impl Fatal {
    fn new() -> Self {
        Fatal { slot: Mutex::new(None) }
    }

    fn set(&self, err: AvalonError, cancel: &CancellationToken) {
        let mut slot = self.slot.lock().expect("fatal slot poisoned");
        if slot.is_none() {
            *slot = Some(err);
        }
        drop(slot);
        cancel.cancel();
    }

    fn take(&self) -> Option<AvalonError> {
        self.slot.lock().expect("fatal slot poisoned").take()
    }
}

/// Consecutive-failure counter with rate-limited logging: the first failure
/// logs, then every hundredth.
struct ErrorStreak {
    max: u32,
    consecutive: u32,
}

impl ErrorStreak {
    fn new(max: u32) -> Self {
        ErrorStreak { max, consecutive: 0 }
    }

    fn ok(&mut self) {
        self.consecutive = 0;
    }

    /// Record a failure; returns true when this one should be logged.
    fn fail(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive == 1 || self.consecutive % 100 == 0
    }

    fn exhausted(&self) -> bool {
        self.consecutive >= self.max
    }

    fn count(&self) -> u32 {
        self.consecutive
    }
}

/// The model-shaped proxy handed to formats: `next()` yields records that
/// already passed the mapping chain.
struct MappedRecords {
    records: VecDeque<Record>,
}

impl MappedRecords {
    fn new(records: Vec<Record>) -> Self {
        MappedRecords { records: records.into() }
    }
}

impl RecordSource for MappedRecords {
    fn next(&mut self) -> Result<Record> {
        self.records.pop_front().ok_or_else(|| anyhow::anyhow!("batch record source exhausted"))
    }
}

/// Coordination state shared by every task in one pipeline run.
struct Shared {
    budget: CountBudget,
    rate: Option<RateGovernor>,
    dispatcher: Dispatcher,
    fatal: Fatal,
    cancel: CancellationToken,
    batch_size: u64,
}

/// Run the assembled pipeline to completion.
///
/// Returns once every producer finished and the writer queue drained. A
/// cancellation that drains within `drain_timeout` is a clean exit; a fatal
/// error recorded by any task surfaces as `Err`.
pub async fn run_pipeline(
    config: PipelineConfig,
    producers: Vec<ProducerSetup>,
    mediums: Vec<Box<dyn Medium>>,
    cancel: CancellationToken,
) -> Result<PipelineReport, AvalonError> {
    if producers.is_empty() {
        return Err(AvalonError::config("no producers configured"));
    }
    if mediums.len() != config.writers {
        return Err(AvalonError::config("one medium instance per writer slot is required"));
    }
    if config.number == Some(0) {
        info!("record budget is zero, nothing to emit");
        return Ok(PipelineReport { emitted: 0 });
    }

    let shared = Arc::new(Shared {
        budget: CountBudget::new(config.number),
        rate: config.rate.map(RateGovernor::new),
        dispatcher: Dispatcher::new(producers.iter().map(|p| p.weight).collect()),
        fatal: Fatal::new(),
        cancel: cancel.clone(),
        batch_size: config.batch_size,
    });

    // Queue capacity equals the pool size: a full queue blocks producers.
    let (tx, rx) = mpsc::channel::<WriteJob>(config.writers);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let mut writers = JoinSet::new();
    for (slot, medium) in mediums.into_iter().enumerate() {
        writers.spawn(writer_task(slot, medium, rx.clone(), shared.clone()));
    }

    let mut workers = JoinSet::new();
    for (id, setup) in producers.into_iter().enumerate() {
        debug!(id, producer = %setup.title, weight = setup.weight, "spawning producer");
        workers.spawn(producer_task(id, setup, shared.clone(), tx.clone()));
    }
    drop(tx);

    while workers.join_next().await.is_some() {}

    // The queue closes once the last producer drops its sender; writers then
    // finish whatever is left. After a cancellation they get one drain
    // window before being aborted.
    let timed_out = tokio::select! {
        _ = async { while writers.join_next().await.is_some() {} } => false,
        _ = async {
            cancel.cancelled().await;
            tokio::time::sleep(config.drain_timeout).await;
        } => true,
    };
    if timed_out {
        error!("writer queue did not drain in time, aborting writers");
        writers.abort_all();
        while writers.join_next().await.is_some() {}
        return Err(AvalonError::ShutdownTimeout(config.drain_timeout));
    }

    if let Some(err) = shared.fatal.take() {
        return Err(err);
    }
    let emitted = shared.budget.emitted();
    if !cancel.is_cancelled() {
        if let Some(number) = config.number {
            if emitted < number {
                return Err(AvalonError::AllProducersRetired);
            }
        }
    }
    info!(emitted, "pipeline drained");
    Ok(PipelineReport { emitted })
}

async fn producer_task(
    id: usize,
    mut setup: ProducerSetup,
    shared: Arc<Shared>,
    tx: mpsc::Sender<WriteJob>,
) {
    let mut model_errors = ErrorStreak::new(MAX_CONSECUTIVE_MODEL_ERRORS);
    let mut mapping_errors: Vec<ErrorStreak> = setup
        .mappings
        .iter()
        .map(|_| ErrorStreak::new(MAX_CONSECUTIVE_MAPPING_ERRORS))
        .collect();
    let mut format_errors = ErrorStreak::new(MAX_CONSECUTIVE_FORMAT_ERRORS);

    'produce: loop {
        // first signal: stop issuing batches, deterministically, not only
        // when a governor or the write queue happens to block
        if shared.cancel.is_cancelled() {
            break;
        }
        if !shared.dispatcher.next_turn(id, &shared.cancel).await {
            break;
        }
        let want = match shared.budget.reserve(shared.batch_size, &shared.cancel).await {
            Grant::Records(n) => n,
            Grant::Done => break,
        };

        let mut records: Vec<Record> = Vec::with_capacity(want as usize);
        for _ in 0..want {
            let record = match setup.model.next() {
                Ok(record) => {
                    model_errors.ok();
                    record
                }
                Err(err) => {
                    if model_errors.fail() {
                        warn!(
                            producer = %setup.title, id, error = %err,
                            "model failed to produce a record"
                        );
                    }
                    if model_errors.exhausted() {
                        error!(
                            producer = %setup.title, id,
                            failures = model_errors.count(),
                            "retiring producer after consecutive model errors"
                        );
                        shared.budget.cancel(want);
                        shared.dispatcher.retire(id);
                        break 'produce;
                    }
                    continue;
                }
            };

            // Mapping chain: inline mappings first, then globals, then
            // flag-enabled extensions; `None` drops the record.
            let mut current = Some(record);
            for (index, named) in setup.mappings.iter_mut().enumerate() {
                let Some(input) = current.take() else { break };
                match named.mapping.map(input) {
                    Ok(next) => {
                        mapping_errors[index].ok();
                        current = next;
                    }
                    Err(err) => {
                        if mapping_errors[index].fail() {
                            warn!(
                                producer = %setup.title, id, mapping = %named.name,
                                error = %err, "mapping failed, record dropped"
                            );
                        }
                        if mapping_errors[index].exhausted() {
                            error!(
                                producer = %setup.title, id, mapping = %named.name,
                                failures = mapping_errors[index].count(),
                                "retiring producer after consecutive mapping errors"
                            );
                            shared.budget.cancel(want);
                            shared.dispatcher.retire(id);
                            break 'produce;
                        }
                        current = None;
                    }
                }
                if current.is_none() {
                    break;
                }
            }
            if let Some(mapped) = current {
                records.push(mapped);
            }
        }

        // Dropped and failed records shrink the batch; their reservations go
        // back so the budget counts emitted records only.
        let size = records.len() as u64;
        shared.budget.cancel(want - size);
        if size == 0 {
            continue;
        }

        let mut source = MappedRecords::new(records);
        let payload = match setup.format.batch(&mut source, size as usize) {
            Ok(payload) => {
                format_errors.ok();
                payload
            }
            Err(err) => {
                shared.budget.cancel(size);
                if format_errors.fail() {
                    warn!(producer = %setup.title, id, error = %err, "format failed, batch dropped");
                }
                if format_errors.exhausted() {
                    shared.fatal.set(
                        AvalonError::FormatGaveUp {
                            failures: format_errors.count(),
                            last: err.to_string(),
                        },
                        &shared.cancel,
                    );
                    break;
                }
                continue;
            }
        };

        if let Some(rate) = &shared.rate {
            if !rate.acquire(size, &shared.cancel).await {
                shared.budget.cancel(size);
                break;
            }
        }

        let job = WriteJob { payload, size };
        tokio::select! {
            sent = tx.send(job) => {
                if sent.is_err() {
                    shared.budget.cancel(size);
                    break;
                }
            }
            _ = shared.cancel.cancelled() => {
                shared.budget.cancel(size);
                break;
            }
        }
    }
    // Leave the rotation on every exit path so peers waiting for a deficit
    // refill are not stranded.
    shared.dispatcher.retire(id);
    debug!(id, "producer finished");
}

async fn writer_task(
    slot: usize,
    mut medium: Box<dyn Medium>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<WriteJob>>>,
    shared: Arc<Shared>,
) {
    let mut failures: u32 = 0;
    loop {
        // Hold the lock only while waiting for a job; delivery happens
        // outside it so slots genuinely run in parallel.
        let job = {
            let mut queue = rx.lock().await;
            queue.recv().await
        };
        let Some(job) = job else { break };

        match medium.write(&job.payload).await {
            Ok(()) => {
                failures = 0;
                shared.budget.commit(job.size);
            }
            Err(err) => {
                failures += 1;
                shared.budget.cancel(job.size);
                warn!(
                    slot, retriable = err.retriable, error = %err,
                    "write failed, batch lost, budget reopened"
                );
                if failures >= MAX_MEDIUM_FAILURES {
                    shared.fatal.set(
                        AvalonError::MediumGaveUp { failures, last: err.to_string() },
                        &shared.cancel,
                    );
                    break;
                }
            }
        }
    }
    if let Err(err) = medium.close().await {
        warn!(slot, error = %err, "medium close failed");
    }
    debug!(slot, "writer finished");
}
