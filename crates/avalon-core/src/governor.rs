//! Emission governors: the rate token bucket, the record count budget, and
//! the weighted deficit round-robin dispatcher.
//!
//! These three primitives are the only coordination points shared between
//! producer tasks; everything else in the pipeline is owned by exactly one
//! task. All of them block cooperatively and observe the shutdown token so a
//! cancelled pipeline never wedges inside a governor.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Global records-per-second cap.
///
/// A token bucket holding at most one second's worth of tokens, refilled
/// continuously. The bucket starts empty, so emission never front-runs the
/// cap even in the first window. `acquire` drains partial grants and sleeps
/// for the remainder, which keeps batches larger than the bucket legal.
pub struct RateGovernor {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl RateGovernor {
    /// `rate` must be positive; the CLI rejects `--rate 0` before this.
    pub fn new(rate: f64) -> Self {
        RateGovernor {
            rate,
            capacity: rate,
            state: Mutex::new(BucketState { tokens: 0.0, refilled_at: Instant::now() }),
        }
    }

    /// Take `need` tokens, waiting for refill as necessary. Returns false
    /// when the pipeline is cancelled while waiting.
    pub async fn acquire(&self, need: u64, cancel: &CancellationToken) -> bool {
        let mut outstanding = need as f64;
        loop {
            // check before granting, or a fast consumer never observes
            // cancellation
            if cancel.is_cancelled() {
                return false;
            }
            let wait = {
                let mut state = self.state.lock().expect("rate governor poisoned");
                let now = Instant::now();
                let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
                state.refilled_at = now;

                let take = state.tokens.min(outstanding);
                state.tokens -= take;
                outstanding -= take;
                if outstanding < 1e-9 {
                    return true;
                }
                Duration::from_secs_f64(outstanding.min(self.capacity) / self.rate)
            };
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return false,
            }
        }
    }
}

/// Outcome of a budget reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// Build a batch of exactly this many records.
    Records(u64),
    /// The budget is met (or the pipeline cancelled); enter drain.
    Done,
}

/// The `--number` count guard.
///
/// Producers reserve records before building a batch; writers commit on
/// delivery or cancel on loss. Reservations are clipped so
/// `emitted + reserved` never exceeds the budget, which both clips the final
/// batch and guarantees `emitted <= number` under concurrent writers. A
/// cancelled reservation reopens the budget, so a lost batch is replaced.
pub struct CountBudget {
    state: Mutex<BudgetState>,
    version: watch::Sender<()>,
}

struct BudgetState {
    number: Option<u64>,
    emitted: u64,
    reserved: u64,
}

impl CountBudget {
    pub fn new(number: Option<u64>) -> Self {
        let (version, _) = watch::channel(());
        CountBudget { state: Mutex::new(BudgetState { number, emitted: 0, reserved: 0 }), version }
    }

    /// Reserve up to `want` records. Blocks while the budget is fully
    /// assigned but unconfirmed, in case a failed write reopens it.
    pub async fn reserve(&self, want: u64, cancel: &CancellationToken) -> Grant {
        loop {
            // a cancelled pipeline stops issuing batches even while budget
            // remains
            if cancel.is_cancelled() {
                return Grant::Done;
            }
            let mut rx = self.version.subscribe();
            {
                let mut state = self.state.lock().expect("count budget poisoned");
                match state.number {
                    None => {
                        state.reserved += want;
                        return Grant::Records(want);
                    }
                    Some(number) => {
                        let assigned = state.emitted + state.reserved;
                        if assigned < number {
                            let take = want.min(number - assigned);
                            state.reserved += take;
                            return Grant::Records(take);
                        }
                        if state.emitted >= number && state.reserved == 0 {
                            return Grant::Done;
                        }
                    }
                }
            }
            tokio::select! {
                _ = rx.changed() => {}
                _ = cancel.cancelled() => return Grant::Done,
            }
        }
    }

    /// Confirm `n` reserved records as emitted.
    pub fn commit(&self, n: u64) {
        let mut state = self.state.lock().expect("count budget poisoned");
        state.emitted += n;
        state.reserved = state.reserved.saturating_sub(n);
        drop(state);
        self.version.send_replace(());
    }

    /// Return `n` reserved records to the budget (mapping drops, build
    /// failures, lost batches).
    pub fn cancel(&self, n: u64) {
        if n == 0 {
            return;
        }
        let mut state = self.state.lock().expect("count budget poisoned");
        state.reserved = state.reserved.saturating_sub(n);
        drop(state);
        self.version.send_replace(());
    }

    pub fn emitted(&self) -> u64 {
        self.state.lock().expect("count budget poisoned").emitted
    }

    /// True when a finite budget was fully emitted.
    pub fn complete(&self) -> bool {
        let state = self.state.lock().expect("count budget poisoned");
        match state.number {
            Some(number) => state.emitted >= number,
            None => false,
        }
    }
}

/// Weighted fair dispatch over producer groups.
///
/// Classic deficit round robin: every active producer holds a deficit
/// initialized to its weight, a turn costs one, and deficits refill when all
/// active ones hit zero. Over any window of at least
/// `max_weight x batch_size` records the per-producer emission ratio matches
/// the weight ratio within one batch.
pub struct Dispatcher {
    state: Mutex<DrrState>,
    version: watch::Sender<()>,
}

struct DrrState {
    weights: Vec<u32>,
    deficits: Vec<u32>,
    active: Vec<bool>,
}

impl DrrState {
    fn all_active_exhausted(&self) -> bool {
        self.deficits
            .iter()
            .zip(&self.active)
            .all(|(deficit, active)| !active || *deficit == 0)
    }
}

impl Dispatcher {
    pub fn new(weights: Vec<u32>) -> Self {
        let deficits = weights.clone();
        let active = vec![true; weights.len()];
        let (version, _) = watch::channel(());
        Dispatcher { state: Mutex::new(DrrState { weights, deficits, active }), version }
    }

    /// Wait for producer `id`'s next turn. Returns false when the producer
    /// was retired or the pipeline cancelled.
    pub async fn next_turn(&self, id: usize, cancel: &CancellationToken) -> bool {
        loop {
            // no turns once the pipeline is cancelled, even with deficit left
            if cancel.is_cancelled() {
                return false;
            }
            let mut rx = self.version.subscribe();
            {
                let mut state = self.state.lock().expect("dispatcher poisoned");
                if !state.active[id] {
                    return false;
                }
                if state.deficits[id] == 0 && state.all_active_exhausted() {
                    for i in 0..state.deficits.len() {
                        if state.active[i] {
                            state.deficits[i] = state.weights[i];
                        }
                    }
                }
                if state.deficits[id] > 0 {
                    state.deficits[id] -= 1;
                    drop(state);
                    self.version.send_replace(());
                    return true;
                }
            }
            tokio::select! {
                _ = rx.changed() => {}
                _ = cancel.cancelled() => return false,
            }
        }
    }

    /// Remove a producer from rotation so rounds keep completing without it.
    pub fn retire(&self, id: usize) {
        let mut state = self.state.lock().expect("dispatcher poisoned");
        state.active[id] = false;
        drop(state);
        self.version.send_replace(());
    }
}
