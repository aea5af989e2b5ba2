//! Adaptive fan-out barrier.
//!
//! A [`GatherTask`] collects the results of a fixed-size group of concurrent
//! sub-operations into positional slots. It completes when every slot is
//! filled, when an absolute timeout elapses, or when the early-stop deadline
//! elapses.
//!
//! Early stop: once the fraction of completed slots reaches
//! [`EarlyStop::threshold`], the barrier takes `T` as the largest elapsed
//! completion time seen so far, floors it at `timeout * floor_fraction`, and
//! forces completion at `start + T`. The deadline is fixed the first time the
//! threshold is crossed and never moved afterwards.
//!
//! Completion is first-writer-wins. Slot writes arriving after completion are
//! silently dropped, so stragglers may keep running in the background and
//! report late without any effect.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::time::{Duration, Instant};

/// Default fraction of completed slots that arms the early-stop deadline.
pub const DEFAULT_EARLY_STOP_THRESHOLD: f64 = 0.8;

/// Default floor of the early-stop wait, as a fraction of the timeout.
pub const DEFAULT_EARLY_STOP_FLOOR: f64 = 0.25;

/// Early-stop policy for a [`GatherTask`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarlyStop {
    /// Completed fraction in `(0, 1]` at which the deadline is scheduled.
    pub threshold: f64,
    /// Fraction of the absolute timeout the wait is floored at.
    pub floor_fraction: f64,
}

impl Default for EarlyStop {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_EARLY_STOP_THRESHOLD,
            floor_fraction: DEFAULT_EARLY_STOP_FLOOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Pending { early_deadline: Option<Instant> },
    Done,
}

struct State<T> {
    slots: Vec<Option<T>>,
    filled: Vec<bool>,
    completed: usize,
    longest: Duration,
    early_deadline: Option<Instant>,
    done: bool,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    signal: watch::Sender<Signal>,
    start: Instant,
    timeout: Option<Duration>,
    early_stop: Option<EarlyStop>,
}

/// Completion barrier over `n` positional result slots.
///
/// Cloning yields another handle to the same barrier.
pub struct GatherTask<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for GatherTask<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> GatherTask<T> {
    /// Create a barrier over `n` expected results.
    ///
    /// A barrier over zero slots is complete on creation.
    pub fn new(n: usize, early_stop: Option<EarlyStop>, timeout: Option<Duration>) -> Self {
        let done = n == 0;
        let initial = if done {
            Signal::Done
        } else {
            Signal::Pending {
                early_deadline: None,
            }
        };
        let (signal, _) = watch::channel(initial);
        let state = State {
            slots: std::iter::repeat_with(|| None).take(n).collect(),
            filled: vec![false; n],
            completed: 0,
            longest: Duration::ZERO,
            early_deadline: None,
            done,
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                signal,
                start: Instant::now(),
                timeout,
                early_stop,
            }),
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    /// Whether the barrier has zero slots.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots completed so far.
    pub fn completed(&self) -> usize {
        self.lock().completed
    }

    /// Whether the barrier has completed, by fill, timeout or early stop.
    pub fn is_done(&self) -> bool {
        let mut state = self.lock();
        self.expire_if_due(&mut state);
        state.done
    }

    /// The early-stop deadline, once armed.
    pub fn early_deadline(&self) -> Option<Instant> {
        self.lock().early_deadline
    }

    /// Record the result for slot `index`.
    ///
    /// Each slot completes once; repeated writes to the same slot and writes
    /// after completion are ignored.
    pub fn set_result(&self, index: usize, value: T) {
        self.complete_slot(index, Some(value));
    }

    /// Complete slot `index` without a value, leaving it empty.
    ///
    /// Used when a sub-operation failed: the barrier stops waiting for it but
    /// callers see no data for that slot.
    pub fn skip(&self, index: usize) {
        self.complete_slot(index, None);
    }

    /// Publish an interim value for slot `index` without completing it.
    pub fn update_result(&self, index: usize, value: T) {
        let mut state = self.lock();
        self.expire_if_due(&mut state);
        if state.done {
            return;
        }
        match state.slots.get_mut(index) {
            Some(slot) => *slot = Some(value),
            None => tracing::warn!(index, "update_result index out of range"),
        }
    }

    /// Wait until every slot is filled, the timeout elapses, or the
    /// early-stop deadline elapses.
    pub async fn done(&self) {
        let mut rx = self.inner.signal.subscribe();
        loop {
            let signal = *rx.borrow_and_update();
            let early_deadline = match signal {
                Signal::Done => return,
                Signal::Pending { early_deadline } => early_deadline,
            };
            match self.next_deadline(early_deadline) {
                Some(at) => {
                    tokio::select! {
                        changed = rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                        () = tokio::time::sleep_until(at) => {
                            self.force_complete();
                            return;
                        }
                    }
                }
                None => {
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Snapshot of all slots; `None` marks a slot with no result.
    pub fn results(&self) -> Vec<Option<T>>
    where
        T: Clone,
    {
        self.lock().slots.clone()
    }

    /// Move the slot values out, leaving every slot empty.
    pub fn take_results(&self) -> Vec<Option<T>> {
        let mut state = self.lock();
        state.slots.iter_mut().map(Option::take).collect()
    }

    fn complete_slot(&self, index: usize, value: Option<T>) {
        let mut state = self.lock();
        self.expire_if_due(&mut state);
        if state.done {
            tracing::trace!(index, "late result ignored");
            return;
        }
        let Some(filled) = state.filled.get(index).copied() else {
            tracing::warn!(index, "set_result index out of range");
            return;
        };
        if filled {
            return;
        }
        state.filled[index] = true;
        if let Some(value) = value {
            state.slots[index] = Some(value);
        }
        state.completed += 1;
        let elapsed = self.inner.start.elapsed();
        if elapsed > state.longest {
            state.longest = elapsed;
        }

        let n = state.slots.len();
        if state.completed >= n {
            self.finish(&mut state);
            return;
        }

        if let Some(policy) = self.inner.early_stop {
            if state.early_deadline.is_none()
                && state.completed as f64 / n as f64 >= policy.threshold
            {
                let mut wait = state.longest;
                if let Some(timeout) = self.inner.timeout {
                    wait = wait.max(timeout.mul_f64(policy.floor_fraction));
                }
                let deadline = self.inner.start + wait;
                state.early_deadline = Some(deadline);
                tracing::debug!(
                    completed = state.completed,
                    total = n,
                    wait_ms = wait.as_millis() as u64,
                    "early stop armed"
                );
                self.inner.signal.send_replace(Signal::Pending {
                    early_deadline: Some(deadline),
                });
            }
        }
    }

    fn next_deadline(&self, early_deadline: Option<Instant>) -> Option<Instant> {
        let absolute = self.inner.timeout.map(|t| self.inner.start + t);
        match (absolute, early_deadline) {
            (Some(a), Some(e)) => Some(a.min(e)),
            (a, e) => a.or(e),
        }
    }

    fn expire_if_due(&self, state: &mut State<T>) {
        if state.done {
            return;
        }
        if let Some(at) = self.next_deadline(state.early_deadline) {
            if Instant::now() >= at {
                self.finish(state);
            }
        }
    }

    fn force_complete(&self) {
        let mut state = self.lock();
        if !state.done {
            tracing::debug!(
                completed = state.completed,
                total = state.slots.len(),
                "gather forced to complete"
            );
            self.finish(&mut state);
        }
    }

    fn finish(&self, state: &mut State<T>) {
        state.done = true;
        self.inner.signal.send_replace(Signal::Done);
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
