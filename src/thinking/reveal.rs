//! Progressive reveal of thinking steps.
//!
//! Steps that have already been parsed are disclosed one at a time on
//! a fixed cadence, decoupled from when the text arrived over the
//! network. Each message gets at most one ticker task, keyed by the
//! message's identity, and the task is aborted when the message leaves
//! view or the scheduler is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::chat::MessageId;

pub const DEFAULT_REVEAL_INTERVAL: Duration = Duration::from_millis(300);

/// Shortest tick period, a zero period is not a valid interval.
pub const MIN_REVEAL_INTERVAL: Duration = Duration::from_millis(1);

/// How many of a message's steps are visible.
///
/// `visible` only moves forward and never passes `total`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RevealState {
    visible: usize,
    total: usize,
}

impl RevealState {
    pub fn new(total: usize) -> Self {
        Self { visible: 0, total }
    }

    pub fn visible(&self) -> usize {
        self.visible
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_complete(&self) -> bool {
        self.visible >= self.total
    }

    /// Reveal one more step. Returns `false` when there was nothing
    /// left to reveal.
    pub fn advance(&mut self) -> bool {
        if self.visible < self.total {
            self.visible += 1;
            true
        } else {
            false
        }
    }

    /// Grow the number of steps. Shrinking is ignored so that visible
    /// progress is never taken back.
    pub fn extend(&mut self, total: usize) {
        self.total = self.total.max(total);
    }
}

struct Schedule {
    progress: Arc<watch::Sender<RevealState>>,
    ticker: JoinHandle<()>,
}

impl Schedule {
    fn state(&self) -> RevealState {
        *self.progress.borrow()
    }
}

impl Drop for Schedule {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

fn spawn_ticker(progress: Arc<watch::Sender<RevealState>>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = time::interval_at(Instant::now() + period, period);
        loop {
            ticks.tick().await;
            let mut complete = false;
            progress.send_modify(|state| {
                state.advance();
                complete = state.is_complete();
            });
            if complete {
                break;
            }
        }
    })
}

/// Tracks reveal progress for every message in view.
///
/// Must be used from within a Tokio runtime since each schedule runs
/// as a spawned task.
pub struct RevealScheduler {
    period: Duration,
    schedules: HashMap<MessageId, Schedule>,
}

impl Default for RevealScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_REVEAL_INTERVAL)
    }
}

impl RevealScheduler {
    /// Periods shorter than [`MIN_REVEAL_INTERVAL`] are raised to it.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_REVEAL_INTERVAL),
            schedules: HashMap::new(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Report the number of parsed steps for a message.
    ///
    /// The first non-empty report starts revealing. Reporting the same
    /// count again, for example after re-parsing a growing stream, does
    /// not touch the running schedule. A larger count replaces the
    /// ticker and continues from the steps already visible.
    pub fn observe(&mut self, id: MessageId, step_count: usize) {
        if step_count == 0 {
            return;
        }

        match self.schedules.get_mut(&id) {
            Some(schedule) if step_count <= schedule.state().total() => {}
            Some(schedule) => {
                tracing::debug!(
                    "Extending reveal for message {} to {} steps",
                    id,
                    step_count
                );
                schedule.ticker.abort();
                schedule.progress.send_modify(|state| state.extend(step_count));
                schedule.ticker = spawn_ticker(Arc::clone(&schedule.progress), self.period);
            }
            None => {
                tracing::debug!("Revealing {} steps for message {}", step_count, id);
                let (progress, _) = watch::channel(RevealState::new(step_count));
                let progress = Arc::new(progress);
                let ticker = spawn_ticker(Arc::clone(&progress), self.period);
                self.schedules.insert(id, Schedule { progress, ticker });
            }
        }
    }

    /// Stop revealing a message and forget its progress. Returns
    /// whether the message had a schedule.
    pub fn remove(&mut self, id: MessageId) -> bool {
        self.schedules.remove(&id).is_some()
    }

    /// Cancel every schedule.
    pub fn clear(&mut self) {
        self.schedules.clear();
    }

    pub fn state(&self, id: MessageId) -> Option<RevealState> {
        self.schedules.get(&id).map(Schedule::state)
    }

    pub fn visible(&self, id: MessageId) -> usize {
        self.state(id).map_or(0, |state| state.visible())
    }

    /// Watch a message's progress. The channel closes when the
    /// message's schedule is removed.
    pub fn subscribe(&self, id: MessageId) -> Option<watch::Receiver<RevealState>> {
        self.schedules
            .get(&id)
            .map(|schedule| schedule.progress.subscribe())
    }

    pub fn is_running(&self, id: MessageId) -> bool {
        self.schedules
            .get(&id)
            .is_some_and(|schedule| !schedule.ticker.is_finished())
    }

    /// Number of messages with a schedule, finished or not.
    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }
}
