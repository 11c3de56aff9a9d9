//! Cooperative delay scheduler for the session sequence.
//!
//! Steps are plain values rather than closures so the controller can match on
//! them with full access to its own state. Every step carries the cancellation
//! token of the session that scheduled it; a cancelled token makes the step inert
//! even if it is still queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

#[derive(Debug)]
struct ScheduledTask<T> {
    id: TaskId,
    due_at: f64,
    token: CancellationToken,
    step: T,
}

#[derive(Debug)]
pub struct Scheduler<T> {
    now: f64,
    next_id: u64,
    tasks: Vec<ScheduledTask<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            now: 0.0,
            next_id: 0,
            tasks: Vec::new(),
        }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn pending(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| !task.token.is_cancelled())
            .count()
    }

    pub fn schedule(&mut self, delay_seconds: f32, token: &CancellationToken, step: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        let delay = if delay_seconds.is_finite() {
            f64::from(delay_seconds.max(0.0))
        } else {
            0.0
        };
        self.tasks.push(ScheduledTask {
            id,
            due_at: self.now + delay,
            token: token.clone(),
            step,
        });
        id
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        self.tasks.len() != before
    }

    pub fn cancel_all(&mut self) -> usize {
        let dropped = self.tasks.len();
        self.tasks.clear();
        dropped
    }

    pub fn advance(&mut self, dt_seconds: f32) {
        if dt_seconds.is_finite() && dt_seconds > 0.0 {
            self.now += f64::from(dt_seconds);
        }
    }

    /// Removes and returns the earliest due step whose token is still live.
    /// Ties on due time run in scheduling order.
    pub fn pop_due(&mut self) -> Option<T> {
        self.tasks.retain(|task| !task.token.is_cancelled());
        let now = self.now;
        let index = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.due_at <= now)
            .min_by(|(_, a), (_, b)| a.due_at.total_cmp(&b.due_at).then(a.id.cmp(&b.id)))
            .map(|(index, _)| index)?;
        Some(self.tasks.remove(index).step)
    }
}
