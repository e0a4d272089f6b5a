//! Deferred work for the chat client.
//!
//! Reconnects, the initial connect and simulated replies are modelled as
//! cancellable tasks: `schedule` returns a `TaskHandle`, and when the delay
//! elapses the task is delivered back to the client as a `ClientEvent::Timer`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::session::ClientEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimerTask {
    InitialConnect,
    Reconnect,
    SimulatedReply { prompt: String },
}

pub trait Scheduler: Send {
    /// Wall clock used for message timestamps and duplicate detection.
    fn now(&self) -> OffsetDateTime;

    fn schedule(&mut self, delay: Duration, task: TimerTask) -> TaskHandle;

    /// Cancel a pending task. Cancelling a task that already fired is a no-op.
    fn cancel(&mut self, handle: TaskHandle);
}

// ============================================
// Tokio-backed scheduler
// ============================================

pub struct TokioScheduler {
    events: mpsc::UnboundedSender<ClientEvent>,
    next_id: u64,
    tasks: HashMap<TaskHandle, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self {
            events,
            next_id: 1,
            tasks: HashMap::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn schedule(&mut self, delay: Duration, task: TimerTask) -> TaskHandle {
        self.tasks.retain(|_, join| !join.is_finished());

        let handle = TaskHandle(self.next_id);
        self.next_id += 1;

        let events = self.events.clone();
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The session may already be gone; nothing left to notify then.
            let _ = events.send(ClientEvent::Timer { handle, task });
        });
        self.tasks.insert(handle, join);
        handle
    }

    fn cancel(&mut self, handle: TaskHandle) {
        if let Some(join) = self.tasks.remove(&handle) {
            join.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, join) in self.tasks.drain() {
            join.abort();
        }
    }
}

// ============================================
// Manual scheduler (deterministic time)
// ============================================

struct Pending {
    handle: TaskHandle,
    due: Duration,
    task: TimerTask,
}

struct ManualState {
    start: OffsetDateTime,
    elapsed: Duration,
    next_id: u64,
    pending: Vec<Pending>,
}

/// Scheduler driven by explicit `advance` calls instead of real time.
///
/// Clones share the same clock and queue, so a caller can keep one clone
/// while the client owns another. Fired tasks are returned from `advance`
/// for the caller to hand to `ChatClient::handle_timer`.
#[derive(Clone)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                start,
                elapsed: Duration::ZERO,
                next_id: 1,
                pending: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // A panic while holding the lock only happens inside a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move the clock forward and return every task that came due, in due order.
    pub fn advance(&self, by: Duration) -> Vec<(TaskHandle, TimerTask)> {
        let mut state = self.lock();
        state.elapsed += by;
        let now = state.elapsed;

        let mut due: Vec<Pending> = Vec::new();
        let mut index = 0;
        while index < state.pending.len() {
            if state.pending[index].due <= now {
                due.push(state.pending.remove(index));
            } else {
                index += 1;
            }
        }
        due.sort_by_key(|p| (p.due, p.handle));
        due.into_iter().map(|p| (p.handle, p.task)).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Pending tasks with the delay remaining until each fires.
    pub fn pending(&self) -> Vec<(Duration, TimerTask)> {
        let state = self.lock();
        state
            .pending
            .iter()
            .map(|p| (p.due.saturating_sub(state.elapsed), p.task.clone()))
            .collect()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> OffsetDateTime {
        let state = self.lock();
        state.start + state.elapsed
    }

    fn schedule(&mut self, delay: Duration, task: TimerTask) -> TaskHandle {
        let mut state = self.lock();
        let handle = TaskHandle(state.next_id);
        state.next_id += 1;
        let due = state.elapsed + delay;
        state.pending.push(Pending { handle, due, task });
        handle
    }

    fn cancel(&mut self, handle: TaskHandle) {
        self.lock().pending.retain(|p| p.handle != handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_manual_scheduler_fires_in_order() {
        let mut scheduler = ManualScheduler::new(datetime!(2025-01-01 0:00 UTC));
        scheduler.schedule(Duration::from_secs(4), TimerTask::Reconnect);
        scheduler.schedule(Duration::from_secs(1), TimerTask::InitialConnect);

        assert!(scheduler.advance(Duration::from_millis(999)).is_empty());
        let fired = scheduler.advance(Duration::from_secs(5));
        let tasks: Vec<TimerTask> = fired.into_iter().map(|(_, task)| task).collect();
        assert_eq!(tasks, vec![TimerTask::InitialConnect, TimerTask::Reconnect]);
        assert_eq!(scheduler.pending_count(), 0);
        assert_eq!(scheduler.now(), datetime!(2025-01-01 0:00:05.999 UTC));
    }

    #[test]
    fn test_manual_scheduler_cancel() {
        let mut scheduler = ManualScheduler::new(datetime!(2025-01-01 0:00 UTC));
        let handle = scheduler.schedule(Duration::from_secs(1), TimerTask::Reconnect);
        let observer = scheduler.clone();
        scheduler.cancel(handle);
        assert_eq!(observer.pending_count(), 0);
        assert!(observer.advance(Duration::from_secs(10)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_delivers_and_cancels() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);

        let cancelled = scheduler.schedule(Duration::from_secs(1), TimerTask::Reconnect);
        let kept = scheduler.schedule(Duration::from_secs(2), TimerTask::InitialConnect);
        scheduler.cancel(cancelled);

        match rx.recv().await {
            Some(ClientEvent::Timer { handle, task }) => {
                assert_eq!(handle, kept);
                assert_eq!(task, TimerTask::InitialConnect);
            }
            _ => panic!("expected a timer event"),
        }
    }
}
