//! Line buffer shared by a pipe reader task and the expect matcher

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct State {
    lines: Vec<String>,
    closed: bool,
}

/// Blocking line buffer between a background reader and its consumer.
///
/// `drain` suspends until at least one line is buffered and then takes
/// everything at once. Once the producer calls `close`, `drain` hands out
/// whatever is left and then returns `None`.
#[derive(Debug, Default)]
pub struct BufferedChannel {
    state: Mutex<State>,
    notify: Notify,
}

impl BufferedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add lines and wake the waiting consumer
    pub fn append<I>(&self, lines: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.state().lines.extend(lines);
        self.notify.notify_one();
    }

    /// Wait for buffered lines and take all of them.
    /// Returns `None` once the channel is closed and empty.
    pub async fn drain(&self) -> Option<Vec<String>> {
        loop {
            {
                let mut state = self.state();
                if !state.lines.is_empty() {
                    return Some(std::mem::take(&mut state.lines));
                }
                if state.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Discard buffered lines without waiting
    pub fn reset(&self) {
        self.state().lines.clear();
    }

    /// Mark the producer as gone and wake every waiter
    pub fn close(&self) {
        self.state().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Number of buffered lines
    pub fn len(&self) -> usize {
        self.state().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
