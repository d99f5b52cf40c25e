use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::protocol::Direction;

/// What the owner should do with the connection once a body is done.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The body ended cleanly on a message boundary, the connection may go back to the pool.
    Reuse,
    /// The connection must be closed.
    Discard,
}

impl Disposition {
    #[inline]
    pub fn is_reuse(&self) -> bool {
        matches!(self, Disposition::Reuse)
    }
}

/// The single completion record a body stream hands to its owner.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Completion {
    pub direction: Direction,
    pub disposition: Disposition,
    /// Length of the buffered body of a buffer-only write stream.
    pub buffered: Option<u64>,
}

/// The request or exchange a body stream belongs to.
pub trait BodyOwner: Send + Sync {
    /// Called exactly once per stream, when the body is finished one way or another.
    fn body_done(&self, completion: Completion);

    /// Aborts the whole exchange. A failing write stream calls this so the paired
    /// read side is not left waiting.
    fn abort(&self);

    fn is_aborted(&self) -> bool;
}

/// A [`BodyOwner`] that records completions and lets callers wait for them.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    aborted: AtomicBool,
    completions: Mutex<Vec<Completion>>,
    notify: Notify,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first completion reported, if any.
    pub fn completion(&self) -> Option<Completion> {
        self.lock().first().copied()
    }

    /// How often `body_done` was called. Anything but 0 or 1 is a bug in the stream.
    pub fn completion_count(&self) -> usize {
        self.lock().len()
    }

    /// Waits for the first completion.
    pub async fn wait(&self) -> Completion {
        loop {
            let notified = self.notify.notified();
            if let Some(completion) = self.completion() {
                return completion;
            }
            notified.await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Completion>> {
        self.completions.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl BodyOwner for CompletionSignal {
    fn body_done(&self, completion: Completion) {
        self.lock().push(completion);
        self.notify.notify_waiters();
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_for_completion() {
        let signal = Arc::new(CompletionSignal::new());
        let waiter = Arc::clone(&signal);
        let handle = tokio::spawn(async move { waiter.wait().await });

        tokio::task::yield_now().await;
        let completion = Completion { direction: Direction::Read, disposition: Disposition::Reuse, buffered: None };
        signal.body_done(completion);

        assert_eq!(handle.await.unwrap(), completion);
        assert_eq!(signal.completion_count(), 1);
    }

    #[test]
    fn test_abort_flag() {
        let signal = CompletionSignal::new();
        assert!(!signal.is_aborted());
        signal.abort();
        assert!(signal.is_aborted());
    }
}
