//! The atomic bookkeeping that lets close and abort race an in-flight operation.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

/// Where a stream is in its I/O lifecycle.
///
/// ```text
///  Idle ──► IoInProgress ──► Idle | InError
///  Idle ──► InternalIo   ──► Idle | InError
///  IoInProgress ──► Closed   (close arrived mid operation, the operation finishes the close)
///  any ──► InError
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Nesting {
    Idle = 0,
    IoInProgress = 1,
    Closed = 2,
    InError = 3,
    InternalIo = 4,
}

impl Nesting {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Nesting::Idle,
            1 => Nesting::IoInProgress,
            2 => Nesting::Closed,
            3 => Nesting::InError,
            _ => Nesting::InternalIo,
        }
    }

    /// Closed and errored streams accept no new I/O.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Nesting::Closed | Nesting::InError)
    }

    #[inline]
    pub fn is_busy(self) -> bool {
        matches!(self, Nesting::IoInProgress | Nesting::InternalIo)
    }
}

#[derive(Debug, Default)]
pub struct NestingState(AtomicU8);

impl NestingState {
    pub fn new() -> Self {
        Self(AtomicU8::new(Nesting::Idle as u8))
    }

    #[inline]
    pub fn load(&self) -> Nesting {
        Nesting::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves from `current` to `new`, or reports the state that was found instead.
    #[inline]
    pub fn transition(&self, current: Nesting, new: Nesting) -> Result<(), Nesting> {
        self.0
            .compare_exchange(current as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(Nesting::from_u8)
    }

    #[inline]
    pub fn swap(&self, new: Nesting) -> Nesting {
        Nesting::from_u8(self.0.swap(new as u8, Ordering::AcqRel))
    }
}

/// Counts close and abort requests.
///
/// The first close bumps the counter from zero and owns the teardown. An abort swaps in a
/// sentinel; whoever sees a value below the sentinel owns the abort, every later abort is a
/// no-op.
#[derive(Debug, Default)]
pub struct ShutdownGuard(AtomicU32);

impl ShutdownGuard {
    pub const ALREADY_ABORTED: u32 = 777_777;

    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// True for the first close request only.
    #[inline]
    pub fn begin_close(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < Self::ALREADY_ABORTED).then_some(count + 1)
            })
            .is_ok_and(|count| count == 0)
    }

    /// True for the first abort request only.
    #[inline]
    pub fn begin_abort(&self) -> bool {
        self.0.swap(Self::ALREADY_ABORTED, Ordering::AcqRel) < Self::ALREADY_ABORTED
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire) >= Self::ALREADY_ABORTED
    }

    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.0.load(Ordering::Acquire) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition() {
        let state = NestingState::new();
        assert_eq!(state.load(), Nesting::Idle);

        state.transition(Nesting::Idle, Nesting::IoInProgress).unwrap();
        assert_eq!(state.transition(Nesting::Idle, Nesting::IoInProgress), Err(Nesting::IoInProgress));
        assert!(state.load().is_busy());

        assert_eq!(state.swap(Nesting::Closed), Nesting::IoInProgress);
        assert_eq!(state.transition(Nesting::IoInProgress, Nesting::Idle), Err(Nesting::Closed));
        assert!(state.load().is_terminal());
    }

    #[test]
    fn test_close_then_abort() {
        let guard = ShutdownGuard::new();
        assert!(guard.begin_close());
        assert!(!guard.begin_close());
        assert!(guard.is_shut_down());
        assert!(!guard.is_aborted());

        assert!(guard.begin_abort());
        assert!(!guard.begin_abort());
        assert!(!guard.begin_close());
        assert!(guard.is_aborted());
    }

    #[test]
    fn test_abort_first() {
        let guard = ShutdownGuard::new();
        assert!(guard.begin_abort());
        assert!(!guard.begin_close());
        assert!(!guard.begin_abort());
    }
}
