use std::io;
use std::io::ErrorKind;
use std::sync::Arc;

use thiserror::Error;

use crate::protocol::Direction;

/// Errors produced while decoding chunked framing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid chunk: {reason}")]
    InvalidChunk { reason: String },

    #[error("trailer size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeTrailer { current_size: usize, max_size: usize },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn invalid_chunk<S: ToString>(str: S) -> Self {
        Self::InvalidChunk { reason: str.to_string() }
    }

    pub fn too_large_trailer(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeTrailer { current_size, max_size }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// The error taxonomy of an entity body stream.
///
/// A stream latches the first error it observes and hands a clone of it to every
/// later caller, so I/O sources are shared behind an [`Arc`].
#[derive(Error, Debug, Clone)]
pub enum BodyError {
    /// The declared length was overflowed or the chunked framing is malformed.
    #[error("protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    /// The peer closed the connection, or the stream was already closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        reason: String,
        #[source]
        source: Option<Arc<io::Error>>,
    },

    /// A read, write or drain exceeded its time budget.
    #[error("operation timed out: {reason}")]
    Timeout { reason: String },

    /// The stream or its owning request was aborted.
    #[error("request canceled")]
    Canceled,

    /// A second read or write was started while one was still in flight.
    #[error("concurrent {direction:?} operation is not allowed on this stream")]
    ConcurrentIo { direction: Direction },

    /// An internal invariant was violated.
    #[error("fatal error: {reason}")]
    Fatal { reason: String },

    #[error("io error: {source}")]
    Io {
        #[source]
        source: Arc<io::Error>,
    },
}

impl BodyError {
    pub fn protocol<S: ToString>(str: S) -> Self {
        Self::ProtocolViolation { reason: str.to_string() }
    }

    pub fn connection_closed<S: ToString>(str: S) -> Self {
        Self::ConnectionClosed { reason: str.to_string(), source: None }
    }

    pub fn timeout<S: ToString>(str: S) -> Self {
        Self::Timeout { reason: str.to_string() }
    }

    pub fn fatal<S: ToString>(str: S) -> Self {
        Self::Fatal { reason: str.to_string() }
    }

    /// Classifies a transport error.
    ///
    /// Timeouts become [`BodyError::Timeout`], every flavour of "the other side is gone"
    /// becomes [`BodyError::ConnectionClosed`] and the rest stays a plain I/O error.
    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        let e = e.into();
        match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::Timeout { reason: e.to_string() },
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => Self::ConnectionClosed { reason: e.to_string(), source: Some(Arc::new(e)) },
            _ => Self::Io { source: Arc::new(e) },
        }
    }

    #[inline]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation { .. })
    }

    #[inline]
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed { .. })
    }

    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    #[inline]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    #[inline]
    pub fn is_concurrent_io(&self) -> bool {
        matches!(self, Self::ConcurrentIo { .. })
    }

    /// Fatal errors are never downgraded, not even by ignore-errors mode.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

impl From<ParseError> for BodyError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Io { source } => Self::io(source),
            other => Self::protocol(other),
        }
    }
}

impl From<io::Error> for BodyError {
    fn from(e: io::Error) -> Self {
        Self::io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        assert!(BodyError::io(io::Error::new(ErrorKind::TimedOut, "slow")).is_timeout());
        assert!(BodyError::io(io::Error::from(ErrorKind::BrokenPipe)).is_connection_closed());
        assert!(BodyError::io(io::Error::from(ErrorKind::UnexpectedEof)).is_connection_closed());
        assert!(matches!(BodyError::io(io::Error::from(ErrorKind::PermissionDenied)), BodyError::Io { .. }));
    }

    #[test]
    fn framing_errors_become_protocol_violations() {
        let error: BodyError = ParseError::invalid_chunk("bad size").into();
        assert!(error.is_protocol_violation());
        assert_eq!(error.to_string(), "protocol violation: invalid chunk: bad size");

        let error: BodyError = ParseError::too_large_trailer(10, 4).into();
        assert!(error.is_protocol_violation());

        let error: BodyError = ParseError::io(io::Error::from(ErrorKind::ConnectionReset)).into();
        assert!(error.is_connection_closed());
    }

    #[test]
    fn latched_errors_clone_with_their_source() {
        let error = BodyError::io(io::Error::new(ErrorKind::ConnectionReset, "reset by peer"));
        let cloned = error.clone();
        assert_eq!(error.to_string(), cloned.to_string());
        assert!(std::error::Error::source(&cloned).is_some());
    }
}
