//! Numeric tunables of a body stream.
//!
//! None of these values change correctness, only when a stream gives up: how long it
//! waits on the connection, and how much of an unread response it is willing to drain
//! before it would rather throw the connection away.

use std::time::Duration;

/// How long a closing read stream may spend draining an unread response.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Responses with more unread bytes than this are discarded instead of drained.
pub const DEFAULT_MAX_DRAIN_BYTES: u64 = 64 * 1024;

/// Upper bound on the trailer section of a chunked body.
pub const DEFAULT_MAX_TRAILER_BYTES: usize = 64 * 1024;

/// Size of a single read from the connection while decoding a chunked body.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyConfig {
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    drain_timeout: Duration,
    max_drain_bytes: u64,
    max_trailer_bytes: usize,
    read_buffer_size: usize,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            read_timeout: None,
            write_timeout: None,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            max_drain_bytes: DEFAULT_MAX_DRAIN_BYTES,
            max_trailer_bytes: DEFAULT_MAX_TRAILER_BYTES,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl BodyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` waits forever.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// `None` waits forever.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// A zero timeout disables draining: unread responses always discard the connection.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_drain_bytes(mut self, max_drain_bytes: u64) -> Self {
        self.max_drain_bytes = max_drain_bytes;
        self
    }

    #[must_use]
    pub fn with_max_trailer_bytes(mut self, max_trailer_bytes: usize) -> Self {
        self.max_trailer_bytes = max_trailer_bytes;
        self
    }

    #[must_use]
    pub fn with_read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size.max(1);
        self
    }

    #[inline]
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    #[inline]
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }

    #[inline]
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    #[inline]
    pub fn max_drain_bytes(&self) -> u64 {
        self.max_drain_bytes
    }

    #[inline]
    pub fn max_trailer_bytes(&self) -> usize {
        self.max_trailer_bytes
    }

    #[inline]
    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BodyConfig::default();
        assert_eq!(config.read_timeout(), None);
        assert_eq!(config.write_timeout(), None);
        assert_eq!(config.drain_timeout(), Duration::from_millis(500));
        assert_eq!(config.max_drain_bytes(), 64 * 1024);
        assert_eq!(config.max_trailer_bytes(), 64 * 1024);
        assert_eq!(config.read_buffer_size(), 8 * 1024);
    }

    #[test]
    fn builder_overrides() {
        let config = BodyConfig::new()
            .with_read_timeout(Some(Duration::from_secs(3)))
            .with_drain_timeout(Duration::ZERO)
            .with_max_drain_bytes(10)
            .with_read_buffer_size(0);

        assert_eq!(config.read_timeout(), Some(Duration::from_secs(3)));
        assert!(config.drain_timeout().is_zero());
        assert_eq!(config.max_drain_bytes(), 10);
        assert_eq!(config.read_buffer_size(), 1);
    }
}
