use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Buf, Bytes, BytesMut};
use http::StatusCode;
use once_cell::sync::OnceCell;
use tokio_util::codec::Decoder;
use tracing::{debug, trace, warn};

use crate::buffer::WriteBuffer;
use crate::codec::{CHUNK_TERMINATOR, CRLF, PayloadDecoder, chunk_header};
use crate::config::BodyConfig;
use crate::connection::PooledConnection;
use crate::ensure;
use crate::protocol::{BodyError, BodyLength, Direction, PayloadItem, WriteMode};
use crate::stream::nesting::{Nesting, NestingState, ShutdownGuard};
use crate::stream::owner::{BodyOwner, Completion, Disposition};

/// The entity body of one HTTP exchange, read from or written to a pooled connection.
///
/// A stream is bound to exactly one connection and reports, exactly once, whether that
/// connection may be reused once the body is done. Every operation takes `&self`: one
/// task may read or write while another one closes or aborts the same stream. A second
/// read, or a second write, while one is still in flight fails with
/// [`BodyError::ConcurrentIo`].
///
/// The first error a stream runs into is latched. Every later operation, `close`
/// included, reports that same error.
pub struct EntityBodyStream<C: PooledConnection + ?Sized> {
    pub(super) connection: Arc<C>,
    pub(super) owner: Arc<dyn BodyOwner>,
    pub(super) direction: Direction,
    pub(super) config: BodyConfig,

    pub(super) nesting: NestingState,
    pub(super) shutdown: ShutdownGuard,
    pub(super) error: OnceCell<BodyError>,
    pub(super) done_called: AtomicBool,
    pub(super) deferred_internal: AtomicBool,

    pub(super) ignore_socket_errors: AtomicBool,
    pub(super) error_response_status: AtomicBool,
    pub(super) suppress_write: AtomicBool,
    pub(super) terminator_sent: AtomicBool,
    pub(super) eof: AtomicBool,

    // never held across an await
    pub(super) write_state: Mutex<WriteState>,
    pub(super) read_state: tokio::sync::Mutex<ReadState>,
}

#[derive(Debug)]
pub(super) struct WriteState {
    pub(super) mode: WriteMode,
    /// `None` while the body length is open ended.
    pub(super) bytes_left: Option<u64>,
    pub(super) buffer: Option<WriteBuffer>,
}

#[derive(Debug)]
pub(super) struct ReadState {
    pub(super) decoder: PayloadDecoder,
    /// Undecoded bytes, starting with whatever was prefetched along with the headers.
    pub(super) read_buf: BytesMut,
    /// Decoded body bytes not yet handed to the caller.
    pub(super) pending: Bytes,
    pub(super) eof: bool,
}

impl<C: PooledConnection + ?Sized> EntityBodyStream<C> {
    /// Creates the request body stream of an exchange.
    ///
    /// The write mode has to be decided by now, [`WriteMode::Unknown`] is rejected.
    pub fn writer(
        connection: Arc<C>,
        owner: Arc<dyn BodyOwner>,
        mode: WriteMode,
        config: BodyConfig,
    ) -> Result<Self, BodyError> {
        ensure!(!mode.is_unknown(), BodyError::fatal("a write stream needs a decided write mode"));

        let bytes_left = match mode {
            WriteMode::ContentLength(length) => Some(length),
            WriteMode::None => Some(0),
            WriteMode::Chunked | WriteMode::Buffer | WriteMode::Unknown => None,
        };
        if let Some(timeout) = config.write_timeout() {
            connection.set_write_timeout(Some(timeout));
        }

        let write_state = WriteState { mode, bytes_left, buffer: mode.is_buffer_only().then(WriteBuffer::new) };
        let read_state = ReadState {
            decoder: PayloadDecoder::fix_length(0),
            read_buf: BytesMut::new(),
            pending: Bytes::new(),
            eof: true,
        };
        Ok(Self::new(connection, owner, Direction::Write, config, write_state, read_state))
    }

    /// Creates the response body stream of an exchange.
    ///
    /// `prefetched` holds the body bytes that were read from the connection together with
    /// the response headers.
    pub fn reader(
        connection: Arc<C>,
        owner: Arc<dyn BodyOwner>,
        prefetched: Bytes,
        length: BodyLength,
        config: BodyConfig,
    ) -> Self {
        if let Some(timeout) = config.read_timeout() {
            connection.set_read_timeout(Some(timeout));
        }

        let write_state = WriteState { mode: WriteMode::None, bytes_left: Some(0), buffer: None };
        let read_state = ReadState {
            decoder: PayloadDecoder::from_length(length, config.max_trailer_bytes()),
            read_buf: BytesMut::from(&prefetched[..]),
            pending: Bytes::new(),
            eof: false,
        };
        Self::new(connection, owner, Direction::Read, config, write_state, read_state)
    }

    fn new(
        connection: Arc<C>,
        owner: Arc<dyn BodyOwner>,
        direction: Direction,
        config: BodyConfig,
        write_state: WriteState,
        read_state: ReadState,
    ) -> Self {
        Self {
            connection,
            owner,
            direction,
            config,
            nesting: NestingState::new(),
            shutdown: ShutdownGuard::new(),
            error: OnceCell::new(),
            done_called: AtomicBool::new(false),
            deferred_internal: AtomicBool::new(false),
            ignore_socket_errors: AtomicBool::new(false),
            error_response_status: AtomicBool::new(false),
            suppress_write: AtomicBool::new(false),
            terminator_sent: AtomicBool::new(false),
            eof: AtomicBool::new(false),
            write_state: Mutex::new(write_state),
            read_state: tokio::sync::Mutex::new(read_state),
        }
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_state().mode
    }

    /// Bytes a content-length body still expects, `None` for open ended bodies.
    pub fn bytes_left_to_write(&self) -> Option<u64> {
        self.write_state().bytes_left
    }

    /// Undecoded bytes of a read stream, when the framing makes that number knowable.
    pub async fn remaining(&self) -> Option<u64> {
        self.read_state.lock().await.decoder.remaining()
    }

    /// Whether a read stream has seen the end of its body.
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.eof.load(Ordering::Acquire)
    }

    /// Whether the stream accepts no more I/O.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_shut_down() || self.nesting.load().is_terminal()
    }

    /// The latched error, if any.
    pub fn error(&self) -> Option<BodyError> {
        self.error.get().cloned()
    }

    #[inline]
    pub fn ignores_socket_errors(&self) -> bool {
        self.ignore_socket_errors.load(Ordering::Acquire)
    }

    /// Starts mirroring every written byte into a [`WriteBuffer`] for a later resubmission.
    pub fn enable_write_buffering(&self) {
        let mut state = self.write_state();
        if state.buffer.is_none() {
            state.buffer = Some(WriteBuffer::new());
        }
    }

    /// Hands out the buffered request body, leaving the stream without one.
    pub fn take_write_buffer(&self) -> Option<WriteBuffer> {
        self.write_state().buffer.take()
    }

    /// When set, writes are still buffered and counted but no longer sent.
    pub fn set_suppress_write(&self, suppress: bool) {
        self.suppress_write.store(suppress, Ordering::Release);
    }

    /// Tells the stream a non-success response arrived while the body was still being sent.
    ///
    /// A chunked body is cut short with its terminator on the next write. Without
    /// keep-alive, all further socket errors are ignored.
    pub fn error_response_notify(&self, keep_alive: bool) {
        self.error_response_status.store(true, Ordering::Release);
        if !keep_alive {
            self.ignore_socket_errors.store(true, Ordering::Release);
        }
        debug!(direction = ?self.direction, keep_alive, ignore = self.ignores_socket_errors(), "error response notified");
    }

    /// Forwards a response status, only non-success statuses change the stream.
    pub fn notify_response_status(&self, status: StatusCode, keep_alive: bool) {
        if !status.is_success() && !status.is_informational() {
            self.error_response_notify(keep_alive);
        }
    }

    /// The response made the connection unusable: every later operation fails with
    /// [`BodyError::ConnectionClosed`], even in ignore-errors mode.
    pub fn fatal_response_notify(&self) {
        let _ = self.latch(BodyError::connection_closed("fatal response received, connection closed"));
        self.error_response_status.store(false, Ordering::Release);
    }

    /// Writes one piece of the request body.
    ///
    /// In chunked mode the piece goes out as a single chunk. In content-length mode a
    /// piece that would overflow the declared length fails with
    /// [`BodyError::ProtocolViolation`] and leaves the stream usable.
    pub async fn write(&self, buf: &[u8]) -> Result<(), BodyError> {
        self.check_direction(Direction::Write)?;
        if !self.check_io_allowed()? {
            return Ok(());
        }

        {
            let state = self.write_state();
            if let Some(left) = state.bytes_left {
                ensure!(
                    buf.len() as u64 <= left,
                    BodyError::protocol(format!(
                        "write of {} bytes exceeds the declared content length, {left} bytes left",
                        buf.len()
                    ))
                );
            }
        }

        if !self.enter_io(Direction::Write)? {
            return Ok(());
        }
        let result = self.write_inner(buf).await;
        self.exit_io(Nesting::IoInProgress, result).await
    }

    async fn write_inner(&self, buf: &[u8]) -> Result<(), BodyError> {
        let len = buf.len() as u64;
        let suppress = self.suppress_write.load(Ordering::Acquire);
        let mode = {
            let mut state = self.write_state();
            if !buf.is_empty() {
                if let Some(buffer) = state.buffer.as_mut() {
                    buffer.write(buf);
                }
            }

            if buf.is_empty() || state.mode.is_buffer_only() || suppress || self.ignores_socket_errors() {
                if suppress {
                    if let Some(left) = state.bytes_left.as_mut() {
                        *left = left.saturating_sub(len);
                    }
                }
                trace!(len, mode = ?state.mode, suppress, "write not put on the wire");
                return Ok(());
            }

            if let Some(left) = state.bytes_left.as_mut() {
                *left = left.saturating_sub(len);
            }
            state.mode
        };

        let sent = if mode.is_chunked() {
            if self.error_response_status.load(Ordering::Acquire) {
                self.ignore_socket_errors.store(true, Ordering::Release);
                debug!("error response received, terminating the chunked body instead of sending data");
                let sent = self.connection.write_all(CHUNK_TERMINATOR).await;
                if sent.is_ok() {
                    self.terminator_sent.store(true, Ordering::Release);
                }
                sent
            } else {
                let header = chunk_header(len);
                let frame: [&[u8]; 3] = [&header, buf, CRLF];
                self.connection.write_vectored_all(&frame).await
            }
        } else {
            self.connection.write_all(buf).await
        };

        match sent {
            Ok(()) => {
                trace!(len, "wrote body bytes");
                Ok(())
            }
            Err(e) => self.handle_write_error(e),
        }
    }

    fn handle_write_error(&self, e: std::io::Error) -> Result<(), BodyError> {
        // ignore-errors mode may have been switched on while the write was in flight
        if self.ignores_socket_errors() {
            debug!(cause = %e, "ignoring write failure");
            return Ok(());
        }

        if self.owner.is_aborted() {
            return Err(self.io_error(BodyError::Canceled));
        }

        if self.error_response_status.load(Ordering::Acquire) {
            // the server answered already and may have dropped the connection
            self.ignore_socket_errors.store(true, Ordering::Release);
            debug!(cause = %e, "ignoring write failure after an error response");
            return Ok(());
        }

        Err(self.io_error(BodyError::io(e)))
    }

    /// Reads body bytes into `buf`, `Ok(0)` marks the end of the body.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, BodyError> {
        self.check_direction(Direction::Read)?;
        if !self.check_io_allowed()? || buf.is_empty() {
            return Ok(0);
        }
        if !self.enter_io(Direction::Read)? {
            return Ok(0);
        }

        let result = self.read_inner(buf).await.map_err(|e| self.io_error(e));
        self.exit_io(Nesting::IoInProgress, result).await
    }

    /// Decodes into `buf`, pulling from the connection when nothing is buffered.
    ///
    /// Failures are returned untouched, the caller decides whether they are fatal.
    pub(super) async fn read_inner(&self, buf: &mut [u8]) -> Result<usize, BodyError> {
        let mut state = self.read_state.lock().await;
        let ReadState { decoder, read_buf, pending, eof } = &mut *state;

        loop {
            if !pending.is_empty() {
                let n = pending.len().min(buf.len());
                buf[..n].copy_from_slice(&pending[..n]);
                pending.advance(n);

                if pending.is_empty() && decoder.is_finished() && !*eof {
                    *eof = true;
                    self.finish_read(Disposition::Reuse, read_buf.split().freeze());
                }
                return Ok(n);
            }

            if *eof {
                return Ok(0);
            }

            match decoder.decode(read_buf)? {
                Some(PayloadItem::Chunk(bytes)) => *pending = bytes,
                Some(PayloadItem::Eof) => {
                    *eof = true;
                    self.finish_read(Disposition::Reuse, read_buf.split().freeze());
                    return Ok(0);
                }
                None => {
                    let limit = decoder.read_limit(buf.len(), self.config.read_buffer_size());
                    let start = read_buf.len();
                    read_buf.resize(start + limit, 0);

                    let n = match self.connection.read(&mut read_buf[start..]).await {
                        Ok(n) => n,
                        Err(e) => {
                            read_buf.truncate(start);
                            return Err(BodyError::io(e));
                        }
                    };
                    read_buf.truncate(start + n);
                    trace!(len = n, "read from connection");

                    if n == 0 {
                        if decoder.is_until_close() {
                            *eof = true;
                            // the peer closed, nothing left to reuse
                            self.finish_read(Disposition::Discard, Bytes::new());
                            return Ok(0);
                        }
                        return Err(BodyError::connection_closed(format!(
                            "connection closed before the end of the body, {:?} bytes missing",
                            decoder.remaining()
                        )));
                    }
                }
            }
        }
    }

    pub(super) fn finish_read(&self, disposition: Disposition, leftover: Bytes) {
        self.eof.store(true, Ordering::Release);
        if !leftover.is_empty() {
            trace!(len = leftover.len(), "handing bytes past the body back to the connection");
            self.connection.set_leftover(leftover);
        }
        self.call_done(disposition, None);
    }

    fn check_direction(&self, direction: Direction) -> Result<(), BodyError> {
        ensure!(
            self.direction == direction,
            BodyError::fatal(format!("{direction:?} called on a {:?} stream", self.direction))
        );
        Ok(())
    }

    /// `Ok(false)` means the operation is silently swallowed.
    fn check_io_allowed(&self) -> Result<bool, BodyError> {
        if let Some(e) = self.error.get() {
            return Err(e.clone());
        }

        let ignore = self.ignores_socket_errors();
        if self.is_closed() {
            if ignore {
                return Ok(false);
            }
            return Err(BodyError::connection_closed("the body stream is closed"));
        }

        if self.owner.is_aborted() && !ignore {
            return Err(BodyError::Canceled);
        }
        Ok(true)
    }

    /// Claims the stream for one read or write. `Ok(false)` means the operation is swallowed.
    fn enter_io(&self, direction: Direction) -> Result<bool, BodyError> {
        match self.nesting.transition(Nesting::Idle, Nesting::IoInProgress) {
            Ok(()) => Ok(true),
            Err(found) if found.is_busy() => Err(BodyError::ConcurrentIo { direction }),
            Err(_) => self.check_io_allowed().map(|_| false),
        }
    }

    /// Releases the stream after an operation started from `from`.
    ///
    /// If a close arrived in the meantime, this is where it runs.
    pub(super) async fn exit_io<T>(&self, from: Nesting, result: Result<T, BodyError>) -> Result<T, BodyError> {
        let next = if result.is_ok() { Nesting::Idle } else { Nesting::InError };
        if let Err(found) = self.nesting.transition(from, next) {
            if found == Nesting::Closed {
                let internal = self.deferred_internal.load(Ordering::Acquire);
                debug!(direction = ?self.direction, internal, "running deferred close");
                if let Err(e) = self.finish_close(internal).await {
                    debug!(cause = %e, "deferred close failed");
                }
            }
        }
        result
    }

    /// Latches `error` unless another one got there first, and returns the winner.
    pub(super) fn latch(&self, error: BodyError) -> BodyError {
        match self.error.try_insert(error) {
            Ok(latched) => {
                warn!(direction = ?self.direction, cause = %latched, "body stream failed");
                latched.clone()
            }
            Err((first, _)) => first.clone(),
        }
    }

    /// Handles a failed transfer: latches the error and gives up on the connection.
    pub(super) fn io_error(&self, error: BodyError) -> BodyError {
        let latched = self.latch(error);
        if !self.done_called.load(Ordering::Acquire) {
            self.connection.abort(true);
        }
        self.call_done(Disposition::Discard, None);
        latched
    }

    /// Reports the outcome to the owner, only the first call gets through.
    pub(super) fn call_done(&self, disposition: Disposition, buffered: Option<u64>) {
        if self.done_called.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(direction = ?self.direction, ?disposition, ?buffered, "body done");
        self.owner.body_done(Completion { direction: self.direction, disposition, buffered });
    }

    pub(super) fn write_state(&self) -> MutexGuard<'_, WriteState> {
        self.write_state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: PooledConnection + ?Sized> fmt::Debug for EntityBodyStream<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityBodyStream")
            .field("direction", &self.direction)
            .field("nesting", &self.nesting.load())
            .field("error", &self.error.get())
            .field("done_called", &self.done_called.load(Ordering::Acquire))
            .field("ignore_socket_errors", &self.ignores_socket_errors())
            .field("eof", &self.is_eof())
            .finish_non_exhaustive()
    }
}
