use std::sync::atomic::Ordering;

use tokio::time::Instant;
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

use crate::codec::CHUNK_TERMINATOR;
use crate::connection::PooledConnection;
use crate::protocol::{BodyError, PayloadItem, WriteMode};
use crate::stream::entity_body_stream::EntityBodyStream;
use crate::stream::nesting::Nesting;
use crate::stream::owner::Disposition;

impl<C: PooledConnection + ?Sized> EntityBodyStream<C> {
    /// Closes the stream. Only the first call does anything.
    ///
    /// A chunked request body is terminated, a response body is drained so the connection
    /// can be reused. Closing a content-length request body before all declared bytes were
    /// written fails with [`BodyError::ProtocolViolation`] and discards the connection.
    ///
    /// If a read or write is still in flight, the close is handed over to it and this
    /// call returns right away.
    pub async fn close(&self) -> Result<(), BodyError> {
        self.close_with(false).await
    }

    /// Closes the stream on behalf of its owner, e.g. when a request is about to be
    /// resubmitted. Unlike [`close`](Self::close), a short content-length body just
    /// discards the connection without an error.
    pub async fn release(&self) -> Result<(), BodyError> {
        self.close_with(true).await
    }

    /// Aborts the stream and its connection. Safe to call from any thread at any time,
    /// every call after the first one is a no-op.
    pub fn abort(&self) {
        if !self.shutdown.begin_abort() {
            debug!(direction = ?self.direction, "already aborted");
            return;
        }

        debug!(direction = ?self.direction, "aborting body stream");
        self.nesting.swap(Nesting::InError);
        let _ = self.latch(BodyError::Canceled);
        let _ = self.complete_close(false, true, Disposition::Discard, None);
    }

    async fn close_with(&self, internal: bool) -> Result<(), BodyError> {
        if !self.shutdown.begin_close() {
            return self.latched();
        }

        let clean = !self.ignores_socket_errors() && self.error.get().is_none() && !self.write_mode().is_buffer_only();
        let target = if clean { Nesting::Closed } else { Nesting::InError };

        if self.nesting.swap(target) == Nesting::IoInProgress && target == Nesting::Closed {
            self.deferred_internal.store(internal, Ordering::Release);
            debug!(direction = ?self.direction, internal, "close deferred until the in-flight operation completes");
            return Ok(());
        }

        self.finish_close(internal).await
    }

    /// Runs the teardown of a close, either right away or from the operation it was deferred to.
    pub(super) async fn finish_close(&self, internal: bool) -> Result<(), BodyError> {
        let mut normal = self.error.get().is_none();
        let mut disposition = Disposition::Reuse;
        let mut buffered = None;

        if self.ignores_socket_errors() || !normal {
            debug!(direction = ?self.direction, normal, "dead stream, nothing left to send or drain");
            if !self.wire_complete() {
                disposition = Disposition::Discard;
            }
        } else if self.direction.is_read() {
            disposition = if self.connection.is_connected() { self.drain().await } else { Disposition::Discard };
        } else {
            let (mode, bytes_left) = {
                let state = self.write_state();
                (state.mode, state.bytes_left)
            };

            match mode {
                WriteMode::Chunked => {
                    if self.ignore_socket_errors.swap(true, Ordering::AcqRel) {
                        // switched to ignore-errors mode concurrently
                        if !self.wire_complete() {
                            disposition = Disposition::Discard;
                        }
                    } else {
                        match self.connection.write_all(CHUNK_TERMINATOR).await {
                            Ok(()) => self.terminator_sent.store(true, Ordering::Release),
                            Err(e) => {
                                debug!(cause = %e, "ignoring chunk terminator write failure");
                                disposition = Disposition::Discard;
                            }
                        }
                    }
                    self.write_state().bytes_left = Some(0);
                }
                WriteMode::ContentLength(_) | WriteMode::None if bytes_left.is_some_and(|left| left > 0) => {
                    if internal {
                        // no error to report, but the request on the wire is incomplete
                        self.connection.abort(true);
                        disposition = Disposition::Discard;
                    } else {
                        let _ = self.latch(BodyError::protocol(format!(
                            "body closed with {} of the declared bytes not written",
                            bytes_left.unwrap_or_default()
                        )));
                        normal = false;
                    }
                }
                WriteMode::Buffer => {
                    let len = self.write_state().buffer.as_ref().map_or(0, |buffer| buffer.len());
                    debug!(len, "buffer-only body closed, handing the length to the owner");
                    buffered = Some(len);
                }
                _ => {}
            }
        }

        self.complete_close(normal, false, disposition, buffered)
    }

    /// The last step of every close and abort: tear the connection down if the stream
    /// ended abnormally, then report to the owner.
    pub(super) fn complete_close(
        &self,
        normal: bool,
        aborting: bool,
        disposition: Disposition,
        buffered: Option<u64>,
    ) -> Result<(), BodyError> {
        if !normal && !self.done_called.load(Ordering::Acquire) {
            // a close that turned into an abort competes with real aborts
            if !aborting && !self.shutdown.begin_abort() {
                debug!(direction = ?self.direction, "abort already charged by another caller");
                return self.latched();
            }

            let error = self.latch(BodyError::Canceled);
            warn!(direction = ?self.direction, cause = %error, "tearing down the connection");
            self.connection.abort(true);
            if self.direction.is_write() {
                // don't leave the response side waiting on a request that will never finish
                self.owner.abort();
            }
            self.call_done(Disposition::Discard, buffered);
            return Err(error);
        }

        self.call_done(if normal { disposition } else { Disposition::Discard }, buffered);
        self.latched()
    }

    /// Reads and discards what is left of a response body so the connection can be reused.
    ///
    /// Once the end of the body is seen the owner was told `Reuse`, so from then on the
    /// connection is never torn down here.
    async fn drain(&self) -> Disposition {
        let remaining = {
            let mut guard = self.read_state.lock().await;
            let state = &mut *guard;

            if state.decoder.is_until_close() {
                // ends with the connection, nothing to reuse
                return Disposition::Discard;
            }
            if self.is_eof() || state.eof {
                return Disposition::Reuse;
            }

            if let Some(remaining) = state.decoder.remaining() {
                let undecoded = state.read_buf.len() as u64;
                if undecoded > remaining {
                    warn!(undecoded, remaining, "response carries more bytes than its declared length");
                    self.connection.abort(false);
                    return Disposition::Discard;
                }
            }

            // skip what is already buffered
            state.pending.clear();
            while let Ok(Some(PayloadItem::Chunk(_))) = state.decoder.decode(&mut state.read_buf) {}
            if state.decoder.is_finished() {
                state.eof = true;
                self.finish_read(Disposition::Reuse, state.read_buf.split().freeze());
                return Disposition::Reuse;
            }
            state.decoder.remaining()
        };

        let drain_timeout = self.config.drain_timeout();
        let max_drain_bytes = self.config.max_drain_bytes();
        if drain_timeout.is_zero() || remaining.is_some_and(|remaining| remaining > max_drain_bytes) {
            debug!(?remaining, max_drain_bytes, "not worth draining, discarding the connection");
            self.connection.abort(false);
            return Disposition::Discard;
        }

        let previous_timeout = self.connection.read_timeout();
        self.connection.set_read_timeout(Some(drain_timeout));

        let started = Instant::now();
        let mut scratch = vec![0u8; self.config.read_buffer_size()];
        let mut drained = 0u64;
        while !self.is_eof() {
            if started.elapsed() >= drain_timeout {
                debug!(drained, "drain timed out");
                break;
            }
            match self.read_inner(&mut scratch).await {
                Ok(0) => break,
                Ok(n) => {
                    drained += n as u64;
                    if drained > max_drain_bytes && !self.is_eof() {
                        debug!(drained, max_drain_bytes, "drain exceeded its byte cap");
                        break;
                    }
                }
                Err(e) => {
                    debug!(cause = %e, "drain failed");
                    break;
                }
            }
        }

        if self.is_eof() {
            self.connection.set_read_timeout(previous_timeout);
            info!(drained, elapsed = ?started.elapsed(), "drained response body");
            Disposition::Reuse
        } else {
            debug!(drained, "giving up on draining, discarding the connection");
            self.connection.abort(false);
            Disposition::Discard
        }
    }

    /// Whether everything the framing requires already went over the wire.
    fn wire_complete(&self) -> bool {
        if self.direction.is_read() {
            return self.is_eof();
        }

        let state = self.write_state();
        match state.mode {
            WriteMode::Chunked => self.terminator_sent.load(Ordering::Acquire),
            WriteMode::ContentLength(_) | WriteMode::None => state.bytes_left == Some(0),
            WriteMode::Buffer | WriteMode::Unknown => true,
        }
    }

    fn latched(&self) -> Result<(), BodyError> {
        match self.error.get() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
