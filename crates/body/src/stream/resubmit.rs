use tracing::{debug, info};

use crate::buffer::{SPLIT_WRITE_SIZE, SplitWrites, WriteBuffer};
use crate::codec::{CHUNK_TERMINATOR, CRLF, chunk_header};
use crate::connection::PooledConnection;
use crate::protocol::{BodyError, Direction, WriteMode};
use crate::stream::entity_body_stream::EntityBodyStream;
use crate::stream::nesting::Nesting;
use crate::stream::owner::Disposition;

impl<C: PooledConnection + ?Sized> EntityBodyStream<C> {
    /// Sends a request body buffered by an earlier attempt, e.g. after a redirect or an
    /// authentication challenge.
    ///
    /// A chunked stream sends the whole buffer as one chunk followed by the terminator,
    /// and switches to content-length mode so closing it sends nothing more. With
    /// `suppress_write` a non-chunked body is not sent at all.
    ///
    /// Afterwards the body counts as complete and the owner is notified. A failed send
    /// latches [`BodyError::ConnectionClosed`] and discards the connection.
    pub async fn resubmit(&self, old: &WriteBuffer, suppress_write: bool) -> Result<(), BodyError> {
        if !self.direction.is_write() {
            return Err(BodyError::fatal("resubmit called on a read stream"));
        }
        if let Some(e) = self.error.get() {
            return Err(e.clone());
        }
        if let Err(found) = self.nesting.transition(Nesting::Idle, Nesting::InternalIo) {
            return Err(if found.is_busy() {
                BodyError::ConcurrentIo { direction: Direction::Write }
            } else {
                BodyError::connection_closed("the body stream is closed")
            });
        }

        let result = self.resubmit_inner(old, suppress_write).await.map_err(|e| {
            self.io_error(BodyError::ConnectionClosed {
                reason: format!("resubmitting the request body failed: {e}"),
                source: Some(std::sync::Arc::new(e)),
            })
        });

        let next = if result.is_ok() { Nesting::Idle } else { Nesting::InError };
        let _ = self.nesting.transition(Nesting::InternalIo, next);

        self.write_state().bytes_left = Some(0);
        self.call_done(Disposition::Reuse, None);
        result
    }

    async fn resubmit_inner(&self, old: &WriteBuffer, suppress_write: bool) -> std::io::Result<()> {
        let chunked = {
            let mut state = self.write_state();
            let chunked = state.mode.is_chunked();
            if chunked {
                // close must not send a second terminator
                state.mode = WriteMode::ContentLength(old.len());
            }
            chunked
        };

        if !chunked {
            if suppress_write {
                debug!(len = old.len(), "resubmission suppressed");
                return Ok(());
            }
            let segments: Vec<&[u8]> = old.segments().collect();
            for batch in SplitWrites::new(&segments, SPLIT_WRITE_SIZE) {
                self.connection.write_vectored_all(&batch).await?;
            }
        } else if old.is_empty() {
            self.connection.write_all(CHUNK_TERMINATOR).await?;
        } else {
            let header = chunk_header(old.len());
            let mut frame: Vec<&[u8]> = Vec::with_capacity(4 + old.segments().count());
            frame.push(&header);
            frame.extend(old.segments());
            frame.push(CRLF);
            frame.push(CHUNK_TERMINATOR);

            for batch in SplitWrites::new(&frame, SPLIT_WRITE_SIZE) {
                self.connection.write_vectored_all(&batch).await?;
            }
        }

        info!(len = old.len(), chunked, "resubmitted request body");
        Ok(())
    }
}
