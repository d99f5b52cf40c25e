use std::sync::Arc;

use tokio::runtime::Handle;

use crate::buffer::WriteBuffer;
use crate::connection::PooledConnection;
use crate::protocol::BodyError;
use crate::stream::EntityBodyStream;

/// Blocking access to an [`EntityBodyStream`].
///
/// Every call drives the same future the async API returns to completion on the given
/// runtime, so both styles share one state machine and may be mixed on one stream.
/// Must not be used from within an async context, [`Handle::block_on`] panics there.
#[derive(Debug)]
pub struct BlockingBodyStream<C: PooledConnection + ?Sized> {
    inner: Arc<EntityBodyStream<C>>,
    handle: Handle,
}

impl<C: PooledConnection + ?Sized> BlockingBodyStream<C> {
    pub fn new(inner: Arc<EntityBodyStream<C>>, handle: Handle) -> Self {
        Self { inner, handle }
    }

    /// The async stream behind this one.
    pub fn get_ref(&self) -> &Arc<EntityBodyStream<C>> {
        &self.inner
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize, BodyError> {
        self.handle.block_on(self.inner.read(buf))
    }

    /// Reads until the end of the body.
    pub fn read_to_end(&self, out: &mut Vec<u8>) -> Result<usize, BodyError> {
        let mut buf = [0u8; 4096];
        let mut total = 0;
        loop {
            match self.read(&mut buf)? {
                0 => return Ok(total),
                n => {
                    out.extend_from_slice(&buf[..n]);
                    total += n;
                }
            }
        }
    }

    pub fn write(&self, buf: &[u8]) -> Result<(), BodyError> {
        self.handle.block_on(self.inner.write(buf))
    }

    pub fn resubmit(&self, old: &WriteBuffer, suppress_write: bool) -> Result<(), BodyError> {
        self.handle.block_on(self.inner.resubmit(old, suppress_write))
    }

    pub fn close(&self) -> Result<(), BodyError> {
        self.handle.block_on(self.inner.close())
    }

    pub fn abort(&self) {
        self.inner.abort();
    }
}
