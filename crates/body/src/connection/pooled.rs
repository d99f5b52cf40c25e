use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// The byte transport a body stream runs on.
///
/// A pooled connection is owned by exactly one active body stream at a time. The stream
/// may call [`abort`](PooledConnection::abort) from any thread while a read or a write is
/// in flight on another one, so every method takes `&self`.
#[async_trait]
pub trait PooledConnection: Send + Sync {
    /// Reads into `buf`, `Ok(0)` means the peer closed the connection.
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes the whole buffer.
    async fn write_all(&self, buf: &[u8]) -> io::Result<()>;

    /// Writes every slice, in order, as if they were one buffer.
    async fn write_vectored_all(&self, bufs: &[&[u8]]) -> io::Result<()> {
        for buf in bufs {
            self.write_all(buf).await?;
        }
        Ok(())
    }

    fn read_timeout(&self) -> Option<Duration>;

    fn set_read_timeout(&self, timeout: Option<Duration>);

    fn write_timeout(&self) -> Option<Duration>;

    fn set_write_timeout(&self, timeout: Option<Duration>);

    /// Tears the connection down. In-flight and later operations fail.
    ///
    /// `hard` is false when the connection is merely not worth reusing, e.g. after an
    /// unfinished drain, and true when the exchange itself failed.
    fn abort(&self, hard: bool);

    fn is_connected(&self) -> bool;

    /// Hands back bytes that were read past the end of a body, so the next response on
    /// this connection starts with them. Bytes still unread from an earlier hand back
    /// come after the new ones.
    fn set_leftover(&self, leftover: Bytes);
}
