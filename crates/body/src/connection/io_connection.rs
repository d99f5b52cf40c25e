use std::fmt;
use std::io;
use std::io::{ErrorKind, IoSlice};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::PooledConnection;

/// A [`PooledConnection`] over a tokio reader and writer pair.
///
/// Reads and writes each run behind their own async lock, so one read and one write may
/// be in flight together. Timeouts are applied per operation with [`tokio::time::timeout`].
/// [`abort`](PooledConnection::abort) cancels whatever is in flight and fails everything
/// after it with [`ErrorKind::ConnectionAborted`].
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
pub struct IoConnection<R, W> {
    reader: tokio::sync::Mutex<R>,
    writer: tokio::sync::Mutex<W>,
    leftover: Mutex<Bytes>,
    read_timeout: Mutex<Option<Duration>>,
    write_timeout: Mutex<Option<Duration>>,
    peer_closed: AtomicBool,
    hard_aborted: AtomicBool,
    cancel: CancellationToken,
}

impl<R, W> IoConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: tokio::sync::Mutex::new(reader),
            writer: tokio::sync::Mutex::new(writer),
            leftover: Mutex::new(Bytes::new()),
            read_timeout: Mutex::new(None),
            write_timeout: Mutex::new(None),
            peer_closed: AtomicBool::new(false),
            hard_aborted: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }
}

impl<T> IoConnection<ReadHalf<T>, WriteHalf<T>>
where
    T: AsyncRead + AsyncWrite + Send,
{
    /// Splits a bidirectional stream, e.g. a `TcpStream` or a `tokio::io::duplex` end.
    pub fn from_stream(io: T) -> Self {
        let (reader, writer) = tokio::io::split(io);
        IoConnection::new(reader, writer)
    }
}

impl<R, W> IoConnection<R, W> {
    /// Bytes handed back through [`set_leftover`](PooledConnection::set_leftover) that no
    /// read consumed yet.
    pub fn leftover(&self) -> Bytes {
        lock(&self.leftover).clone()
    }

    /// Whether the connection was torn down because an exchange failed.
    pub fn is_hard_aborted(&self) -> bool {
        self.hard_aborted.load(Ordering::Acquire)
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn take_leftover(&self, buf: &mut [u8]) -> Option<usize> {
        let mut leftover = lock(&self.leftover);
        if leftover.is_empty() || buf.is_empty() {
            return None;
        }
        let n = leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&leftover[..n]);
        leftover.advance(n);
        Some(n)
    }

    fn check_open(&self) -> io::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::new(ErrorKind::ConnectionAborted, "connection was aborted"));
        }
        Ok(())
    }

    /// Runs one transport operation under the given timeout, racing the abort signal.
    async fn guarded<T, F>(&self, op: &'static str, timeout: Option<Duration>, fut: F) -> io::Result<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        let timed = async {
            match timeout {
                Some(timeout) => tokio::time::timeout(timeout, fut).await.unwrap_or_else(|_| {
                    Err(io::Error::new(ErrorKind::TimedOut, format!("{op} timed out after {timeout:?}")))
                }),
                None => fut.await,
            }
        };

        select! {
            biased;
            () = self.cancel.cancelled() => {
                Err(io::Error::new(ErrorKind::ConnectionAborted, format!("{op} interrupted by abort")))
            }
            result = timed => result,
        }
    }
}

#[async_trait]
impl<R, W> PooledConnection for IoConnection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(n) = self.take_leftover(buf) {
            return Ok(n);
        }
        self.check_open()?;

        let timeout = self.read_timeout();
        let mut reader = self.reader.lock().await;
        let n = self.guarded("read", timeout, reader.read(buf)).await?;
        if n == 0 && !buf.is_empty() {
            self.peer_closed.store(true, Ordering::Release);
        }
        Ok(n)
    }

    async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        self.check_open()?;

        let timeout = self.write_timeout();
        let mut writer = self.writer.lock().await;
        self.guarded("write", timeout, async {
            writer.write_all(buf).await?;
            writer.flush().await
        })
        .await
    }

    async fn write_vectored_all(&self, bufs: &[&[u8]]) -> io::Result<()> {
        self.check_open()?;

        let timeout = self.write_timeout();
        let mut writer = self.writer.lock().await;
        self.guarded("write", timeout, async {
            let mut slices: Vec<IoSlice<'_>> = bufs.iter().map(|buf| IoSlice::new(buf)).collect();
            let mut slices = &mut slices[..];
            IoSlice::advance_slices(&mut slices, 0);
            while !slices.is_empty() {
                let n = writer.write_vectored(slices).await?;
                if n == 0 {
                    return Err(io::Error::from(ErrorKind::WriteZero));
                }
                IoSlice::advance_slices(&mut slices, n);
            }
            writer.flush().await
        })
        .await
    }

    fn read_timeout(&self) -> Option<Duration> {
        *lock(&self.read_timeout)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) {
        *lock(&self.read_timeout) = timeout;
    }

    fn write_timeout(&self) -> Option<Duration> {
        *lock(&self.write_timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) {
        *lock(&self.write_timeout) = timeout;
    }

    fn abort(&self, hard: bool) {
        debug!(hard, "aborting connection");
        if hard {
            self.hard_aborted.store(true, Ordering::Release);
        }
        self.cancel.cancel();
    }

    fn is_connected(&self) -> bool {
        !self.cancel.is_cancelled() && !self.peer_closed.load(Ordering::Acquire)
    }

    fn set_leftover(&self, leftover: Bytes) {
        let mut current = lock(&self.leftover);
        *current = prepend(leftover, &current);
    }
}

impl<R, W> fmt::Debug for IoConnection<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoConnection")
            .field("connected", &(!self.cancel.is_cancelled() && !self.peer_closed.load(Ordering::Acquire)))
            .field("hard_aborted", &self.is_hard_aborted())
            .field("leftover", &lock(&self.leftover).len())
            .finish_non_exhaustive()
    }
}

pub(crate) fn prepend(front: Bytes, back: &Bytes) -> Bytes {
    if back.is_empty() {
        return front;
    }
    let mut joined = BytesMut::with_capacity(front.len() + back.len());
    joined.extend_from_slice(&front);
    joined.extend_from_slice(back);
    joined.freeze()
}

// the guarded values stay consistent even if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
