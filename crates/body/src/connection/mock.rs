//! A scripted connection for failure injection in tests.

use std::io;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::select;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::connection::io_connection::prepend;
use crate::connection::PooledConnection;

#[derive(Debug, Default)]
pub(crate) struct MockConnection {
    input: Mutex<BytesMut>,
    hang_when_empty: bool,
    read_delay: Option<Duration>,
    written: Mutex<BytesMut>,
    write_failure: Mutex<Option<ErrorKind>>,
    write_gate: Option<Semaphore>,
    write_started: Notify,
    writes: AtomicUsize,
    aborts: Mutex<Vec<bool>>,
    leftover: Mutex<Bytes>,
    read_timeout: Mutex<Option<Duration>>,
    write_timeout: Mutex<Option<Duration>>,
    peer_closed: AtomicBool,
    cancel: CancellationToken,
}

impl MockConnection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Bytes served by `read`, in order.
    pub(crate) fn with_input(self, input: &[u8]) -> Self {
        self.input.lock().unwrap().extend_from_slice(input);
        self
    }

    /// Reads block on an empty input, until the read timeout fires or the connection is aborted,
    /// instead of reporting end of stream.
    pub(crate) fn hang_when_empty(mut self) -> Self {
        self.hang_when_empty = true;
        self
    }

    /// Every read of the input waits this long before returning data.
    pub(crate) fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Every write blocks until [`release_writes`](Self::release_writes) hands out a permit.
    pub(crate) fn gate_writes(mut self) -> Self {
        self.write_gate = Some(Semaphore::new(0));
        self
    }

    pub(crate) fn fail_writes(&self, kind: ErrorKind) {
        *self.write_failure.lock().unwrap() = Some(kind);
    }

    pub(crate) fn release_writes(&self, n: usize) {
        if let Some(gate) = &self.write_gate {
            gate.add_permits(n);
        }
    }

    /// Resolves once a write is waiting at the gate.
    pub(crate) async fn write_started(&self) {
        self.write_started.notified().await;
    }

    pub(crate) fn written(&self) -> Bytes {
        self.written.lock().unwrap().clone().freeze()
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    /// The `hard` flag of every abort call, in order.
    pub(crate) fn aborts(&self) -> Vec<bool> {
        self.aborts.lock().unwrap().clone()
    }

    pub(crate) fn leftover(&self) -> Bytes {
        self.leftover.lock().unwrap().clone()
    }

    fn aborted_error() -> io::Error {
        io::Error::new(ErrorKind::ConnectionAborted, "mock connection aborted")
    }

    async fn write_bytes(&self, parts: &[&[u8]]) -> io::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Self::aborted_error());
        }

        if let Some(gate) = &self.write_gate {
            self.write_started.notify_one();
            select! {
                () = self.cancel.cancelled() => return Err(Self::aborted_error()),
                permit = gate.acquire() => permit.map_err(|_| Self::aborted_error())?.forget(),
            }
        }

        if let Some(kind) = *self.write_failure.lock().unwrap() {
            return Err(io::Error::new(kind, "injected write failure"));
        }

        let mut written = self.written.lock().unwrap();
        for part in parts {
            written.extend_from_slice(part);
        }
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

#[async_trait]
impl PooledConnection for MockConnection {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        {
            let mut leftover = self.leftover.lock().unwrap();
            if !leftover.is_empty() {
                let n = leftover.len().min(buf.len());
                buf[..n].copy_from_slice(&leftover.split_to(n));
                return Ok(n);
            }
        }

        if self.cancel.is_cancelled() {
            return Err(Self::aborted_error());
        }

        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut input = self.input.lock().unwrap();
            if !input.is_empty() {
                let n = input.len().min(buf.len());
                buf[..n].copy_from_slice(&input.split_to(n));
                return Ok(n);
            }
        }

        if !self.hang_when_empty {
            self.peer_closed.store(true, Ordering::Release);
            return Ok(0);
        }

        let timeout = self.read_timeout();
        match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.cancel.cancelled()).await {
                Ok(()) => Err(Self::aborted_error()),
                Err(_) => Err(io::Error::new(ErrorKind::TimedOut, "mock read timed out")),
            },
            None => {
                self.cancel.cancelled().await;
                Err(Self::aborted_error())
            }
        }
    }

    async fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        self.write_bytes(&[buf]).await
    }

    async fn write_vectored_all(&self, bufs: &[&[u8]]) -> io::Result<()> {
        self.write_bytes(bufs).await
    }

    fn read_timeout(&self) -> Option<Duration> {
        *self.read_timeout.lock().unwrap()
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) {
        *self.read_timeout.lock().unwrap() = timeout;
    }

    fn write_timeout(&self) -> Option<Duration> {
        *self.write_timeout.lock().unwrap()
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) {
        *self.write_timeout.lock().unwrap() = timeout;
    }

    fn abort(&self, hard: bool) {
        self.aborts.lock().unwrap().push(hard);
        self.cancel.cancel();
    }

    fn is_connected(&self) -> bool {
        !self.cancel.is_cancelled() && !self.peer_closed.load(Ordering::Acquire)
    }

    fn set_leftover(&self, leftover: Bytes) {
        let mut current = self.leftover.lock().unwrap();
        *current = prepend(leftover, &current);
    }
}
