//! The transport side of a body stream.
//!
//! - [`PooledConnection`]: the narrow interface a body stream needs from a pooled
//!   connection: reads, (vectored) writes, per-operation timeouts, abort and the
//!   hand back of bytes read past the end of a body
//! - [`IoConnection`]: an implementation over any tokio `AsyncRead`/`AsyncWrite` pair

mod io_connection;
mod pooled;

#[cfg(test)]
pub(crate) mod mock;

pub use io_connection::IoConnection;
pub use pooled::PooledConnection;
