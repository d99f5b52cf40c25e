//! Entity body transport for pooled HTTP/1.1 client connections
//!
//! This crate sends and receives HTTP message bodies over a connection that is owned by a
//! connection pool and may be handed to the next request once the current exchange is
//! over. It deals with everything between "headers are done" and "the connection can be
//! reused", built on top of tokio.
//!
//! # Features
//!
//! - Chunked transfer coding, trailers included
//! - Content-Length bounded request and response bodies
//! - Bodies delimited by connection close
//! - Request body buffering for resubmission after redirects or authentication challenges
//! - Draining unread responses so the connection can be reused
//! - Close and abort from any thread while a read or write is in flight
//! - Async API, plus a blocking wrapper over the very same state machine
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use micro_body::config::BodyConfig;
//! use micro_body::connection::IoConnection;
//! use micro_body::protocol::{BodyLength, WriteMode};
//! use micro_body::stream::{CompletionSignal, EntityBodyStream};
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tcp_stream = TcpStream::connect("127.0.0.1:8080").await?;
//!     let connection = Arc::new(IoConnection::from_stream(tcp_stream));
//!
//!     // request headers are written by the caller, the body goes through a write stream
//!     let owner = Arc::new(CompletionSignal::new());
//!     let request_body = EntityBodyStream::writer(
//!         Arc::clone(&connection),
//!         owner.clone(),
//!         WriteMode::Chunked,
//!         BodyConfig::default(),
//!     )?;
//!     request_body.write(b"hello").await?;
//!     request_body.close().await?;
//!
//!     // once the response headers are parsed, the body is read through a read stream
//!     let owner = Arc::new(CompletionSignal::new());
//!     let response_body = EntityBodyStream::reader(
//!         Arc::clone(&connection),
//!         owner.clone(),
//!         Bytes::new(),
//!         BodyLength::Chunked,
//!         BodyConfig::default(),
//!     );
//!     let mut buf = [0u8; 1024];
//!     while response_body.read(&mut buf).await? > 0 {}
//!     response_body.close().await?;
//!
//!     let completion = owner.wait().await;
//!     println!("connection reusable: {}", completion.disposition.is_reuse());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`stream`]: The entity body stream, its state machine and the owner interface
//! - [`codec`]: Chunked and content-length framing
//! - [`buffer`]: The request body buffer used for resubmission
//! - [`connection`]: The pooled connection interface and a tokio based implementation
//! - [`protocol`]: Shared types and the error taxonomy
//! - [`config`]: Timeouts and drain limits
//!
//! # Core Components
//!
//! ## Nesting
//!
//! Every stream carries one atomic nesting state. A read or write claims the stream by
//! moving it from `Idle` to `IoInProgress`; a second claim fails with
//! [`protocol::BodyError::ConcurrentIo`]. A close that arrives mid operation only marks the
//! stream closed, and the operation runs the close once it finishes.
//!
//! ## Completion
//!
//! Every stream reports exactly once to its [`stream::BodyOwner`], with a
//! [`stream::Disposition`] telling whether the connection may be reused.
//!
//! ## Error Handling
//!
//! - [`protocol::BodyError`]: the errors a stream reports. The first one is latched and
//!   returned by every later call
//! - [`protocol::ParseError`]: chunked framing errors
//!
//! # Limitations
//!
//! - HTTP/1.1 only
//! - Headers are neither parsed nor written here
//! - No TLS, DNS or pool policy: the connection is handed in ready to use

pub mod buffer;
pub mod codec;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod stream;

mod utils;
pub(crate) use utils::ensure;
