//! The entity body stream and the interface to the exchange that owns it.
//!
//! # Components
//!
//! - [`EntityBodyStream`]: reads or writes one body over a pooled connection, async
//! - [`BlockingBodyStream`]: the same stream driven from blocking code
//! - [`BodyOwner`]: what the stream reports to once it is done
//! - [`CompletionSignal`]: a ready-made owner that records completions
//!
//! # Lifecycle
//!
//! A stream is created per body transfer and bound to one connection. It is mutated only
//! through read, write, close and abort. Once it is done, the owner receives exactly one
//! [`Completion`] saying whether the connection may go back to the pool.

mod blocking;
mod close;
mod entity_body_stream;
mod nesting;
mod owner;
mod resubmit;


pub use blocking::BlockingBodyStream;
pub use entity_body_stream::EntityBodyStream;
pub use owner::{BodyOwner, Completion, CompletionSignal, Disposition};
