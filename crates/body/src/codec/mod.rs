//! Entity body framing codecs.
//!
//! This module provides the wire format pieces a body stream needs on either
//! side of a connection. Decoders follow the [`tokio_util::codec::Decoder`]
//! contract and leave every byte they don't own in the source buffer.
//!
//! # Components
//!
//! ## Decoders
//! - [`ChunkedDecoder`]: Handles chunked transfer encoded payloads, trailers included
//! - [`LengthDecoder`]: Processes fixed-length payloads
//! - [`PayloadDecoder`]: Picks one of the above, or reads until the peer closes
//!
//! ## Encoders
//! - [`ChunkedEncoder`]: Implements chunked transfer encoding
//! - [`chunk_header`], [`CHUNK_TERMINATOR`], [`CRLF`]: the framing pieces for vectored writes
//!
//! # Example
//!
//! ```
//! use bytes::{Bytes, BytesMut};
//! use micro_body::codec::{ChunkedDecoder, ChunkedEncoder};
//! use micro_body::protocol::PayloadItem;
//! use tokio_util::codec::{Decoder, Encoder};
//!
//! let mut encoder = ChunkedEncoder::new();
//! let mut wire = BytesMut::new();
//! encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"ABCDE")), &mut wire).unwrap();
//! encoder.encode(PayloadItem::<Bytes>::Eof, &mut wire).unwrap();
//! assert_eq!(&wire[..], b"5\r\nABCDE\r\n0\r\n\r\n");
//!
//! let mut decoder = ChunkedDecoder::new();
//! let chunk = decoder.decode(&mut wire).unwrap().unwrap();
//! assert_eq!(chunk.as_bytes().unwrap().as_ref(), b"ABCDE");
//! ```

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod payload_decoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::{CHUNK_TERMINATOR, CRLF, ChunkedEncoder, chunk_header};
pub use length_decoder::LengthDecoder;
pub use payload_decoder::PayloadDecoder;
