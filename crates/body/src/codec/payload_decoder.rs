//! Decoder implementation for response payloads.
//!
//! This module provides a unified decoder for the three ways a response body can be delimited:
//! - Content-Length based payloads
//! - Chunked transfer encoding
//! - Payloads that end when the peer closes the connection
//!
//! The decoder picks the strategy from a [`BodyLength`].

use crate::codec::chunked_decoder::ChunkedDecoder;
use crate::codec::length_decoder::LengthDecoder;
use crate::protocol::{BodyLength, ParseError, PayloadItem};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// A unified decoder for handling response payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    /// The specific decoding strategy to use
    kind: Kind,
}

/// Enum representing different payload decoding strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// Decode payload with a fixed content length
    Length(LengthDecoder),

    /// Decode payload using chunked transfer encoding
    Chunked(ChunkedDecoder),

    /// Hand out everything until the connection reports end of stream
    UntilClose,
}

impl PayloadDecoder {
    /// Creates a PayloadDecoder for chunked transfer encoding.
    pub fn chunked(max_trailer_bytes: usize) -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::with_max_trailer_bytes(max_trailer_bytes)) }
    }

    /// Creates a PayloadDecoder for a fixed-length payload.
    ///
    /// # Arguments
    /// * `size` - The expected content length in bytes
    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    /// Creates a PayloadDecoder for a body delimited by connection close.
    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose }
    }

    pub fn from_length(length: BodyLength, max_trailer_bytes: usize) -> Self {
        match length {
            BodyLength::Length(size) => Self::fix_length(size),
            BodyLength::Chunked => Self::chunked(max_trailer_bytes),
            BodyLength::UntilClose => Self::until_close(),
        }
    }

    /// Returns whether this decoder handles chunked transfer encoding.
    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_until_close(&self) -> bool {
        matches!(self.kind, Kind::UntilClose)
    }

    /// Undecoded body bytes, when the framing makes that number knowable.
    pub fn remaining(&self) -> Option<u64> {
        match &self.kind {
            Kind::Length(length_decoder) => Some(length_decoder.remaining()),
            Kind::Chunked(chunked_decoder) if chunked_decoder.is_eof() => Some(0),
            Kind::Chunked(_) | Kind::UntilClose => None,
        }
    }

    /// Whether the whole body was decoded. A close-delimited body only ends on end of stream.
    pub fn is_finished(&self) -> bool {
        match &self.kind {
            Kind::Length(length_decoder) => length_decoder.is_finished(),
            Kind::Chunked(chunked_decoder) => chunked_decoder.is_eof(),
            Kind::UntilClose => false,
        }
    }

    /// How many bytes the next read from the connection may ask for.
    ///
    /// A fixed-length body never reads past its end, so whatever follows it stays
    /// on the connection.
    pub fn read_limit(&self, want: usize, chunk_read_size: usize) -> usize {
        match &self.kind {
            Kind::Length(length_decoder) => {
                usize::try_from(length_decoder.remaining()).map_or(want, |remaining| want.min(remaining))
            }
            Kind::Chunked(_) => chunk_read_size,
            Kind::UntilClose => want,
        }
    }
}

/// Implementation of the Decoder trait for response payloads.
///
/// Delegates to the appropriate decoder based on the payload type.
impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::UntilClose if src.is_empty() => Ok(None),
            Kind::UntilClose => Ok(Some(PayloadItem::Chunk(src.split().freeze()))),
        }
    }
}
