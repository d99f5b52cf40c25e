//! Decoder for response bodies sent with chunked transfer coding.
//!
//! The framing is described in [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1):
//! every chunk is a hexadecimal size line with optional extensions, the data and a CRLF.
//! A zero sized chunk ends the body, followed by optional trailer fields and an empty line.
//!
//! Nothing after that empty line is consumed. Those bytes belong to the next response on
//! the connection and stay in the source buffer.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::config::DEFAULT_MAX_TRAILER_BYTES;
use crate::protocol::{ParseError, PayloadItem};
use ChunkedState::*;

/// A [`Decoder`] turning chunked wire bytes into body data.
///
/// Chunk data is handed out as soon as it is buffered, so one large chunk may arrive
/// as several [`PayloadItem::Chunk`]s. Trailer fields are skipped, but their total size
/// is bounded by `max_trailer_bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    /// Data bytes of the current chunk not handed out yet, or the size being parsed.
    chunk_left: u64,
    /// Whether the size line being parsed carried at least one hex digit.
    size_seen: bool,
    trailer_len: usize,
    max_trailer_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    Size,
    SizeLws,
    Extension,
    SizeLf,
    Data,
    DataCr,
    DataLf,
    Trailer,
    TrailerLf,
    EndCr,
    EndLf,
    End,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self::with_max_trailer_bytes(DEFAULT_MAX_TRAILER_BYTES)
    }

    /// A decoder rejecting trailer sections larger than `max_trailer_bytes`.
    pub fn with_max_trailer_bytes(max_trailer_bytes: usize) -> Self {
        Self { state: Size, chunk_left: 0, size_seen: false, trailer_len: 0, max_trailer_bytes }
    }

    /// Whether the last chunk and the empty line after the trailers were consumed.
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.state == End
    }

    /// Moves the state machine one framing byte ahead.
    fn advance(&mut self, byte: u8) -> Result<ChunkedState, ParseError> {
        let next = match self.state {
            Size if !self.size_seen && matches!(byte, b'\t' | b' ' | b';' | b'\r') => {
                return Err(ParseError::invalid_chunk("missing chunk size"));
            }
            Size => match byte {
                b'\t' | b' ' => SizeLws,
                b';' => Extension,
                b'\r' => SizeLf,
                _ => {
                    let digit = hex_value(byte)
                        .ok_or_else(|| ParseError::invalid_chunk(format!("invalid byte {byte:#04x} in chunk size")))?;
                    self.chunk_left = self
                        .chunk_left
                        .checked_mul(16)
                        .and_then(|size| size.checked_add(digit))
                        .ok_or_else(|| ParseError::invalid_chunk("chunk size overflows"))?;
                    self.size_seen = true;
                    Size
                }
            },
            SizeLws => match byte {
                b'\t' | b' ' => SizeLws,
                b';' => Extension,
                b'\r' => SizeLf,
                _ => return Err(ParseError::invalid_chunk("unexpected byte after chunk size")),
            },
            Extension => match byte {
                b'\r' => SizeLf,
                // a bare LF would let a sloppy peer sneak in a second size line
                b'\n' => return Err(ParseError::invalid_chunk("chunk extension contains a bare LF")),
                _ => Extension,
            },
            SizeLf => match byte {
                b'\n' if self.chunk_left == 0 => EndCr,
                b'\n' => Data,
                _ => return Err(ParseError::invalid_chunk("chunk size line not ended by CRLF")),
            },
            DataCr => expect(byte, b'\r', DataLf, "chunk data not followed by CR")?,
            DataLf => {
                self.size_seen = false;
                expect(byte, b'\n', Size, "chunk data not followed by LF")?
            }
            Trailer => {
                self.charge_trailer()?;
                if byte == b'\r' { TrailerLf } else { Trailer }
            }
            TrailerLf => {
                self.charge_trailer()?;
                expect(byte, b'\n', EndCr, "trailer field not ended by CRLF")?
            }
            EndCr => {
                if byte == b'\r' {
                    EndLf
                } else {
                    self.charge_trailer()?;
                    Trailer
                }
            }
            EndLf => expect(byte, b'\n', End, "chunked body not ended by CRLF")?,
            // consumed by `decode` without going through here
            Data | End => self.state,
        };
        Ok(next)
    }

    fn charge_trailer(&mut self) -> Result<(), ParseError> {
        self.trailer_len += 1;
        if self.trailer_len > self.max_trailer_bytes {
            return Err(ParseError::too_large_trailer(self.trailer_len, self.max_trailer_bytes));
        }
        Ok(())
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                End => return Ok(Some(PayloadItem::Eof)),
                Data => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let take = usize::try_from(self.chunk_left).map_or(src.len(), |left| left.min(src.len()));
                    self.chunk_left -= take as u64;
                    if self.chunk_left == 0 {
                        self.state = DataCr;
                    }
                    trace!(len = take, "decoded chunk data");
                    return Ok(Some(PayloadItem::Chunk(src.split_to(take).freeze())));
                }
                _ => {}
            }

            if !src.has_remaining() {
                return Ok(None);
            }
            self.state = self.advance(src.get_u8())?;
            if self.state == End {
                trace!(trailer_len = self.trailer_len, "finished chunked body");
            }
        }
    }
}

fn expect(byte: u8, wanted: u8, next: ChunkedState, reason: &'static str) -> Result<ChunkedState, ParseError> {
    if byte == wanted { Ok(next) } else { Err(ParseError::invalid_chunk(reason)) }
}

fn hex_value(byte: u8) -> Option<u64> {
    char::from(byte).to_digit(16).map(u64::from)
}
