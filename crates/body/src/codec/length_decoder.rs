//! Decoder for bodies delimited by a declared length.
//!
//! Used for response bodies announced with a `Content-Length` header. The decoder
//! never takes a byte past the declared length out of the source buffer, whatever
//! follows the body belongs to the next message on the connection.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{ParseError, PayloadItem};

/// Hands out at most `remaining` more body bytes, then reports EOF forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(declared: u64) -> Self {
        Self { remaining: declared }
    }

    /// Body bytes not decoded yet.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.is_finished() {
            return Ok(Some(PayloadItem::Eof));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let take = usize::try_from(self.remaining).map_or(src.len(), |remaining| remaining.min(src.len()));
        self.remaining -= take as u64;
        Ok(Some(PayloadItem::Chunk(src.split_to(take).freeze())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stops_at_declared_length() {
        let mut wire = BytesMut::from(&b"0123456789HTTP/1.1 200 OK\r\n"[..]);
        let mut decoder = LengthDecoder::new(10);

        let body = decoder.decode(&mut wire).unwrap().unwrap().into_bytes().unwrap();
        assert_eq!(&body[..], b"0123456789");
        assert!(decoder.is_finished());
        assert!(decoder.decode(&mut wire).unwrap().unwrap().is_eof());
        assert_eq!(&wire[..], b"HTTP/1.1 200 OK\r\n");
    }

    #[test]
    fn test_body_spread_over_reads() {
        let mut decoder = LengthDecoder::new(5);

        let mut wire = BytesMut::from(&b"abc"[..]);
        let first = decoder.decode(&mut wire).unwrap().unwrap();
        assert_eq!(first.as_bytes().unwrap().as_ref(), b"abc");
        assert_eq!(decoder.remaining(), 2);
        assert!(decoder.decode(&mut wire).unwrap().is_none());

        wire.extend_from_slice(b"de");
        let second = decoder.decode(&mut wire).unwrap().unwrap();
        assert_eq!(second.as_bytes().unwrap().as_ref(), b"de");
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_empty_body() {
        let mut wire = BytesMut::from(&b"next"[..]);
        let mut decoder = LengthDecoder::new(0);

        assert!(decoder.decode(&mut wire).unwrap().unwrap().is_eof());
        assert_eq!(&wire[..], b"next");
    }
}
