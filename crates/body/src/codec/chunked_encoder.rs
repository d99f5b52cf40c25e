//! Encoder for HTTP chunked transfer encoding.
//!
//! Besides the [`Encoder`] implementation, the framing pieces are exposed on their own
//! so a body stream can hand header, payload and trailer CRLF to a single vectored
//! write without copying the payload.

use crate::protocol::PayloadItem;
use bytes::{Buf, Bytes, BytesMut};
use std::io;
use std::io::Write;

use tokio_util::codec::Encoder;

/// Closes a chunked body: the zero-sized chunk and an empty trailer section.
pub const CHUNK_TERMINATOR: &[u8] = b"0\r\n\r\n";

/// Ends the size line and the data of every chunk.
pub const CRLF: &[u8] = b"\r\n";

/// Builds the size line of a chunk carrying `len` bytes, e.g. `5\r\n` or `1F4\r\n`.
pub fn chunk_header(len: u64) -> Bytes {
    let mut dst = BytesMut::with_capacity(18);
    // writing into a BytesMut never fails
    let _ = write!(helper::Writer(&mut dst), "{len:X}\r\n");
    dst.freeze()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
    send_size: usize,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { eof: false, send_size: 0 }
    }

    /// Whether the terminating chunk was already produced.
    #[inline]
    pub fn is_finish(&self) -> bool {
        self.eof
    }

    /// Payload bytes encoded so far, framing excluded.
    #[inline]
    pub fn send_size(&self) -> usize {
        self.send_size
    }
}

impl Default for ChunkedEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = io::Error;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            // an empty chunk would read as the terminator
            PayloadItem::Chunk(bytes) if !bytes.has_remaining() => Ok(()),
            PayloadItem::Chunk(mut bytes) => {
                let len = bytes.remaining();
                write!(helper::Writer(dst), "{len:X}\r\n")?;
                dst.reserve(len + CRLF.len());
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    let n = chunk.len();
                    dst.extend_from_slice(chunk);
                    bytes.advance(n);
                }
                dst.extend_from_slice(CRLF);
                self.send_size += len;
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                dst.extend_from_slice(CHUNK_TERMINATOR);
                Ok(())
            }
        }
    }
}

mod helper {
    use bytes::{BufMut, BytesMut};
    use std::io;

    pub struct Writer<'a>(pub &'a mut BytesMut);

    impl io::Write for Writer<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.put_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ChunkedDecoder;
    use tokio_util::codec::Decoder;

    fn decode_all(mut src: BytesMut) -> (Vec<u8>, BytesMut) {
        let mut decoder = ChunkedDecoder::new();
        let mut body = Vec::new();
        loop {
            match decoder.decode(&mut src).unwrap() {
                Some(PayloadItem::Chunk(bytes)) => body.extend_from_slice(&bytes),
                Some(PayloadItem::Eof) => return (body, src),
                None => panic!("incomplete chunked body"),
            }
        }
    }

    #[test]
    fn test_chunk_header() {
        assert_eq!(&chunk_header(0)[..], b"0\r\n");
        assert_eq!(&chunk_header(5)[..], b"5\r\n");
        assert_eq!(&chunk_header(500)[..], b"1F4\r\n");
        assert_eq!(&chunk_header(u64::MAX)[..], b"FFFFFFFFFFFFFFFF\r\n");
    }

    #[test]
    fn test_encode_chunk_and_eof() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"ABCDE")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], b"5\r\nABCDE\r\n0\r\n\r\n");
        assert!(encoder.is_finish());
        assert_eq!(encoder.send_size(), 5);
    }

    #[test]
    fn test_nothing_after_eof() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"late")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], CHUNK_TERMINATOR);
    }

    #[test]
    fn test_empty_chunk_is_skipped() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::new()), &mut dst).unwrap();
        assert!(dst.is_empty());
        assert!(!encoder.is_finish());
    }

    #[test]
    fn test_round_trip_sizes() {
        for size in [0usize, 1, 15, 16, 17, 4095, 4096, 4097, 65536] {
            let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();

            let mut encoder = ChunkedEncoder::new();
            let mut dst = BytesMut::new();
            encoder.encode(PayloadItem::Chunk(Bytes::from(payload.clone())), &mut dst).unwrap();
            encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

            let (body, rest) = decode_all(dst);
            assert_eq!(body, payload, "size {size}");
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn test_round_trip_many_chunks_with_leftover() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();
        for part in ["a", "bc", "def", "0123456789abcdef0"] {
            encoder.encode(PayloadItem::Chunk(Bytes::from_static(part.as_bytes())), &mut dst).unwrap();
        }
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        dst.extend_from_slice(b"next");

        let (body, rest) = decode_all(dst);
        assert_eq!(body, b"abcdef0123456789abcdef0");
        assert_eq!(&rest[..], b"next");
    }
}
