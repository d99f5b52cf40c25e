use bytes::{Buf, Bytes};

/// Represents an item in the HTTP message payload stream.
///
/// This enum is used by the payload decoders to produce either data chunks
/// or signal the end of the payload stream (EOF).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Marks the end of the payload stream
    Eof,
}

impl<D: Buf> PayloadItem<D> {
    /// Returns true if this item represents the end of the payload stream
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    /// Returns true if this item contains chunk data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    /// Returns a reference to the contained bytes if this is a Chunk
    ///
    /// Returns None if this is an EOF marker
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    /// Consumes the PayloadItem and returns the contained bytes if this is a Chunk
    ///
    /// Returns None if this is an EOF marker
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

/// How a response body is delimited on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyLength {
    /// Body with a declared Content-Length
    Length(u64),
    /// Body using chunked transfer encoding
    Chunked,
    /// Body that ends when the peer closes the connection
    UntilClose,
}

impl BodyLength {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, BodyLength::Chunked)
    }

    /// The declared length, if any.
    #[inline]
    pub fn exact(&self) -> Option<u64> {
        match self {
            BodyLength::Length(length) => Some(*length),
            BodyLength::Chunked | BodyLength::UntilClose => None,
        }
    }
}

/// How a request body is put on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WriteMode {
    /// Not decided yet; a write stream can't be built from it
    Unknown,
    /// Exactly `n` bytes follow the headers
    ContentLength(u64),
    /// Transfer-Encoding: chunked
    Chunked,
    /// Bytes are only buffered, the owner submits them later with a known length
    Buffer,
    /// The request carries no declared body
    None,
}

impl WriteMode {
    #[inline]
    pub fn is_unknown(&self) -> bool {
        matches!(self, WriteMode::Unknown)
    }

    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, WriteMode::Chunked)
    }

    #[inline]
    pub fn is_buffer_only(&self) -> bool {
        matches!(self, WriteMode::Buffer)
    }

    /// Whether the request has an entity body at all.
    #[inline]
    pub fn is_post(&self) -> bool {
        !matches!(self, WriteMode::None)
    }

    /// The number of bytes the mode allows, `None` when unbounded.
    #[inline]
    pub fn declared_length(&self) -> Option<u64> {
        match self {
            WriteMode::ContentLength(length) => Some(*length),
            _ => None,
        }
    }
}

/// The fixed direction of an entity body stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    #[inline]
    pub fn is_read(&self) -> bool {
        matches!(self, Direction::Read)
    }

    #[inline]
    pub fn is_write(&self) -> bool {
        matches!(self, Direction::Write)
    }
}
