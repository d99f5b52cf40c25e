use bytes::{BufMut, Bytes, BytesMut};

/// Capacity of a single segment of a [`WriteBuffer`].
pub const SEGMENT_SIZE: usize = 8 * 1024;

/// An append-only, segmented copy of everything written to a request body.
///
/// The owner keeps it around so a request can be sent again on a fresh connection,
/// or so a buffer-only body can be submitted once its length is known.
#[derive(Debug, Clone, Default)]
pub struct WriteBuffer {
    segments: Vec<BytesMut>,
    len: u64,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `buf`, filling up the last segment before opening a new one.
    pub fn write(&mut self, mut buf: &[u8]) {
        self.len += buf.len() as u64;
        while !buf.is_empty() {
            if self.segments.last().is_none_or(|segment| segment.len() >= SEGMENT_SIZE) {
                self.segments.push(BytesMut::with_capacity(SEGMENT_SIZE));
            }
            let Some(segment) = self.segments.last_mut() else {
                break;
            };

            let n = buf.len().min(SEGMENT_SIZE - segment.len());
            segment.put_slice(&buf[..n]);
            buf = &buf[n..];
        }
    }

    /// Total number of buffered bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The buffered bytes in write order, one slice per segment.
    pub fn segments(&self) -> impl Iterator<Item = &[u8]> {
        self.segments.iter().map(|segment| &segment[..])
    }

    /// Copies the buffered bytes into one contiguous buffer.
    pub fn to_bytes(&self) -> Bytes {
        #[allow(clippy::cast_possible_truncation, reason = "the buffer lives in memory")]
        let mut bytes = BytesMut::with_capacity(self.len as usize);
        for segment in &self.segments {
            bytes.extend_from_slice(segment);
        }
        bytes.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let buffer = WriteBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.segments().count(), 0);
        assert!(buffer.to_bytes().is_empty());
    }

    #[test]
    fn test_fills_segments_in_order() {
        let mut buffer = WriteBuffer::new();
        let payload: Vec<u8> = (0..SEGMENT_SIZE * 2 + 100).map(|i| (i % 256) as u8).collect();

        buffer.write(&payload[..10]);
        buffer.write(&payload[10..SEGMENT_SIZE + 5]);
        buffer.write(&payload[SEGMENT_SIZE + 5..]);

        assert_eq!(buffer.len(), payload.len() as u64);
        let lens: Vec<usize> = buffer.segments().map(<[u8]>::len).collect();
        assert_eq!(lens, vec![SEGMENT_SIZE, SEGMENT_SIZE, 100]);
        assert_eq!(&buffer.to_bytes()[..], &payload[..]);
    }

    #[test]
    fn test_empty_write_is_noop() {
        let mut buffer = WriteBuffer::new();
        buffer.write(b"");
        assert!(buffer.is_empty());
        assert_eq!(buffer.segments().count(), 0);
    }
}
