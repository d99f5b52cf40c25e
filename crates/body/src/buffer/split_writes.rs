/// Largest batch handed to a single vectored write.
pub const SPLIT_WRITE_SIZE: usize = 64 * 1024;

/// Groups a list of slices into batches of at most `limit` bytes.
///
/// Slices are kept whole where they fit and cut where they don't, so every batch
/// but the last carries exactly `limit` bytes. Empty slices are skipped.
#[derive(Debug)]
pub struct SplitWrites<'a> {
    slices: &'a [&'a [u8]],
    // the part of slices[0] that is still pending
    current: &'a [u8],
    limit: usize,
}

impl<'a> SplitWrites<'a> {
    pub fn new(slices: &'a [&'a [u8]], limit: usize) -> Self {
        let (current, slices) = match slices.split_first() {
            Some((first, rest)) => (*first, rest),
            None => (&[][..], slices),
        };
        Self { slices, current, limit: limit.max(1) }
    }
}

impl<'a> Iterator for SplitWrites<'a> {
    type Item = Vec<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::new();
        let mut room = self.limit;

        while room > 0 {
            if self.current.is_empty() {
                match self.slices.split_first() {
                    Some((first, rest)) => {
                        self.current = *first;
                        self.slices = rest;
                        continue;
                    }
                    None => break,
                }
            }

            let n = self.current.len().min(room);
            let (head, tail) = self.current.split_at(n);
            batch.push(head);
            self.current = tail;
            room -= n;
        }

        if batch.is_empty() { None } else { Some(batch) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(batches: &[Vec<&[u8]>]) -> Vec<Vec<usize>> {
        batches.iter().map(|batch| batch.iter().map(|slice| slice.len()).collect()).collect()
    }

    #[test]
    fn test_small_slices_share_a_batch() {
        let slices: [&[u8]; 3] = [b"3\r\n", b"abc", b"\r\n"];
        let batches: Vec<_> = SplitWrites::new(&slices, 1024).collect();
        assert_eq!(sizes(&batches), vec![vec![3, 3, 2]]);
    }

    #[test]
    fn test_large_slice_is_cut() {
        let big = vec![b'x'; 250];
        let slices: [&[u8]; 3] = [b"FA\r\n", &big, b"\r\n"];
        let batches: Vec<_> = SplitWrites::new(&slices, 100).collect();
        assert_eq!(sizes(&batches), vec![vec![4, 96], vec![100], vec![54, 2]]);

        let joined: Vec<u8> = batches.iter().flatten().flat_map(|slice| slice.iter().copied()).collect();
        assert_eq!(joined.len(), 256);
        assert_eq!(&joined[..4], b"FA\r\n");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(SplitWrites::new(&[], 10).count(), 0);
        let slices: [&[u8]; 2] = [b"", b""];
        assert_eq!(SplitWrites::new(&slices, 10).count(), 0);
    }
}
