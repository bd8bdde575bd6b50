//! Staging buffers between pipeline stages.
//!
//! A staging buffer is a byte vector plus a read cursor. Consuming only
//! advances the cursor; [`StagingBuffer::compact`] moves the unconsumed
//! tail back to the front. Buffers are either growable (input staging) or
//! bounded (decoded samples), in which case writers fill the free tail
//! through [`StagingBuffer::fill_with`].

#[derive(Debug, Clone)]
pub struct StagingBuffer {
    data: Vec<u8>,
    read: usize,
    limit: Option<usize>,
}

impl StagingBuffer {
    /// A buffer that grows as data is pushed.
    pub fn growable() -> Self {
        Self {
            data: Vec::new(),
            read: 0,
            limit: None,
        }
    }

    /// A buffer that never holds more than `capacity` bytes, consumed
    /// prefix included until the next [`compact`](Self::compact).
    pub fn bounded(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            read: 0,
            limit: Some(capacity),
        }
    }

    /// Unconsumed bytes
    pub fn len(&self) -> usize {
        self.data.len() - self.read
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.read..]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.read..]
    }

    /// Bytes that can still be written before the bound is hit.
    pub fn free(&self) -> usize {
        match self.limit {
            Some(limit) => limit.saturating_sub(self.data.len()),
            None => usize::MAX - self.data.len(),
        }
    }

    /// Appends bytes. A bounded buffer takes as much as fits and returns
    /// the count taken.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let taken = bytes.len().min(self.free());
        self.data.extend_from_slice(&bytes[..taken]);
        taken
    }

    /// Lets `write` fill up to `max` bytes of free tail space and keeps
    /// the `written` count it reports alongside its result.
    pub fn fill_with<T, E, F>(&mut self, max: usize, write: F) -> Result<T, E>
    where
        F: FnOnce(&mut [u8]) -> Result<(usize, T), E>,
    {
        let start = self.data.len();
        let room = max.min(self.free());
        self.data.resize(start + room, 0);
        match write(&mut self.data[start..]) {
            Ok((written, value)) => {
                self.data.truncate(start + written.min(room));
                Ok(value)
            }
            Err(e) => {
                self.data.truncate(start);
                Err(e)
            }
        }
    }

    /// Marks `n` bytes as consumed.
    pub fn consume(&mut self, n: usize) {
        self.read = (self.read + n).min(self.data.len());
        if self.read == self.data.len() {
            self.clear();
        }
    }

    /// Moves unconsumed bytes to the front of the buffer.
    pub fn compact(&mut self) {
        if self.read > 0 {
            self.data.drain(..self.read);
            self.read = 0;
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.read = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// xorshift so the operation sequence is the same on every run
    struct Rng(u64);

    impl Rng {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }

        fn below(&mut self, n: u64) -> usize {
            (self.next() % n) as usize
        }
    }

    #[test]
    fn compact_never_loses_or_duplicates_bytes() {
        for seed in 1..=32u64 {
            let mut rng = Rng(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15));
            let mut buffer = StagingBuffer::bounded(4096);
            let mut model: VecDeque<u8> = VecDeque::new();
            let mut counter = 0u8;

            for _ in 0..500 {
                match rng.below(4) {
                    0 => {
                        let bytes: Vec<u8> = (0..rng.below(700))
                            .map(|_| {
                                counter = counter.wrapping_add(1);
                                counter
                            })
                            .collect();
                        let taken = buffer.push(&bytes);
                        model.extend(&bytes[..taken]);
                    }
                    1 => {
                        let n = rng.below(buffer.len() as u64 + 1);
                        buffer.consume(n);
                        model.drain(..n);
                    }
                    2 => buffer.compact(),
                    _ => {
                        let want = rng.below(300);
                        let filled: Result<usize, ()> = buffer.fill_with(want, |tail| {
                            for b in tail.iter_mut() {
                                counter = counter.wrapping_add(1);
                                *b = counter;
                            }
                            Ok((tail.len(), tail.len()))
                        });
                        let n = filled.unwrap();
                        let len = buffer.len();
                        model.extend(&buffer.as_slice()[len - n..]);
                    }
                }
                assert_eq!(buffer.len(), model.len());
                assert!(buffer.as_slice().iter().eq(model.iter()), "seed {seed} diverged");
            }
        }
    }

    #[test]
    fn bounded_buffer_counts_consumed_prefix_until_compacted() {
        let mut buffer = StagingBuffer::bounded(8);
        assert_eq!(buffer.push(&[1, 2, 3, 4, 5, 6]), 6);
        buffer.consume(4);
        assert_eq!(buffer.free(), 2);
        assert_eq!(buffer.push(&[7, 8, 9]), 2);
        buffer.compact();
        assert_eq!(buffer.as_slice(), &[5, 6, 7, 8]);
        assert_eq!(buffer.free(), 4);
    }

    #[test]
    fn failed_fill_leaves_contents_untouched() {
        let mut buffer = StagingBuffer::bounded(16);
        buffer.push(&[1, 2, 3]);
        let result: Result<(), &str> = buffer.fill_with(8, |tail| {
            tail.fill(0xFF);
            Err("decoder rejected input")
        });
        assert!(result.is_err());
        assert_eq!(buffer.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn consuming_everything_resets_cursor() {
        let mut buffer = StagingBuffer::growable();
        buffer.push(&[0u8; 100]);
        buffer.consume(100);
        assert!(buffer.is_empty());
        assert_eq!(buffer.free(), usize::MAX);
    }
}
