//! Append-only block pools
//!
//! Byte and int arenas made of fixed-size blocks. Everything stored in a pool
//! is addressed by a global offset (`block_index * BLOCK_SIZE + offset`), so
//! per-term handles are plain integers and never borrow the pool.
//!
//! Byte pools also host *slices*: short, chained runs of bytes used as
//! per-term streams. A slice ends with a non-zero level marker; when a writer
//! reaches the marker the slice is extended by allocating the next, larger
//! level and storing a 4-byte forwarding address in the last bytes of the old
//! slice.

use crate::error::{QuireError, Result};

use super::counter::Counter;

pub const BYTE_BLOCK_SHIFT: usize = 15;
pub const BYTE_BLOCK_SIZE: usize = 1 << BYTE_BLOCK_SHIFT;
pub const BYTE_BLOCK_MASK: usize = BYTE_BLOCK_SIZE - 1;

pub const INT_BLOCK_SHIFT: usize = 13;
pub const INT_BLOCK_SIZE: usize = 1 << INT_BLOCK_SHIFT;
pub const INT_BLOCK_MASK: usize = INT_BLOCK_SIZE - 1;

/// Slice sizes per level
pub const LEVEL_SIZES: [usize; 10] = [5, 14, 20, 30, 40, 40, 80, 80, 120, 200];
/// Level that follows each level once a slice fills up
pub const NEXT_LEVELS: [usize; 10] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 9];
pub const FIRST_LEVEL_SIZE: usize = LEVEL_SIZES[0];

/// Longest term that fits in a byte block together with its length prefix
pub const MAX_TERM_LENGTH: usize = BYTE_BLOCK_SIZE - 2;

/// Growable pool of byte blocks
#[derive(Debug)]
pub struct ByteBlockPool {
    buffers: Vec<Vec<u8>>,
    /// Write position inside the current (last) block
    byte_upto: usize,
    bytes_used: Counter,
}

impl ByteBlockPool {
    pub fn new(bytes_used: Counter) -> Self {
        Self {
            buffers: Vec::new(),
            byte_upto: BYTE_BLOCK_SIZE,
            bytes_used,
        }
    }

    /// Number of blocks currently allocated
    pub fn block_count(&self) -> usize {
        self.buffers.len()
    }

    fn byte_offset(&self) -> usize {
        self.buffers.len().saturating_sub(1) * BYTE_BLOCK_SIZE
    }

    fn current(&self) -> usize {
        self.buffers.len() - 1
    }

    /// Start a fresh zero-filled block
    pub fn next_buffer(&mut self) {
        self.buffers.push(vec![0u8; BYTE_BLOCK_SIZE]);
        self.bytes_used.add_and_get(BYTE_BLOCK_SIZE as i64);
        self.byte_upto = 0;
    }

    /// Make sure `len` contiguous bytes are available in the current block
    pub fn reserve(&mut self, len: usize) {
        if BYTE_BLOCK_SIZE - self.byte_upto < len {
            self.next_buffer();
        }
    }

    /// Drop every block and release its accounting
    pub fn reset(&mut self) {
        let released = self.buffers.len() * BYTE_BLOCK_SIZE;
        if released > 0 {
            self.bytes_used.add_and_get(-(released as i64));
        }
        self.buffers.clear();
        self.byte_upto = BYTE_BLOCK_SIZE;
    }

    pub fn byte_at(&self, offset: usize) -> u8 {
        self.buffers[offset >> BYTE_BLOCK_SHIFT][offset & BYTE_BLOCK_MASK]
    }

    pub fn set_byte(&mut self, offset: usize, value: u8) {
        self.buffers[offset >> BYTE_BLOCK_SHIFT][offset & BYTE_BLOCK_MASK] = value;
    }

    /// Allocate a level-0 slice of `size` bytes and return its global start
    pub fn new_slice(&mut self, size: usize) -> usize {
        if self.byte_upto > BYTE_BLOCK_SIZE - size {
            self.next_buffer();
        }
        let upto = self.byte_upto;
        self.byte_upto += size;
        let cur = self.current();
        self.buffers[cur][self.byte_upto - 1] = 16;
        self.byte_offset() + upto
    }

    /// Extend the slice whose end marker sits at global offset `end`.
    ///
    /// Returns the global offset where writing continues.
    pub fn alloc_slice(&mut self, end: usize) -> usize {
        let slice_block = end >> BYTE_BLOCK_SHIFT;
        let upto = end & BYTE_BLOCK_MASK;

        let level = (self.buffers[slice_block][upto] & 15) as usize;
        let new_level = NEXT_LEVELS[level];
        let new_size = LEVEL_SIZES[new_level];

        if self.byte_upto > BYTE_BLOCK_SIZE - new_size {
            self.next_buffer();
        }

        let new_upto = self.byte_upto;
        let offset = self.byte_offset() + new_upto;
        self.byte_upto += new_size;
        let cur = self.current();

        // The forwarding address overwrites the last 3 data bytes; move them
        // to the head of the new slice first.
        let mut carried = [0u8; 3];
        carried.copy_from_slice(&self.buffers[slice_block][upto - 3..upto]);
        self.buffers[cur][new_upto..new_upto + 3].copy_from_slice(&carried);

        self.buffers[slice_block][upto - 3..=upto].copy_from_slice(&(offset as u32).to_be_bytes());

        self.buffers[cur][self.byte_upto - 1] = 16 | new_level as u8;

        offset + 3
    }

    /// Append a length-prefixed term and return its text start
    pub fn append_term(&mut self, term: &[u8]) -> Result<usize> {
        let len = term.len();
        if len > MAX_TERM_LENGTH {
            return Err(QuireError::TermTooLong {
                length: len,
                max: MAX_TERM_LENGTH,
            });
        }
        if len + 2 + self.byte_upto > BYTE_BLOCK_SIZE {
            self.next_buffer();
        }

        let upto = self.byte_upto;
        let text_start = self.byte_offset() + upto;
        let cur = self.current();
        let buffer = &mut self.buffers[cur];

        if len < 128 {
            buffer[upto] = len as u8;
            buffer[upto + 1..upto + 1 + len].copy_from_slice(term);
            self.byte_upto += len + 1;
        } else {
            buffer[upto] = (0x80 | (len & 0x7f)) as u8;
            buffer[upto + 1] = ((len >> 7) & 0xff) as u8;
            buffer[upto + 2..upto + 2 + len].copy_from_slice(term);
            self.byte_upto += len + 2;
        }

        Ok(text_start)
    }

    /// Term bytes stored at `text_start` by [`append_term`](Self::append_term)
    pub fn term_at(&self, text_start: usize) -> &[u8] {
        let buffer = &self.buffers[text_start >> BYTE_BLOCK_SHIFT];
        let pos = text_start & BYTE_BLOCK_MASK;
        if buffer[pos] & 0x80 == 0 {
            let len = buffer[pos] as usize;
            &buffer[pos + 1..pos + 1 + len]
        } else {
            let len = (buffer[pos] & 0x7f) as usize | ((buffer[pos + 1] as usize) << 7);
            &buffer[pos + 2..pos + 2 + len]
        }
    }
}

/// Growable pool of `u32` blocks
#[derive(Debug)]
pub struct IntBlockPool {
    buffers: Vec<Vec<u32>>,
    int_upto: usize,
    bytes_used: Counter,
}

impl IntBlockPool {
    pub fn new(bytes_used: Counter) -> Self {
        Self {
            buffers: Vec::new(),
            int_upto: INT_BLOCK_SIZE,
            bytes_used,
        }
    }

    pub fn block_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn next_buffer(&mut self) {
        self.buffers.push(vec![0u32; INT_BLOCK_SIZE]);
        self.bytes_used
            .add_and_get((INT_BLOCK_SIZE * std::mem::size_of::<u32>()) as i64);
        self.int_upto = 0;
    }

    pub fn reset(&mut self) {
        let released = self.buffers.len() * INT_BLOCK_SIZE * std::mem::size_of::<u32>();
        if released > 0 {
            self.bytes_used.add_and_get(-(released as i64));
        }
        self.buffers.clear();
        self.int_upto = INT_BLOCK_SIZE;
    }

    /// Reserve `count` contiguous ints and return the global index of the first
    pub fn alloc(&mut self, count: usize) -> usize {
        debug_assert!(count <= INT_BLOCK_SIZE);
        if self.int_upto + count > INT_BLOCK_SIZE {
            self.next_buffer();
        }
        let start = (self.buffers.len() - 1) * INT_BLOCK_SIZE + self.int_upto;
        self.int_upto += count;
        start
    }

    pub fn get(&self, index: usize) -> u32 {
        self.buffers[index >> INT_BLOCK_SHIFT][index & INT_BLOCK_MASK]
    }

    pub fn set(&mut self, index: usize, value: u32) {
        self.buffers[index >> INT_BLOCK_SHIFT][index & INT_BLOCK_MASK] = value;
    }
}

/// Replays one slice chain from a byte pool
pub struct ByteSliceReader<'a> {
    pool: &'a ByteBlockPool,
    block: usize,
    upto: usize,
    limit: usize,
    level: usize,
    end: usize,
}

impl<'a> ByteSliceReader<'a> {
    /// Read the chain starting at global `start` up to (excluding) global `end`
    pub fn new(pool: &'a ByteBlockPool, start: usize, end: usize) -> Self {
        debug_assert!(end >= start);
        let block = start >> BYTE_BLOCK_SHIFT;
        let upto = start & BYTE_BLOCK_MASK;
        let limit = if start + FIRST_LEVEL_SIZE >= end {
            end - block * BYTE_BLOCK_SIZE
        } else {
            upto + FIRST_LEVEL_SIZE - 4
        };
        Self {
            pool,
            block,
            upto,
            limit,
            level: 0,
            end,
        }
    }

    pub fn eof(&self) -> bool {
        self.block * BYTE_BLOCK_SIZE + self.upto == self.end
    }

    pub fn read_byte(&mut self) -> u8 {
        debug_assert!(!self.eof());
        if self.upto == self.limit {
            self.next_slice();
        }
        let b = self.pool.buffers[self.block][self.upto];
        self.upto += 1;
        b
    }

    pub fn read_vint(&mut self) -> u32 {
        let mut b = self.read_byte();
        let mut value = (b & 0x7f) as u32;
        let mut shift = 7;
        while b & 0x80 != 0 {
            b = self.read_byte();
            value |= ((b & 0x7f) as u32) << shift;
            shift += 7;
        }
        value
    }

    fn next_slice(&mut self) {
        let buffer = &self.pool.buffers[self.block];
        let forward = u32::from_be_bytes([
            buffer[self.limit],
            buffer[self.limit + 1],
            buffer[self.limit + 2],
            buffer[self.limit + 3],
        ]) as usize;

        self.level = NEXT_LEVELS[self.level];
        let new_size = LEVEL_SIZES[self.level];

        self.block = forward >> BYTE_BLOCK_SHIFT;
        self.upto = forward & BYTE_BLOCK_MASK;
        let block_offset = self.block * BYTE_BLOCK_SIZE;

        self.limit = if forward + new_size >= self.end {
            self.end - block_offset
        } else {
            self.upto + new_size - 4
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Write `data` into a fresh slice the way a term stream does
    fn write_stream(pool: &mut ByteBlockPool, data: &[u8]) -> (usize, usize) {
        let start = pool.new_slice(FIRST_LEVEL_SIZE);
        let mut upto = start;
        for &b in data {
            if pool.byte_at(upto) != 0 {
                upto = pool.alloc_slice(upto);
            }
            pool.set_byte(upto, b);
            upto += 1;
        }
        (start, upto)
    }

    #[test]
    fn test_slice_chain_replays_across_levels() {
        let counter = Counter::new();
        let mut pool = ByteBlockPool::new(counter.clone());

        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8 + 1).collect();
        let (start, end) = write_stream(&mut pool, &data);

        let mut reader = ByteSliceReader::new(&pool, start, end);
        let mut replay = Vec::new();
        while !reader.eof() {
            replay.push(reader.read_byte());
        }
        assert_eq!(replay, data);
        assert_eq!(counter.get(), (pool.block_count() * BYTE_BLOCK_SIZE) as i64);
    }

    #[test]
    fn test_interleaved_streams_stay_separate() {
        let mut pool = ByteBlockPool::new(Counter::new());
        let a = pool.new_slice(FIRST_LEVEL_SIZE);
        let b = pool.new_slice(FIRST_LEVEL_SIZE);
        let (mut ua, mut ub) = (a, b);

        for i in 0..200u8 {
            for (upto, value) in [(&mut ua, i), (&mut ub, 255 - i)] {
                if pool.byte_at(*upto) != 0 {
                    *upto = pool.alloc_slice(*upto);
                }
                pool.set_byte(*upto, value);
                *upto += 1;
            }
        }

        let mut ra = ByteSliceReader::new(&pool, a, ua);
        let mut rb = ByteSliceReader::new(&pool, b, ub);
        for i in 0..200u8 {
            assert_eq!(ra.read_byte(), i);
            assert_eq!(rb.read_byte(), 255 - i);
        }
        assert!(ra.eof());
        assert!(rb.eof());
    }

    #[test]
    fn test_term_storage() {
        let mut pool = ByteBlockPool::new(Counter::new());
        let short = pool.append_term(b"rust").unwrap();
        let long_term = vec![b'x'; 300];
        let long = pool.append_term(&long_term).unwrap();

        assert_eq!(pool.term_at(short), b"rust");
        assert_eq!(pool.term_at(long), long_term.as_slice());
    }

    #[test]
    fn test_term_too_long() {
        let mut pool = ByteBlockPool::new(Counter::new());
        let huge = vec![0u8; MAX_TERM_LENGTH + 1];
        assert!(matches!(
            pool.append_term(&huge),
            Err(QuireError::TermTooLong { .. })
        ));
        assert_eq!(pool.block_count(), 0);
    }

    #[test]
    fn test_reset_releases_accounting() {
        let counter = Counter::new();
        let mut bytes = ByteBlockPool::new(counter.clone());
        let mut ints = IntBlockPool::new(counter.clone());
        bytes.next_buffer();
        ints.alloc(4);
        assert!(counter.get() > 0);

        bytes.reset();
        ints.reset();
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_int_pool_alloc_is_contiguous() {
        let mut ints = IntBlockPool::new(Counter::new());
        let first = ints.alloc(INT_BLOCK_SIZE - 1);
        let second = ints.alloc(2);
        assert_eq!(first, 0);
        assert_eq!(second, INT_BLOCK_SIZE);
        ints.set(second + 1, 7);
        assert_eq!(ints.get(second + 1), 7);
    }
}
