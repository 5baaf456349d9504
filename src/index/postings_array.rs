//! Parallel per-term columns
//!
//! Every term ordinal owns one slot in each column. The base columns are
//! shared by all consumers; consumers add their own columns by wrapping
//! `ParallelPostingsArray` and implementing [`PostingsArray`].

use std::fmt::Debug;

const U32_BYTES: usize = std::mem::size_of::<u32>();

/// Base columns: where each term's text, stream pointers and first slice live
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParallelPostingsArray {
    pub size: usize,
    /// Text start of the term in the term pool
    pub text_starts: Vec<u32>,
    /// Int-pool address of the term's per-stream write pointers
    pub int_starts: Vec<u32>,
    /// Byte-pool address of the term's first slice
    pub byte_starts: Vec<u32>,
}

impl ParallelPostingsArray {
    pub const BYTES_PER_POSTING: usize = 3 * U32_BYTES;

    pub fn new(size: usize) -> Self {
        Self {
            size,
            text_starts: vec![0; size],
            int_starts: vec![0; size],
            byte_starts: vec![0; size],
        }
    }

    /// Resize the base columns to `new_size`, keeping existing entries
    pub fn resize(&mut self, new_size: usize) {
        self.text_starts.resize(new_size, 0);
        self.int_starts.resize(new_size, 0);
        self.byte_starts.resize(new_size, 0);
        self.size = new_size;
    }
}

/// A set of per-term columns that always grow together
pub trait PostingsArray: Debug {
    /// Fresh, empty instance of the same kind with `size` slots
    fn new_instance(&self, size: usize) -> Self
    where
        Self: Sized;

    fn base(&self) -> &ParallelPostingsArray;

    fn base_mut(&mut self) -> &mut ParallelPostingsArray;

    /// Bytes one slot costs across every column
    fn bytes_per_posting(&self) -> usize {
        ParallelPostingsArray::BYTES_PER_POSTING
    }

    /// Resize every column to `new_size`
    fn grow_to(&mut self, new_size: usize);

    fn size(&self) -> usize {
        self.base().size
    }
}

impl PostingsArray for ParallelPostingsArray {
    fn new_instance(&self, size: usize) -> Self {
        ParallelPostingsArray::new(size)
    }

    fn base(&self) -> &ParallelPostingsArray {
        self
    }

    fn base_mut(&mut self) -> &mut ParallelPostingsArray {
        self
    }

    fn grow_to(&mut self, new_size: usize) {
        self.resize(new_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_keeps_entries() {
        let mut array = ParallelPostingsArray::new(2);
        array.text_starts[1] = 7;
        array.int_starts[1] = 8;
        array.byte_starts[1] = 9;

        array.grow_to(5);
        assert_eq!(array.size(), 5);
        assert_eq!(array.text_starts, vec![0, 7, 0, 0, 0]);
        assert_eq!(array.int_starts[1], 8);
        assert_eq!(array.byte_starts.len(), 5);
    }

    #[test]
    fn test_new_instance_is_empty() {
        let mut array = ParallelPostingsArray::new(4);
        array.text_starts[0] = 3;
        let fresh = array.new_instance(2);
        assert_eq!(fresh, ParallelPostingsArray::new(2));
        assert_eq!(array.bytes_per_posting(), 12);
    }
}
