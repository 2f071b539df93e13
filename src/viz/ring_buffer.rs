//! Growable circular byte buffer.
//!
//! The buffer is a byte stream: callers push and pop whole elements and are
//! responsible for keeping sizes a multiple of their element size. The sample
//! helpers (`push_back_samples`, `peek_back_samples`, ...) do this for `f32`.
//!
//! ```text
//!   capacity ────────────────────────────────────────────────┐
//!   ┌──────────────┬───────────────────────┬─────────────────┐
//!   │ data (wrap)  │        free           │   data (front)  │
//!   └──────────────┴───────────────────────┴─────────────────┘
//!                  ▲ end_pos                ▲ start_pos
//! ```
//!
//! Growth doubles the capacity (or grows to exactly fit, whichever is
//! larger). When the stored bytes wrap around, the front segment is slid to
//! the end of the new allocation so logical order is preserved.
//!
//! Reading or consuming more than `len()` bytes is a programming error and
//! panics.

/// Bytes converted per stack chunk in the sample helpers.
const CHUNK_BYTES: usize = 1024;
const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// Circular byte buffer that grows on demand and never shrinks.
#[derive(Debug, Clone, Default)]
pub struct RingBuffer {
    /// Backing storage; its length is the capacity
    data: Vec<u8>,
    /// Number of stored bytes
    size: usize,
    /// Physical offset of the first stored byte
    start_pos: usize,
    /// Physical offset one past the last stored byte (may equal capacity)
    end_pos: usize,
}

impl RingBuffer {
    /// Create an empty buffer with no allocation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with at least `capacity` bytes reserved.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut buf = Self::new();
        buf.reserve(capacity);
        buf
    }

    /// Release the storage and reset to the empty state.
    pub fn free(&mut self) {
        *self = Self::new();
    }

    /// Number of stored bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Allocated bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Grow the allocation to at least `capacity` bytes.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity <= self.capacity() {
            return;
        }
        self.grow_to(capacity);
    }

    /// Append bytes at the back.
    pub fn push_back(&mut self, bytes: &[u8]) {
        let end = self.grow_back(bytes.len());
        self.fill_back(end, bytes.len(), |dst, offset| {
            dst.copy_from_slice(&bytes[offset..offset + dst.len()])
        });
    }

    /// Append `size` zero bytes at the back.
    pub fn push_back_zero(&mut self, size: usize) {
        let end = self.grow_back(size);
        self.fill_back(end, size, |dst, _| dst.fill(0));
    }

    /// Prepend bytes at the front.
    pub fn push_front(&mut self, bytes: &[u8]) {
        self.fill_front(bytes.len(), |dst, offset| {
            dst.copy_from_slice(&bytes[offset..offset + dst.len()])
        });
    }

    /// Prepend `size` zero bytes at the front.
    pub fn push_front_zero(&mut self, size: usize) {
        self.fill_front(size, |dst, _| dst.fill(0));
    }

    /// Overwrite bytes starting at logical `offset`, growing (zero filled)
    /// when the write extends past the current end.
    pub fn place(&mut self, offset: usize, bytes: &[u8]) {
        let end_point = offset + bytes.len();
        if end_point > self.size {
            self.upsize(end_point);
        }
        self.write_at(offset, bytes);
    }

    /// Copy the first `out.len()` bytes without consuming them.
    pub fn peek_front(&self, out: &mut [u8]) {
        self.read_at(0, out);
    }

    /// Copy the last `out.len()` bytes without consuming them.
    pub fn peek_back(&self, out: &mut [u8]) {
        assert!(
            out.len() <= self.size,
            "peek_back of {} bytes from ring buffer holding {}",
            out.len(),
            self.size
        );
        self.read_at(self.size - out.len(), out);
    }

    /// Copy and consume the first `out.len()` bytes.
    pub fn pop_front(&mut self, out: &mut [u8]) {
        self.peek_front(out);
        self.drop_front(out.len());
    }

    /// Copy and consume the last `out.len()` bytes.
    pub fn pop_back(&mut self, out: &mut [u8]) {
        self.peek_back(out);
        self.drop_back(out.len());
    }

    /// Consume `size` bytes from the front without copying.
    pub fn drop_front(&mut self, size: usize) {
        assert!(
            size <= self.size,
            "pop_front of {} bytes from ring buffer holding {}",
            size,
            self.size
        );
        self.size -= size;
        if self.size == 0 {
            self.start_pos = 0;
            self.end_pos = 0;
            return;
        }
        self.start_pos += size;
        if self.start_pos >= self.capacity() {
            self.start_pos -= self.capacity();
        }
    }

    /// Consume `size` bytes from the back without copying.
    pub fn drop_back(&mut self, size: usize) {
        assert!(
            size <= self.size,
            "pop_back of {} bytes from ring buffer holding {}",
            size,
            self.size
        );
        self.size -= size;
        if self.size == 0 {
            self.start_pos = 0;
            self.end_pos = 0;
            return;
        }
        if self.end_pos <= size {
            self.end_pos = self.capacity() - (size - self.end_pos);
        } else {
            self.end_pos -= size;
        }
    }

    /// Byte at logical `index`, or `None` past the end.
    pub fn data_at(&self, index: usize) -> Option<&u8> {
        if index >= self.size {
            return None;
        }
        Some(&self.data[self.physical(index)])
    }

    // ------------------------------------------------------------------
    // f32 sample helpers
    // ------------------------------------------------------------------

    /// Number of whole `f32` samples stored.
    #[inline]
    pub fn sample_len(&self) -> usize {
        self.size / SAMPLE_BYTES
    }

    /// Append samples at the back.
    pub fn push_back_samples(&mut self, samples: &[f32]) {
        let mut chunk = [0u8; CHUNK_BYTES];
        for block in samples.chunks(CHUNK_BYTES / SAMPLE_BYTES) {
            for (dst, s) in chunk.chunks_exact_mut(SAMPLE_BYTES).zip(block) {
                dst.copy_from_slice(&s.to_ne_bytes());
            }
            self.push_back(&chunk[..block.len() * SAMPLE_BYTES]);
        }
    }

    /// Append `count` silent samples at the back.
    pub fn push_back_silence(&mut self, count: usize) {
        self.push_back_zero(count * SAMPLE_BYTES);
    }

    /// Copy the first `out.len()` samples without consuming them.
    pub fn peek_front_samples(&self, out: &mut [f32]) {
        self.read_samples_at(0, out);
    }

    /// Copy the last `out.len()` samples without consuming them.
    pub fn peek_back_samples(&self, out: &mut [f32]) {
        let bytes = out.len() * SAMPLE_BYTES;
        assert!(
            bytes <= self.size,
            "peek_back of {} samples from ring buffer holding {}",
            out.len(),
            self.sample_len()
        );
        self.read_samples_at(self.size - bytes, out);
    }

    /// Consume `count` samples from the front.
    pub fn drop_front_samples(&mut self, count: usize) {
        self.drop_front(count * SAMPLE_BYTES);
    }

    /// Drop the oldest samples until at most `max` remain.
    pub fn truncate_front_samples(&mut self, max: usize) {
        let len = self.sample_len();
        if len > max {
            self.drop_front_samples(len - max);
        }
    }

    fn read_samples_at(&self, byte_offset: usize, out: &mut [f32]) {
        let mut chunk = [0u8; CHUNK_BYTES];
        let per_chunk = CHUNK_BYTES / SAMPLE_BYTES;
        for (i, block) in out.chunks_mut(per_chunk).enumerate() {
            let bytes = &mut chunk[..block.len() * SAMPLE_BYTES];
            self.read_at(byte_offset + i * CHUNK_BYTES, bytes);
            for (dst, src) in block.iter_mut().zip(bytes.chunks_exact(SAMPLE_BYTES)) {
                *dst = f32::from_ne_bytes([src[0], src[1], src[2], src[3]]);
            }
        }
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    #[inline]
    fn physical(&self, logical: usize) -> usize {
        let pos = self.start_pos + logical;
        if pos >= self.capacity() {
            pos - self.capacity()
        } else {
            pos
        }
    }

    /// Copy `out.len()` bytes starting at logical `offset`.
    fn read_at(&self, offset: usize, out: &mut [u8]) {
        let size = out.len();
        assert!(
            offset + size <= self.size,
            "read of {} bytes at {} from ring buffer holding {}",
            size,
            offset,
            self.size
        );
        if size == 0 {
            return;
        }
        let pos = self.physical(offset);
        let first = (self.capacity() - pos).min(size);
        out[..first].copy_from_slice(&self.data[pos..pos + first]);
        out[first..].copy_from_slice(&self.data[..size - first]);
    }

    /// Overwrite `bytes.len()` stored bytes starting at logical `offset`.
    fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        let size = bytes.len();
        if size == 0 {
            return;
        }
        let pos = self.physical(offset);
        let first = (self.capacity() - pos).min(size);
        self.data[pos..pos + first].copy_from_slice(&bytes[..first]);
        self.data[..size - first].copy_from_slice(&bytes[first..]);
    }

    /// Account for `size` new bytes at the back and return the new end
    /// position before wrapping.
    fn grow_back(&mut self, size: usize) -> usize {
        let new_end = self.end_pos + size;
        self.size += size;
        self.ensure_capacity();
        new_end
    }

    /// Fill `size` bytes after `end_pos`, wrapping at the capacity.
    fn fill_back(&mut self, mut new_end: usize, size: usize, mut fill: impl FnMut(&mut [u8], usize)) {
        let cap = self.capacity();
        let end = self.end_pos;
        if new_end > cap {
            let back_size = cap - end;
            fill(&mut self.data[end..cap], 0);
            fill(&mut self.data[..size - back_size], back_size);
            new_end -= cap;
        } else {
            fill(&mut self.data[end..new_end], 0);
        }
        self.end_pos = new_end;
    }

    /// Fill `size` bytes before `start_pos`, wrapping below zero.
    fn fill_front(&mut self, size: usize, mut fill: impl FnMut(&mut [u8], usize)) {
        self.size += size;
        self.ensure_capacity();

        if self.size == size {
            self.start_pos = 0;
            self.end_pos = size;
            fill(&mut self.data[..size], 0);
        } else if self.start_pos < size {
            let back_size = size - self.start_pos;
            let start = self.start_pos;
            if start > 0 {
                fill(&mut self.data[..start], back_size);
            }
            self.start_pos = self.capacity() - back_size;
            let start = self.start_pos;
            fill(&mut self.data[start..start + back_size], 0);
        } else {
            self.start_pos -= size;
            let start = self.start_pos;
            fill(&mut self.data[start..start + size], 0);
        }
    }

    /// Extend the stored size to `size` with zeros.
    fn upsize(&mut self, size: usize) {
        if size <= self.size {
            return;
        }
        let add = size - self.size;
        let end = self.grow_back(add);
        self.fill_back(end, add, |dst, _| dst.fill(0));
    }

    fn ensure_capacity(&mut self) {
        if self.size <= self.capacity() {
            return;
        }
        let new_capacity = (self.capacity() * 2).max(self.size);
        self.grow_to(new_capacity);
    }

    fn grow_to(&mut self, new_capacity: usize) {
        let old_capacity = self.capacity();
        self.data.resize(new_capacity, 0);

        // Slide the wrapped front segment so the stored bytes stay in order.
        let wrapped = self.size > 0 && self.start_pos > 0 && self.end_pos <= self.start_pos;
        if wrapped {
            let difference = new_capacity - old_capacity;
            self.data
                .copy_within(self.start_pos..old_capacity, self.start_pos + difference);
            self.start_pos += difference;
        }
    }
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone)]
    enum Op {
        PushBack(Vec<u8>),
        PushFront(Vec<u8>),
        PushBackZero(usize),
        PopFront(usize),
        PopBack(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            prop::collection::vec(any::<u8>(), 0..40).prop_map(Op::PushBack),
            prop::collection::vec(any::<u8>(), 0..40).prop_map(Op::PushFront),
            (0usize..40).prop_map(Op::PushBackZero),
            (0usize..60).prop_map(Op::PopFront),
            (0usize..60).prop_map(Op::PopBack),
        ]
    }

    proptest! {
        /// The buffer behaves like a deque of bytes for any legal sequence
        #[test]
        fn matches_deque_model(ops in prop::collection::vec(op(), 1..80)) {
            let mut buf = RingBuffer::new();
            let mut model: VecDeque<u8> = VecDeque::new();
            let mut last_capacity = 0;

            for op in ops {
                match op {
                    Op::PushBack(bytes) => {
                        buf.push_back(&bytes);
                        model.extend(bytes);
                    }
                    Op::PushFront(bytes) => {
                        buf.push_front(&bytes);
                        for b in bytes.into_iter().rev() {
                            model.push_front(b);
                        }
                    }
                    Op::PushBackZero(n) => {
                        buf.push_back_zero(n);
                        model.extend(std::iter::repeat_n(0u8, n));
                    }
                    Op::PopFront(n) => {
                        let n = n.min(model.len());
                        let mut out = vec![0u8; n];
                        buf.pop_front(&mut out);
                        let expected: Vec<u8> = model.drain(..n).collect();
                        prop_assert_eq!(out, expected);
                    }
                    Op::PopBack(n) => {
                        let n = n.min(model.len());
                        let mut out = vec![0u8; n];
                        buf.pop_back(&mut out);
                        let expected: Vec<u8> = model.split_off(model.len() - n).into();
                        prop_assert_eq!(out, expected);
                    }
                }
                prop_assert_eq!(buf.len(), model.len());
                prop_assert!(buf.len() <= buf.capacity());
                prop_assert!(buf.capacity() >= last_capacity, "capacity shrank");
                last_capacity = buf.capacity();
            }

            let mut all = vec![0u8; buf.len()];
            buf.peek_front(&mut all);
            prop_assert_eq!(all, model.into_iter().collect::<Vec<_>>());
        }
    }
}
