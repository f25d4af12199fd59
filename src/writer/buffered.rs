use super::{
    write_slow_by_pushing,
    FlushType,
    Writer,
    WriterState,
};
use crate::{
    arith::{
        to_length,
        MAX_POSITION,
    },
    buffer::{
        Buffer,
        BufferOptions,
    },
    error::Error,
};

/// A leaf that drains a [`BufferedWriter`] into the actual byte destination.
///
/// Hooks receive the shared [`WriterState`] with the staging buffer already
/// detached, so `start_to_limit()` is zero and `limit_pos()` is the physical
/// destination position.
pub trait BufferedSink {
    /// Writes all of `src` to the destination, advancing `limit_pos` by
    /// `src.len()` on success.
    fn write_internal(&mut self, state: &mut WriterState, src: &[u8]) -> bool;

    /// Propagates a flush to the destination after staged data was written
    /// down.
    fn flush_internal(&mut self, state: &mut WriterState, flush_type: FlushType) -> bool {
        let _ = flush_type;
        state.ok()
    }

    fn supports_random_access(&mut self, state: &mut WriterState) -> bool {
        let _ = state;
        false
    }

    /// Repositions the destination; called with an empty staging buffer.
    fn seek_behind_buffer(&mut self, state: &mut WriterState, new_pos: u64) -> bool {
        let _ = new_pos;
        state.fail(Error::unimplemented("seek"))
    }

    fn size_behind_buffer(&mut self, state: &mut WriterState) -> Option<u64> {
        state.fail(Error::unimplemented("size"));
        None
    }

    fn truncate_behind_buffer(&mut self, state: &mut WriterState, new_size: u64) -> bool {
        let _ = new_size;
        state.fail(Error::unimplemented("truncate"))
    }

    fn done(&mut self, state: &mut WriterState) {
        let _ = state;
    }
}

impl<D: BufferedSink> BufferedSink for &mut D {
    #[inline]
    fn write_internal(&mut self, state: &mut WriterState, src: &[u8]) -> bool {
        D::write_internal(self, state, src)
    }

    #[inline]
    fn flush_internal(&mut self, state: &mut WriterState, flush_type: FlushType) -> bool {
        D::flush_internal(self, state, flush_type)
    }

    #[inline]
    fn supports_random_access(&mut self, state: &mut WriterState) -> bool {
        D::supports_random_access(self, state)
    }

    #[inline]
    fn seek_behind_buffer(&mut self, state: &mut WriterState, new_pos: u64) -> bool {
        D::seek_behind_buffer(self, state, new_pos)
    }

    #[inline]
    fn size_behind_buffer(&mut self, state: &mut WriterState) -> Option<u64> {
        D::size_behind_buffer(self, state)
    }

    #[inline]
    fn truncate_behind_buffer(&mut self, state: &mut WriterState, new_size: u64) -> bool {
        D::truncate_behind_buffer(self, state, new_size)
    }

    #[inline]
    fn done(&mut self, state: &mut WriterState) {
        D::done(self, state)
    }
}

/// A [`Writer`] that stages bytes in an owned buffer and hands them to a
/// [`BufferedSink`] in large runs.
///
/// The buffer target doubles on successive allocations up to the configured
/// maximum, biased downwards when a size hint says the stream is about to
/// end. Writes at least as large as a full buffer skip staging entirely.
#[derive(Debug)]
pub struct BufferedWriter<D> {
    state: WriterState,
    dest: D,
    options: BufferOptions,
    buffer_size: usize,
    size_hint: Option<u64>,
    spare: Buffer,
}

impl<D: BufferedSink> BufferedWriter<D> {
    pub fn new(dest: D) -> Self {
        Self::with_options(dest, BufferOptions::default(), None)
    }

    pub fn with_options(dest: D, options: BufferOptions, size_hint: Option<u64>) -> Self {
        Self::from_parts(WriterState::new(), dest, options, size_hint)
    }

    pub(crate) fn from_parts(
        state: WriterState,
        dest: D,
        options: BufferOptions,
        size_hint: Option<u64>,
    ) -> Self {
        Self {
            state,
            dest,
            options,
            buffer_size: options.min_buffer_size(),
            size_hint,
            spare: Buffer::new(),
        }
    }

    #[inline]
    pub fn dest(&self) -> &D {
        &self.dest
    }

    #[inline]
    pub fn dest_mut(&mut self) -> &mut D {
        &mut self.dest
    }

    /// Releases the destination. Staged but unflushed bytes are lost; call
    /// [`close`](Writer::close) or [`flush`](Writer::flush) first to keep
    /// them.
    pub fn into_dest(self) -> D {
        self.dest
    }

    /// Writes the staged bytes down and empties the window.
    fn sync_buffer(&mut self) -> bool {
        let (buffer, staged) = self.state.take_staged();
        let result = if staged == 0 {
            true
        }
        else if !self.state.ok() {
            false
        }
        else {
            self.dest
                .write_internal(&mut self.state, &buffer.as_slice()[..staged])
        };
        self.spare = buffer;
        result
    }

    /// Writes of at least this length go straight to the destination. Even
    /// with a partially filled buffer this keeps at least every other write
    /// at full buffer length.
    fn length_to_write_directly(&self) -> usize {
        if let Some(hint) = self.size_hint {
            let pos = self.state.pos();
            if pos < hint && (self.state.start_to_cursor() == 0 || self.state.limit_pos() < hint) {
                return self.buffer_size.min(to_length(hint - pos));
            }
        }
        self.buffer_size
    }

    /// Length for the next staging buffer: the doubling target, biased by
    /// how far the size hint says the stream still has to go.
    fn buffer_length(&mut self, min_length: usize) -> usize {
        let mut length = self.buffer_size;
        self.buffer_size = self
            .buffer_size
            .saturating_mul(2)
            .min(self.options.max_buffer_size());
        if let Some(hint) = self.size_hint {
            let start_pos = self.state.start_pos();
            if start_pos < hint {
                length = length.min(to_length(hint - start_pos));
            }
        }
        length.max(min_length)
    }
}

impl<D: BufferedSink> Writer for BufferedWriter<D> {
    #[inline]
    fn state(&self) -> &WriterState {
        &self.state
    }

    #[inline]
    fn state_mut(&mut self) -> &mut WriterState {
        &mut self.state
    }

    fn push_slow(&mut self, min_length: usize, recommended_length: usize) -> bool {
        debug_assert!(self.state.available() < min_length);
        let _ = recommended_length;
        if !self.sync_buffer() {
            return false;
        }
        if !self.state.ok() {
            return false;
        }
        let start_pos = self.state.start_pos();
        if min_length as u64 > MAX_POSITION - start_pos {
            return self.state.fail(Error::overflow());
        }
        let length = self.buffer_length(min_length);
        let mut buffer = std::mem::take(&mut self.spare);
        buffer.reset(length);
        let limit = buffer
            .capacity()
            .min(length.saturating_add(length))
            .min(to_length(MAX_POSITION - start_pos));
        self.state.set_owned_window(buffer, limit, 0);
        self.state.set_limit_pos(start_pos + limit as u64);
        true
    }

    fn write_slow(&mut self, src: &[u8]) -> bool {
        debug_assert!(self.state.available() < src.len());
        if src.len() >= self.length_to_write_directly() {
            if !self.sync_buffer() {
                return false;
            }
            if !self.state.ok() {
                return false;
            }
            if src.len() as u64 > MAX_POSITION - self.state.start_pos() {
                return self.state.fail(Error::overflow());
            }
            return self.dest.write_internal(&mut self.state, src);
        }
        write_slow_by_pushing(self, src)
    }

    fn flush_impl(&mut self, flush_type: FlushType) -> bool {
        if !self.sync_buffer() {
            return false;
        }
        self.dest.flush_internal(&mut self.state, flush_type)
    }

    fn seek_slow(&mut self, new_pos: u64) -> bool {
        if !self.sync_buffer() {
            return false;
        }
        self.dest.seek_behind_buffer(&mut self.state, new_pos)
    }

    fn size_impl(&mut self) -> Option<u64> {
        if !self.sync_buffer() {
            return None;
        }
        self.dest.size_behind_buffer(&mut self.state)
    }

    fn truncate_impl(&mut self, new_size: u64) -> bool {
        if !self.sync_buffer() {
            return false;
        }
        self.dest.truncate_behind_buffer(&mut self.state, new_size)
    }

    fn supports_random_access(&mut self) -> bool {
        self.dest.supports_random_access(&mut self.state)
    }

    fn done(&mut self) {
        let _ = self.sync_buffer();
        self.dest.done(&mut self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every run handed to `write_internal`.
    #[derive(Default)]
    struct RecordingSink {
        runs: Vec<Vec<u8>>,
    }

    impl RecordingSink {
        fn contents(&self) -> Vec<u8> {
            self.runs.concat()
        }
    }

    impl BufferedSink for RecordingSink {
        fn write_internal(&mut self, state: &mut WriterState, src: &[u8]) -> bool {
            self.runs.push(src.to_vec());
            state.move_limit_pos(src.len());
            true
        }
    }

    #[test]
    fn staged_writes_reach_the_sink_in_order() {
        let options = BufferOptions::new().with_buffer_size(8);
        let mut writer = BufferedWriter::with_options(RecordingSink::default(), options, None);
        for chunk in [&b"ab"[..], b"cdefg", b"hij", b"klmnopq"] {
            assert!(writer.write(chunk));
        }
        assert!(writer.close());
        assert_eq!(writer.into_dest().contents(), b"abcdefghijklmnopq");
    }

    #[test]
    fn large_writes_bypass_the_buffer() {
        let options = BufferOptions::new().with_buffer_size(8);
        let mut writer = BufferedWriter::with_options(RecordingSink::default(), options, None);
        assert!(writer.write(b"xy"));
        let big = vec![7u8; 64];
        assert!(writer.write(&big));
        assert!(writer.close());
        let dest = writer.into_dest();
        // The staged prefix was flushed first, then the big run went down
        // whole.
        assert_eq!(dest.runs[0], b"xy");
        assert_eq!(dest.runs[1], big);
    }

    #[test]
    fn flush_drains_the_buffer() {
        let mut writer = BufferedWriter::new(RecordingSink::default());
        assert!(writer.write(b"abc"));
        assert!(writer.flush(FlushType::FromObject));
        assert_eq!(writer.dest().contents(), b"abc");
        assert_eq!(writer.pos(), 3);
    }

    #[test]
    fn position_overflow_is_resource_exhaustion() {
        use crate::arith::MAX_POSITION;

        let mut state = WriterState::new();
        state.set_limit_pos(MAX_POSITION);
        let mut writer = BufferedWriter::from_parts(
            state,
            RecordingSink::default(),
            BufferOptions::default(),
            None,
        );
        assert!(!writer.write(b"x"));
        assert_eq!(
            writer.error().map(|e| e.kind()),
            Some(crate::error::ErrorKind::ResourceExhausted)
        );
    }

    #[test]
    fn size_hint_bounds_the_first_buffer() {
        let options = BufferOptions::new()
            .with_min_buffer_size(1024)
            .with_max_buffer_size(4096);
        let mut writer =
            BufferedWriter::with_options(RecordingSink::default(), options, Some(10));
        assert!(writer.push(1, 1));
        // The window should not stretch far past the hinted size.
        assert!(writer.available() <= 20);
    }
}
