use super::{
    read_slow_by_pulling,
    seek_forward_by_pulling,
    Reader,
    ReaderState,
    Region,
    SyncType,
};
use crate::{
    arith::to_length,
    buffer::{
        Buffer,
        BufferOptions,
    },
    error::Error,
};

/// A leaf that feeds a [`BufferedReader`] from the actual byte source.
///
/// Hooks receive the shared [`ReaderState`] so they can move `limit_pos`,
/// record a terminal failure, and observe the logical position. They are
/// called with the read buffer already detached, never through it.
pub trait BufferedSource {
    /// Reads between `min_length` and `max_length` bytes into `dest`,
    /// advancing `limit_pos` by each fragment read. Returns whether at least
    /// `min_length` bytes were read; a short count with the state still ok
    /// means the stream ended.
    fn read_internal(
        &mut self,
        state: &mut ReaderState,
        min_length: usize,
        max_length: usize,
        dest: &mut [u8],
    ) -> bool;

    /// Total stream size to bias buffer sizing, if known.
    fn size_hint(&self, state: &ReaderState) -> Option<u64> {
        let _ = state;
        None
    }

    fn supports_random_access(&mut self, state: &mut ReaderState) -> bool {
        let _ = state;
        false
    }

    /// Repositions the source to `new_pos`, setting `limit_pos` accordingly.
    /// Called with an empty buffer.
    fn seek_behind_buffer(&mut self, state: &mut ReaderState, new_pos: u64) -> bool {
        let _ = new_pos;
        state.fail(Error::unimplemented("seek"))
    }

    /// Total stream size, if discoverable. Must leave the source positioned
    /// at `limit_pos`.
    fn size(&mut self, state: &mut ReaderState) -> Option<u64> {
        let _ = state;
        None
    }

    fn sync(&mut self, state: &mut ReaderState, sync_type: SyncType) -> bool {
        let _ = sync_type;
        state.ok()
    }

    fn done(&mut self, state: &mut ReaderState) {
        let _ = state;
    }
}

impl<S: BufferedSource> BufferedSource for &mut S {
    #[inline]
    fn read_internal(
        &mut self,
        state: &mut ReaderState,
        min_length: usize,
        max_length: usize,
        dest: &mut [u8],
    ) -> bool {
        S::read_internal(self, state, min_length, max_length, dest)
    }

    #[inline]
    fn size_hint(&self, state: &ReaderState) -> Option<u64> {
        S::size_hint(self, state)
    }

    #[inline]
    fn supports_random_access(&mut self, state: &mut ReaderState) -> bool {
        S::supports_random_access(self, state)
    }

    #[inline]
    fn seek_behind_buffer(&mut self, state: &mut ReaderState, new_pos: u64) -> bool {
        S::seek_behind_buffer(self, state, new_pos)
    }

    #[inline]
    fn size(&mut self, state: &mut ReaderState) -> Option<u64> {
        S::size(self, state)
    }

    #[inline]
    fn sync(&mut self, state: &mut ReaderState, sync_type: SyncType) -> bool {
        S::sync(self, state, sync_type)
    }

    #[inline]
    fn done(&mut self, state: &mut ReaderState) {
        S::done(self, state)
    }
}

/// A [`Reader`] that owns a contiguous buffer and refills it from a
/// [`BufferedSource`].
///
/// The buffer starts at the configured minimum size and doubles on each
/// refill up to the maximum, clamped by the source's size hint. On a refill
/// the unread suffix is kept and moved to the front.
#[derive(Debug)]
pub struct BufferedReader<S> {
    state: ReaderState,
    src: S,
    options: BufferOptions,
    next_buffer_size: usize,
}

impl<S: BufferedSource> BufferedReader<S> {
    pub fn new(src: S) -> Self {
        Self::with_options(src, BufferOptions::default())
    }

    pub fn with_options(src: S, options: BufferOptions) -> Self {
        Self::from_parts(ReaderState::new(), src, options)
    }

    pub(crate) fn from_parts(state: ReaderState, src: S, options: BufferOptions) -> Self {
        Self {
            state,
            src,
            options,
            next_buffer_size: options.min_buffer_size(),
        }
    }

    #[inline]
    pub fn src(&self) -> &S {
        &self.src
    }

    #[inline]
    pub fn src_mut(&mut self) -> &mut S {
        &mut self.src
    }

    /// Releases the source. Unread buffered bytes are lost.
    pub fn into_src(self) -> S {
        self.src
    }

    /// How many bytes the next refill should ask for.
    fn buffer_length(&mut self, min_length: usize, recommended_length: usize) -> usize {
        let mut length = self.next_buffer_size;
        self.next_buffer_size = self
            .next_buffer_size
            .saturating_mul(2)
            .min(self.options.max_buffer_size());
        if min_length == 1 {
            // A plain `pull(1, ..)` may grow the buffer opportunistically to
            // the full recommended length.
            length = length.max(recommended_length.min(self.options.max_buffer_size()));
        }
        if let Some(total) = self.src.size_hint(&self.state) {
            let remaining = to_length(total.saturating_sub(self.state.limit_pos()));
            length = length.min(remaining.max(min_length));
        }
        length.max(min_length)
    }
}

impl<S: BufferedSource> Reader for BufferedReader<S> {
    #[inline]
    fn state(&self) -> &ReaderState {
        &self.state
    }

    #[inline]
    fn state_mut(&mut self) -> &mut ReaderState {
        &mut self.state
    }

    fn pull_slow(&mut self, min_length: usize, recommended_length: usize) -> bool {
        debug_assert!(self.state.available() < min_length);
        if !self.state.ok() {
            return false;
        }
        let available = self.state.available();
        let min_to_read = min_length - available;
        let grow = self.buffer_length(
            min_to_read,
            recommended_length.max(min_length) - available,
        );
        let capacity = available + grow;

        // Move the unread suffix to the front of the (possibly new) buffer.
        let saved = self.state.save_window();
        let mut buffer = match saved.region {
            Region::Owned(buffer) => buffer,
            _ => Buffer::new(),
        };
        if buffer.capacity() < capacity {
            let mut fresh = Buffer::with_capacity(capacity);
            fresh.as_mut_slice()[..available]
                .copy_from_slice(&buffer.as_slice()[saved.cursor..saved.limit]);
            buffer = fresh;
        }
        else if available > 0 && saved.cursor > 0 {
            buffer.as_mut_slice().copy_within(saved.cursor..saved.limit, 0);
        }

        let read_max = buffer.capacity() - available;
        let before = self.state.limit_pos();
        let _ = self.src.read_internal(
            &mut self.state,
            min_to_read,
            read_max,
            &mut buffer.as_mut_slice()[available..],
        );
        if !self.state.ok() {
            // Bytes that arrived before the failure are discarded; the
            // position stays where the caller last saw it.
            self.state.set_limit_pos(before);
            return false;
        }
        let read = (self.state.limit_pos() - before) as usize;
        self.state.set_owned_window(buffer, available + read, 0);
        self.state.available() >= min_length
    }

    fn read_slow(&mut self, dest: &mut [u8]) -> bool {
        debug_assert!(self.state.available() < dest.len());
        if !self.state.ok() {
            return false;
        }
        // Big reads bypass the buffer to skip a copy.
        if dest.len() - self.state.available() >= self.next_buffer_size {
            let available = self.state.available();
            self.state.read_from_window(&mut dest[..available]);
            self.state.clear_window();
            let remaining = dest.len() - available;
            let full = self.src.read_internal(
                &mut self.state,
                remaining,
                remaining,
                &mut dest[available..],
            );
            return full && self.state.ok();
        }
        read_slow_by_pulling(self, dest)
    }

    fn seek_slow(&mut self, new_pos: u64) -> bool {
        debug_assert!(
            new_pos < self.state.start_pos() || new_pos > self.state.limit_pos()
        );
        if !self.state.ok() {
            return false;
        }
        if new_pos > self.state.limit_pos() && !self.src.supports_random_access(&mut self.state) {
            // Forward seeks need no support from the source.
            if !self.state.ok() {
                return false;
            }
            return seek_forward_by_pulling(self, new_pos);
        }
        if !self.state.ok() {
            return false;
        }
        self.state.drop_window();
        self.src.seek_behind_buffer(&mut self.state, new_pos)
    }

    fn read_hint_slow(&mut self, length: usize) {
        if self.state.ok() {
            let _ = self.pull_slow(length, length);
        }
    }

    fn size_impl(&mut self) -> Option<u64> {
        self.src.size(&mut self.state)
    }

    fn sync_impl(&mut self, sync_type: SyncType) -> bool {
        if !self.state.ok() {
            return false;
        }
        if self.state.available() > 0 && self.src.supports_random_access(&mut self.state) {
            let new_pos = self.state.pos();
            self.state.drop_window();
            if !self.src.seek_behind_buffer(&mut self.state, new_pos) {
                return false;
            }
        }
        self.src.sync(&mut self.state, sync_type)
    }

    fn supports_random_access(&mut self) -> bool {
        self.src.supports_random_access(&mut self.state)
    }

    fn done(&mut self) {
        self.src.done(&mut self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferOptions;

    /// Feeds fixed-size slices of a byte string, at most one per call.
    struct SlicedSource {
        data: Vec<u8>,
        step: usize,
        calls: usize,
    }

    impl SlicedSource {
        fn new(data: &[u8], step: usize) -> Self {
            Self {
                data: data.to_vec(),
                step,
                calls: 0,
            }
        }
    }

    impl BufferedSource for SlicedSource {
        fn read_internal(
            &mut self,
            state: &mut ReaderState,
            min_length: usize,
            max_length: usize,
            dest: &mut [u8],
        ) -> bool {
            self.calls += 1;
            let mut read = 0;
            while read < min_length {
                let offset = state.limit_pos() as usize;
                let n = self.step.min(self.data.len() - offset).min(max_length - read);
                if n == 0 {
                    return false;
                }
                dest[read..read + n].copy_from_slice(&self.data[offset..offset + n]);
                state.move_limit_pos(n);
                read += n;
            }
            true
        }
    }

    #[test]
    fn refills_keep_the_unread_suffix() {
        let data: Vec<u8> = (0..200u8).collect();
        let options = BufferOptions::new().with_buffer_size(16);
        let mut reader = BufferedReader::with_options(SlicedSource::new(&data, 7), options);
        let mut out = Vec::new();
        let mut dest = [0u8; 13];
        loop {
            let before = reader.pos();
            if reader.read(&mut dest) {
                out.extend_from_slice(&dest);
            }
            else {
                // The short read delivered the tail into the prefix.
                let got = (reader.pos() - before) as usize;
                out.extend_from_slice(&dest[..got]);
                break;
            }
        }
        assert_eq!(out, data);
    }

    #[test]
    fn big_reads_bypass_the_buffer() {
        let data: Vec<u8> = (0..255u8).collect();
        let options = BufferOptions::new().with_buffer_size(8);
        let mut reader = BufferedReader::with_options(SlicedSource::new(&data, 255), options);
        let mut dest = vec![0u8; 200];
        assert!(reader.read(&mut dest));
        assert_eq!(&dest[..], &data[..200]);
        // The direct read went through a single source call.
        assert_eq!(reader.src().calls, 1);
        assert_eq!(reader.pos(), 200);
    }

    #[test]
    fn buffer_doubles_up_to_the_cap() {
        let data = vec![0u8; 4096];
        let options = BufferOptions::new()
            .with_min_buffer_size(16)
            .with_max_buffer_size(64);
        let mut reader = BufferedReader::with_options(SlicedSource::new(&data, 4096), options);
        assert!(reader.pull(1, 1));
        let first = reader.available();
        assert!(first >= 16);
        reader.state_mut().move_cursor(first);
        assert!(reader.pull(1, 1));
        assert!(reader.available() >= first);
    }

    #[test]
    fn seek_forward_without_random_access_drains() {
        let data: Vec<u8> = (0..100u8).collect();
        let options = BufferOptions::new().with_buffer_size(8);
        let mut reader = BufferedReader::with_options(SlicedSource::new(&data, 5), options);
        assert!(reader.seek(42));
        assert_eq!(reader.pos(), 42);
        let mut dest = [0u8; 1];
        assert!(reader.read(&mut dest));
        assert_eq!(dest[0], 42);
    }

    #[test]
    fn seek_backwards_fails_without_support() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut reader = BufferedReader::new(SlicedSource::new(&data, 100));
        let mut dest = [0u8; 10];
        assert!(reader.read(&mut dest));
        // In-buffer rewind still works.
        assert!(reader.seek(0));
        // The whole stream is buffered here, so force a real backward seek.
        let mut reader = BufferedReader::with_options(
            SlicedSource::new(&data, 4),
            BufferOptions::new().with_buffer_size(4),
        );
        assert!(reader.seek(50));
        assert!(!reader.seek(2));
        assert!(!reader.ok());
    }
}
