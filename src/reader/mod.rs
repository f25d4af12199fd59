pub mod buffered;
pub mod bytes;
pub mod fragments;
pub mod pullable;
pub mod stream;

use std::fmt;

use ::bytes::{
    Bytes,
    BytesMut,
};

use crate::{
    arith::to_length,
    buffer::Buffer,
    error::Error,
    object::ObjectState,
    writer::Writer,
};

/// How far a [`Reader::sync`] must propagate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncType {
    /// Make the reader's own buffering consistent with the source.
    #[default]
    FromObject,

    /// Additionally make state shared within the process consistent.
    FromProcess,

    /// Additionally make state shared with other processes consistent.
    FromMachine,
}

/// The byte region a window currently points into.
///
/// Swapping regions is a cheap move, which is what lets the scratch layer and
/// buffered refills exchange whole windows without copying.
#[derive(Default)]
pub(crate) enum Region {
    #[default]
    Empty,
    Owned(Buffer),
    Shared(Bytes),
}

impl Region {
    #[inline]
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Empty => &[],
            Self::Owned(buffer) => buffer.as_slice(),
            Self::Shared(bytes) => bytes,
        }
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Owned(buffer) => write!(f, "Owned({})", buffer.capacity()),
            Self::Shared(bytes) => write!(f, "Shared({})", bytes.len()),
        }
    }
}

/// A window taken out of a [`ReaderState`], restorable later.
#[derive(Debug)]
pub(crate) struct SavedWindow {
    pub(crate) region: Region,
    pub(crate) cursor: usize,
    pub(crate) limit: usize,
}

/// Buffer-pointer state shared by every reader: a byte region with cursor and
/// limit offsets, the logical position of the limit, and the lifecycle state.
///
/// The region origin plays the role of the `start` pointer, so
/// `start_to_cursor()` is just `cursor` and `start_to_limit()` is `limit`.
/// Invariant: `cursor <= limit <= region length`.
#[derive(Debug)]
pub struct ReaderState {
    region: Region,
    cursor: usize,
    limit: usize,
    limit_pos: u64,
    object: ObjectState,
}

impl Default for ReaderState {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderState {
    /// An open state with no window yet.
    #[inline]
    pub fn new() -> Self {
        Self {
            region: Region::Empty,
            cursor: 0,
            limit: 0,
            limit_pos: 0,
            object: ObjectState::open(),
        }
    }

    #[inline]
    pub fn ok(&self) -> bool {
        self.object.ok()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.object.is_open()
    }

    #[inline]
    pub fn error(&self) -> Option<&Error> {
        self.object.error()
    }

    /// Records a terminal failure and drops the window, preserving `pos()`,
    /// so no further bytes can be taken from a failed reader. Always returns
    /// `false`.
    pub fn fail(&mut self, error: Error) -> bool {
        self.clear_window();
        self.object.fail(error)
    }

    #[inline]
    pub(crate) fn mark_closed(&mut self) {
        self.object.mark_closed();
    }

    /// Unread bytes between the cursor and the limit.
    #[inline]
    pub fn available(&self) -> usize {
        self.limit - self.cursor
    }

    /// Bytes already consumed from the current window.
    #[inline]
    pub fn start_to_cursor(&self) -> usize {
        self.cursor
    }

    /// Length of the current window.
    #[inline]
    pub fn start_to_limit(&self) -> usize {
        self.limit
    }

    /// Logical position of the first unread byte past the limit.
    #[inline]
    pub fn limit_pos(&self) -> u64 {
        self.limit_pos
    }

    /// Logical position of the cursor.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.limit_pos - self.available() as u64
    }

    /// Logical position of the window origin.
    #[inline]
    pub fn start_pos(&self) -> u64 {
        self.limit_pos - self.limit as u64
    }

    /// The unread bytes of the window.
    #[inline]
    pub fn chunk(&self) -> &[u8] {
        &self.region.as_slice()[self.cursor..self.limit]
    }

    #[inline]
    pub fn move_cursor(&mut self, length: usize) {
        debug_assert!(length <= self.available());
        self.cursor += length;
    }

    #[inline]
    pub fn set_cursor(&mut self, cursor: usize) {
        debug_assert!(cursor <= self.limit);
        self.cursor = cursor;
    }

    #[inline]
    pub fn set_limit_pos(&mut self, limit_pos: u64) {
        self.limit_pos = limit_pos;
    }

    #[inline]
    pub fn move_limit_pos(&mut self, length: usize) {
        self.limit_pos += length as u64;
    }

    /// Installs refcounted bytes as the window. `limit_pos` is untouched and
    /// must be adjusted by the caller to the position at the end of the new
    /// window.
    pub fn set_shared_window(&mut self, bytes: Bytes, cursor: usize) {
        debug_assert!(cursor <= bytes.len());
        self.limit = bytes.len();
        self.cursor = cursor;
        self.region = Region::Shared(bytes);
    }

    /// Installs an owned buffer as the window, exposing its first `limit`
    /// bytes. `limit_pos` is untouched, as with
    /// [`set_shared_window`](Self::set_shared_window).
    pub fn set_owned_window(&mut self, buffer: Buffer, limit: usize, cursor: usize) {
        debug_assert!(limit <= buffer.capacity());
        debug_assert!(cursor <= limit);
        self.limit = limit;
        self.cursor = cursor;
        self.region = Region::Owned(buffer);
    }

    /// Drops the window, pinning `limit_pos` to the cursor position so
    /// `pos()` is preserved.
    pub fn clear_window(&mut self) {
        self.limit_pos = self.pos();
        self.cursor = 0;
        self.limit = 0;
        self.region = Region::Empty;
    }

    /// Drops the window without touching `limit_pos`; `pos()` jumps forward
    /// to it. Used before repositioning the source, which is physically at
    /// `limit_pos`.
    pub(crate) fn drop_window(&mut self) {
        self.cursor = 0;
        self.limit = 0;
        self.region = Region::Empty;
    }

    /// Takes the whole window out, leaving an empty one. `limit_pos` is
    /// untouched.
    pub(crate) fn save_window(&mut self) -> SavedWindow {
        SavedWindow {
            region: std::mem::take(&mut self.region),
            cursor: std::mem::take(&mut self.cursor),
            limit: std::mem::take(&mut self.limit),
        }
    }

    pub(crate) fn restore_window(&mut self, saved: SavedWindow) {
        self.region = saved.region;
        self.cursor = saved.cursor;
        self.limit = saved.limit;
    }

    /// Copies `dest.len()` bytes out of the window, advancing the cursor.
    #[inline]
    pub(crate) fn read_from_window(&mut self, dest: &mut [u8]) {
        debug_assert!(dest.len() <= self.available());
        dest.copy_from_slice(&self.chunk()[..dest.len()]);
        self.cursor += dest.len();
    }
}

/// A source of bytes with buffered fast paths.
///
/// Every operation has an inline fast path that succeeds when enough bytes
/// already sit between the cursor and the limit, and otherwise delegates to a
/// slow-path hook. Implementors provide [`pull_slow`](Reader::pull_slow) and
/// override the remaining hooks where they can do better than the generic
/// fallbacks.
///
/// A reader is either *ok* or carries a sticky terminal failure. Running out
/// of bytes is not a failure: operations return `false` while
/// [`ok`](Reader::ok) stays true, and [`pos`](Reader::pos) tells how far they
/// got.
pub trait Reader {
    fn state(&self) -> &ReaderState;

    fn state_mut(&mut self) -> &mut ReaderState;

    /// Makes at least `min_length` bytes available in the window, targeting
    /// `recommended_length`. Returns `false` if the stream ends first or on
    /// failure.
    #[inline]
    fn pull(&mut self, min_length: usize, recommended_length: usize) -> bool {
        if self.state().available() >= min_length {
            true
        }
        else {
            self.pull_slow(min_length, recommended_length)
        }
    }

    /// Reads exactly `dest.len()` bytes, advancing the cursor. On a short
    /// read the prefix of `dest` up to the end of the stream is filled and
    /// `false` is returned.
    #[inline]
    fn read(&mut self, dest: &mut [u8]) -> bool {
        if dest.len() <= self.state().available() {
            self.state_mut().read_from_window(dest);
            true
        }
        else {
            self.read_slow(dest)
        }
    }

    /// Reads exactly `length` bytes, appending them to `dest`.
    #[inline]
    fn read_bytes(&mut self, length: usize, dest: &mut BytesMut) -> bool {
        if length <= self.state().available() {
            let state = self.state_mut();
            dest.extend_from_slice(&state.chunk()[..length]);
            state.move_cursor(length);
            true
        }
        else {
            self.read_bytes_slow(length, dest)
        }
    }

    /// Transfers exactly `length` bytes to `dest`. A short transfer can be
    /// told apart by comparing `dest`'s position before and after.
    #[inline]
    fn copy_to(&mut self, length: u64, dest: &mut dyn Writer) -> bool {
        if length <= self.state().available() as u64 {
            let length = length as usize;
            let written = dest.write(&self.state().chunk()[..length]);
            self.state_mut().move_cursor(length);
            written
        }
        else {
            self.copy_slow(length, dest)
        }
    }

    /// Advances over `length` bytes without exposing them.
    #[inline]
    fn skip(&mut self, length: u64) -> bool {
        if length <= self.state().available() as u64 {
            self.state_mut().move_cursor(length as usize);
            true
        }
        else {
            self.seek(self.state().pos().saturating_add(length))
        }
    }

    /// Repositions the cursor to `new_pos`. Seeking backwards requires
    /// [`supports_rewind`](Reader::supports_rewind); seeking to an arbitrary
    /// position requires
    /// [`supports_random_access`](Reader::supports_random_access). Seeking
    /// past the end stops at the end and returns `false` with the reader
    /// still ok.
    #[inline]
    fn seek(&mut self, new_pos: u64) -> bool {
        let state = self.state();
        if new_pos >= state.start_pos() && new_pos <= state.limit_pos() {
            let limit = state.start_to_limit();
            let cursor = limit - (state.limit_pos() - new_pos) as usize;
            self.state_mut().set_cursor(cursor);
            true
        }
        else {
            self.seek_slow(new_pos)
        }
    }

    /// Advice that the caller will soon read `length` bytes; may buffer ahead
    /// but reports nothing.
    #[inline]
    fn read_hint(&mut self, length: usize) {
        if length > self.state().available() {
            self.read_hint_slow(length);
        }
    }

    /// Total stream size, if known or discoverable. Returns `None` without
    /// failing when the size cannot be determined.
    #[inline]
    fn size(&mut self) -> Option<u64> {
        self.size_impl()
    }

    /// Pushes any buffered cursor advance back to the source, for sources
    /// shared with external readers.
    #[inline]
    fn sync(&mut self, sync_type: SyncType) -> bool {
        self.sync_impl(sync_type)
    }

    /// Closes the reader, releasing buffers. Idempotent. Returns whether the
    /// reader is failure-free.
    fn close(&mut self) -> bool {
        if self.state().is_open() {
            self.done();
            self.state_mut().clear_window();
            self.state_mut().mark_closed();
        }
        self.state().error().is_none()
    }

    // Cheap queries.

    #[inline]
    fn pos(&self) -> u64 {
        self.state().pos()
    }

    #[inline]
    fn available(&self) -> usize {
        self.state().available()
    }

    #[inline]
    fn ok(&self) -> bool {
        self.state().ok()
    }

    #[inline]
    fn error(&self) -> Option<&Error> {
        self.state().error()
    }

    /// Whether seeking backwards within already-read territory can work.
    fn supports_rewind(&mut self) -> bool {
        self.supports_random_access()
    }

    /// Whether seeking to arbitrary positions can work.
    fn supports_random_access(&mut self) -> bool {
        false
    }

    // Slow paths.

    /// Refills the window so that at least `min_length` bytes are available,
    /// or reports the end of the stream or a failure. Called only when the
    /// fast path failed.
    fn pull_slow(&mut self, min_length: usize, recommended_length: usize) -> bool;

    fn read_slow(&mut self, dest: &mut [u8]) -> bool {
        read_slow_by_pulling(self, dest)
    }

    fn read_bytes_slow(&mut self, length: usize, dest: &mut BytesMut) -> bool {
        let mut remaining = length;
        while remaining > 0 {
            if !self.pull(1, remaining) {
                return false;
            }
            let state = self.state_mut();
            let n = state.available().min(remaining);
            dest.extend_from_slice(&state.chunk()[..n]);
            state.move_cursor(n);
            remaining -= n;
        }
        true
    }

    fn copy_slow(&mut self, length: u64, dest: &mut dyn Writer) -> bool {
        copy_slow_by_pulling(self, length, dest)
    }

    /// Called when `new_pos` falls outside the window. The default can only
    /// seek forwards, by pulling and discarding.
    fn seek_slow(&mut self, new_pos: u64) -> bool {
        if new_pos < self.state().start_pos() {
            return self
                .state_mut()
                .fail(Error::unimplemented("seek backwards"));
        }
        seek_forward_by_pulling(self, new_pos)
    }

    fn read_hint_slow(&mut self, length: usize) {
        let _ = length;
    }

    fn size_impl(&mut self) -> Option<u64> {
        None
    }

    fn sync_impl(&mut self, sync_type: SyncType) -> bool {
        let _ = sync_type;
        self.state().ok()
    }

    /// Close hook, called once from [`close`](Reader::close) while the reader
    /// is still open.
    fn done(&mut self) {}
}

pub(crate) fn read_slow_by_pulling<R: Reader + ?Sized>(reader: &mut R, dest: &mut [u8]) -> bool {
    let mut offset = 0;
    loop {
        let state = reader.state_mut();
        let n = state.available().min(dest.len() - offset);
        if n > 0 {
            state.read_from_window(&mut dest[offset..offset + n]);
            offset += n;
        }
        if offset == dest.len() {
            return true;
        }
        if !reader.pull(1, dest.len() - offset) {
            return false;
        }
    }
}

pub(crate) fn copy_slow_by_pulling<R: Reader + ?Sized>(
    reader: &mut R,
    length: u64,
    dest: &mut dyn Writer,
) -> bool {
    let mut remaining = length;
    loop {
        let n = (reader.state().available() as u64).min(remaining) as usize;
        if n > 0 {
            let written = dest.write(&reader.state().chunk()[..n]);
            reader.state_mut().move_cursor(n);
            if !written {
                return false;
            }
            remaining -= n as u64;
        }
        if remaining == 0 {
            return true;
        }
        if !reader.pull(1, to_length(remaining)) {
            return false;
        }
    }
}

/// Seeks forwards by pulling and discarding until `new_pos` is inside the
/// window.
pub(crate) fn seek_forward_by_pulling<R: Reader + ?Sized>(reader: &mut R, new_pos: u64) -> bool {
    debug_assert!(new_pos >= reader.state().start_pos());
    loop {
        let state = reader.state_mut();
        if new_pos <= state.limit_pos() {
            let limit = state.start_to_limit();
            let cursor = limit - (state.limit_pos() - new_pos) as usize;
            state.set_cursor(cursor);
            return true;
        }
        let available = state.available();
        state.move_cursor(available);
        if !reader.pull(1, to_length(new_pos - reader.state().limit_pos())) {
            return false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        bytes::BytesReader,
        Reader,
    };
    use crate::error::ErrorKind;

    #[test]
    fn short_read_fills_the_prefix_and_stays_ok() {
        let mut reader = BytesReader::new(&b"hello"[..]);
        let mut dest = [0; 10];
        assert!(!reader.read(&mut dest));
        assert!(reader.ok());
        assert_eq!(reader.pos(), 5);
        assert_eq!(&dest[..5], b"hello");
    }

    #[test]
    fn pos_is_monotone_across_reads_and_failed_pulls() {
        let mut reader = BytesReader::new(&b"abcdef"[..]);
        let mut last = reader.pos();
        let mut dest = [0; 4];
        while reader.read(&mut dest[..1]) {
            assert!(reader.pos() >= last);
            last = reader.pos();
        }
        assert!(!reader.pull(1, 1));
        assert_eq!(reader.pos(), last);
    }

    #[test]
    fn failed_reader_short_circuits_without_moving() {
        let mut reader = BytesReader::new(&b"abc"[..]);
        reader
            .state_mut()
            .fail(crate::Error::unimplemented("anything"));
        let pos = reader.pos();
        let mut dest = [0; 2];
        assert!(!reader.read(&mut dest));
        assert!(!reader.pull(1, 1));
        assert!(!reader.skip(1));
        assert_eq!(reader.pos(), pos);
        assert_eq!(reader.error().map(|e| e.kind()), Some(ErrorKind::Unimplemented));
    }

    #[test]
    fn seek_within_the_window_is_exact() {
        let mut reader = BytesReader::new(&b"abcdef"[..]);
        assert!(reader.seek(4));
        assert_eq!(reader.pos(), 4);
        let mut dest = [0; 2];
        assert!(reader.read(&mut dest));
        assert_eq!(&dest, b"ef");
        assert!(reader.seek(1));
        assert!(reader.read(&mut dest));
        assert_eq!(&dest, b"bc");
    }

    #[test]
    fn skip_advances_over_bytes() {
        let mut reader = BytesReader::new(&b"abcdef"[..]);
        assert!(reader.skip(3));
        let mut dest = [0; 1];
        assert!(reader.read(&mut dest));
        assert_eq!(&dest, b"d");
        assert!(!reader.skip(10));
        assert!(reader.ok());
        assert_eq!(reader.pos(), 6);
    }

    #[test]
    fn close_is_idempotent_and_preserves_pos() {
        let mut reader = BytesReader::new(&b"abc"[..]);
        let mut dest = [0; 2];
        assert!(reader.read(&mut dest));
        assert!(reader.close());
        assert!(reader.close());
        assert_eq!(reader.pos(), 2);
        assert!(!reader.read(&mut dest));
    }
}
