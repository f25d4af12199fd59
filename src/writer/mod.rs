pub mod buffered;
pub mod bytes;
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
    reader::Reader,
};

/// How durable a [`Writer::flush`] must be before it reports success.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlushType {
    /// Data is pushed out of the writer's own buffers.
    #[default]
    FromObject,

    /// Data additionally survives the process, e.g. reaches the OS.
    FromProcess,

    /// Data additionally survives the machine, e.g. reaches stable storage.
    FromMachine,
}

/// The byte region a writer window currently points into.
#[derive(Default)]
pub(crate) enum WriteRegion {
    #[default]
    Empty,
    Owned(Buffer),
    Dest(BytesMut),
}

impl WriteRegion {
    #[inline]
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Empty => &[],
            Self::Owned(buffer) => buffer.as_slice(),
            Self::Dest(bytes) => bytes,
        }
    }

    #[inline]
    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Self::Empty => &mut [],
            Self::Owned(buffer) => buffer.as_mut_slice(),
            Self::Dest(bytes) => bytes,
        }
    }
}

impl fmt::Debug for WriteRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Owned(buffer) => write!(f, "Owned({})", buffer.capacity()),
            Self::Dest(bytes) => write!(f, "Dest({})", bytes.len()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct SavedWriteWindow {
    pub(crate) region: WriteRegion,
    pub(crate) cursor: usize,
    pub(crate) limit: usize,
}

/// Buffer-pointer state shared by every writer, mirroring
/// [`ReaderState`](crate::reader::ReaderState): `cursor..limit` is writable
/// space, `limit_pos` is the logical position of the first writable byte past
/// the limit.
#[derive(Debug)]
pub struct WriterState {
    region: WriteRegion,
    cursor: usize,
    limit: usize,
    limit_pos: u64,
    object: ObjectState,
}

impl Default for WriterState {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl WriterState {
    #[inline]
    pub fn new() -> Self {
        Self {
            region: WriteRegion::Empty,
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
    /// so a failed writer stages nothing further. Always returns `false`.
    pub fn fail(&mut self, error: Error) -> bool {
        self.clear_window();
        self.object.fail(error)
    }

    #[inline]
    pub(crate) fn mark_closed(&mut self) {
        self.object.mark_closed();
    }

    /// Writable space between the cursor and the limit.
    #[inline]
    pub fn available(&self) -> usize {
        self.limit - self.cursor
    }

    /// Bytes already staged in the current window.
    #[inline]
    pub fn start_to_cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn start_to_limit(&self) -> usize {
        self.limit
    }

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

    /// The staged bytes of the window.
    #[inline]
    pub fn written(&self) -> &[u8] {
        &self.region.as_slice()[..self.cursor]
    }

    /// The writable bytes of the window.
    #[inline]
    pub fn chunk_mut(&mut self) -> &mut [u8] {
        let (cursor, limit) = (self.cursor, self.limit);
        &mut self.region.as_mut_slice()[cursor..limit]
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

    /// Installs an owned buffer as the window, exposing its first `limit`
    /// bytes as writable. `limit_pos` is untouched and must be adjusted by
    /// the caller.
    pub fn set_owned_window(&mut self, buffer: Buffer, limit: usize, cursor: usize) {
        debug_assert!(limit <= buffer.capacity());
        debug_assert!(cursor <= limit);
        self.limit = limit;
        self.cursor = cursor;
        self.region = WriteRegion::Owned(buffer);
    }

    /// Lends destination storage into the window; the whole of `bytes` is
    /// writable. `limit_pos` is untouched.
    pub fn set_dest_window(&mut self, bytes: BytesMut, cursor: usize) {
        debug_assert!(cursor <= bytes.len());
        self.limit = bytes.len();
        self.cursor = cursor;
        self.region = WriteRegion::Dest(bytes);
    }

    /// Drops the window, pinning `limit_pos` to the cursor position so
    /// `pos()` is preserved.
    pub fn clear_window(&mut self) {
        self.limit_pos = self.pos();
        self.cursor = 0;
        self.limit = 0;
        self.region = WriteRegion::Empty;
    }

    pub(crate) fn save_window(&mut self) -> SavedWriteWindow {
        SavedWriteWindow {
            region: std::mem::take(&mut self.region),
            cursor: std::mem::take(&mut self.cursor),
            limit: std::mem::take(&mut self.limit),
        }
    }

    pub(crate) fn restore_window(&mut self, saved: SavedWriteWindow) {
        self.region = saved.region;
        self.cursor = saved.cursor;
        self.limit = saved.limit;
    }

    /// Takes the staging buffer out along with how many bytes it stages,
    /// leaving an empty window with `limit_pos` rewound to the window
    /// origin. After the staged bytes are written down,
    /// [`move_limit_pos`](Self::move_limit_pos) brings the position forward
    /// again.
    pub(crate) fn take_staged(&mut self) -> (Buffer, usize) {
        let saved = self.save_window();
        self.limit_pos -= saved.limit as u64;
        let buffer = match saved.region {
            WriteRegion::Owned(buffer) => buffer,
            _ => Buffer::default(),
        };
        (buffer, saved.cursor)
    }

    /// Takes lent destination storage back out of the window.
    pub(crate) fn take_dest(&mut self) -> BytesMut {
        let saved = self.save_window();
        match saved.region {
            WriteRegion::Dest(bytes) => bytes,
            _ => BytesMut::new(),
        }
    }

    /// The whole region backing the window.
    #[inline]
    pub(crate) fn region_slice(&self) -> &[u8] {
        self.region.as_slice()
    }

    /// Copies `src` into the window at the cursor, advancing it.
    #[inline]
    pub(crate) fn write_to_window(&mut self, src: &[u8]) {
        debug_assert!(src.len() <= self.available());
        self.chunk_mut()[..src.len()].copy_from_slice(src);
        self.cursor += src.len();
    }
}

/// A sink of bytes with buffered fast paths, the mirror image of
/// [`Reader`](crate::reader::Reader).
///
/// The same error model applies: a writer is *ok* or terminally failed, and
/// running out of room in a bounded destination is a short write, not a
/// failure.
pub trait Writer {
    fn state(&self) -> &WriterState;

    fn state_mut(&mut self) -> &mut WriterState;

    /// Makes at least `min_length` bytes of contiguous writable space
    /// available, targeting `recommended_length`.
    #[inline]
    fn push(&mut self, min_length: usize, recommended_length: usize) -> bool {
        if self.state().available() >= min_length {
            true
        }
        else {
            self.push_slow(min_length, recommended_length)
        }
    }

    /// Writes all of `src`, advancing the position.
    #[inline]
    fn write(&mut self, src: &[u8]) -> bool {
        if src.len() <= self.state().available() {
            self.state_mut().write_to_window(src);
            true
        }
        else {
            self.write_slow(src)
        }
    }

    /// Writes refcounted bytes. Implementations may pass the reference on
    /// instead of copying; the default copies.
    #[inline]
    fn write_bytes(&mut self, src: Bytes) -> bool {
        self.write(&src)
    }

    /// Writes `length` zero bytes.
    #[inline]
    fn write_zeros(&mut self, length: u64) -> bool {
        if length <= self.state().available() as u64 {
            let length = length as usize;
            let state = self.state_mut();
            state.chunk_mut()[..length].fill(0);
            state.move_cursor(length);
            true
        }
        else {
            self.write_zeros_slow(length)
        }
    }

    /// Pushes buffered data towards the destination, as far as `flush_type`
    /// demands.
    #[inline]
    fn flush(&mut self, flush_type: FlushType) -> bool {
        self.flush_impl(flush_type)
    }

    /// Repositions the cursor within already-written territory. Seeking past
    /// the written size stops there and returns `false` with the writer
    /// still ok.
    ///
    /// Only the no-op seek is a fast path: a rewind inside the staging
    /// buffer would abandon staged bytes past the target, so anything else
    /// is for the leaf to decide.
    #[inline]
    fn seek(&mut self, new_pos: u64) -> bool {
        if new_pos == self.state().pos() {
            self.state().ok()
        }
        else {
            self.seek_slow(new_pos)
        }
    }

    /// Total size of the written stream, if known.
    #[inline]
    fn size(&mut self) -> Option<u64> {
        self.size_impl()
    }

    /// Discards everything past `new_size`. Returns `false` with the writer
    /// still ok when `new_size` is past the written size.
    #[inline]
    fn truncate(&mut self, new_size: u64) -> bool {
        self.truncate_impl(new_size)
    }

    /// Exposes a reader over the bytes written so far, positioned at
    /// `initial_pos`. The writer stays borrowed while the reader is in use;
    /// the next write resumes at the reader's position.
    #[inline]
    fn read_mode(&mut self, initial_pos: u64) -> Option<&mut dyn Reader> {
        self.read_mode_impl(initial_pos)
    }

    /// Closes the writer, pushing staged data down first. Idempotent.
    /// Returns whether the writer is failure-free.
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

    fn supports_random_access(&mut self) -> bool {
        false
    }

    fn supports_truncate(&mut self) -> bool {
        false
    }

    fn supports_read_mode(&mut self) -> bool {
        false
    }

    // Slow paths.

    /// Makes room when the window is too small. Called only when the fast
    /// path failed.
    fn push_slow(&mut self, min_length: usize, recommended_length: usize) -> bool;

    fn write_slow(&mut self, src: &[u8]) -> bool {
        write_slow_by_pushing(self, src)
    }

    fn write_zeros_slow(&mut self, length: u64) -> bool {
        let mut remaining = length;
        while remaining > 0 {
            if !self.push(1, to_length(remaining)) {
                return false;
            }
            let state = self.state_mut();
            let n = (state.available() as u64).min(remaining) as usize;
            state.chunk_mut()[..n].fill(0);
            state.move_cursor(n);
            remaining -= n as u64;
        }
        true
    }

    fn flush_impl(&mut self, flush_type: FlushType) -> bool {
        let _ = flush_type;
        self.state().ok()
    }

    fn seek_slow(&mut self, new_pos: u64) -> bool {
        let _ = new_pos;
        self.state_mut().fail(Error::unimplemented("seek"))
    }

    fn size_impl(&mut self) -> Option<u64> {
        None
    }

    fn truncate_impl(&mut self, new_size: u64) -> bool {
        let _ = new_size;
        self.state_mut().fail(Error::unimplemented("truncate"))
    }

    fn read_mode_impl(&mut self, initial_pos: u64) -> Option<&mut dyn Reader> {
        let _ = initial_pos;
        self.state_mut().fail(Error::unimplemented("read mode"));
        None
    }

    /// Close hook, called once from [`close`](Writer::close) while the
    /// writer is still open.
    fn done(&mut self) {}
}

pub(crate) fn write_slow_by_pushing<W: Writer + ?Sized>(writer: &mut W, src: &[u8]) -> bool {
    let mut offset = 0;
    loop {
        let state = writer.state_mut();
        let n = state.available().min(src.len() - offset);
        if n > 0 {
            state.write_to_window(&src[offset..offset + n]);
            offset += n;
        }
        if offset == src.len() {
            return true;
        }
        if !writer.push(1, src.len() - offset) {
            return false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        bytes::BytesWriter,
        FlushType,
        Writer,
    };
    use crate::error::ErrorKind;

    #[test]
    fn failed_writer_short_circuits() {
        let mut writer = BytesWriter::new();
        assert!(writer.write(b"ab"));
        writer.state_mut().fail(crate::Error::overflow());
        let pos = writer.pos();
        assert!(!writer.write(b"cd"));
        assert!(!writer.push(1, 1));
        assert!(!writer.flush(FlushType::FromObject));
        assert_eq!(writer.pos(), pos);
        assert_eq!(
            writer.error().map(|e| e.kind()),
            Some(ErrorKind::ResourceExhausted)
        );
    }

    #[test]
    fn write_zeros_crosses_window_boundaries() {
        let mut writer = BytesWriter::new();
        assert!(writer.write(b"x"));
        assert!(writer.write_zeros(100_000));
        assert!(writer.write(b"y"));
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), 100_002);
        assert_eq!(bytes[0], b'x');
        assert!(bytes[1..100_001].iter().all(|&b| b == 0));
        assert_eq!(bytes[100_001], b'y');
    }
}
