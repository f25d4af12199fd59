use std::io::{
    self,
    SeekFrom,
};

use super::{
    buffered::{
        BufferedSink,
        BufferedWriter,
    },
    FlushType,
    WriterState,
};
use crate::{
    arith::MAX_POSITION,
    buffer::BufferOptions,
    error::Error,
};

/// A sequential byte destination.
///
/// Only `write` is required. `flush` levels beyond
/// [`FlushType::FromObject`] default to doing nothing, which is right for
/// destinations without deeper buffering. `seek`, `tell`, `size` and
/// `truncate` are optional.
pub trait SinkStream {
    /// Writes all of `src`.
    fn write(&mut self, src: &[u8]) -> Result<(), Error>;

    fn flush(&mut self, flush_type: FlushType) -> Result<(), Error> {
        let _ = flush_type;
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<(), Error> {
        let _ = pos;
        Err(Error::unimplemented("seek"))
    }

    fn tell(&mut self) -> Result<u64, Error> {
        Err(Error::unimplemented("tell"))
    }

    fn size(&mut self) -> Result<u64, Error> {
        Err(Error::unimplemented("size"))
    }

    fn truncate(&mut self, new_size: u64) -> Result<(), Error> {
        let _ = new_size;
        Err(Error::unimplemented("truncate"))
    }
}

impl<D: SinkStream> SinkStream for &mut D {
    #[inline]
    fn write(&mut self, src: &[u8]) -> Result<(), Error> {
        D::write(self, src)
    }

    #[inline]
    fn flush(&mut self, flush_type: FlushType) -> Result<(), Error> {
        D::flush(self, flush_type)
    }

    #[inline]
    fn seek(&mut self, pos: SeekFrom) -> Result<(), Error> {
        D::seek(self, pos)
    }

    #[inline]
    fn tell(&mut self) -> Result<u64, Error> {
        D::tell(self)
    }

    #[inline]
    fn size(&mut self) -> Result<u64, Error> {
        D::size(self)
    }

    #[inline]
    fn truncate(&mut self, new_size: u64) -> Result<(), Error> {
        D::truncate(self, new_size)
    }
}

/// Options for [`StreamWriter`].
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamWriterOptions {
    assumed_pos: Option<u64>,
    size_hint: Option<u64>,
    buffer: BufferOptions,
}

impl StreamWriterOptions {
    #[inline]
    pub fn new() -> Self {
        Self {
            assumed_pos: None,
            size_hint: None,
            buffer: BufferOptions::default(),
        }
    }

    /// Takes `pos` as the current destination position instead of asking the
    /// destination.
    #[inline]
    pub fn with_assumed_pos(mut self, pos: u64) -> Self {
        self.assumed_pos = Some(pos);
        self
    }

    /// Expected final size, biasing buffer sizing towards it.
    #[inline]
    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    #[inline]
    pub fn with_buffer_options(mut self, buffer: BufferOptions) -> Self {
        self.buffer = buffer;
        self
    }
}

/// The [`BufferedSink`] half of a [`StreamWriter`].
#[derive(Debug)]
pub struct StreamSink<D> {
    dest: D,
}

impl<D: SinkStream> StreamSink<D> {
    #[inline]
    pub fn get_ref(&self) -> &D {
        &self.dest
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut D {
        &mut self.dest
    }

    pub fn into_inner(self) -> D {
        self.dest
    }
}

impl<D: SinkStream> BufferedSink for StreamSink<D> {
    fn write_internal(&mut self, state: &mut WriterState, src: &[u8]) -> bool {
        debug_assert!(state.start_to_limit() == 0);
        debug_assert!(state.ok());
        if src.len() as u64 > MAX_POSITION - state.limit_pos() {
            return state.fail(Error::overflow());
        }
        match self.dest.write(src) {
            Err(error) => {
                tracing::debug!(%error, "writing the sink failed");
                state.fail(error)
            }
            Ok(()) => {
                state.move_limit_pos(src.len());
                true
            }
        }
    }

    fn flush_internal(&mut self, state: &mut WriterState, flush_type: FlushType) -> bool {
        if !state.ok() {
            return false;
        }
        match self.dest.flush(flush_type) {
            Err(error) => state.fail(error),
            Ok(()) => true,
        }
    }

    fn seek_behind_buffer(&mut self, state: &mut WriterState, new_pos: u64) -> bool {
        debug_assert!(state.start_to_limit() == 0);
        if !state.ok() {
            return false;
        }
        if new_pos > MAX_POSITION {
            return state.fail(Error::overflow());
        }
        match self.dest.seek(SeekFrom::Start(new_pos)) {
            Err(error) => state.fail(error),
            Ok(()) => {
                state.set_limit_pos(new_pos);
                true
            }
        }
    }

    fn size_behind_buffer(&mut self, state: &mut WriterState) -> Option<u64> {
        if !state.ok() {
            return None;
        }
        match self.dest.size() {
            Err(error) => {
                state.fail(error);
                None
            }
            Ok(size) => Some(size.max(state.limit_pos())),
        }
    }

    fn truncate_behind_buffer(&mut self, state: &mut WriterState, new_size: u64) -> bool {
        if !state.ok() {
            return false;
        }
        match self.dest.truncate(new_size) {
            Err(error) => state.fail(error),
            Ok(()) => {
                if state.limit_pos() > new_size {
                    state.set_limit_pos(new_size);
                }
                true
            }
        }
    }
}

/// A buffered [`Writer`](crate::writer::Writer) over a [`SinkStream`].
pub type StreamWriter<D> = BufferedWriter<StreamSink<D>>;

impl<D: SinkStream> BufferedWriter<StreamSink<D>> {
    pub fn open(dest: D) -> Self {
        Self::open_with(dest, StreamWriterOptions::new())
    }

    pub fn open_with(mut dest: D, options: StreamWriterOptions) -> Self {
        let mut state = WriterState::new();
        match options.assumed_pos {
            Some(pos) => {
                if pos > MAX_POSITION {
                    state.fail(Error::overflow());
                }
                else {
                    state.set_limit_pos(pos);
                }
            }
            None => {
                if let Ok(pos) = dest.tell() {
                    state.set_limit_pos(pos);
                }
            }
        }
        Self::from_parts(state, StreamSink { dest }, options.buffer, options.size_hint)
    }
}

/// Adapts any [`io::Write`] stream.
#[derive(Debug)]
pub struct IoSink<T> {
    inner: T,
}

impl<T: io::Write> IoSink<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    #[inline]
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: io::Write> SinkStream for IoSink<T> {
    fn write(&mut self, src: &[u8]) -> Result<(), Error> {
        self.inner
            .write_all(src)
            .map_err(|error| Error::operation("write", error))
    }

    fn flush(&mut self, flush_type: FlushType) -> Result<(), Error> {
        match flush_type {
            FlushType::FromObject => Ok(()),
            FlushType::FromProcess | FlushType::FromMachine => self
                .inner
                .flush()
                .map_err(|error| Error::operation("flush", error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Writer;

    #[test]
    fn writes_arrive_in_order_through_the_buffer() {
        let mut writer = StreamWriter::open(IoSink::new(Vec::new()));
        assert!(writer.write(b"hello "));
        assert!(writer.write(b"world"));
        assert!(writer.close());
        let vec = writer.into_dest().into_inner().into_inner();
        assert_eq!(vec, b"hello world");
    }

    #[test]
    fn assumed_position_offsets_pos_without_touching_data() {
        let mut writer = StreamWriter::open_with(
            IoSink::new(Vec::new()),
            StreamWriterOptions::new().with_assumed_pos(100),
        );
        assert_eq!(writer.pos(), 100);
        assert!(writer.write(b"abc"));
        assert_eq!(writer.pos(), 103);
        assert!(writer.flush(FlushType::FromObject));
        assert_eq!(writer.dest().get_ref().get_ref(), b"abc");
    }

    #[test]
    fn writing_at_the_position_limit_is_resource_exhaustion() {
        let mut writer = StreamWriter::open_with(
            IoSink::new(Vec::new()),
            StreamWriterOptions::new().with_assumed_pos(MAX_POSITION),
        );
        assert!(writer.ok());
        assert!(!writer.write(b"x"));
        assert_eq!(
            writer.error().map(|e| e.kind()),
            Some(crate::error::ErrorKind::ResourceExhausted)
        );
    }

    #[test]
    fn size_hint_is_advice_not_a_limit() {
        let mut writer = StreamWriter::open_with(
            IoSink::new(Vec::new()),
            StreamWriterOptions::new().with_size_hint(4),
        );
        assert!(writer.write(b"longer than the hint"));
        assert!(writer.close());
        assert_eq!(
            writer.into_dest().into_inner().into_inner(),
            b"longer than the hint"
        );
    }

    #[test]
    fn unsupported_sink_seek_fails_terminally() {
        let mut writer = StreamWriter::open(IoSink::new(Vec::new()));
        assert!(writer.write(b"abc"));
        assert!(!writer.seek(0));
        assert!(!writer.ok());
        assert_eq!(
            writer.error().map(|e| e.kind()),
            Some(crate::error::ErrorKind::Unimplemented)
        );
    }
}
