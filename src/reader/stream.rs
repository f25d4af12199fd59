use std::io::{
    self,
    SeekFrom,
};

use super::{
    buffered::{
        BufferedReader,
        BufferedSource,
    },
    ReaderState,
};
use crate::{
    arith::{
        to_length,
        MAX_POSITION,
    },
    buffer::BufferOptions,
    error::Error,
};

/// What [`SourceStream::peek`] saw without consuming anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Peek {
    Byte(u8),
    Eof,
}

/// A sequential byte source that may or may not support random access.
///
/// The end of the stream is never an error: `read` returns a short count and
/// `read_some` returns zero (distinguish "temporarily empty" from the end via
/// [`peek`](SourceStream::peek)). `seek` and `tell` are optional; probing
/// them is cheap and failing them is recoverable.
pub trait SourceStream {
    /// Reads exactly `dest.len()` bytes unless the stream ends first.
    /// Returns how many bytes were read.
    fn read(&mut self, dest: &mut [u8]) -> Result<usize, Error>;

    /// Reads however many bytes are conveniently available, up to
    /// `dest.len()`, possibly zero.
    fn read_some(&mut self, dest: &mut [u8]) -> Result<usize, Error> {
        self.read(dest)
    }

    /// Looks at the next byte without consuming it.
    fn peek(&mut self) -> Result<Peek, Error>;

    fn seek(&mut self, pos: SeekFrom) -> Result<(), Error> {
        let _ = pos;
        Err(Error::unimplemented("seek"))
    }

    fn tell(&mut self) -> Result<u64, Error> {
        Err(Error::unimplemented("tell"))
    }
}

impl<S: SourceStream> SourceStream for &mut S {
    #[inline]
    fn read(&mut self, dest: &mut [u8]) -> Result<usize, Error> {
        S::read(self, dest)
    }

    #[inline]
    fn read_some(&mut self, dest: &mut [u8]) -> Result<usize, Error> {
        S::read_some(self, dest)
    }

    #[inline]
    fn peek(&mut self) -> Result<Peek, Error> {
        S::peek(self)
    }

    #[inline]
    fn seek(&mut self, pos: SeekFrom) -> Result<(), Error> {
        S::seek(self, pos)
    }

    #[inline]
    fn tell(&mut self) -> Result<u64, Error> {
        S::tell(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LazyBool {
    Unknown,
    False,
    True,
}

/// Options for [`StreamReader`].
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamReaderOptions {
    assumed_pos: Option<u64>,
    growing_source: bool,
    buffer: BufferOptions,
}

impl StreamReaderOptions {
    #[inline]
    pub fn new() -> Self {
        Self {
            assumed_pos: None,
            growing_source: false,
            buffer: BufferOptions::default(),
        }
    }

    /// Takes `pos` as the current stream position instead of asking the
    /// source, and gives up on random access.
    #[inline]
    pub fn with_assumed_pos(mut self, pos: u64) -> Self {
        self.assumed_pos = Some(pos);
        self
    }

    /// Declares that the source may grow while being read; discovered sizes
    /// are then treated as advisory and never cached.
    #[inline]
    pub fn with_growing_source(mut self) -> Self {
        self.growing_source = true;
        self
    }

    #[inline]
    pub fn with_buffer_options(mut self, buffer: BufferOptions) -> Self {
        self.buffer = buffer;
        self
    }
}

/// The [`BufferedSource`] half of a [`StreamReader`]: tracks lazy
/// random-access discovery and the known size of the stream.
#[derive(Debug)]
pub struct StreamSource<S> {
    src: S,
    supports_random_access: LazyBool,
    growing_source: bool,
    size: Option<u64>,
}

impl<S: SourceStream> StreamSource<S> {
    #[inline]
    pub fn get_ref(&self) -> &S {
        &self.src
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.src
    }

    pub fn into_inner(self) -> S {
        self.src
    }

    fn found_size(&mut self, size: u64) {
        if !self.growing_source {
            self.size = Some(size);
        }
    }

    /// Resolves whether the source can seek, at most once.
    ///
    /// A failing probe seek is recoverable and resolves to `false`; a
    /// failure while seeking back to the reading position is terminal.
    fn resolve_random_access(&mut self, state: &mut ReaderState) -> bool {
        match self.supports_random_access {
            LazyBool::False => return false,
            LazyBool::True => return true,
            LazyBool::Unknown => {}
        }
        debug_assert!(state.is_open());
        let supported = match self.src.seek(SeekFrom::End(0)) {
            Err(_) => false,
            Ok(()) => {
                match self.src.tell() {
                    Err(error) => {
                        state.fail(error);
                        false
                    }
                    Ok(size) => {
                        match self.src.seek(SeekFrom::Start(state.limit_pos())) {
                            Err(error) => {
                                state.fail(error);
                                false
                            }
                            Ok(()) => {
                                self.found_size(size);
                                true
                            }
                        }
                    }
                }
            }
        };
        tracing::trace!(supported, "resolved random access support");
        self.supports_random_access = if supported {
            LazyBool::True
        }
        else {
            LazyBool::False
        };
        supported
    }
}

impl<S: SourceStream> BufferedSource for StreamSource<S> {
    fn read_internal(
        &mut self,
        state: &mut ReaderState,
        min_length: usize,
        max_length: usize,
        dest: &mut [u8],
    ) -> bool {
        debug_assert!(min_length > 0);
        debug_assert!(min_length <= max_length);
        debug_assert!(max_length <= dest.len());
        debug_assert!(state.ok());
        if let Some(size) = self.size {
            if state.limit_pos() >= size {
                return false;
            }
        }
        let mut min_length = min_length;
        let mut max_length = max_length;
        // Keep limit_pos + max_length within the representable range.
        let headroom = to_length(MAX_POSITION - state.limit_pos());
        if max_length > headroom {
            max_length = headroom;
            if max_length < min_length {
                return state.fail(Error::overflow());
            }
        }
        let mut offset = 0;
        loop {
            let mut length_to_read = min_length;
            if min_length < max_length {
                let seekable = self.resolve_random_access(state);
                if !state.ok() {
                    return false;
                }
                if let Some(size) = self.size.filter(|_| seekable) {
                    // Widen the read to drain the known remainder in one
                    // call.
                    let remaining = to_length(size.saturating_sub(state.limit_pos()));
                    length_to_read = min_length.max(remaining).min(max_length);
                }
                else {
                    match self.src.peek() {
                        Err(error) => {
                            tracing::debug!(%error, "peeking the source failed");
                            return state.fail(error);
                        }
                        Ok(Peek::Eof) => {
                            self.found_size(state.limit_pos());
                            return false;
                        }
                        Ok(Peek::Byte(_)) => {}
                    }
                    match self.src.read_some(&mut dest[offset..offset + max_length]) {
                        Err(error) => return state.fail(error),
                        Ok(0) => {
                            // The source showed a byte to peek but handed out
                            // nothing; fall back to a fixed-length read.
                        }
                        Ok(n) => {
                            state.move_limit_pos(n);
                            if n >= min_length {
                                return true;
                            }
                            offset += n;
                            min_length -= n;
                            max_length -= n;
                            continue;
                        }
                    }
                }
            }
            match self.src.read(&mut dest[offset..offset + length_to_read]) {
                Err(error) => {
                    tracing::debug!(%error, "reading the source failed");
                    return state.fail(error);
                }
                Ok(n) => {
                    debug_assert!(n <= length_to_read);
                    state.move_limit_pos(n);
                    if n < length_to_read {
                        // The stream ended.
                        self.found_size(state.limit_pos());
                        return n >= min_length;
                    }
                    if n >= min_length {
                        return true;
                    }
                    offset += n;
                    min_length -= n;
                    max_length -= n;
                }
            }
        }
    }

    fn size_hint(&self, _state: &ReaderState) -> Option<u64> {
        self.size
    }

    fn supports_random_access(&mut self, state: &mut ReaderState) -> bool {
        self.resolve_random_access(state)
    }

    fn seek_behind_buffer(&mut self, state: &mut ReaderState, new_pos: u64) -> bool {
        debug_assert!(state.start_to_limit() == 0);
        if !self.resolve_random_access(state) {
            if !state.ok() {
                return false;
            }
            return state.fail(Error::unimplemented("seek"));
        }
        if !state.ok() {
            return false;
        }
        if new_pos > state.limit_pos() {
            match self.size {
                Some(size) => {
                    if new_pos > size {
                        // The stream ends before new_pos.
                        if let Err(error) = self.src.seek(SeekFrom::Start(size)) {
                            return state.fail(error);
                        }
                        state.set_limit_pos(size);
                        return false;
                    }
                }
                None => {
                    if let Err(error) = self.src.seek(SeekFrom::End(0)) {
                        return state.fail(error);
                    }
                    let size = match self.src.tell() {
                        Err(error) => return state.fail(error),
                        Ok(size) => size,
                    };
                    self.found_size(size);
                    if new_pos > size {
                        state.set_limit_pos(size);
                        return false;
                    }
                }
            }
        }
        if let Err(error) = self.src.seek(SeekFrom::Start(new_pos)) {
            return state.fail(error);
        }
        state.set_limit_pos(new_pos);
        true
    }

    fn size(&mut self, state: &mut ReaderState) -> Option<u64> {
        if !self.resolve_random_access(state) {
            return None;
        }
        if !state.ok() {
            return None;
        }
        if let Some(size) = self.size {
            return Some(size);
        }
        if let Err(error) = self.src.seek(SeekFrom::End(0)) {
            state.fail(error);
            return None;
        }
        let size = match self.src.tell() {
            Err(error) => {
                state.fail(error);
                return None;
            }
            Ok(size) => size,
        };
        if let Err(error) = self.src.seek(SeekFrom::Start(state.limit_pos())) {
            state.fail(error);
            return None;
        }
        self.found_size(size);
        Some(size)
    }

    fn done(&mut self, _state: &mut ReaderState) {
        // Resolving later would touch a closed stream, and the answer is no
        // longer interesting anyway.
        if self.supports_random_access == LazyBool::Unknown {
            self.supports_random_access = LazyBool::False;
        }
    }
}

/// A buffered [`Reader`](crate::reader::Reader) over a [`SourceStream`].
///
/// Random access is discovered lazily: the first operation that would profit
/// from seeking probes the source once and remembers the answer. A bounded
/// source's size is recorded when discovered, unless the source was declared
/// growing.
pub type StreamReader<S> = BufferedReader<StreamSource<S>>;

impl<S: SourceStream> BufferedReader<StreamSource<S>> {
    pub fn open(src: S) -> Self {
        Self::open_with(src, StreamReaderOptions::new())
    }

    pub fn open_with(mut src: S, options: StreamReaderOptions) -> Self {
        let mut state = ReaderState::new();
        let mut supports_random_access = LazyBool::False;
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
                if let Ok(pos) = src.tell() {
                    state.set_limit_pos(pos);
                    // tell() worked; whether seek() does is checked later.
                    supports_random_access = LazyBool::Unknown;
                }
            }
        }
        let src = StreamSource {
            src,
            supports_random_access,
            growing_source: options.growing_source,
            size: None,
        };
        Self::from_parts(state, src, options.buffer)
    }
}

/// Adapts any [`io::Read`] stream, without random access.
#[derive(Debug)]
pub struct IoSource<T> {
    inner: T,
    peeked: Option<u8>,
}

impl<T: io::Read> IoSource<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            peeked: None,
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: io::Read> SourceStream for IoSource<T> {
    fn read(&mut self, dest: &mut [u8]) -> Result<usize, Error> {
        read_io(&mut self.inner, &mut self.peeked, dest)
    }

    fn peek(&mut self) -> Result<Peek, Error> {
        peek_io(&mut self.inner, &mut self.peeked)
    }
}

/// Adapts any [`io::Read`] + [`io::Seek`] stream, with random access.
#[derive(Debug)]
pub struct IoSeekSource<T> {
    inner: T,
    peeked: Option<u8>,
}

impl<T: io::Read + io::Seek> IoSeekSource<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            peeked: None,
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: io::Read + io::Seek> SourceStream for IoSeekSource<T> {
    fn read(&mut self, dest: &mut [u8]) -> Result<usize, Error> {
        read_io(&mut self.inner, &mut self.peeked, dest)
    }

    fn peek(&mut self) -> Result<Peek, Error> {
        peek_io(&mut self.inner, &mut self.peeked)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<(), Error> {
        self.peeked = None;
        self.inner
            .seek(pos)
            .map(|_| ())
            .map_err(|error| Error::operation("seek", error))
    }

    fn tell(&mut self) -> Result<u64, Error> {
        let pos = self
            .inner
            .stream_position()
            .map_err(|error| Error::operation("tell", error))?;
        Ok(pos - self.peeked.is_some() as u64)
    }
}

fn read_io<T: io::Read>(
    inner: &mut T,
    peeked: &mut Option<u8>,
    dest: &mut [u8],
) -> Result<usize, Error> {
    let mut offset = 0;
    if let Some(byte) = peeked.take() {
        if dest.is_empty() {
            *peeked = Some(byte);
            return Ok(0);
        }
        dest[0] = byte;
        offset = 1;
    }
    while offset < dest.len() {
        match inner.read(&mut dest[offset..]) {
            Ok(0) => break,
            Ok(n) => offset += n,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(Error::operation("read", error)),
        }
    }
    Ok(offset)
}

fn peek_io<T: io::Read>(inner: &mut T, peeked: &mut Option<u8>) -> Result<Peek, Error> {
    if let Some(byte) = *peeked {
        return Ok(Peek::Byte(byte));
    }
    let mut byte = [0u8; 1];
    loop {
        match inner.read(&mut byte) {
            Ok(0) => return Ok(Peek::Eof),
            Ok(_) => {
                *peeked = Some(byte[0]);
                return Ok(Peek::Byte(byte[0]));
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(Error::operation("peek", error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::reader::Reader;

    #[test]
    fn reads_a_plain_io_stream_to_the_end() {
        let data: Vec<u8> = (0..200u8).collect();
        let mut reader = StreamReader::open(IoSource::new(&data[..]));
        let mut out = vec![0u8; 200];
        assert!(reader.read(&mut out));
        assert_eq!(out, data);
        assert!(!reader.pull(1, 1));
        assert!(reader.ok());
        assert_eq!(reader.pos(), 200);
    }

    #[test]
    fn unseekable_source_resolves_random_access_to_false() {
        let mut reader = StreamReader::open(IoSource::new(&b"abc"[..]));
        assert_eq!(reader.size(), None);
        assert!(reader.ok());
        assert!(!reader.supports_random_access());
    }

    /// Tells its position but cannot seek, like a pipe with an offset
    /// counter.
    struct TellingPipe {
        data: Vec<u8>,
        pos: usize,
    }

    impl SourceStream for TellingPipe {
        fn read(&mut self, dest: &mut [u8]) -> Result<usize, Error> {
            let n = dest.len().min(self.data.len() - self.pos);
            dest[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }

        fn peek(&mut self) -> Result<Peek, Error> {
            Ok(match self.data.get(self.pos) {
                Some(&byte) => Peek::Byte(byte),
                None => Peek::Eof,
            })
        }

        fn tell(&mut self) -> Result<u64, Error> {
            Ok(self.pos as u64)
        }
    }

    #[test]
    fn failed_probe_resolves_to_false_without_terminal_failure() {
        let mut reader = StreamReader::open(TellingPipe {
            data: b"abc".to_vec(),
            pos: 0,
        });
        // The first size query runs the probe; its failing seek is
        // recoverable.
        assert_eq!(reader.size(), None);
        assert!(reader.ok());
        assert!(!reader.supports_random_access());
        let mut dest = [0u8; 3];
        assert!(reader.read(&mut dest));
        assert_eq!(&dest, b"abc");
    }

    /// Seekable source that counts end-probes so the laziness is observable.
    struct CountingSeekSource {
        inner: IoSeekSource<Cursor<Vec<u8>>>,
        end_seeks: usize,
    }

    impl SourceStream for CountingSeekSource {
        fn read(&mut self, dest: &mut [u8]) -> Result<usize, Error> {
            self.inner.read(dest)
        }

        fn peek(&mut self) -> Result<Peek, Error> {
            self.inner.peek()
        }

        fn seek(&mut self, pos: SeekFrom) -> Result<(), Error> {
            if matches!(pos, SeekFrom::End(_)) {
                self.end_seeks += 1;
            }
            self.inner.seek(pos)
        }

        fn tell(&mut self) -> Result<u64, Error> {
            self.inner.tell()
        }
    }

    #[test]
    fn random_access_probe_runs_exactly_once() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut cursor = Cursor::new(data.clone());
        cursor.set_position(10);
        let source = CountingSeekSource {
            inner: IoSeekSource::new(cursor),
            end_seeks: 0,
        };
        let mut reader = StreamReader::open(source);
        assert_eq!(reader.pos(), 10);

        assert!(reader.seek(50));
        assert_eq!(reader.pos(), 50);
        assert_eq!(reader.size(), Some(100));
        assert!(reader.supports_random_access());
        assert_eq!(reader.src().get_ref().end_seeks, 1);

        let mut dest = [0u8; 2];
        assert!(reader.read(&mut dest));
        assert_eq!(&dest, &[50, 51]);
    }

    #[test]
    fn seeking_past_the_end_stops_at_the_size() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut reader = StreamReader::open(IoSeekSource::new(Cursor::new(data)));
        assert!(!reader.seek(1000));
        assert!(reader.ok());
        assert_eq!(reader.pos(), 100);
    }

    #[test]
    fn assumed_pos_skips_probing_and_offsets_positions() {
        let mut reader = StreamReader::open_with(
            IoSource::new(&b"abcdef"[..]),
            StreamReaderOptions::new().with_assumed_pos(1000),
        );
        assert_eq!(reader.pos(), 1000);
        let mut dest = [0u8; 3];
        assert!(reader.read(&mut dest));
        assert_eq!(&dest, b"abc");
        assert_eq!(reader.pos(), 1003);
        assert!(!reader.supports_random_access());
    }

    #[test]
    fn assumed_pos_beyond_the_position_range_fails_construction() {
        let reader = StreamReader::open_with(
            IoSource::new(&b""[..]),
            StreamReaderOptions::new().with_assumed_pos(u64::MAX),
        );
        assert!(!reader.ok());
    }

    #[test]
    fn growing_source_reprobes_the_size() {
        let data: Vec<u8> = (0..50u8).collect();
        let cursor = Cursor::new(data);
        let mut source = IoSeekSource::new(cursor);
        let mut reader = StreamReader::open_with(
            &mut source,
            StreamReaderOptions::new().with_growing_source(),
        );
        assert_eq!(reader.size(), Some(50));
        reader.src_mut().get_mut().inner.get_mut().extend(0..25u8);
        assert_eq!(reader.size(), Some(75));
    }
}
