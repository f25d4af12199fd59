use ::bytes::BytesMut;

use super::{
    write_slow_by_pushing,
    Writer,
    WriterState,
};
use crate::{
    arith::{
        to_length,
        MAX_POSITION,
    },
    error::Error,
    reader::{
        bytes::BytesReader,
        Reader,
    },
};

#[derive(Debug)]
enum Mode {
    Write,
    Read(BytesReader),
}

/// A [`Writer`] into in-memory bytes, with random access, truncation and
/// read mode.
///
/// The destination storage itself is lent into the window, so ordinary
/// writes are a plain copy into it. [`read_mode`](Writer::read_mode) freezes
/// the written bytes into a [`BytesReader`] without copying; the next write
/// thaws them again and resumes at the reader's position.
#[derive(Debug)]
pub struct BytesWriter {
    state: WriterState,
    /// High watermark of bytes ever written; the cursor may sit below it
    /// after seeking back.
    written: usize,
    mode: Mode,
}

impl Default for BytesWriter {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl BytesWriter {
    pub fn new() -> Self {
        Self::from_bytes(BytesMut::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_bytes(BytesMut::with_capacity(capacity))
    }

    /// Continues writing at the end of `storage`.
    pub fn from_bytes(storage: BytesMut) -> Self {
        let mut state = WriterState::new();
        let written = storage.len();
        if written as u64 > MAX_POSITION {
            state.fail(Error::overflow());
            return Self {
                state,
                written: 0,
                mode: Mode::Write,
            };
        }
        state.set_dest_window(storage, written);
        state.set_limit_pos(written as u64);
        Self {
            state,
            written,
            mode: Mode::Write,
        }
    }

    /// Consumes the writer and returns exactly the written bytes.
    pub fn into_bytes(mut self) -> BytesMut {
        self.exit_read_mode();
        self.written = self.written_len();
        let mut storage = self.take_storage();
        storage.truncate(self.written);
        storage
    }

    /// The written bytes. Empty while a read-mode reader is outstanding.
    pub fn as_slice(&self) -> &[u8] {
        let written = self.written_len();
        let region = self.state.region_slice();
        &region[..written.min(region.len())]
    }

    #[inline]
    fn written_len(&self) -> usize {
        self.written.max(self.state.start_to_cursor())
    }

    /// Takes the storage out of the window, remembering the watermark.
    fn take_storage(&mut self) -> BytesMut {
        self.written = self.written_len();
        self.state.take_dest()
    }

    fn install_storage(&mut self, storage: BytesMut, cursor: usize) {
        let len = storage.len();
        self.state.set_dest_window(storage, cursor);
        self.state.set_limit_pos(len as u64);
    }

    /// Leaves read mode, thawing the storage and seeking to where the reader
    /// stopped, so writing resumes there.
    fn exit_read_mode(&mut self) {
        if let Mode::Read(reader) = std::mem::replace(&mut self.mode, Mode::Write) {
            let pos = to_length(reader.pos());
            let bytes = reader.into_src();
            let storage = bytes
                .try_into_mut()
                .unwrap_or_else(|bytes| BytesMut::from(&bytes[..]));
            debug_assert_eq!(storage.len(), self.written);
            let cursor = pos.min(storage.len());
            self.install_storage(storage, cursor);
        }
    }
}

impl Writer for BytesWriter {
    #[inline]
    fn state(&self) -> &WriterState {
        &self.state
    }

    #[inline]
    fn state_mut(&mut self) -> &mut WriterState {
        &mut self.state
    }

    fn push_slow(&mut self, min_length: usize, recommended_length: usize) -> bool {
        let _ = recommended_length;
        self.exit_read_mode();
        if !self.state.ok() {
            return false;
        }
        if self.state.available() >= min_length {
            return true;
        }
        let cursor = self.state.start_to_cursor();
        if min_length as u64 > MAX_POSITION - cursor as u64 {
            return self.state.fail(Error::overflow());
        }
        let mut storage = self.take_storage();
        let needed = cursor + min_length;
        if storage.capacity() < needed {
            storage.reserve(needed - storage.len());
        }
        let new_len = storage.capacity().min(to_length(MAX_POSITION));
        storage.resize(new_len, 0);
        self.install_storage(storage, cursor);
        true
    }

    fn write_slow(&mut self, src: &[u8]) -> bool {
        self.exit_read_mode();
        if !self.state.ok() {
            return false;
        }
        write_slow_by_pushing(self, src)
    }

    fn seek_slow(&mut self, new_pos: u64) -> bool {
        self.exit_read_mode();
        if !self.state.ok() {
            return false;
        }
        self.written = self.written_len();
        if new_pos > self.written as u64 {
            self.state.set_cursor(self.written);
            return false;
        }
        self.state.set_cursor(new_pos as usize);
        true
    }

    fn size_impl(&mut self) -> Option<u64> {
        if self.state.error().is_some() {
            return None;
        }
        Some(self.written_len() as u64)
    }

    fn truncate_impl(&mut self, new_size: u64) -> bool {
        self.exit_read_mode();
        if !self.state.ok() {
            return false;
        }
        self.written = self.written_len();
        if new_size > self.written as u64 {
            return false;
        }
        let new_size = new_size as usize;
        self.written = new_size;
        self.state.set_cursor(new_size);
        true
    }

    fn read_mode_impl(&mut self, initial_pos: u64) -> Option<&mut dyn Reader> {
        self.exit_read_mode();
        if !self.state.ok() {
            return None;
        }
        self.written = self.written_len();
        let mut storage = self.take_storage();
        storage.truncate(self.written);
        let mut reader = BytesReader::new(storage.freeze());
        let _ = reader.seek(initial_pos);
        // Park the writer at the end of the written bytes.
        self.state.set_limit_pos(self.written as u64);
        self.mode = Mode::Read(reader);
        match &mut self.mode {
            Mode::Read(reader) => Some(reader),
            Mode::Write => None,
        }
    }

    fn supports_random_access(&mut self) -> bool {
        true
    }

    fn supports_truncate(&mut self) -> bool {
        true
    }

    fn supports_read_mode(&mut self) -> bool {
        true
    }

    fn done(&mut self) {
        self.exit_read_mode();
        self.written = self.written_len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::FlushType;

    #[test]
    fn write_then_read_mode_then_write_appends_at_the_reader_position() {
        let mut writer = BytesWriter::new();
        assert!(writer.write(b"xyz"));
        let reader = writer.read_mode(1).unwrap();
        assert_eq!(reader.pos(), 1);
        let mut dest = [0u8; 2];
        assert!(reader.read(&mut dest));
        assert_eq!(&dest, b"yz");
        assert!(writer.write(b"Q"));
        assert_eq!(writer.pos(), 4);
        assert_eq!(writer.as_slice(), b"xyzQ");
    }

    #[test]
    fn read_mode_is_a_zero_copy_snapshot() {
        let mut writer = BytesWriter::new();
        assert!(writer.write(b"abcdef"));
        let reader = writer.read_mode(0).unwrap();
        assert_eq!(reader.size(), Some(6));
        let mut dest = [0u8; 6];
        assert!(reader.read(&mut dest));
        assert_eq!(&dest, b"abcdef");
        assert!(!reader.read(&mut [0u8; 1]));
        assert!(reader.ok());
    }

    #[test]
    fn seeking_back_overwrites_without_shrinking() {
        let mut writer = BytesWriter::new();
        assert!(writer.write(b"hello"));
        assert!(writer.seek(1));
        assert!(writer.write(b"E"));
        assert_eq!(writer.size(), Some(5));
        assert_eq!(writer.as_slice(), b"hEllo");
        assert_eq!(writer.pos(), 2);
    }

    #[test]
    fn seeking_past_the_written_size_stops_there() {
        let mut writer = BytesWriter::new();
        assert!(writer.write(b"abc"));
        assert!(!writer.seek(10));
        assert!(writer.ok());
        assert_eq!(writer.pos(), 3);
    }

    #[test]
    fn truncate_discards_the_tail() {
        let mut writer = BytesWriter::new();
        assert!(writer.write(b"abcdef"));
        assert!(writer.truncate(4));
        assert_eq!(writer.size(), Some(4));
        assert!(!writer.truncate(10));
        assert!(writer.ok());
        assert!(writer.write(b"XY"));
        assert_eq!(writer.as_slice(), b"abcdXY");
    }

    #[test]
    fn flush_then_size_covers_everything_written() {
        let mut writer = BytesWriter::new();
        assert!(writer.write(b"12345"));
        assert!(writer.seek(2));
        assert!(writer.flush(FlushType::FromObject));
        assert!(writer.size() >= Some(5));
    }

    #[test]
    fn read_mode_of_an_empty_writer_sees_an_empty_stream() {
        let mut writer = BytesWriter::new();
        let reader = writer.read_mode(0).unwrap();
        assert!(!reader.read(&mut [0u8; 1]));
        assert!(reader.ok());
        assert!(writer.write(b"a"));
        assert_eq!(writer.as_slice(), b"a");
    }

    #[test]
    fn from_bytes_continues_at_the_end() {
        let mut writer = BytesWriter::from_bytes(BytesMut::from(&b"abc"[..]));
        assert_eq!(writer.pos(), 3);
        assert!(writer.write(b"def"));
        assert_eq!(&writer.into_bytes()[..], b"abcdef");
    }
}
