use ::bytes::Bytes;

use super::{
    Reader,
    ReaderState,
};
use crate::{
    arith::MAX_POSITION,
    error::Error,
};

/// A [`Reader`] over in-memory bytes, with full random access.
///
/// The whole source is the window, so every read and every in-range seek
/// takes the fast path.
#[derive(Debug)]
pub struct BytesReader {
    state: ReaderState,
    src: Bytes,
}

impl BytesReader {
    pub fn new(src: impl Into<Bytes>) -> Self {
        let src = src.into();
        let mut state = ReaderState::new();
        if src.len() as u64 > MAX_POSITION {
            state.fail(Error::overflow());
        }
        else {
            state.set_shared_window(src.clone(), 0);
            state.set_limit_pos(src.len() as u64);
        }
        Self { state, src }
    }

    /// The bytes being read. Unchanged by closing.
    #[inline]
    pub fn src(&self) -> &Bytes {
        &self.src
    }

    pub fn into_src(self) -> Bytes {
        self.src
    }
}

impl From<&[u8]> for BytesReader {
    fn from(src: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(src))
    }
}

impl Reader for BytesReader {
    #[inline]
    fn state(&self) -> &ReaderState {
        &self.state
    }

    #[inline]
    fn state_mut(&mut self) -> &mut ReaderState {
        &mut self.state
    }

    fn pull_slow(&mut self, _min_length: usize, _recommended_length: usize) -> bool {
        // The window already spans the whole source; there is nothing more.
        false
    }

    fn seek_slow(&mut self, new_pos: u64) -> bool {
        if !self.state.ok() || !self.state.is_open() {
            return false;
        }
        // Out of the window means past the end here.
        debug_assert!(new_pos > self.state.limit_pos());
        self.state.set_cursor(self.state.start_to_limit());
        false
    }

    fn size_impl(&mut self) -> Option<u64> {
        Some(self.src.len() as u64)
    }

    fn supports_random_access(&mut self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_chunking_schedule_reproduces_the_source() {
        let data: Vec<u8> = (0..97u8).collect();
        for step in [1usize, 2, 3, 7, 31, 96, 97, 200] {
            let mut reader = BytesReader::new(data.clone());
            let mut out = Vec::new();
            let mut dest = vec![0u8; step];
            loop {
                let before = reader.pos();
                if reader.read(&mut dest) {
                    out.extend_from_slice(&dest);
                }
                else {
                    let got = (reader.pos() - before) as usize;
                    out.extend_from_slice(&dest[..got]);
                    break;
                }
            }
            assert_eq!(out, data, "step {step}");
            assert!(reader.ok());
        }
    }

    #[test]
    fn seek_past_the_end_stops_at_the_end() {
        let mut reader = BytesReader::new(&b"abc"[..]);
        assert!(!reader.seek(10));
        assert!(reader.ok());
        assert_eq!(reader.pos(), 3);
        assert_eq!(reader.size(), Some(3));
    }

    #[test]
    fn size_is_always_known() {
        let mut reader = BytesReader::new(&b"abcdef"[..]);
        assert_eq!(reader.size(), Some(6));
        assert!(reader.supports_random_access());
    }

    #[test]
    fn read_bytes_appends_to_the_container() {
        use ::bytes::BytesMut;

        let mut reader = BytesReader::new(&b"abcdef"[..]);
        let mut dest = BytesMut::from(&b"~"[..]);
        assert!(reader.read_bytes(4, &mut dest));
        assert_eq!(&dest[..], b"~abcd");
        assert!(!reader.read_bytes(4, &mut dest));
        assert!(reader.ok());
        assert_eq!(&dest[..], b"~abcdef");
    }
}
