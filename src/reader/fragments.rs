use std::collections::VecDeque;

use ::bytes::Bytes;

use super::{
    pullable::{
        PullableReader,
        PullSource,
    },
    ReaderState,
};
use crate::{
    arith::MAX_POSITION,
    error::Error,
};

/// A queue of refcounted byte fragments, served one per pull.
///
/// Each fragment becomes the window without copying; only reads that
/// straddle fragment boundaries get stitched together by the
/// [`PullableReader`] above.
#[derive(Debug, Default)]
pub struct FragmentsSource {
    fragments: VecDeque<Bytes>,
}

/// A reader over a sequence of byte fragments.
pub type FragmentsReader = PullableReader<FragmentsSource>;

impl PullableReader<FragmentsSource> {
    pub fn from_fragments<I>(fragments: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        Self::new(FragmentsSource {
            fragments: fragments.into_iter().map(Into::into).collect(),
        })
    }
}

impl FragmentsSource {
    /// Appends a fragment to the end of the queue.
    pub fn push(&mut self, fragment: impl Into<Bytes>) {
        self.fragments.push_back(fragment.into());
    }
}

impl PullSource for FragmentsSource {
    fn pull(&mut self, state: &mut ReaderState, _recommended_length: usize) -> bool {
        debug_assert!(state.available() == 0);
        if !state.ok() {
            return false;
        }
        loop {
            let Some(fragment) = self.fragments.pop_front() else {
                return false;
            };
            if fragment.is_empty() {
                continue;
            }
            if fragment.len() as u64 > MAX_POSITION - state.limit_pos() {
                return state.fail(Error::overflow());
            }
            let limit_pos = state.limit_pos() + fragment.len() as u64;
            state.set_shared_window(fragment, 0);
            state.set_limit_pos(limit_pos);
            return true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Reader;

    #[test]
    fn empty_fragments_are_skipped() {
        let mut reader = FragmentsReader::from_fragments([
            Bytes::new(),
            Bytes::from_static(b"ab"),
            Bytes::new(),
            Bytes::from_static(b"cd"),
        ]);
        let mut dest = [0u8; 4];
        assert!(reader.read(&mut dest));
        assert_eq!(&dest, b"abcd");
        assert!(!reader.pull(1, 1));
        assert!(reader.ok());
    }

    #[test]
    fn fragments_are_served_without_copying() {
        let fragment = Bytes::from_static(b"hello");
        let mut reader = FragmentsReader::from_fragments([fragment.clone()]);
        assert!(reader.pull(1, 1));
        // The window is the fragment itself.
        assert_eq!(
            reader.state().chunk().as_ptr(),
            fragment.as_ref().as_ptr()
        );
    }

    #[test]
    fn position_overflow_fails_terminally() {
        let mut reader = FragmentsReader::from_fragments([Bytes::from_static(b"abc")]);
        reader.state_mut().set_limit_pos(MAX_POSITION - 1);
        assert!(!reader.pull(1, 1));
        assert_eq!(
            reader.error().map(|e| e.kind()),
            Some(crate::error::ErrorKind::ResourceExhausted)
        );
    }
}
