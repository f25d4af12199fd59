use super::{
    Reader,
    ReaderState,
    SavedWindow,
    SyncType,
};
use crate::{
    arith::to_length,
    buffer::Buffer,
    error::Error,
    writer::Writer,
};

/// A leaf that can only produce its bytes in fragments.
///
/// [`PullableReader`] synthesizes contiguous views across fragment boundaries
/// on top of this. Hooks always see the *underlying* window, as if nothing
/// had ever been copied aside, and since they only receive that window they
/// cannot observe or disturb the copy layer above them.
pub trait PullSource {
    /// Installs the next fragment as the window: replace the exhausted
    /// window, adjust `limit_pos` to the end of the new one. Called only with
    /// an empty window. Returns `false` at the end of the source or on
    /// failure.
    fn pull(&mut self, state: &mut ReaderState, recommended_length: usize) -> bool;

    /// Reads exactly `dest.len()` bytes across fragments. Called only when
    /// the window alone cannot satisfy the read.
    fn read(&mut self, state: &mut ReaderState, dest: &mut [u8]) -> bool {
        let mut offset = 0;
        loop {
            let n = state.available().min(dest.len() - offset);
            if n > 0 {
                state.read_from_window(&mut dest[offset..offset + n]);
                offset += n;
            }
            if offset == dest.len() {
                return true;
            }
            if !self.pull(state, dest.len() - offset) {
                return false;
            }
        }
    }

    /// Transfers exactly `length` bytes to `dest` across fragments.
    fn copy(&mut self, state: &mut ReaderState, length: u64, dest: &mut dyn Writer) -> bool {
        let mut remaining = length;
        while remaining > state.available() as u64 {
            let n = state.available();
            if n > 0 {
                let written = dest.write(&state.chunk()[..n]);
                state.move_cursor(n);
                if !written {
                    return false;
                }
                remaining -= n as u64;
            }
            if !self.pull(state, to_length(remaining)) {
                return false;
            }
        }
        let n = remaining as usize;
        let written = dest.write(&state.chunk()[..n]);
        state.move_cursor(n);
        written
    }

    /// Repositions to `new_pos`, outside the current window. The default can
    /// only go forwards, by pulling and discarding fragments.
    fn seek(&mut self, state: &mut ReaderState, new_pos: u64) -> bool {
        if new_pos <= state.limit_pos() {
            return state.fail(Error::unimplemented("seek backwards"));
        }
        loop {
            let available = state.available();
            state.move_cursor(available);
            if !self.pull(state, to_length(new_pos - state.limit_pos())) {
                return false;
            }
            if new_pos <= state.limit_pos() {
                let available = (state.limit_pos() - new_pos) as usize;
                debug_assert!(available <= state.start_to_limit());
                state.set_cursor(state.start_to_limit() - available);
                return true;
            }
        }
    }

    /// Prefetch advice; free to do nothing.
    fn read_hint(&mut self, state: &mut ReaderState, length: usize) {
        let _ = (state, length);
    }

    fn sync(&mut self, state: &mut ReaderState, sync_type: SyncType) -> bool {
        let _ = sync_type;
        state.ok()
    }

    fn size(&mut self, state: &mut ReaderState) -> Option<u64> {
        let _ = state;
        None
    }

    fn supports_random_access(&mut self, state: &mut ReaderState) -> bool {
        let _ = state;
        false
    }

    fn supports_rewind(&mut self, state: &mut ReaderState) -> bool {
        self.supports_random_access(state)
    }

    fn done(&mut self, state: &mut ReaderState) {
        let _ = state;
    }
}

/// The underlying window, set aside while its bytes are served from a
/// contiguous copy.
#[derive(Debug)]
struct Scratch {
    original: SavedWindow,
}

/// A [`Reader`] over a fragmented [`PullSource`] that serves reads straddling
/// fragment boundaries from an on-demand contiguous copy.
///
/// Single-byte pulls and reads that fit a fragment never copy. When a caller
/// needs `min_length > 1` contiguous bytes and the current fragment is too
/// short, the needed bytes are collected into a scratch buffer which then
/// poses as the window; the real window is set aside and restored once the
/// copy is consumed. The substitution is invisible both to callers and to
/// the [`PullSource`].
#[derive(Debug)]
pub struct PullableReader<S> {
    state: ReaderState,
    src: S,
    scratch: Option<Box<Scratch>>,
}

impl<S: PullSource> PullableReader<S> {
    pub fn new(src: S) -> Self {
        Self {
            state: ReaderState::new(),
            src,
            scratch: None,
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

    pub fn into_src(self) -> S {
        self.src
    }

    #[inline]
    fn scratch_used(&self) -> bool {
        self.scratch.is_some()
    }

    /// Pops scratch: restores the set-aside window and accounts its unread
    /// bytes back into `limit_pos`. The unread tail of scratch is dropped, so
    /// callers must have consumed it or rewind the cursor themselves.
    fn sync_scratch(&mut self) {
        debug_assert!(self.scratch_used());
        let Some(scratch) = self.scratch.take() else {
            return;
        };
        self.state.restore_window(scratch.original);
        let available = self.state.available();
        self.state.move_limit_pos(available);
    }

    /// If the unread rest of scratch is also present in the set-aside window
    /// before its cursor, pops scratch and rewinds the cursor over that rest,
    /// so reading continues seamlessly from the real window.
    fn scratch_ends(&mut self) -> bool {
        debug_assert!(self.scratch_used());
        let available = self.state.available();
        let original_cursor = match &self.scratch {
            Some(scratch) => scratch.original.cursor,
            None => return false,
        };
        if original_cursor >= available {
            self.sync_scratch();
            let cursor = self.state.start_to_cursor() - available;
            self.state.set_cursor(cursor);
            true
        }
        else {
            false
        }
    }

    /// Temporarily restores the underlying window, runs `f` against it, and
    /// re-installs scratch with the window `f` left behind as the new
    /// set-aside original.
    fn with_scratch_hidden<R>(&mut self, f: impl FnOnce(&mut S, &mut ReaderState) -> R) -> R {
        debug_assert!(self.scratch_used());
        let Some(scratch) = self.scratch.take() else {
            return f(&mut self.src, &mut self.state);
        };
        let read_from_scratch = self.state.start_to_cursor();
        let scratch_window = self.state.save_window();
        self.state.restore_window(scratch.original);
        let available = self.state.available();
        self.state.move_limit_pos(available);

        let result = f(&mut self.src, &mut self.state);

        if !self.state.ok() {
            // A terminal failure surfaced under the hook; scratch is void.
            return result;
        }
        let pos = self.state.pos();
        self.state.set_limit_pos(pos);
        let original = self.state.save_window();
        self.state.restore_window(SavedWindow {
            region: scratch_window.region,
            cursor: read_from_scratch,
            limit: scratch_window.limit,
        });
        self.scratch = Some(Box::new(Scratch { original }));
        result
    }
}

impl<S: PullSource> Reader for PullableReader<S> {
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
        if min_length > 1 {
            if self.scratch_used() && self.scratch_ends() && self.state.available() >= min_length {
                return true;
            }
            if self.state.available() == 0 {
                debug_assert!(
                    !self.scratch_used(),
                    "an exhausted scratch should have ended"
                );
                if !self.src.pull(&mut self.state, recommended_length.max(min_length)) {
                    return false;
                }
                if self.state.available() >= min_length {
                    return true;
                }
            }

            // Collect min_length contiguous bytes into scratch.
            let recommended = recommended_length.max(min_length);
            let mut data = Vec::with_capacity(recommended);
            if let Some(scratch) = self.scratch.take() {
                // Keep the unread scratch suffix, then step back to the
                // underlying window.
                data.extend_from_slice(self.state.chunk());
                self.state.restore_window(scratch.original);
                let available = self.state.available();
                self.state.move_limit_pos(available);
            }
            loop {
                let take = self.state.available().min(min_length - data.len());
                if take > 0 {
                    data.extend_from_slice(&self.state.chunk()[..take]);
                    self.state.move_cursor(take);
                    if data.len() >= min_length {
                        break;
                    }
                }
                debug_assert!(!self.scratch_used());
                if !self.src.pull(&mut self.state, recommended - data.len()) {
                    break;
                }
            }

            if !self.state.ok() {
                // The source failed mid-collection; the collected bytes go
                // down with it.
                return false;
            }

            // Substitute scratch for the window.
            let pos = self.state.pos();
            self.state.set_limit_pos(pos);
            let original = self.state.save_window();
            self.scratch = Some(Box::new(Scratch { original }));
            let limit = data.len();
            self.state.set_owned_window(Buffer::from(data), limit, 0);
            return self.state.available() >= min_length;
        }
        if self.scratch_used() {
            self.sync_scratch();
            if self.state.available() > 0 {
                return true;
            }
        }
        self.src.pull(&mut self.state, recommended_length.max(1))
    }

    fn read_slow(&mut self, dest: &mut [u8]) -> bool {
        debug_assert!(self.state.available() < dest.len());
        if !self.state.ok() {
            return false;
        }
        let mut offset = 0;
        if self.scratch_used() {
            if !self.scratch_ends() {
                let n = self.state.available();
                self.state.read_from_window(&mut dest[..n]);
                offset = n;
                self.sync_scratch();
            }
            let remaining = dest.len() - offset;
            if self.state.available() >= remaining {
                self.state.read_from_window(&mut dest[offset..]);
                return true;
            }
        }
        self.src.read(&mut self.state, &mut dest[offset..])
    }

    fn copy_slow(&mut self, length: u64, dest: &mut dyn Writer) -> bool {
        debug_assert!((self.state.available() as u64) < length);
        if !self.state.ok() {
            return false;
        }
        let mut remaining = length;
        if self.scratch_used() {
            if !self.scratch_ends() {
                let n = self.state.available();
                let written = dest.write(&self.state.chunk()[..n]);
                self.state.move_cursor(n);
                if !written {
                    return false;
                }
                remaining -= n as u64;
                if remaining == 0 {
                    return true;
                }
                self.sync_scratch();
            }
            if remaining <= self.state.available() as u64 {
                let n = remaining as usize;
                let written = dest.write(&self.state.chunk()[..n]);
                self.state.move_cursor(n);
                return written;
            }
        }
        self.src.copy(&mut self.state, remaining, dest)
    }

    fn seek_slow(&mut self, new_pos: u64) -> bool {
        debug_assert!(new_pos < self.state.start_pos() || new_pos > self.state.limit_pos());
        if !self.state.ok() {
            return false;
        }
        if self.scratch_used() {
            self.sync_scratch();
            if new_pos >= self.state.start_pos() && new_pos <= self.state.limit_pos() {
                let available = (self.state.limit_pos() - new_pos) as usize;
                self.state.set_cursor(self.state.start_to_limit() - available);
                return true;
            }
        }
        self.src.seek(&mut self.state, new_pos)
    }

    fn read_hint_slow(&mut self, length: usize) {
        if !self.state.ok() {
            return;
        }
        if self.scratch_used() {
            if !self.scratch_ends() {
                let length = length - self.state.available();
                self.with_scratch_hidden(|src, state| {
                    if state.available() < length {
                        src.read_hint(state, length);
                    }
                });
                return;
            }
            if self.state.available() >= length {
                return;
            }
        }
        self.src.read_hint(&mut self.state, length);
    }

    fn sync_impl(&mut self, sync_type: SyncType) -> bool {
        if self.scratch_used() && !self.scratch_ends() {
            if !self.src.supports_random_access(&mut self.state) {
                // Seeking back over the scratched-ahead bytes is not
                // feasible; keep serving them from scratch.
                return self.state.ok();
            }
            let new_pos = self.state.pos();
            self.sync_scratch();
            let _ = self.seek(new_pos);
        }
        self.src.sync(&mut self.state, sync_type)
    }

    fn size_impl(&mut self) -> Option<u64> {
        self.src.size(&mut self.state)
    }

    fn supports_random_access(&mut self) -> bool {
        self.src.supports_random_access(&mut self.state)
    }

    fn supports_rewind(&mut self) -> bool {
        self.src.supports_rewind(&mut self.state)
    }

    fn done(&mut self) {
        if self.scratch_used() && !self.scratch_ends() {
            if !self.src.supports_random_access(&mut self.state) {
                // The source cannot be repositioned; the bytes copied ahead
                // into scratch are simply dropped.
                tracing::trace!("discarding scratch on close");
                self.scratch = None;
                return;
            }
            let new_pos = self.state.pos();
            self.sync_scratch();
            let _ = self.seek(new_pos);
        }
        let _ = self.src.sync(&mut self.state, SyncType::FromObject);
        self.src.done(&mut self.state);
        self.scratch = None;
    }
}
