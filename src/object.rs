use crate::error::Error;

/// Lifecycle state shared by every reader and writer: open, possibly failed
/// terminally, finally closed.
///
/// A terminal failure is sticky: the first error wins and later ones are
/// dropped. A closed object still answers queries but mutates nothing.
#[derive(Debug)]
pub(crate) struct ObjectState {
    error: Option<Error>,
    open: bool,
}

impl ObjectState {
    #[inline]
    pub(crate) fn open() -> Self {
        Self {
            error: None,
            open: true,
        }
    }

    #[inline]
    pub(crate) fn ok(&self) -> bool {
        self.open && self.error.is_none()
    }

    #[inline]
    pub(crate) fn is_open(&self) -> bool {
        self.open
    }

    #[inline]
    pub(crate) fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Records the terminal failure. Always returns `false` so failing call
    /// sites can `return state.fail(..)` directly.
    pub(crate) fn fail(&mut self, error: Error) -> bool {
        if self.error.is_none() {
            self.error = Some(error);
        }
        false
    }

    #[inline]
    pub(crate) fn mark_closed(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn first_failure_wins() {
        let mut state = ObjectState::open();
        assert!(state.ok());
        assert!(!state.fail(Error::overflow()));
        assert!(!state.fail(Error::unimplemented("seek")));
        assert_eq!(
            state.error().map(Error::kind),
            Some(ErrorKind::ResourceExhausted)
        );
        assert!(!state.ok());
    }

    #[test]
    fn closing_is_idempotent() {
        let mut state = ObjectState::open();
        state.mark_closed();
        state.mark_closed();
        assert!(!state.ok());
        assert!(!state.is_open());
        assert!(state.error().is_none());
    }
}
