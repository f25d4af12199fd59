use std::{
    borrow::Cow,
    fmt,
    io,
};

/// Classifies a terminal stream failure.
///
/// The natural end of a stream is *not* an error and has no kind here; it is
/// reported by the short-read/short-write return values while `ok()` stays
/// true.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A precondition violation surfaced to the caller, e.g. a seek outside
    /// the sensible range.
    InvalidArgument,

    /// The operation is not supported by this reader or writer, e.g. seeking
    /// a pipe.
    Unimplemented,

    /// 64-bit position arithmetic would overflow.
    ResourceExhausted,

    /// The underlying source or sink was torn down mid-operation.
    Cancelled,

    /// A failure of the underlying source or sink with no better
    /// classification.
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidArgument => "invalid argument",
            Self::Unimplemented => "unimplemented",
            Self::ResourceExhausted => "resource exhausted",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        })
    }
}

/// A terminal failure of a reader or writer.
///
/// Once a reader or writer carries one of these its byte stream is never
/// mutated again; every subsequent operation short-circuits.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: Cow<'static, str>,
    #[source]
    source: Option<io::Error>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// The given operation is not supported by this reader or writer.
    pub fn unimplemented(operation: &'static str) -> Self {
        Self::new(
            ErrorKind::Unimplemented,
            format!("{operation} not supported"),
        )
    }

    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// The logical stream position cannot be represented anymore.
    pub fn overflow() -> Self {
        Self::new(ErrorKind::ResourceExhausted, "stream position overflow")
    }

    /// An OS-level operation failed. The message is `"<operation> failed"`;
    /// the OS error is kept as the error source.
    pub fn operation(operation: &'static str, source: io::Error) -> Self {
        let kind = match source.kind() {
            io::ErrorKind::InvalidInput => ErrorKind::InvalidArgument,
            io::ErrorKind::Unsupported => ErrorKind::Unimplemented,
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset => ErrorKind::Cancelled,
            _ => ErrorKind::Unknown,
        };
        Self {
            kind,
            message: format!("{operation} failed").into(),
            source: Some(source),
        }
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_keeps_the_os_error_as_source() {
        let error = Error::operation(
            "read",
            io::Error::new(io::ErrorKind::Other, "device unplugged"),
        );
        assert_eq!(error.kind(), ErrorKind::Unknown);
        assert_eq!(error.to_string(), "unknown: read failed");
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn unsupported_io_errors_map_to_unimplemented() {
        let error = Error::operation("seek", io::Error::from(io::ErrorKind::Unsupported));
        assert_eq!(error.kind(), ErrorKind::Unimplemented);
    }

    #[test]
    fn unimplemented_names_the_operation() {
        let error = Error::unimplemented("seek backwards");
        assert_eq!(
            error.to_string(),
            "unimplemented: seek backwards not supported"
        );
    }
}
