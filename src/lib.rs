//! Layered buffered readers and writers over arbitrary byte streams.
//!
//! Every [`Reader`] and [`Writer`] exposes a window of bytes between a
//! cursor and a limit. Operations run an inline fast path against that
//! window and fall back to a slow path that refills or drains it; `pull`
//! and `push` give callers direct, zero-copy access to the window itself.
//! On top of that sit scaffolds for the common leaf shapes: a
//! [`BufferedReader`]/[`BufferedWriter`] pair owning adaptively sized
//! buffers, and a [`PullableReader`] that stitches contiguous views across
//! fragmented sources. In-memory and [`std::io`] leaves are included.
//!
//! ```
//! use rill::{
//!     BytesReader,
//!     IoSink,
//!     Reader,
//!     StreamWriter,
//!     Writer,
//! };
//!
//! let mut writer = StreamWriter::open(IoSink::new(Vec::new()));
//! assert!(writer.write(b"hello "));
//! assert!(writer.write(b"world"));
//! assert!(writer.close());
//! let data = writer.into_dest().into_inner().into_inner();
//!
//! let mut reader = BytesReader::new(data);
//! let mut out = [0u8; 11];
//! assert!(reader.read(&mut out));
//! assert_eq!(&out, b"hello world");
//! ```

mod arith;
mod buffer;
mod error;
mod object;
pub mod reader;
pub mod writer;

pub use self::{
    arith::MAX_POSITION,
    buffer::{
        Buffer,
        BufferOptions,
    },
    error::{
        Error,
        ErrorKind,
    },
    reader::{
        buffered::{
            BufferedReader,
            BufferedSource,
        },
        bytes::BytesReader,
        fragments::{
            FragmentsReader,
            FragmentsSource,
        },
        pullable::{
            PullSource,
            PullableReader,
        },
        stream::{
            IoSeekSource,
            IoSource,
            Peek,
            SourceStream,
            StreamReader,
            StreamReaderOptions,
            StreamSource,
        },
        Reader,
        ReaderState,
        SyncType,
    },
    writer::{
        buffered::{
            BufferedSink,
            BufferedWriter,
        },
        bytes::BytesWriter,
        stream::{
            IoSink,
            SinkStream,
            StreamSink,
            StreamWriter,
            StreamWriterOptions,
        },
        FlushType,
        Writer,
        WriterState,
    },
};
