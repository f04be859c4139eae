//! Output targets for formatted records.
//!
//! File output goes through `tracing_appender`'s rolling appender; a plain
//! `file` handler is an appender that never rotates.

use std::fmt;
use std::io::{self, Write};
use std::path::Path;

use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;

/// Destination of formatted lines.
pub trait Sink: Send + Sync {
    fn write_line(&self, line: &str) -> io::Result<()>;

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Standard stream target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    /// Accepts `stdout`, `stderr` and the `ext://sys.stdout` spelling.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim_start_matches("ext://sys.") {
            "stdout" => Some(Stream::Stdout),
            "stderr" => Some(Stream::Stderr),
            _ => None,
        }
    }
}

/// Writes to stdout or stderr.
#[derive(Debug)]
pub struct ConsoleSink {
    stream: Stream,
}

impl ConsoleSink {
    pub fn new(stream: Stream) -> Self {
        Self { stream }
    }
}

impl Sink for ConsoleSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        match self.stream {
            Stream::Stdout => writeln!(io::stdout().lock(), "{}", line),
            Stream::Stderr => writeln!(io::stderr().lock(), "{}", line),
        }
    }

    fn flush(&self) -> io::Result<()> {
        match self.stream {
            Stream::Stdout => io::stdout().flush(),
            Stream::Stderr => io::stderr().flush(),
        }
    }
}

/// Parse a rotation period: `minutely`, `hourly`, `daily` or `never`.
///
/// The single-letter `M`, `H`, `D` and `midnight` spellings are accepted too.
pub fn parse_rotation(value: &str) -> Option<Rotation> {
    match value.to_ascii_lowercase().as_str() {
        "minutely" | "m" => Some(Rotation::MINUTELY),
        "hourly" | "h" => Some(Rotation::HOURLY),
        "daily" | "d" | "midnight" => Some(Rotation::DAILY),
        "never" => Some(Rotation::NEVER),
        _ => None,
    }
}

/// Log file written through a rolling appender.
///
/// The appender lives in `directory` and names its files after `file_name`,
/// with a date suffix unless the rotation is `NEVER`.
pub struct FileSink {
    appender: RollingFileAppender,
}

impl FileSink {
    /// Single file that is appended to and never rotated.
    pub fn open(directory: &Path, file_name: &str) -> Result<Self, InitError> {
        Self::rolling(directory, file_name, Rotation::NEVER, None)
    }

    /// Rotating file; `max_files` bounds the number of files kept.
    pub fn rolling(
        directory: &Path,
        file_name: &str,
        rotation: Rotation,
        max_files: Option<usize>,
    ) -> Result<Self, InitError> {
        let mut builder = RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(file_name);
        if let Some(max_files) = max_files {
            builder = builder.max_log_files(max_files);
        }
        Ok(Self {
            appender: builder.build(directory)?,
        })
    }
}

impl Sink for FileSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.appender.make_writer();
        writeln!(writer, "{}", line)
    }

    fn flush(&self) -> io::Result<()> {
        self.appender.make_writer().flush()
    }
}

impl fmt::Debug for FileSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSink").finish_non_exhaustive()
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl Sink for NullSink {
    fn write_line(&self, _line: &str) -> io::Result<()> {
        Ok(())
    }
}
