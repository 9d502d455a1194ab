use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::error::Result;

/// The consumer-side destination of the ordered byte stream.
pub enum StreamOutput {
    /// A custom writer that receives the file's bytes in order. The writer
    /// may block; delivery stalls with it.
    Writer(Box<dyn Write + Send + 'static>),

    /// A file path the stream is written to. The file is opened without
    /// truncation.
    File { path: PathBuf },
}

impl StreamOutput {
    /// Creates a writer output that sends the stream to the given writer.
    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        Self::Writer(Box::new(writer))
    }

    /// Creates a file output that writes the stream to the given path.
    pub fn write_in_file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }
}

/// Resolves the output specification into the writer the flush controller
/// delivers into.
pub(crate) fn new_output_writer(output: StreamOutput) -> Result<Box<dyn Write + Send>> {
    match output {
        StreamOutput::Writer(writer) => Ok(writer),
        StreamOutput::File { path } => {
            let file = OpenOptions::new().write(true).create(true).truncate(false).open(&path)?;
            Ok(Box::new(file))
        },
    }
}
