//! Error types for directory file reading.

/// Errors produced when reading a server directory file.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A line did not parse as `<name> <weight>` with a positive weight.
    #[error("malformed directory line {line}: {content:?}")]
    MalformedLine {
        /// 1-based line number in the file.
        line: usize,
        /// The offending line, verbatim.
        content: String,
    },
}
