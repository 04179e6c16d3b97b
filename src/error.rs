//! Error types shared by the archive reader, writer and patch driver.
use std::path::{Path, PathBuf};

/// Every failure the archive engine can report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The file does not start with the XP4 signature, or its header was never
    /// committed because the build that produced it did not finish.
    #[error("'{}' is not an XP4 archive file", .0.display())]
    NotAnArchive(PathBuf),
    /// Structural damage: chunk bounds violated, a mandatory chunk is missing,
    /// or the index does not have the size it claims.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),
    /// The zlib stream of an index or a segment could not be inflated.
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),
    /// Open/read/write/seek failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The target directory (or one of its subdirectories) cannot be listed.
    #[error("cannot read directory '{}': {source}", path.display())]
    DirectoryUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The interrupt flag was raised while the operation was running.
    #[error("operation interrupted")]
    Interrupted,
    /// A classification rule is not a valid regular expression.
    #[error("error in regular expression '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Error::CorruptArchive(reason.into())
    }

    /// Wraps the error so it can travel through [std::io::Read] implementations.
    pub(crate) fn into_io(self) -> std::io::Error {
        match self {
            Error::Io(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }

    /// Reverses [`Error::into_io`]; plain I/O errors become [`Error::Io`].
    pub(crate) fn from_io(e: std::io::Error) -> Self {
        match e.downcast::<Error>() {
            Ok(err) => err,
            Err(e) => Error::Io(e),
        }
    }

    /// Prefixes structural errors with the volume they were found in.
    pub(crate) fn in_volume(self, path: &Path) -> Self {
        match self {
            Error::CorruptArchive(reason) => {
                Error::CorruptArchive(format!("{} (in '{}')", reason, path.display()))
            }
            Error::DecompressionFailed(reason) => {
                Error::DecompressionFailed(format!("{} (in '{}')", reason, path.display()))
            }
            Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Error::CorruptArchive(format!("unexpected end of file '{}'", path.display()))
            }
            other => other,
        }
    }
}
