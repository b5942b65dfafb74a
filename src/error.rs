use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransferError>;

/// Every variant is terminal for the transfer that raised it.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{}: {source}", .path.display())]
    LocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid checksum")]
    ChecksumMismatch,

    #[error("not enough disk space: need={needed} available={available}")]
    InsufficientSpace { needed: u64, available: u64 },

    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("invalid file name {0:?}")]
    InvalidFileName(String),

    /// The peer refused the transfer; carries its reason verbatim
    #[error("{0}")]
    Rejected(String),
}

impl TransferError {
    /// Wrap a local filesystem error, promoting exclusive-create conflicts
    pub fn local(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::AlreadyExists {
            return TransferError::AlreadyExists(path.to_path_buf());
        }
        TransferError::LocalFile {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, TransferError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn local_promotes_already_exists() {
        let err = TransferError::local(Path::new("a.bin"), Error::from(ErrorKind::AlreadyExists));
        assert!(matches!(err, TransferError::AlreadyExists(ref p) if p == Path::new("a.bin")));

        let err = TransferError::local(Path::new("a.bin"), Error::from(ErrorKind::NotFound));
        assert!(matches!(err, TransferError::LocalFile { .. }));
    }

    #[test]
    fn messages_match_wire_status() {
        assert_eq!(TransferError::ChecksumMismatch.to_string(), "invalid checksum");
        let err = TransferError::InsufficientSpace {
            needed: 10,
            available: 5,
        };
        assert_eq!(err.to_string(), "not enough disk space: need=10 available=5");
    }
}
