use std::os::raw::c_int;

use thiserror::Error;

use crate::consts::FILE_NAME_LENGTH;

type ErrorNum = c_int;

#[derive(Error, Debug)]
pub enum FsError {
    /// Bad magic number on load. Fatal to open.
    #[error("Invalid volume: {0}")]
    InvalidVolume(String),

    #[error("File '{0}' already exists")]
    AlreadyExists(String),

    #[error("File '{0}' not found")]
    NotFound(String),

    #[error("File '{0}' is already deleted")]
    AlreadyDeleted(String),

    /// Read on a tombstoned descriptor.
    #[error("File '{0}' is deleted")]
    Deleted(String),

    #[error("No free file table slots")]
    NoFreeSlot,

    #[error("File too large: {needed} blocks needed, at most {max} allowed")]
    TooLarge { needed: usize, max: usize },

    #[error("Not enough space: {needed} blocks needed, {available} available")]
    InsufficientSpace { needed: usize, available: usize },

    #[error("Journal unreadable: {0}")]
    JournalUnreadable(#[source] std::io::Error),

    #[error("Invalid file name '{0}'")]
    InvalidName(String),

    #[error("Access at offset {offset} (+{len}) outside of volume of {size} bytes")]
    OutOfBounds { offset: u64, len: usize, size: u64 },

    #[error("Corrupt metadata: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    pub fn errno(&self) -> ErrorNum {
        match self {
            FsError::NotFound(_) | FsError::Deleted(_) | FsError::AlreadyDeleted(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::NoFreeSlot | FsError::InsufficientSpace { .. } => libc::ENOSPC,
            FsError::TooLarge { .. } => libc::EFBIG,
            FsError::InvalidName(name) if name.len() > FILE_NAME_LENGTH => libc::ENAMETOOLONG,
            FsError::InvalidName(_) => libc::EINVAL,
            FsError::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            FsError::InvalidVolume(_)
            | FsError::JournalUnreadable(_)
            | FsError::OutOfBounds { .. }
            | FsError::Corrupt(_) => libc::EIO,
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = FsError::TooLarge { needed: 300, max: 256 };
        assert_eq!(err.to_string(), "File too large: 300 blocks needed, at most 256 allowed");
        assert_eq!(FsError::NotFound("a".to_string()).to_string(), "File 'a' not found");
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: FsError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
        assert_eq!(err.errno(), libc::EIO);
    }

    #[test]
    fn errno_mapping() {
        assert_eq!(FsError::NotFound("a".into()).errno(), libc::ENOENT);
        assert_eq!(FsError::Deleted("a".into()).errno(), libc::ENOENT);
        assert_eq!(FsError::AlreadyExists("a".into()).errno(), libc::EEXIST);
        assert_eq!(FsError::NoFreeSlot.errno(), libc::ENOSPC);
        assert_eq!(FsError::InsufficientSpace { needed: 2, available: 1 }.errno(), libc::ENOSPC);
        assert_eq!(FsError::TooLarge { needed: 300, max: 256 }.errno(), libc::EFBIG);
        assert_eq!(FsError::InvalidName("x".repeat(40)).errno(), libc::ENAMETOOLONG);
        assert_eq!(FsError::InvalidName(String::new()).errno(), libc::EINVAL);
    }
}
