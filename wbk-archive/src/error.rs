//! Error types for archive export and extraction

use std::collections::TryReserveError;
use std::io;

use thiserror::Error;
use wbk_secure::CipherError;

/// Main error type for archive operations
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("provider call `{op}` failed: {source}")]
    Provider {
        op: &'static str,
        #[source]
        source: ProviderError,
    },
    #[error("invalid format: {0}")]
    Format(#[from] FormatError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),
    #[error("file table allocation failed: {0}")]
    Allocation(#[from] TryReserveError),
    #[error("binary layout error: {0}")]
    Layout(#[from] binrw::Error),
    #[error("invalid options: {0}")]
    Options(String),
}

/// Status reported by a storage, cipher or identity provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("path is a directory")]
    IsDirectory,
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("file of {0} bytes exceeds 32-bit length")]
    FileTooLarge(u64),
    #[error("read ended {missing} bytes early")]
    ShortRead { missing: usize },
    #[error("path \"{0}\" leaves the storage root")]
    InvalidPath(String),
    #[error("provider returned status {0}")]
    Status(i32),
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A structure read from storage or from an archive failed validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("banner is {len} bytes, below the minimum of {min}")]
    BannerTooShort { len: usize, min: usize },
    #[error("banner is {len} bytes, above the maximum of {max}")]
    BannerTooLong { len: usize, max: usize },
    #[error("banner length {0} is not a whole number of icon frames")]
    BannerFrames(usize),
    #[error("invalid magic in {what}: {found:#010x}")]
    BadMagic { what: &'static str, found: u32 },
    #[error("checksum mismatch in {0}")]
    ChecksumMismatch(&'static str),
    #[error("relative path \"{0}\" exceeds 32 bytes")]
    PathTooLong(String),
    #[error("unknown entry type {0}")]
    UnknownEntryKind(u8),
    #[error("declared sizes overflow 32 bits")]
    SizeOverflow,
    #[error("path \"{0}\" has an empty, `.` or `..` component")]
    UnsafePath(String),
    #[error("entry index {0} out of range")]
    EntryIndex(usize),
}

pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;

/// Tag a provider result with the name of the call that produced it.
pub trait ProviderResultExt<T> {
    fn during(self, op: &'static str) -> Result<T>;
}

impl<T> ProviderResultExt<T> for std::result::Result<T, ProviderError> {
    fn during(self, op: &'static str) -> Result<T> {
        self.map_err(|source| ArchiveError::Provider { op, source })
    }
}
