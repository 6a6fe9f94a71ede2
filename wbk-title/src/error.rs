//! Error types for installed-title content export

use std::io;

use thiserror::Error;
use wbk_archive::ArchiveError;

#[derive(Debug, Error)]
pub enum TitleError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("binary layout error: {0}")]
    Layout(#[from] binrw::Error),
    #[error("TMD is {len} bytes, at least {need} expected")]
    TmdTooShort { len: usize, need: usize },
    #[error("TMD belongs to title {found:016x}, not {requested:016x}")]
    TmdTitleMismatch { requested: u64, found: u64 },
    #[error("title has no content with index 0")]
    NoBootContent,
    #[error("title has no ticket views")]
    NoTicketView,
    #[error("invalid IMET magic: {0:#010x}")]
    ImetMagic(u32),
    #[error("invalid U8 magic: {0:#010x}")]
    U8Magic(u32),
    #[error("U8 archive is malformed: {0}")]
    U8Layout(&'static str),
    #[error("meta/icon.bin not found in the boot content")]
    IconMissing,
    #[error("declared sizes overflow 32 bits")]
    SizeOverflow,
}

pub type Result<T, E = TitleError> = std::result::Result<T, E>;
