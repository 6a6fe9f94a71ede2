//! Builder-pattern options for walking and exporting.

use derive_builder::Builder;

use crate::error::ArchiveError;
use crate::structs::ARCHIVE_ALIGN;

/// Default streaming chunk size for file bodies.
pub const DEFAULT_CHUNK_SIZE: usize = 0x10000;

/// Options for building a file table.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct WalkOptions {
    /// Leave `banner.bin` at the root of the walk out of the table
    #[builder(default = "true")]
    pub skip_banner: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self { skip_banner: true }
    }
}

/// Options for a save export.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ExportOptions {
    /// Size of the buffer file bodies are streamed through
    #[builder(default = "DEFAULT_CHUNK_SIZE")]
    pub chunk_size: usize,
    /// Options passed to the file tree walker
    #[builder(default)]
    pub walk: WalkOptions,
    /// Zero the part of the save blob the banner does not cover
    #[builder(default = "true")]
    pub zero_fill_banner_tail: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            walk: WalkOptions::default(),
            zero_fill_banner_tail: true,
        }
    }
}

fn check_chunk_size(chunk_size: usize) -> Result<(), String> {
    if chunk_size == 0 || !chunk_size.is_multiple_of(ARCHIVE_ALIGN) {
        return Err(format!(
            "chunk_size must be a non-zero multiple of {ARCHIVE_ALIGN}, got {chunk_size}"
        ));
    }
    Ok(())
}

impl ExportOptions {
    /// Check options that may have been built without the builder.
    pub fn validate(&self) -> crate::Result<()> {
        check_chunk_size(self.chunk_size).map_err(ArchiveError::Options)
    }
}

impl ExportOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.chunk_size {
            Some(chunk_size) => check_chunk_size(chunk_size),
            None => Ok(()),
        }
    }
}
