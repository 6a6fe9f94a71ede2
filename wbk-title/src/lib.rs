//! Export of installed titles into signed SD-card content archives.
//!
//! [`export_content`] writes the encrypted content header and icon, then a
//! Bk header, the TMD and every non-shared content under a running SHA-1
//! that the device identity signs, the same way save archives are signed.

pub mod error;
pub mod memory;
pub mod provider;
pub mod structs;
pub mod tmd;
pub mod u8_archive;
pub mod writer;

pub use error::{Result, TitleError};
pub use memory::MemoryTitles;
pub use provider::{ContentReader, ExportSession, TicketView, TitleContent};
pub use tmd::Tmd;
pub use writer::{
    CONTENT_TRAILER_SIZE, ContentProvider, ContentSummary, ContentWriter, export_content,
};

#[cfg(test)]
mod tests;
