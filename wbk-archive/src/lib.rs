//! Signed, encrypted save-data archives in the console's SD-card format.
//!
//! [`export_save`] serializes a title's save directory into a `data.bin`
//! stream; [`SaveArchiveReader`] parses and verifies such a stream; and
//! [`extract_save`] mirrors a save directory onto the host filesystem.
//!
//! Console services (NAND access, the SD-key cipher and the device
//! identity) are reached through the traits in [`provider`].

pub mod error;
pub mod host;
pub mod memory;
pub mod options;
pub mod provider;
pub mod save;
pub mod signing;
pub mod structs;
pub mod table;

pub use error::{ArchiveError, FormatError, ProviderError, ProviderResultExt, Result};
pub use host::HostNand;
pub use memory::MemoryNand;
pub use options::{ExportOptions, ExportOptionsBuilder, WalkOptions, WalkOptionsBuilder};
pub use provider::{
    Console, DeviceCipher, Identity, KeySelector, Provider, SignedDigest, Storage, StorageFile,
};
pub use save::{SaveArchiveReader, SaveExtractor, SaveWriter, export_save, extract_save};
pub use table::{FileEntry, FileTable, build_file_table};
