//! Save-data archives: export, verification and extraction.

pub mod extract;
pub mod reader;
pub mod writer;

pub use extract::{ExtractSummary, SaveExtractor, extract_save};
pub use reader::{ArchivedEntry, SaveArchiveReader};
pub use writer::{ExportSummary, SaveWriter, export_save, validate_banner};
