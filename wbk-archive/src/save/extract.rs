//! Mirror a title's save directory onto the host filesystem.
//!
//! Extraction copies stored bytes verbatim; nothing is decrypted or hashed.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{FormatError, ProviderResultExt, Result};
use crate::options::{DEFAULT_CHUNK_SIZE, WalkOptions};
use crate::provider::{Storage, StorageFile, join_path, path_components};
use crate::table::{FileEntry, build_file_table};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub directories: usize,
    pub files: usize,
    pub bytes: u64,
}

pub struct SaveExtractor<'s, S: Storage + ?Sized> {
    storage: &'s S,
    walk: WalkOptions,
    chunk: Vec<u8>,
}

impl<'s, S: Storage + ?Sized> SaveExtractor<'s, S> {
    /// Extractor that copies every entry, `banner.bin` included.
    pub fn new(storage: &'s S) -> Self {
        Self::with_walk_options(storage, WalkOptions { skip_banner: false })
    }

    pub fn with_walk_options(storage: &'s S, walk: WalkOptions) -> Self {
        Self {
            storage,
            walk,
            chunk: Vec::new(),
        }
    }

    /// Copy the save of `title_id` below `destination`.
    pub fn extract(&mut self, title_id: u64, destination: &Path) -> Result<ExtractSummary> {
        let data_dir = self.storage.data_directory(title_id);
        let table = build_file_table(self.storage, &data_dir, &self.walk)?;

        fs::create_dir_all(destination)?;

        let mut summary = ExtractSummary::default();
        for entry in &table {
            let target = destination_path(destination, entry)?;

            if entry.is_directory() {
                debug!(path = %entry.relative_path, "creating directory");
                fs::create_dir_all(&target)?;
                summary.directories += 1;
                continue;
            }

            let source = join_path(&data_dir, &entry.relative_path);
            summary.bytes += self.copy_file(&source, &target)?;
            summary.files += 1;
        }

        info!(
            directories = summary.directories,
            files = summary.files,
            bytes = summary.bytes,
            "save extraction complete"
        );
        Ok(summary)
    }

    fn copy_file(&mut self, source: &str, target: &Path) -> Result<u64> {
        if self.chunk.is_empty() {
            self.chunk.resize(DEFAULT_CHUNK_SIZE, 0);
        }

        let mut file = self.storage.open_for_read(source).during("open_for_read")?;
        let mut out = BufWriter::new(File::create(target)?);

        let mut copied = 0u64;
        loop {
            let n = file.read(&mut self.chunk).during("read")?;
            if n == 0 {
                break;
            }
            out.write_all(&self.chunk[..n])?;
            copied += n as u64;
        }

        out.flush()?;
        Ok(copied)
    }
}

fn destination_path(root: &Path, entry: &FileEntry) -> Result<PathBuf> {
    let parts = path_components(&entry.relative_path)?;
    if parts.is_empty() {
        return Err(FormatError::UnsafePath(entry.relative_path.clone()).into());
    }
    Ok(parts
        .into_iter()
        .fold(root.to_path_buf(), |path, part| path.join(part)))
}

/// Copy the save of `title_id` below `destination`, banner included.
pub fn extract_save<S>(
    storage: &S,
    title_id: u64,
    destination: impl AsRef<Path>,
) -> Result<ExtractSummary>
where
    S: Storage + ?Sized,
{
    SaveExtractor::new(storage).extract(title_id, destination.as_ref())
}
