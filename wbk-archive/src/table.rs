//! Flat file table built by walking a save data directory.

use std::slice;

use tracing::{debug, info};

use crate::error::{ArchiveError, FormatError, ProviderError, ProviderResultExt, Result};
use crate::options::WalkOptions;
use crate::provider::{FileMode, Storage, StorageFile, join_path};
use crate::structs::{BANNER_NAME, EntryKind, FileHeader, MAX_RELATIVE_PATH, align64};

/// One file or directory marker of a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path below the walk root, without a leading `/`.
    pub relative_path: String,
    pub permissions: u8,
    pub attributes: u8,
    pub kind: EntryKind,
    /// Byte length; always 0 for directories.
    pub size: u32,
}

impl FileEntry {
    fn new(relative_path: String, mode: FileMode, kind: EntryKind, size: u32) -> Result<Self> {
        if relative_path.len() > MAX_RELATIVE_PATH {
            return Err(FormatError::PathTooLong(relative_path).into());
        }

        Ok(Self {
            relative_path,
            permissions: mode.packed(),
            attributes: mode.attributes,
            kind,
            size,
        })
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// The banner at the root of the save. Its body lives in the save blob.
    pub fn is_banner(&self) -> bool {
        self.kind == EntryKind::File && self.relative_path == BANNER_NAME
    }

    /// Whether an encrypted body follows this entry's header in an archive.
    pub fn carries_body(&self) -> bool {
        self.kind == EntryKind::File && !self.is_banner()
    }

    /// Bytes this entry occupies in the file region of an archive.
    pub fn archived_size(&self) -> u64 {
        let body = if self.carries_body() {
            align64(self.size as usize) as u64
        } else {
            0
        };
        FileHeader::SIZE as u64 + body
    }
}

/// Ordered entries in directory-walk order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTable {
    entries: Vec<FileEntry>,
}

impl FileTable {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append an entry, reporting allocation failure instead of aborting.
    pub fn push(&mut self, entry: FileEntry) -> Result<()> {
        self.entries.try_reserve(1)?;
        self.entries.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FileEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, FileEntry> {
        self.entries.iter()
    }

    /// Size of all file headers and padded bodies, as declared in the Bk header.
    pub fn files_size(&self) -> Result<u32> {
        let total: u64 = self.entries.iter().map(FileEntry::archived_size).sum();
        u32::try_from(total).map_err(|_| FormatError::SizeOverflow.into())
    }
}

impl<'a> IntoIterator for &'a FileTable {
    type Item = &'a FileEntry;
    type IntoIter = slice::Iter<'a, FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Recursively list `root` into a flat [`FileTable`].
///
/// Each directory is appended as a zero-size marker and walked immediately,
/// so its contents follow it before the next sibling. Siblings keep the
/// order the provider lists them in.
pub fn build_file_table<S>(storage: &S, root: &str, options: &WalkOptions) -> Result<FileTable>
where
    S: Storage + ?Sized,
{
    let root = root.trim_end_matches('/');
    let mut table = FileTable::new();

    walk_directory(storage, root, root, options, &mut table)?;

    info!(root, entries = table.len(), "built file table");
    Ok(table)
}

fn walk_directory<S>(
    storage: &S,
    root: &str,
    dir: &str,
    options: &WalkOptions,
    table: &mut FileTable,
) -> Result<()>
where
    S: Storage + ?Sized,
{
    let names = storage.list_directory(dir).during("list_directory")?;

    for name in names {
        if options.skip_banner && dir == root && name == BANNER_NAME {
            continue;
        }

        let path = join_path(dir, &name);
        let relative = relative_path(root, &path);
        let mode = storage.get_metadata(&path).during("get_metadata")?;

        match storage.open_for_read(&path) {
            Ok(file) => {
                let size = file.length();
                table.push(FileEntry::new(relative, mode, EntryKind::File, size)?)?;
            }
            Err(ProviderError::IsDirectory) => {
                debug!(path = %relative, "descending into directory");
                table.push(FileEntry::new(relative, mode, EntryKind::Directory, 0)?)?;
                walk_directory(storage, root, &path, options, table)?;
            }
            Err(source) => {
                return Err(ArchiveError::Provider {
                    op: "open_for_read",
                    source,
                });
            }
        }
    }

    Ok(())
}

/// `path` with the `root` prefix and the separator after it removed.
pub fn relative_path(root: &str, path: &str) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .trim_start_matches('/')
        .to_string()
}
