//! Storage provider over a host directory laid out like the console NAND.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::ProviderError;
use crate::provider::{FileMode, Storage, StorageFile, path_components, title_data_path};

/// NAND dump rooted at a host directory, e.g. `root/title/00010000/52534245/data`.
///
/// Listings are sorted by name since host directory order is unstable.
#[derive(Debug, Clone)]
pub struct HostNand {
    root: PathBuf,
}

impl HostNand {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path of a NAND path. Paths that would leave the root are rejected.
    pub fn host_path(&self, path: &str) -> Result<PathBuf, ProviderError> {
        let parts =
            path_components(path).map_err(|_| ProviderError::InvalidPath(path.to_string()))?;
        Ok(parts
            .into_iter()
            .fold(self.root.clone(), |host, part| host.join(part)))
    }
}

fn map_io(path: &str, e: io::Error) -> ProviderError {
    match e.kind() {
        io::ErrorKind::NotFound => ProviderError::NotFound(path.to_string()),
        _ => ProviderError::Io(e),
    }
}

#[cfg(unix)]
fn mode_of(metadata: &fs::Metadata) -> FileMode {
    use std::os::unix::fs::PermissionsExt;

    let bits = metadata.permissions().mode();
    let class = |shift: u32| {
        let read = (bits >> (shift + 2)) & 1;
        let write = (bits >> (shift + 1)) & 1;
        (read | write << 1) as u8
    };

    FileMode {
        owner: class(6),
        group: class(3),
        other: class(0),
        attributes: 0,
    }
}

#[cfg(not(unix))]
fn mode_of(_metadata: &fs::Metadata) -> FileMode {
    FileMode::default()
}

#[derive(Debug)]
pub struct HostFile {
    file: File,
    length: u32,
}

impl StorageFile for HostFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ProviderError> {
        Ok(self.file.read(buf)?)
    }

    fn length(&self) -> u32 {
        self.length
    }
}

impl Storage for HostNand {
    type File = HostFile;

    fn list_directory(&self, path: &str) -> Result<Vec<String>, ProviderError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.host_path(path)?).map_err(|e| map_io(path, e))? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn get_metadata(&self, path: &str) -> Result<FileMode, ProviderError> {
        let metadata = fs::metadata(self.host_path(path)?).map_err(|e| map_io(path, e))?;
        Ok(mode_of(&metadata))
    }

    fn open_for_read(&self, path: &str) -> Result<Self::File, ProviderError> {
        let host = self.host_path(path)?;
        let metadata = fs::metadata(&host).map_err(|e| map_io(path, e))?;
        if metadata.is_dir() {
            return Err(ProviderError::IsDirectory);
        }

        let length =
            u32::try_from(metadata.len()).map_err(|_| ProviderError::FileTooLarge(metadata.len()))?;
        let file = File::open(&host).map_err(|e| map_io(path, e))?;
        Ok(HostFile { file, length })
    }

    fn data_directory(&self, title_id: u64) -> String {
        title_data_path(title_id)
    }
}
