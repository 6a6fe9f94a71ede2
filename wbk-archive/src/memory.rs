//! In-memory NAND used to export synthetic save trees.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use crate::error::ProviderError;
use crate::provider::{FileMode, Storage, StorageFile, join_path, title_data_path};

#[derive(Debug, Clone)]
enum Node {
    File { data: Vec<u8>, mode: FileMode },
    Directory { children: Vec<String>, mode: FileMode },
}

/// A tree of files and directories keyed by absolute path.
///
/// Directory listings keep insertion order. Parent directories are created
/// implicitly with default permissions.
#[derive(Debug, Clone)]
pub struct MemoryNand {
    nodes: HashMap<String, Node>,
    failures: HashMap<String, i32>,
}

impl Default for MemoryNand {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNand {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            "/".to_string(),
            Node::Directory {
                children: Vec::new(),
                mode: FileMode::default(),
            },
        );
        Self {
            nodes,
            failures: HashMap::new(),
        }
    }

    /// Add or replace a file.
    pub fn add_file(&mut self, path: &str, data: impl Into<Vec<u8>>) -> &mut Self {
        let path = normalize(path);
        let mode = match self.nodes.get(&path) {
            Some(Node::File { mode, .. }) => *mode,
            _ => FileMode::default(),
        };
        self.link(&path);
        self.nodes.insert(
            path,
            Node::File {
                data: data.into(),
                mode,
            },
        );
        self
    }

    pub fn add_directory(&mut self, path: &str) -> &mut Self {
        let path = normalize(path);
        if !matches!(self.nodes.get(&path), Some(Node::Directory { .. })) {
            self.link(&path);
            self.nodes.insert(
                path,
                Node::Directory {
                    children: Vec::new(),
                    mode: FileMode::default(),
                },
            );
        }
        self
    }

    /// Set the permission metadata of an existing node.
    pub fn set_mode(&mut self, path: &str, new_mode: FileMode) -> &mut Self {
        match self.nodes.get_mut(&normalize(path)) {
            Some(Node::File { mode, .. } | Node::Directory { mode, .. }) => *mode = new_mode,
            None => {}
        }
        self
    }

    /// Make every later open of `path` fail with `status`.
    pub fn fail_open(&mut self, path: &str, status: i32) -> &mut Self {
        self.failures.insert(normalize(path), status);
        self
    }

    /// Add `name` under the title's data directory.
    pub fn add_save_file(
        &mut self,
        title_id: u64,
        name: &str,
        data: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.add_file(&join_path(&title_data_path(title_id), name), data)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(&normalize(path))
    }

    /// Register `path` with its parent, creating missing ancestors.
    fn link(&mut self, path: &str) {
        if path == "/" || self.nodes.contains_key(path) {
            return;
        }

        let (parent, name) = split_parent(path);
        self.add_directory(&parent);
        if let Some(Node::Directory { children, .. }) = self.nodes.get_mut(&parent) {
            children.push(name.to_string());
        }
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{trimmed}")
}

fn split_parent(path: &str) -> (String, &str) {
    match path.rfind('/') {
        Some(0) | None => ("/".to_string(), path.trim_start_matches('/')),
        Some(at) => (path[..at].to_string(), &path[at + 1..]),
    }
}

/// Open handle on a [`MemoryNand`] file.
#[derive(Debug)]
pub struct MemoryFile {
    data: Cursor<Vec<u8>>,
}

impl StorageFile for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ProviderError> {
        Ok(self.data.read(buf)?)
    }

    fn length(&self) -> u32 {
        self.data.get_ref().len() as u32
    }
}

impl Storage for MemoryNand {
    type File = MemoryFile;

    fn list_directory(&self, path: &str) -> Result<Vec<String>, ProviderError> {
        match self.nodes.get(&normalize(path)) {
            Some(Node::Directory { children, .. }) => Ok(children.clone()),
            Some(Node::File { .. }) => Err(ProviderError::Status(-101)),
            None => Err(ProviderError::NotFound(path.to_string())),
        }
    }

    fn get_metadata(&self, path: &str) -> Result<FileMode, ProviderError> {
        match self.nodes.get(&normalize(path)) {
            Some(Node::File { mode, .. } | Node::Directory { mode, .. }) => Ok(*mode),
            None => Err(ProviderError::NotFound(path.to_string())),
        }
    }

    fn open_for_read(&self, path: &str) -> Result<Self::File, ProviderError> {
        let path = normalize(path);
        if let Some(status) = self.failures.get(&path) {
            return Err(ProviderError::Status(*status));
        }

        match self.nodes.get(&path) {
            Some(Node::File { data, .. }) => {
                if u32::try_from(data.len()).is_err() {
                    return Err(ProviderError::FileTooLarge(data.len() as u64));
                }
                Ok(MemoryFile {
                    data: Cursor::new(data.clone()),
                })
            }
            Some(Node::Directory { .. }) => Err(ProviderError::IsDirectory),
            None => Err(ProviderError::NotFound(path)),
        }
    }

    fn data_directory(&self, title_id: u64) -> String {
        title_data_path(title_id)
    }
}
