//! Lookup of files inside a U8 archive.

use byteorder::{BigEndian, ByteOrder};
use tracing::debug;
use wbk_archive::ProviderResultExt;
use wbk_archive::structs::{field_str, from_bytes};

use crate::error::{Result, TitleError};
use crate::provider::ContentReader;
use crate::structs::{U8_MAGIC, U8Header, U8Node};

/// Location of a file inside a U8 archive, relative to the archive start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U8File {
    pub offset: u32,
    pub size: u32,
}

/// Parsed node and string tables of a U8 archive.
#[derive(Debug, Clone)]
pub struct U8Archive {
    nodes: Vec<U8Node>,
    strings: Vec<u8>,
}

impl U8Archive {
    /// Read the U8 tables of an archive starting at `base` in `content`.
    pub fn read<C: ContentReader + ?Sized>(content: &mut C, base: u64) -> Result<Self> {
        let header_bytes = content.read_at(base, U8Header::SIZE).during("read_content")?;
        let header: U8Header = from_bytes(&header_bytes)?;
        if header.magic != U8_MAGIC {
            return Err(TitleError::U8Magic(header.magic));
        }

        let tables = content
            .read_at(base + u64::from(header.root_offset), header.header_size as usize)
            .during("read_content")?;
        Self::from_tables(&tables)
    }

    /// Parse a node table immediately followed by its string table.
    pub fn from_tables(tables: &[u8]) -> Result<Self> {
        if tables.len() < U8Node::SIZE {
            return Err(TitleError::U8Layout("missing root node"));
        }

        let count = BigEndian::read_u32(&tables[8..12]) as usize;
        let nodes_len = count
            .checked_mul(U8Node::SIZE)
            .filter(|&len| len <= tables.len())
            .ok_or(TitleError::U8Layout("node table exceeds header"))?;

        let nodes = tables[..nodes_len]
            .chunks_exact(U8Node::SIZE)
            .map(from_bytes::<U8Node>)
            .collect::<binrw::BinResult<Vec<_>>>()?;

        Ok(Self {
            nodes,
            strings: tables[nodes_len..].to_vec(),
        })
    }

    fn name(&self, node: &U8Node) -> String {
        self.strings
            .get(node.name_offset()..)
            .map(field_str)
            .unwrap_or_default()
    }

    /// Find the file at `path` (`/`-separated, relative to the root node).
    pub fn find(&self, path: &str) -> Option<U8File> {
        // (path of the directory, index one past its last descendant)
        let mut dirs: Vec<(String, usize)> = vec![(String::new(), self.nodes.len())];

        for (index, node) in self.nodes.iter().enumerate().skip(1) {
            while dirs.len() > 1 && dirs.last().is_some_and(|&(_, end)| index >= end) {
                dirs.pop();
            }

            let parent = dirs.last().map_or("", |(p, _)| p.as_str());
            let name = self.name(node);
            let full = if parent.is_empty() {
                name
            } else {
                format!("{parent}/{name}")
            };

            if node.is_directory() {
                dirs.push((full, node.size as usize));
            } else if full == path {
                debug!(path, offset = node.data_offset, size = node.size, "found U8 entry");
                return Some(U8File {
                    offset: node.data_offset,
                    size: node.size,
                });
            }
        }

        None
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
