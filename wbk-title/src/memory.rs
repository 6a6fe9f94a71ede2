//! In-memory installed titles.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom};

use wbk_archive::ProviderError;

use crate::provider::{ContentReader, ExportSession, TicketView, TitleContent};
use crate::structs::ContentRecord;
use crate::tmd::Tmd;

#[derive(Debug, Clone, Default)]
struct InstalledTitle {
    tmd: Vec<u8>,
    records: Vec<ContentRecord>,
    /// Decrypted contents by TMD index.
    contents: HashMap<u16, Vec<u8>>,
    /// Export form of each content by content ID.
    exported: HashMap<u32, Vec<u8>>,
}

/// Installed titles held in memory.
///
/// Without an explicit export form, a content exports as its decrypted bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryTitles {
    titles: HashMap<u64, InstalledTitle>,
}

impl MemoryTitles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a title from its TMD and decrypted contents, in record order.
    pub fn install(&mut self, tmd: &Tmd, contents: Vec<Vec<u8>>) -> crate::Result<&mut Self> {
        let mut title = InstalledTitle {
            tmd: tmd.to_bytes()?,
            records: tmd.contents.clone(),
            ..InstalledTitle::default()
        };
        for (record, data) in tmd.contents.iter().zip(contents) {
            title.exported.insert(record.content_id, data.clone());
            title.contents.insert(record.index, data);
        }

        self.titles.insert(tmd.title_id, title);
        Ok(self)
    }

    /// Replace the bytes exported for `content_id`.
    pub fn set_export_form(&mut self, title_id: u64, content_id: u32, data: Vec<u8>) -> &mut Self {
        if let Some(title) = self.titles.get_mut(&title_id) {
            title.exported.insert(content_id, data);
        }
        self
    }

    /// Replace the stored TMD returned for `title_id`.
    pub fn set_stored_tmd(&mut self, title_id: u64, tmd: Vec<u8>) -> &mut Self {
        if let Some(title) = self.titles.get_mut(&title_id) {
            title.tmd = tmd;
        }
        self
    }

    fn title(&self, title_id: u64) -> Result<&InstalledTitle, ProviderError> {
        self.titles
            .get(&title_id)
            .ok_or_else(|| ProviderError::NotFound(format!("{title_id:016x}")))
    }
}

#[derive(Debug)]
pub struct MemoryContent {
    data: Cursor<Vec<u8>>,
}

impl ContentReader for MemoryContent {
    fn seek(&mut self, offset: u64) -> Result<(), ProviderError> {
        self.data.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ProviderError> {
        Ok(self.data.read(buf)?)
    }
}

#[derive(Debug)]
pub struct MemoryExport {
    data: Cursor<Vec<u8>>,
}

impl ExportSession for MemoryExport {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, ProviderError> {
        Ok(self.data.read(buf)?)
    }

    fn end(self) -> Result<(), ProviderError> {
        Ok(())
    }
}

impl TitleContent for MemoryTitles {
    type Content = MemoryContent;
    type Export = MemoryExport;

    fn stored_tmd(&self, title_id: u64) -> Result<Vec<u8>, ProviderError> {
        Ok(self.title(title_id)?.tmd.clone())
    }

    fn ticket_views(&self, title_id: u64) -> Result<Vec<TicketView>, ProviderError> {
        self.title(title_id)?;
        Ok(vec![TicketView(title_id.to_be_bytes().to_vec())])
    }

    fn open_content(
        &self,
        title_id: u64,
        _view: &TicketView,
        index: u16,
    ) -> Result<Self::Content, ProviderError> {
        let data = self
            .title(title_id)?
            .contents
            .get(&index)
            .ok_or_else(|| ProviderError::NotFound(format!("{title_id:016x}/{index}")))?;
        Ok(MemoryContent {
            data: Cursor::new(data.clone()),
        })
    }

    fn export_begin(&self, title_id: u64, content_id: u32) -> Result<Self::Export, ProviderError> {
        let title = self.title(title_id)?;
        if !title.records.iter().any(|r| r.content_id == content_id) {
            return Err(ProviderError::NotFound(format!("{title_id:016x}/{content_id:08x}")));
        }

        let data = title.exported.get(&content_id).cloned().unwrap_or_default();
        Ok(MemoryExport {
            data: Cursor::new(data),
        })
    }
}
