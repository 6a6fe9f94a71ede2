//! Console services for reading installed titles.

use wbk_archive::ProviderError;
use wbk_archive::provider::Console;

/// Opaque ticket view, passed back to the provider when opening content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketView(pub Vec<u8>);

/// Installed title metadata and content access.
pub trait TitleContent {
    type Content: ContentReader;
    type Export: ExportSession;

    /// The signed TMD as stored on the console.
    fn stored_tmd(&self, title_id: u64) -> Result<Vec<u8>, ProviderError>;

    fn ticket_views(&self, title_id: u64) -> Result<Vec<TicketView>, ProviderError>;

    /// Open the decrypted content with TMD index `index`.
    fn open_content(
        &self,
        title_id: u64,
        view: &TicketView,
        index: u16,
    ) -> Result<Self::Content, ProviderError>;

    /// Start exporting content `content_id` in its SD-card form.
    fn export_begin(&self, title_id: u64, content_id: u32) -> Result<Self::Export, ProviderError>;
}

/// Random access to decrypted content. Dropping it closes the content.
pub trait ContentReader {
    fn seek(&mut self, offset: u64) -> Result<(), ProviderError>;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ProviderError>;

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ProviderError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(ProviderError::ShortRead {
                    missing: buf.len() - filled,
                });
            }
            filled += n;
        }
        Ok(())
    }

    /// Read `len` bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, ProviderError> {
        let mut buf = vec![0u8; len];
        self.seek(offset)?;
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// An in-progress content export.
///
/// Dropping a session without calling [`ExportSession::end`] abandons it.
pub trait ExportSession {
    /// Read the next exported bytes, returning 0 once the content is exhausted.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, ProviderError>;

    fn end(self) -> Result<(), ProviderError>;
}

impl<S: TitleContent, C, I> TitleContent for Console<S, C, I> {
    type Content = S::Content;
    type Export = S::Export;

    fn stored_tmd(&self, title_id: u64) -> Result<Vec<u8>, ProviderError> {
        self.storage.stored_tmd(title_id)
    }

    fn ticket_views(&self, title_id: u64) -> Result<Vec<TicketView>, ProviderError> {
        self.storage.ticket_views(title_id)
    }

    fn open_content(
        &self,
        title_id: u64,
        view: &TicketView,
        index: u16,
    ) -> Result<Self::Content, ProviderError> {
        self.storage.open_content(title_id, view, index)
    }

    fn export_begin(&self, title_id: u64, content_id: u32) -> Result<Self::Export, ProviderError> {
        self.storage.export_begin(title_id, content_id)
    }
}
