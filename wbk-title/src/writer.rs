use std::io::Write;

use tracing::{debug, info};
use wbk_archive::error::{ArchiveError, ProviderError};
use wbk_archive::options::ExportOptions;
use wbk_archive::provider::{DeviceCipher, Identity, KeySelector};
use wbk_archive::signing::write_signature_trailer;
use wbk_archive::structs::{BkHeader, SignatureTrailer, align64, from_bytes, to_bytes};
use wbk_archive::ProviderResultExt;
use wbk_secure::hash::{md5, seal_md5};
use wbk_secure::{HashingWriter, SD_IV};

use crate::error::{Result, TitleError};
use crate::provider::{ContentReader, ExportSession, TitleContent};
use crate::structs::{ContentHeader, ContentRecord, ICON_PATH, IMET_MAGIC, ImetHeader};
use crate::tmd::Tmd;
use crate::u8_archive::U8Archive;

/// A content export ends with the signature and both certificates, no filler.
pub const CONTENT_TRAILER_SIZE: usize = SignatureTrailer::SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSummary {
    /// Number of contents streamed into the archive.
    pub contents: usize,
    pub bytes_written: u64,
    pub digest: [u8; 20],
}

/// Everything a content export needs from the console.
pub trait ContentProvider: TitleContent + DeviceCipher + Identity {}

impl<T: TitleContent + DeviceCipher + Identity> ContentProvider for T {}

/// Streams an installed title into a signed `content.bin` archive.
///
/// Only [`ExportOptions::chunk_size`] applies; contents are exported by
/// the console in their final form and are not walked or re-encrypted.
pub struct ContentWriter<'p, P: ContentProvider + ?Sized> {
    provider: &'p P,
    options: ExportOptions,
    chunk: Vec<u8>,
}

impl<'p, P: ContentProvider + ?Sized> ContentWriter<'p, P> {
    pub fn new(provider: &'p P) -> Self {
        Self::with_options(provider, ExportOptions::default())
    }

    pub fn with_options(provider: &'p P, options: ExportOptions) -> Self {
        Self {
            provider,
            options,
            chunk: Vec::new(),
        }
    }

    pub fn export<W: Write>(&mut self, title_id: u64, mut sink: W) -> Result<ContentSummary> {
        self.options.validate()?;

        let provider = self.provider;
        info!(title_id = format_args!("{title_id:016x}"), "exporting content");

        let tmd_bytes = provider.stored_tmd(title_id).during("get_stored_tmd")?;
        let tmd = Tmd::parse(&tmd_bytes)?;
        if tmd.title_id != title_id {
            return Err(TitleError::TmdTitleMismatch {
                requested: title_id,
                found: tmd.title_id,
            });
        }
        let boot = tmd.boot_content().ok_or(TitleError::NoBootContent)?;
        debug!(content_id = boot.content_id, "reading icon from boot content");

        let (imet, icon) = self.read_boot_icon(title_id)?;

        // Header and icon: SD-key encrypted, outside the signed region
        let icon_size = u32::try_from(icon.len()).map_err(|_| TitleError::SizeOverflow)?;
        let header = ContentHeader {
            title_id,
            icon_size,
            header_md5: [0u8; 16],
            icon_md5: md5(&icon),
            padding: [0u8; 0x14],
            imet,
        };
        let mut header_bytes = to_bytes(&header)?;
        seal_md5(&mut header_bytes, ContentHeader::MD5_RANGE);

        let mut icon_bytes = icon;
        icon_bytes.resize(align64(icon_bytes.len()), 0);

        let mut iv = SD_IV;
        provider
            .encrypt(KeySelector::SdCard, &mut iv, &mut header_bytes)
            .during("encrypt")?;
        let mut iv = SD_IV;
        provider
            .encrypt(KeySelector::SdCard, &mut iv, &mut icon_bytes)
            .during("encrypt")?;

        // Bk header
        let included: Vec<&ContentRecord> =
            tmd.contents.iter().filter(|c| !c.is_shared()).collect();

        let device_id = provider.device_id().during("get_device_id")?;
        let mac_address = provider
            .wireless_mac_address()
            .during("get_wireless_mac_address")?;
        let mut bk = BkHeader::new(device_id, mac_address);
        bk.title_id = title_id;
        bk.tmd_size = u32::try_from(tmd_bytes.len()).map_err(|_| TitleError::SizeOverflow)?;

        let mut contents_size = 0u64;
        for record in &included {
            bk.include_content(record.index);
            contents_size += align64_u64(record.size);
        }
        bk.total_contents_size =
            u32::try_from(contents_size).map_err(|_| TitleError::SizeOverflow)?;

        let total = align64(tmd_bytes.len()) as u64 + contents_size + CONTENT_TRAILER_SIZE as u64;
        bk.total_size = u32::try_from(total).map_err(|_| TitleError::SizeOverflow)?;

        sink.write_all(&header_bytes)?;
        sink.write_all(&icon_bytes)?;

        // Signed region
        let mut hashed = HashingWriter::new(&mut sink);
        hashed.write_all(&to_bytes(&bk)?)?;

        let mut tmd_padded = tmd_bytes;
        tmd_padded.resize(align64(tmd_padded.len()), 0);
        hashed.write_all(&tmd_padded)?;

        for record in &included {
            self.write_content(&mut hashed, title_id, record)?;
        }

        let signed_len = hashed.bytes_written();
        let (sink, digest) = hashed.finalize();
        let trailer_len = write_signature_trailer(sink, provider, &digest, 0)?;
        sink.flush()?;

        let summary = ContentSummary {
            contents: included.len(),
            bytes_written: (header_bytes.len() + icon_bytes.len()) as u64 + signed_len + trailer_len,
            digest,
        };
        info!(
            contents = summary.contents,
            bytes = summary.bytes_written,
            "content export complete"
        );
        Ok(summary)
    }

    /// Read the IMET header and `meta/icon.bin` out of content 0.
    fn read_boot_icon(&self, title_id: u64) -> Result<(ImetHeader, Vec<u8>)> {
        let provider = self.provider;

        let views = provider.ticket_views(title_id).during("get_ticket_views")?;
        let view = views.first().ok_or(TitleError::NoTicketView)?;
        let mut content = provider
            .open_content(title_id, view, 0)
            .during("open_content")?;

        let imet_bytes = content
            .read_at(0, ImetHeader::SIZE)
            .during("read_content")?;
        let imet: ImetHeader = from_bytes(&imet_bytes)?;
        if imet.magic != IMET_MAGIC {
            return Err(TitleError::ImetMagic(imet.magic));
        }

        let base = ImetHeader::SIZE as u64;
        let archive = U8Archive::read(&mut content, base)?;
        let file = archive.find(ICON_PATH).ok_or(TitleError::IconMissing)?;

        let icon = content
            .read_at(base + u64::from(file.offset), file.size as usize)
            .during("read_content")?;
        Ok((imet, icon))
    }

    fn write_content<W: Write>(
        &mut self,
        sink: &mut HashingWriter<W>,
        title_id: u64,
        record: &ContentRecord,
    ) -> Result<()> {
        info!("processing content {:08x}", record.content_id);

        let chunk_size = self.options.chunk_size;
        if self.chunk.len() != chunk_size {
            self.chunk.resize(chunk_size, 0);
        }

        let mut session = self
            .provider
            .export_begin(title_id, record.content_id)
            .during("export_content_begin")?;

        let mut remaining = record.size;
        while remaining > 0 {
            let want = remaining.min(chunk_size as u64) as usize;

            let mut filled = 0;
            while filled < want {
                let n = session
                    .read_chunk(&mut self.chunk[filled..want])
                    .during("export_content_data")?;
                if n == 0 {
                    return Err(ArchiveError::Provider {
                        op: "export_content_data",
                        source: ProviderError::ShortRead {
                            missing: want - filled,
                        },
                    }
                    .into());
                }
                filled += n;
            }

            let padded = align64(want);
            self.chunk[want..padded].fill(0);
            sink.write_all(&self.chunk[..padded])?;

            remaining -= want as u64;
        }

        session.end().during("export_content_end")?;
        Ok(())
    }
}

const fn align64_u64(len: u64) -> u64 {
    (len + 0x3F) & !0x3F
}

/// Export the installed content of `title_id` with default options.
pub fn export_content<P, W>(provider: &P, title_id: u64, sink: W) -> Result<ContentSummary>
where
    P: ContentProvider + ?Sized,
    W: Write,
{
    ContentWriter::new(provider).export(title_id, sink)
}
