use std::io::Write;

use byteorder::{BigEndian, ByteOrder};
use tracing::{debug, info};
use wbk_secure::hash::seal_md5;
use wbk_secure::{HashingWriter, SD_IV};

use crate::error::{FormatError, ProviderResultExt, Result};
use crate::options::ExportOptions;
use crate::provider::{KeySelector, Provider, StorageFile, join_path};
use crate::signing::write_signature_trailer;
use crate::structs::{
    BANNER_HEADER_SIZE, BANNER_IMAGE_SIZE, BANNER_NAME, BannerFlag, BannerHeader, BkHeader,
    FILE_HDR_MAGIC, FULL_BNR_MAX, FULL_BNR_MIN, FileHeader, ICON_SIZE, SAVE_BLOB_SIZE,
    SAVE_TRAILER_FILLER, SAVE_TRAILER_SIZE, SaveHeader, WIBN_MAGIC, align64, file_iv, pad_bytes,
    to_bytes,
};
use crate::table::{FileEntry, build_file_table};

/// Result of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Number of file table entries written.
    pub entries: usize,
    /// Total bytes written to the sink.
    pub bytes_written: u64,
    /// SHA-1 of the signed region, as handed to the signer.
    pub digest: [u8; 20],
}

/// Check a banner read from storage.
///
/// A banner is a `WIBN` header, the banner image and one to eight icon
/// frames; anything else is rejected.
pub fn validate_banner(banner: &[u8]) -> Result<(), FormatError> {
    let len = banner.len();
    if len < FULL_BNR_MIN {
        return Err(FormatError::BannerTooShort {
            len,
            min: FULL_BNR_MIN,
        });
    }
    if len > FULL_BNR_MAX {
        return Err(FormatError::BannerTooLong {
            len,
            max: FULL_BNR_MAX,
        });
    }
    if !(len - BANNER_HEADER_SIZE - BANNER_IMAGE_SIZE).is_multiple_of(ICON_SIZE) {
        return Err(FormatError::BannerFrames(len));
    }

    let magic = BigEndian::read_u32(&banner[..4]);
    if magic != WIBN_MAGIC {
        return Err(FormatError::BadMagic {
            what: "banner",
            found: magic,
        });
    }

    Ok(())
}

/// Streams one title's save data into a signed `data.bin` archive.
///
/// The writer owns its save blob and chunk buffers, so it can be reused
/// for several exports but never runs two at once.
pub struct SaveWriter<'p, P: Provider + ?Sized> {
    provider: &'p P,
    options: ExportOptions,
    blob: Vec<u8>,
    chunk: Vec<u8>,
}

impl<'p, P: Provider + ?Sized> SaveWriter<'p, P> {
    pub fn new(provider: &'p P) -> Self {
        Self::with_options(provider, ExportOptions::default())
    }

    pub fn with_options(provider: &'p P, options: ExportOptions) -> Self {
        Self {
            provider,
            options,
            blob: Vec::new(),
            chunk: Vec::new(),
        }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Export the save of `title_id` into `sink`.
    ///
    /// Every failure aborts the export. Bytes already written to `sink`
    /// are left there and must be discarded by the caller.
    pub fn export<W: Write>(&mut self, title_id: u64, mut sink: W) -> Result<ExportSummary> {
        self.options.validate()?;

        let provider = self.provider;
        let data_dir = provider.data_directory(title_id);
        info!(
            title_id = format_args!("{title_id:016x}"),
            data_dir = %data_dir,
            "exporting save"
        );

        self.prepare_save_blob(title_id, &data_dir)?;

        let mut iv = SD_IV;
        provider
            .encrypt(KeySelector::SdCard, &mut iv, &mut self.blob)
            .during("encrypt")?;

        let device_id = provider.device_id().during("get_device_id")?;
        let mac_address = provider
            .wireless_mac_address()
            .during("get_wireless_mac_address")?;
        let mut bk = BkHeader::new(device_id, mac_address);

        let table = build_file_table(provider, &data_dir, &self.options.walk)?;
        bk.num_files = u32::try_from(table.len()).map_err(|_| FormatError::SizeOverflow)?;
        bk.total_files_size = table.files_size()?;
        bk.total_size = bk
            .total_files_size
            .checked_add(SAVE_TRAILER_SIZE as u32)
            .ok_or(FormatError::SizeOverflow)?;

        sink.write_all(&self.blob)?;

        let mut hashed = HashingWriter::new(&mut sink);
        hashed.write_all(&to_bytes(&bk)?)?;

        for (index, entry) in table.iter().enumerate() {
            self.write_entry(&mut hashed, &data_dir, index as u32, entry)?;
        }

        let signed_len = hashed.bytes_written();
        let (sink, digest) = hashed.finalize();
        debug!(signed_len, "finalized archive digest");

        let trailer_len = write_signature_trailer(sink, provider, &digest, SAVE_TRAILER_FILLER)?;
        sink.flush()?;

        let summary = ExportSummary {
            entries: table.len(),
            bytes_written: SAVE_BLOB_SIZE as u64 + signed_len + trailer_len,
            digest,
        };
        info!(
            entries = summary.entries,
            bytes = summary.bytes_written,
            "save export complete"
        );
        Ok(summary)
    }

    /// Fill `self.blob` with the sealed, still plaintext save header and banner.
    fn prepare_save_blob(&mut self, title_id: u64, data_dir: &str) -> Result<()> {
        let provider = self.provider;
        let banner_path = join_path(data_dir, BANNER_NAME);

        let mut file = provider.open_for_read(&banner_path).during("open_for_read")?;
        let length = file.length() as usize;
        if length > FULL_BNR_MAX {
            return Err(FormatError::BannerTooLong {
                len: length,
                max: FULL_BNR_MAX,
            }
            .into());
        }

        if self.options.zero_fill_banner_tail || self.blob.len() != SAVE_BLOB_SIZE {
            self.blob.clear();
            self.blob.resize(SAVE_BLOB_SIZE, 0);
        }

        let banner = &mut self.blob[SaveHeader::SIZE..SaveHeader::SIZE + length];
        file.read_exact(banner).during("read")?;
        drop(file);
        validate_banner(banner)?;

        let flags_at = BannerHeader::FLAGS_OFFSET;
        let flags = BigEndian::read_u32(&banner[flags_at..flags_at + 4]);
        BigEndian::write_u32(
            &mut banner[flags_at..flags_at + 4],
            flags & !(BannerFlag::NoCopy as u32),
        );

        let mode = provider.get_metadata(&banner_path).during("get_metadata")?;
        let header = SaveHeader {
            title_id,
            banner_size: length as u32,
            permissions: mode.packed(),
            attributes: mode.attributes,
            md5: [0u8; 16],
            unk2: 0,
        };
        self.blob[..SaveHeader::SIZE].copy_from_slice(&to_bytes(&header)?);
        seal_md5(&mut self.blob, SaveHeader::MD5_RANGE);

        Ok(())
    }

    fn write_entry<W: Write>(
        &mut self,
        sink: &mut HashingWriter<W>,
        data_dir: &str,
        index: u32,
        entry: &FileEntry,
    ) -> Result<()> {
        let provider = self.provider;
        let mut iv = file_iv(index);

        info!("processing {}", entry.relative_path);

        let header = FileHeader {
            magic: FILE_HDR_MAGIC,
            size: entry.size,
            permissions: entry.permissions,
            attributes: entry.attributes,
            kind: entry.kind,
            name: pad_bytes(entry.relative_path.as_bytes()),
            padding: [0u8; 5],
            iv,
            unknown: [0u8; 0x20],
        };
        sink.write_all(&to_bytes(&header)?)?;

        if !entry.carries_body() {
            return Ok(());
        }

        let chunk_size = self.options.chunk_size;
        if self.chunk.len() != chunk_size {
            self.chunk.resize(chunk_size, 0);
        }

        let path = join_path(data_dir, &entry.relative_path);
        let mut file = provider.open_for_read(&path).during("open_for_read")?;

        let mut remaining = entry.size as usize;
        while remaining > 0 {
            let read = remaining.min(chunk_size);
            let padded = align64(read);

            file.read_exact(&mut self.chunk[..read]).during("read")?;
            self.chunk[read..padded].fill(0);

            provider
                .encrypt(KeySelector::SdCard, &mut iv, &mut self.chunk[..padded])
                .during("encrypt")?;
            sink.write_all(&self.chunk[..padded])?;

            remaining -= read;
        }

        Ok(())
    }
}

/// Export the save of `title_id` with default options.
pub fn export_save<P, W>(provider: &P, title_id: u64, sink: W) -> Result<ExportSummary>
where
    P: Provider + ?Sized,
    W: Write,
{
    SaveWriter::new(provider).export(title_id, sink)
}
