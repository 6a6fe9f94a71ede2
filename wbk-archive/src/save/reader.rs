//! Verifying reader for exported save archives.
//!
//! Opening an archive decrypts and checks the save blob, walks every file
//! header and recomputes the SHA-1 of the signed region; file bodies are
//! only decrypted on request.

use std::io::{self, Read, Seek, SeekFrom, Write};

use tracing::debug;
use wbk_secure::hash::verify_md5;
use wbk_secure::{HashingWriter, SD_IV, SdCipher};

use crate::error::{FormatError, Result};
use crate::structs::{
    BANNER_NAME, BK_HDR_MAGIC, BK_LISTED_SZ, BannerHeader, BkHeader, EntryKind, FILE_HDR_MAGIC,
    FileHeader, SAVE_BLOB_SIZE, SAVE_TRAILER_FILLER, SaveHeader, SignatureTrailer, WIBN_MAGIC,
    align64, from_bytes,
};

/// A file header and where its encrypted body starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedEntry {
    pub header: FileHeader,
    /// Absolute offset of the body, `None` for entries without one.
    pub body_offset: Option<u64>,
}

impl ArchivedEntry {
    pub fn name(&self) -> String {
        self.header.name()
    }

    pub fn is_directory(&self) -> bool {
        self.header.kind == EntryKind::Directory
    }
}

pub struct SaveArchiveReader<R: Read + Seek> {
    inner: R,
    cipher: SdCipher,
    save_header: SaveHeader,
    banner: Vec<u8>,
    bk_header: BkHeader,
    entries: Vec<ArchivedEntry>,
    digest: [u8; 20],
    trailer: SignatureTrailer,
}

impl<R: Read + Seek> SaveArchiveReader<R> {
    /// Parse and verify an archive, decrypting with the SD key.
    pub fn open(inner: R) -> Result<Self> {
        Self::open_with_cipher(inner, SdCipher::new())
    }

    pub fn open_with_cipher(mut inner: R, cipher: SdCipher) -> Result<Self> {
        inner.seek(SeekFrom::Start(0))?;

        // Save blob
        let mut blob = vec![0u8; SAVE_BLOB_SIZE];
        inner.read_exact(&mut blob)?;
        let mut iv = SD_IV;
        cipher.decrypt(&mut iv, &mut blob)?;

        if !verify_md5(&blob, SaveHeader::MD5_RANGE) {
            return Err(FormatError::ChecksumMismatch("save blob").into());
        }

        let save_header: SaveHeader = from_bytes(&blob[..SaveHeader::SIZE])?;
        let banner_size = save_header.banner_size as usize;
        if SaveHeader::SIZE + banner_size > SAVE_BLOB_SIZE {
            return Err(FormatError::BannerTooLong {
                len: banner_size,
                max: SAVE_BLOB_SIZE - SaveHeader::SIZE,
            }
            .into());
        }
        let banner = blob[SaveHeader::SIZE..SaveHeader::SIZE + banner_size].to_vec();

        let banner_header: BannerHeader = from_bytes(&banner)?;
        if banner_header.magic != WIBN_MAGIC {
            return Err(FormatError::BadMagic {
                what: "banner",
                found: banner_header.magic,
            }
            .into());
        }

        // Signed region
        let mut hasher = HashingWriter::new(io::sink());

        let bk_bytes = read_array::<_, { BkHeader::SIZE }>(&mut inner)?;
        hasher.write_all(&bk_bytes)?;
        let bk_header: BkHeader = from_bytes(&bk_bytes)?;
        if bk_header.magic != BK_HDR_MAGIC || bk_header.header_size != BK_LISTED_SZ {
            return Err(FormatError::BadMagic {
                what: "bk header",
                found: bk_header.magic,
            }
            .into());
        }

        let mut entries = Vec::new();
        entries.try_reserve(bk_header.num_files as usize)?;

        for _ in 0..bk_header.num_files {
            let header_bytes = read_array::<_, { FileHeader::SIZE }>(&mut inner)?;
            hasher.write_all(&header_bytes)?;

            let header: FileHeader = from_bytes(&header_bytes)?;
            if header.magic != FILE_HDR_MAGIC {
                return Err(FormatError::BadMagic {
                    what: "file header",
                    found: header.magic,
                }
                .into());
            }

            let body_offset = if header.kind == EntryKind::File
                && header.size > 0
                && header.name() != BANNER_NAME
            {
                let offset = inner.stream_position()?;
                let body_len = align64(header.size as usize) as u64;
                let copied = io::copy(&mut (&mut inner).take(body_len), &mut hasher)?;
                if copied != body_len {
                    return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
                }
                Some(offset)
            } else {
                None
            };

            debug!(name = %header.name(), size = header.size, "read file header");
            entries.push(ArchivedEntry {
                header,
                body_offset,
            });
        }

        let (_, digest) = hasher.finalize();

        let trailer_bytes = read_array::<_, { SignatureTrailer::SIZE }>(&mut inner)?;
        let trailer: SignatureTrailer = from_bytes(&trailer_bytes)?;
        read_array::<_, SAVE_TRAILER_FILLER>(&mut inner)?;

        Ok(Self {
            inner,
            cipher,
            save_header,
            banner,
            bk_header,
            entries,
            digest,
            trailer,
        })
    }

    pub fn save_header(&self) -> &SaveHeader {
        &self.save_header
    }

    /// Decrypted banner, `banner_size` bytes long.
    pub fn banner(&self) -> &[u8] {
        &self.banner
    }

    pub fn banner_header(&self) -> Result<BannerHeader> {
        Ok(from_bytes(&self.banner)?)
    }

    pub fn bk_header(&self) -> &BkHeader {
        &self.bk_header
    }

    pub fn entries(&self) -> &[ArchivedEntry] {
        &self.entries
    }

    /// SHA-1 recomputed over the Bk header, file headers and bodies.
    pub fn signed_digest(&self) -> [u8; 20] {
        self.digest
    }

    pub fn trailer(&self) -> &SignatureTrailer {
        &self.trailer
    }

    /// Decrypt the body of entry `index`. Entries without a body yield an
    /// empty vector.
    pub fn read_entry(&mut self, index: usize) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(index)
            .ok_or(FormatError::EntryIndex(index))?;
        let Some(offset) = entry.body_offset else {
            return Ok(Vec::new());
        };

        let size = entry.header.size as usize;
        let mut iv = entry.header.iv;

        let mut body = vec![0u8; align64(size)];
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(&mut body)?;
        self.cipher.decrypt(&mut iv, &mut body)?;

        body.truncate(size);
        Ok(body)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn read_array<R: Read, const N: usize>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}
