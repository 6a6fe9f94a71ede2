use std::cell::RefCell;

use byteorder::{BigEndian, WriteBytesExt};
use wbk_archive::provider::{Console, Identity, SignedDigest};
use wbk_archive::structs::{BkHeader, ECC_CERT_SIZE, SIG_SIZE, align64, from_bytes, to_bytes};
use wbk_archive::{ArchiveError, ExportOptions, ExportOptionsBuilder, ProviderError};
use wbk_secure::hash::{md5, sha1, verify_md5};
use wbk_secure::{SD_IV, SdCipher};

use crate::structs::{
    ContentHeader, ContentRecord, IMET_LANGUAGES, IMET_MAGIC, IMET_NAME_LEN, ImetHeader, U8_MAGIC,
};
use crate::{CONTENT_TRAILER_SIZE, ContentWriter, MemoryTitles, TitleError, Tmd, export_content};

const TITLE_ID: u64 = 0x0001_0001_4841_4445;

#[derive(Default)]
struct TestIdentity {
    signed: RefCell<Vec<[u8; 20]>>,
}

impl Identity for TestIdentity {
    fn device_id(&self) -> Result<u32, ProviderError> {
        Ok(0x0403_AC68)
    }

    fn device_certificate(&self) -> Result<[u8; ECC_CERT_SIZE], ProviderError> {
        Ok([0xDC; ECC_CERT_SIZE])
    }

    fn wireless_mac_address(&self) -> Result<[u8; 6], ProviderError> {
        Ok([0x00, 0x17, 0xAB, 0x12, 0x34, 0x56])
    }

    fn sign(&self, digest: &[u8; 20]) -> Result<SignedDigest, ProviderError> {
        self.signed.borrow_mut().push(*digest);
        Ok(SignedDigest {
            signature: [0x5A; SIG_SIZE],
            ap_certificate: [0xA9; ECC_CERT_SIZE],
        })
    }
}

type TestConsole = Console<MemoryTitles, SdCipher, TestIdentity>;

fn imet(magic: u32) -> Vec<u8> {
    let mut names = [0u16; IMET_LANGUAGES * 2 * IMET_NAME_LEN];
    for (i, unit) in "Homebrew".encode_utf16().enumerate() {
        names[2 * IMET_NAME_LEN + i] = unit;
    }

    to_bytes(&ImetHeader {
        padding: [0; 0x40],
        magic,
        header_size: 0x600,
        version: 3,
        file_sizes: [0x1000, 0x2000, 0x3000],
        flags: 0,
        names,
        padding2: [0; 0x24C],
        md5: [0; 16],
    })
    .unwrap()
}

/// IMET header followed by a U8 archive holding `meta/<name>`.
fn boot_content(imet_magic: u32, u8_magic: u32, name: &str, file: &[u8]) -> Vec<u8> {
    let mut strings = b"\0meta\0".to_vec();
    strings.extend_from_slice(name.as_bytes());
    strings.push(0);

    let tables_len = 3 * 12 + strings.len();
    let data_offset = (0x20 + tables_len as u32 + 0x1F) & !0x1F;

    let mut out = imet(imet_magic);
    out.write_u32::<BigEndian>(u8_magic).unwrap();
    out.write_u32::<BigEndian>(0x20).unwrap();
    out.write_u32::<BigEndian>(tables_len as u32).unwrap();
    out.write_u32::<BigEndian>(data_offset).unwrap();
    out.extend_from_slice(&[0u8; 16]);

    for (kind, name_off, data, size) in [
        (1u32, 0u32, 0u32, 3u32),
        (1, 1, 0, 3),
        (0, 6, data_offset, file.len() as u32),
    ] {
        out.write_u32::<BigEndian>(kind << 24 | name_off).unwrap();
        out.write_u32::<BigEndian>(data).unwrap();
        out.write_u32::<BigEndian>(size).unwrap();
    }
    out.extend_from_slice(&strings);
    out.resize(0x600 + data_offset as usize, 0);
    out.extend_from_slice(file);
    out
}

fn icon() -> Vec<u8> {
    (0..0x1234u32).map(|i| (i * 7) as u8).collect()
}

fn record(content_id: u32, index: u16, kind: u16, size: usize) -> ContentRecord {
    ContentRecord {
        content_id,
        index,
        kind,
        size: size as u64,
        hash: [0; 20],
    }
}

fn install(boot: Vec<u8>) -> (TestConsole, Tmd, Vec<Vec<u8>>) {
    let data = (0..100u8).collect::<Vec<_>>();
    let shared = vec![0x33; 64];
    let tmd = Tmd {
        title_id: TITLE_ID,
        contents: vec![
            record(0x10, 0, 1, boot.len()),
            record(0x11, 1, 1, data.len()),
            record(0x12, 2, 0x8001, shared.len()),
        ],
    };

    let contents = vec![boot, data, shared];
    let mut titles = MemoryTitles::new();
    titles.install(&tmd, contents.clone()).unwrap();

    let console = Console::new(titles, SdCipher::new(), TestIdentity::default());
    (console, tmd, contents)
}

fn standard() -> (TestConsole, Tmd, Vec<Vec<u8>>) {
    install(boot_content(IMET_MAGIC, U8_MAGIC, "icon.bin", &icon()))
}

fn decrypt(region: &[u8]) -> Vec<u8> {
    let mut out = region.to_vec();
    let mut iv = SD_IV;
    SdCipher::new().decrypt(&mut iv, &mut out).unwrap();
    out
}

#[test]
fn content_export_layout() {
    let (console, tmd, contents) = standard();
    let mut out = Vec::new();
    let summary = export_content(&console, TITLE_ID, &mut out).unwrap();

    let icon = icon();
    let tmd_bytes = tmd.to_bytes().unwrap();
    let icon_len = align64(icon.len());
    let bk_at = ContentHeader::SIZE + icon_len;
    let contents_size = align64(contents[0].len()) + align64(contents[1].len());
    let signed_len = BkHeader::SIZE + align64(tmd_bytes.len()) + contents_size;

    assert_eq!(summary.contents, 2);
    assert_eq!(out.len(), bk_at + signed_len + CONTENT_TRAILER_SIZE);
    assert_eq!(summary.bytes_written, out.len() as u64);

    // Encrypted header, self-hashed with the blanker
    let header_plain = decrypt(&out[..ContentHeader::SIZE]);
    assert!(verify_md5(&header_plain, ContentHeader::MD5_RANGE));
    let header: ContentHeader = from_bytes(&header_plain).unwrap();
    assert_eq!(header.title_id, TITLE_ID);
    assert_eq!(header.icon_size as usize, icon.len());
    assert_eq!(header.icon_md5, md5(&icon));
    assert_eq!(header.padding, [0; 0x14]);
    assert_eq!(header.imet.magic, IMET_MAGIC);
    assert_eq!(header.imet.name(1).as_deref(), Some("Homebrew"));

    // Icon, encrypted from the SD IV again
    let icon_plain = decrypt(&out[ContentHeader::SIZE..bk_at]);
    assert_eq!(&icon_plain[..icon.len()], &icon[..]);
    assert!(icon_plain[icon.len()..].iter().all(|&b| b == 0));

    // Bk header
    let bk: BkHeader = from_bytes(&out[bk_at..bk_at + BkHeader::SIZE]).unwrap();
    assert_eq!(bk.num_files, 0);
    assert_eq!(bk.total_files_size, 0);
    assert_eq!(bk.title_id, TITLE_ID);
    assert_eq!(bk.tmd_size as usize, tmd_bytes.len());
    assert_eq!(bk.total_contents_size as usize, contents_size);
    assert_eq!(
        bk.total_size as usize,
        out.len() - bk_at - BkHeader::SIZE
    );
    assert_eq!(bk.included_contents[0], 0b011);
    assert!(bk.included_contents[1..].iter().all(|&b| b == 0));

    // TMD then contents, in record order
    let tmd_at = bk_at + BkHeader::SIZE;
    assert_eq!(&out[tmd_at..tmd_at + tmd_bytes.len()], &tmd_bytes[..]);
    let boot_at = tmd_at + align64(tmd_bytes.len());
    assert_eq!(&out[boot_at..boot_at + contents[0].len()], &contents[0][..]);
    let data_at = boot_at + align64(contents[0].len());
    assert_eq!(&out[data_at..data_at + 100], &contents[1][..]);
}

#[test]
fn content_digest_covers_signed_region() {
    let (console, _, _) = standard();
    let mut out = Vec::new();
    let summary = export_content(&console, TITLE_ID, &mut out).unwrap();

    let bk_at = ContentHeader::SIZE + align64(icon().len());
    let independent = sha1(&out[bk_at..out.len() - CONTENT_TRAILER_SIZE]);

    assert_eq!(summary.digest, independent);
    assert_eq!(console.identity.signed.borrow().as_slice(), &[independent]);

    let trailer = &out[out.len() - CONTENT_TRAILER_SIZE..];
    assert_eq!(&trailer[..SIG_SIZE], &[0x5A; SIG_SIZE]);
    assert_eq!(&trailer[SIG_SIZE..SIG_SIZE + ECC_CERT_SIZE], &[0xDC; ECC_CERT_SIZE]);
    assert_eq!(&trailer[SIG_SIZE + ECC_CERT_SIZE..], &[0xA9; ECC_CERT_SIZE]);
}

#[test]
fn chunk_size_does_not_change_content_export() {
    let (console, _, _) = standard();
    let mut default_out = Vec::new();
    export_content(&console, TITLE_ID, &mut default_out).unwrap();

    let options = ExportOptionsBuilder::default()
        .chunk_size(0x40usize)
        .build()
        .unwrap();
    let mut small_out = Vec::new();
    ContentWriter::with_options(&console, options)
        .export(TITLE_ID, &mut small_out)
        .unwrap();

    assert_eq!(default_out, small_out);
}

#[test]
fn missing_icon_is_reported() {
    let (console, _, _) = install(boot_content(IMET_MAGIC, U8_MAGIC, "banner.bin", &[1; 32]));
    let mut out = Vec::new();

    assert!(matches!(
        export_content(&console, TITLE_ID, &mut out),
        Err(TitleError::IconMissing)
    ));
    assert!(out.is_empty());
}

#[test]
fn bad_magics_are_reported() {
    let (console, _, _) = install(boot_content(0x1234_5678, U8_MAGIC, "icon.bin", &[1; 32]));
    assert!(matches!(
        export_content(&console, TITLE_ID, &mut Vec::new()),
        Err(TitleError::ImetMagic(0x1234_5678))
    ));

    let (console, _, _) = install(boot_content(IMET_MAGIC, 0xDEAD_BEEF, "icon.bin", &[1; 32]));
    assert!(matches!(
        export_content(&console, TITLE_ID, &mut Vec::new()),
        Err(TitleError::U8Magic(0xDEAD_BEEF))
    ));
}

#[test]
fn title_without_boot_content() {
    let tmd = Tmd {
        title_id: TITLE_ID,
        contents: vec![record(0x11, 1, 1, 4)],
    };
    let mut titles = MemoryTitles::new();
    titles.install(&tmd, vec![vec![0; 4]]).unwrap();
    let console = Console::new(titles, SdCipher::new(), TestIdentity::default());

    assert!(matches!(
        export_content(&console, TITLE_ID, &mut Vec::new()),
        Err(TitleError::NoBootContent)
    ));
}

#[test]
fn short_export_session_aborts() {
    let (mut console, _, _) = standard();
    console
        .storage
        .set_export_form(TITLE_ID, 0x11, vec![0u8; 10]);

    let err = export_content(&console, TITLE_ID, &mut Vec::new()).unwrap_err();
    assert!(matches!(
        err,
        TitleError::Archive(ArchiveError::Provider {
            op: "export_content_data",
            source: ProviderError::ShortRead { missing: 90 },
        })
    ));
    assert!(console.identity.signed.borrow().is_empty());
}

#[test]
fn unknown_title_fails_on_tmd() {
    let (console, _, _) = standard();
    assert!(matches!(
        export_content(&console, 0x0001_0001_0000_0000, &mut Vec::new()),
        Err(TitleError::Archive(ArchiveError::Provider {
            op: "get_stored_tmd",
            source: ProviderError::NotFound(_),
        }))
    ));
}

#[test]
fn stored_tmd_for_another_title_is_rejected() {
    let (mut console, mut tmd, _) = standard();
    tmd.title_id = 0x0001_0001_5A5A_5A5A;
    console
        .storage
        .set_stored_tmd(TITLE_ID, tmd.to_bytes().unwrap());

    let mut out = Vec::new();
    assert!(matches!(
        export_content(&console, TITLE_ID, &mut out),
        Err(TitleError::TmdTitleMismatch {
            requested: TITLE_ID,
            found: 0x0001_0001_5A5A_5A5A,
        })
    ));
    assert!(out.is_empty());
}

#[test]
fn unchecked_chunk_sizes_are_rejected() {
    let (console, _, _) = standard();
    for chunk_size in [0usize, 100] {
        let options = ExportOptions {
            chunk_size,
            ..Default::default()
        };
        let mut out = Vec::new();
        let result = ContentWriter::with_options(&console, options).export(TITLE_ID, &mut out);

        assert!(matches!(
            result,
            Err(TitleError::Archive(ArchiveError::Options(_)))
        ));
        assert!(out.is_empty());
    }
}
