//! Fixed binary layouts of the SD-card save archive.
//!
//! An exported save has the following layout (all integers big-endian):
//!
//! | Region              | Size                | Notes                                  |
//! |---------------------|---------------------|----------------------------------------|
//! | Save blob           | `0xF0C0`            | [`SaveHeader`] + banner, SD-key encrypted |
//! | Bk header           | `0x80`              | [`BkHeader`], start of the signed region |
//! | File headers/bodies | `total_files_size`  | [`FileHeader`] + encrypted body per entry |
//! | Signature trailer   | `0x3C0`             | signature, device cert, AP cert, filler |

use std::io::Cursor;
use std::ops::Range;

use binrw::{BinRead, BinResult, BinWrite, Endian};
use enumflags2::{BitFlags, bitflags};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::FormatError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const BANNER_NAME: &str = "banner.bin";

pub const BANNER_HEADER_SIZE: usize = 0xA0;
pub const BANNER_IMAGE_SIZE: usize = 0x6000;
pub const ICON_SIZE: usize = 0x1200;
pub const MAX_ICONS: usize = 8;

/// Banner header + image + one icon frame.
pub const FULL_BNR_MIN: usize = BANNER_HEADER_SIZE + BANNER_IMAGE_SIZE + ICON_SIZE;
/// Banner header + image + eight icon frames.
pub const FULL_BNR_MAX: usize = BANNER_HEADER_SIZE + BANNER_IMAGE_SIZE + MAX_ICONS * ICON_SIZE;

/// The encrypted blob is always the full header + maximum banner.
pub const SAVE_BLOB_SIZE: usize = SaveHeader::SIZE + FULL_BNR_MAX;

pub const BK_LISTED_SZ: u32 = 0x70;
pub const BK_HDR_MAGIC: u32 = 0x426B_0001;
pub const FILE_HDR_MAGIC: u32 = 0x03AD_F17E;
pub const WIBN_MAGIC: u32 = 0x5749_424E;

pub const SIG_SIZE: usize = 0x40;
pub const ECC_CERT_SIZE: usize = 0x180;
pub const SAVE_TRAILER_FILLER: usize = 0x80;
pub const SAVE_TRAILER_SIZE: usize = SignatureTrailer::SIZE + SAVE_TRAILER_FILLER;

/// Longest relative path a file table entry may carry.
pub const MAX_RELATIVE_PATH: usize = 32;

/// Every encrypted or hashed region is rounded up to this boundary.
pub const ARCHIVE_ALIGN: usize = 0x40;

/// Base IV of per-file body encryption ("thepikachugamer<").
pub const FILE_IV_BASE: [u8; 16] = [
    0x74, 0x68, 0x65, 0x70, 0x69, 0x6B, 0x61, 0x63, 0x68, 0x75, 0x67, 0x61, 0x6D, 0x65, 0x72, 0x3C,
];

#[inline]
pub const fn align64(len: usize) -> usize {
    (len + (ARCHIVE_ALIGN - 1)) & !(ARCHIVE_ALIGN - 1)
}

/// IV of the entry at `index` in the file table: the base with `index`
/// added to its low 32-bit word.
pub fn file_iv(index: u32) -> [u8; 16] {
    let mut iv = FILE_IV_BASE;
    let low = u32::from_be_bytes([iv[12], iv[13], iv[14], iv[15]]).wrapping_add(index);
    iv[12..16].copy_from_slice(&low.to_be_bytes());
    iv
}

pub fn to_bytes<T>(value: &T) -> BinResult<Vec<u8>>
where
    T: for<'a> BinWrite<Args<'a> = ()>,
{
    let mut cursor = Cursor::new(Vec::new());
    value.write_options(&mut cursor, Endian::Big, ())?;
    Ok(cursor.into_inner())
}

pub fn from_bytes<T>(bytes: &[u8]) -> BinResult<T>
where
    T: for<'a> BinRead<Args<'a> = ()>,
{
    T::read_options(&mut Cursor::new(bytes), Endian::Big, ())
}

/// Copy `src` into a NUL-padded fixed field, truncating if needed.
pub fn pad_bytes<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let len = std::cmp::min(src.len(), N);
    out[..len].copy_from_slice(&src[..len]);
    out
}

/// Read a NUL-terminated string out of a fixed field.
pub fn field_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum EntryKind {
    File = 1,
    Directory = 2,
}

#[bitflags]
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BannerFlag {
    /// The save may not be copied off the console.
    NoCopy = 0x0000_0001,
    /// Icon animation bounces instead of looping.
    IconBounce = 0x0000_0010,
}

/// Owner/group/other permission bits and the attribute byte of a NAND node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileMode {
    pub owner: u8,
    pub group: u8,
    pub other: u8,
    pub attributes: u8,
}

impl Default for FileMode {
    fn default() -> Self {
        Self {
            owner: 3,
            group: 3,
            other: 3,
            attributes: 0,
        }
    }
}

impl FileMode {
    /// Pack the three 2-bit permission fields as `owner << 4 | group << 2 | other`.
    pub const fn packed(&self) -> u8 {
        (self.owner & 3) << 4 | (self.group & 3) << 2 | (self.other & 3)
    }

    pub const fn from_packed(permissions: u8, attributes: u8) -> Self {
        Self {
            owner: (permissions >> 4) & 3,
            group: (permissions >> 2) & 3,
            other: permissions & 3,
            attributes,
        }
    }
}

// ---------------------------------------------------------------------------
// Header structs
// ---------------------------------------------------------------------------

/// Header at the start of the encrypted save blob (`0x20` bytes, packed).
///
/// ```text
/// 0x00  u64      title_id
/// 0x08  u32      banner_size
/// 0x0C  u8       permissions
/// 0x0D  u8       attributes
/// 0x0E  [u8;16]  md5 (blanker while hashing)
/// 0x1E  u16      unk2
/// ```
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct SaveHeader {
    pub title_id: u64,
    pub banner_size: u32,
    pub permissions: u8,
    pub attributes: u8,
    pub md5: [u8; 16],
    pub unk2: u16,
}

impl SaveHeader {
    pub const SIZE: usize = 0x20;

    /// Location of the MD5 slot inside the save blob.
    pub const MD5_RANGE: Range<usize> = 0x0E..0x1E;
}

/// `WIBN` banner header (`0xA0` bytes), followed by the banner image and icons.
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct BannerHeader {
    pub magic: u32,
    pub flags: u32,
    pub anim_speed: u16,
    pub reserved: [u8; 0x16],
    pub game_title: [u16; 0x20],
    pub game_subtitle: [u16; 0x20],
}

impl BannerHeader {
    pub const SIZE: usize = BANNER_HEADER_SIZE;

    /// Offset of the flags word inside the banner.
    pub const FLAGS_OFFSET: usize = 0x04;

    #[must_use]
    pub fn flags_bits(&self) -> BitFlags<BannerFlag> {
        BitFlags::from_bits_truncate(self.flags)
    }

    pub fn title(&self) -> String {
        decode_utf16(&self.game_title)
    }

    pub fn subtitle(&self) -> String {
        decode_utf16(&self.game_subtitle)
    }
}

fn decode_utf16(units: &[u16]) -> String {
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

/// Per-entry header (`0x80` bytes) preceding each encrypted body.
///
/// ```text
/// 0x00  u32      magic (0x03ADF17E)
/// 0x04  u32      size
/// 0x08  u8       permissions
/// 0x09  u8       attributes
/// 0x0A  u8       kind (1: file, 2: directory)
/// 0x0B  [u8;64]  name (NUL padded)
/// 0x4B  [u8;5]   padding
/// 0x50  [u8;16]  iv
/// 0x60  [u8;32]  unknown
/// ```
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct FileHeader {
    pub magic: u32,
    pub size: u32,
    pub permissions: u8,
    pub attributes: u8,
    #[br(try_map = |x: u8| EntryKind::try_from(x).map_err(|_| FormatError::UnknownEntryKind(x)))]
    #[bw(map = |k: &EntryKind| u8::from(*k))]
    pub kind: EntryKind,
    pub name: [u8; 0x40],
    pub padding: [u8; 5],
    pub iv: [u8; 16],
    pub unknown: [u8; 0x20],
}

impl FileHeader {
    pub const SIZE: usize = 0x80;

    pub fn name(&self) -> String {
        field_str(&self.name)
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Backup header (`0x80` bytes) opening the signed region.
///
/// Only the first `0x70` bytes are counted in `header_size`.
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct BkHeader {
    pub header_size: u32,
    pub magic: u32,
    pub device_id: u32,
    pub num_files: u32,
    pub total_files_size: u32,
    pub tmd_size: u32,
    pub total_contents_size: u32,
    pub total_size: u32,
    pub included_contents: [u8; 0x40],
    pub title_id: u64,
    pub mac_address: [u8; 6],
    pub padding: [u8; 0x12],
}

impl BkHeader {
    pub const SIZE: usize = 0x80;

    /// A header with the fixed fields set and every count zeroed.
    pub const fn new(device_id: u32, mac_address: [u8; 6]) -> Self {
        Self {
            header_size: BK_LISTED_SZ,
            magic: BK_HDR_MAGIC,
            device_id,
            num_files: 0,
            total_files_size: 0,
            tmd_size: 0,
            total_contents_size: 0,
            total_size: 0,
            included_contents: [0u8; 0x40],
            title_id: 0,
            mac_address,
            padding: [0u8; 0x12],
        }
    }

    /// Mark content `index` as present in the archive.
    pub fn include_content(&mut self, index: u16) {
        let index = usize::from(index);
        if let Some(byte) = self.included_contents.get_mut(index / 8) {
            *byte |= 1 << (index % 8);
        }
    }

    pub fn is_content_included(&self, index: u16) -> bool {
        let index = usize::from(index);
        self.included_contents
            .get(index / 8)
            .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
    }
}

/// Signature and certificates closing every archive.
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct SignatureTrailer {
    pub signature: [u8; SIG_SIZE],
    pub device_certificate: [u8; ECC_CERT_SIZE],
    pub ap_certificate: [u8; ECC_CERT_SIZE],
}

impl SignatureTrailer {
    pub const SIZE: usize = SIG_SIZE + 2 * ECC_CERT_SIZE;
}
