//! Fixed layouts of the content export header and the boot content.

use std::ops::Range;

use binrw::{BinRead, BinWrite};

pub const IMET_MAGIC: u32 = 0x494D_4554;
pub const U8_MAGIC: u32 = 0x55AA_382D;

/// Path of the icon inside the boot content's U8 archive.
pub const ICON_PATH: &str = "meta/icon.bin";

pub const IMET_LANGUAGES: usize = 10;
pub const IMET_NAME_LEN: usize = 21;

/// `IMET` header at the start of content 0 (`0x600` bytes).
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct ImetHeader {
    pub padding: [u8; 0x40],
    pub magic: u32,
    pub header_size: u32,
    pub version: u32,
    pub file_sizes: [u32; 3],
    pub flags: u32,
    /// `[language][main, alternate][char]`, flattened.
    pub names: [u16; IMET_LANGUAGES * 2 * IMET_NAME_LEN],
    pub padding2: [u8; 0x24C],
    pub md5: [u8; 16],
}

impl ImetHeader {
    pub const SIZE: usize = 0x600;

    /// Localized title name, `language` 0 being Japanese and 1 English.
    pub fn name(&self, language: usize) -> Option<String> {
        let start = language.checked_mul(2 * IMET_NAME_LEN)?;
        let units = self.names.get(start..start + IMET_NAME_LEN)?;
        let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        Some(String::from_utf16_lossy(&units[..end]))
    }
}

/// Plaintext of the encrypted header opening a content export (`0x640` bytes).
///
/// ```text
/// 0x000  u64       title_id
/// 0x008  u32       icon_size
/// 0x00C  [u8;16]   header_md5 (blanker while hashing)
/// 0x01C  [u8;16]   icon_md5
/// 0x02C  [u8;20]   padding
/// 0x040  IMET      imet
/// ```
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct ContentHeader {
    pub title_id: u64,
    pub icon_size: u32,
    pub header_md5: [u8; 16],
    pub icon_md5: [u8; 16],
    pub padding: [u8; 0x14],
    pub imet: ImetHeader,
}

impl ContentHeader {
    pub const SIZE: usize = 0x640;

    pub const MD5_RANGE: Range<usize> = 0x0C..0x1C;
}

/// U8 archive header.
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct U8Header {
    pub magic: u32,
    /// Offset of the root node from the start of the archive.
    pub root_offset: u32,
    /// Size of the node table plus the string table.
    pub header_size: u32,
    pub data_offset: u32,
    pub reserved: [u8; 16],
}

impl U8Header {
    pub const SIZE: usize = 0x20;
}

/// One U8 node (`0x0C` bytes).
///
/// For directories `data_offset` is the parent index and `size` the index
/// one past the directory's last descendant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct U8Node {
    /// Node type in the top byte, name offset in the low 24 bits.
    pub type_name: u32,
    pub data_offset: u32,
    pub size: u32,
}

impl U8Node {
    pub const SIZE: usize = 0x0C;

    pub const fn is_directory(&self) -> bool {
        self.type_name >> 24 == 1
    }

    pub const fn name_offset(&self) -> usize {
        (self.type_name & 0x00FF_FFFF) as usize
    }
}

/// A content record of a TMD (`0x24` bytes).
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(big)]
pub struct ContentRecord {
    pub content_id: u32,
    pub index: u16,
    pub kind: u16,
    pub size: u64,
    pub hash: [u8; 20],
}

impl ContentRecord {
    pub const SIZE: usize = 0x24;

    /// Shared contents live in the system's shared store and are not exported.
    pub const SHARED: u16 = 0x8000;

    pub const fn is_shared(&self) -> bool {
        self.kind & Self::SHARED != 0
    }
}
