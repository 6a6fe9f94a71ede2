//! Title metadata (TMD) parsing.

use std::io::{Cursor, Seek, SeekFrom, Write};

use binrw::{BinRead, BinWrite, Endian};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, TitleError};
use crate::structs::ContentRecord;

/// Size of the RSA-2048 signature block opening the TMD.
pub const TMD_SIGNATURE_SIZE: usize = 0x140;
pub const TMD_TITLE_ID_OFFSET: usize = 0x18C;
pub const TMD_NUM_CONTENTS_OFFSET: usize = 0x1DE;
pub const TMD_CONTENTS_OFFSET: usize = 0x1E4;

/// The parts of a TMD an export needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tmd {
    pub title_id: u64,
    pub contents: Vec<ContentRecord>,
}

impl Tmd {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < TMD_CONTENTS_OFFSET {
            return Err(TitleError::TmdTooShort {
                len: bytes.len(),
                need: TMD_CONTENTS_OFFSET,
            });
        }

        let mut cursor = Cursor::new(bytes);
        cursor.seek(SeekFrom::Start(TMD_TITLE_ID_OFFSET as u64))?;
        let title_id = cursor.read_u64::<BigEndian>()?;

        cursor.seek(SeekFrom::Start(TMD_NUM_CONTENTS_OFFSET as u64))?;
        let count = cursor.read_u16::<BigEndian>()? as usize;

        let need = TMD_CONTENTS_OFFSET + count * ContentRecord::SIZE;
        if bytes.len() < need {
            return Err(TitleError::TmdTooShort {
                len: bytes.len(),
                need,
            });
        }

        cursor.seek(SeekFrom::Start(TMD_CONTENTS_OFFSET as u64))?;
        let contents = (0..count)
            .map(|_| ContentRecord::read_options(&mut cursor, Endian::Big, ()))
            .collect::<binrw::BinResult<Vec<_>>>()?;

        Ok(Self { title_id, contents })
    }

    /// The boot content, index 0, which carries the IMET banner.
    pub fn boot_content(&self) -> Option<&ContentRecord> {
        self.contents.iter().find(|c| c.index == 0)
    }

    /// Serialize as an unsigned TMD with a zeroed signature block.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(vec![0u8; TMD_CONTENTS_OFFSET]);

        cursor.seek(SeekFrom::Start(0))?;
        cursor.write_u32::<BigEndian>(0x0001_0001)?;

        cursor.seek(SeekFrom::Start(TMD_TITLE_ID_OFFSET as u64))?;
        cursor.write_u64::<BigEndian>(self.title_id)?;

        let count = u16::try_from(self.contents.len()).map_err(|_| TitleError::SizeOverflow)?;
        cursor.seek(SeekFrom::Start(TMD_NUM_CONTENTS_OFFSET as u64))?;
        cursor.write_u16::<BigEndian>(count)?;

        cursor.seek(SeekFrom::End(0))?;
        for record in &self.contents {
            record.write_options(&mut cursor, Endian::Big, ())?;
        }
        cursor.flush()?;

        Ok(cursor.into_inner())
    }
}
