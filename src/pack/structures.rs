use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::error::ArchiveError;

/// Pack header - 12 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackHeader {
    pub version: u32,
    pub num_files: u32,
}

impl PackHeader {
    pub const SIGNATURE: &'static [u8] = b"BFPK";
    pub const SIZE: usize = 12;
    pub const SUPPORTED_VERSION: u32 = 0;

    pub fn from_bytes(data: &[u8]) -> Result<Self, ArchiveError> {
        if data.len() < Self::SIZE {
            return Err(ArchiveError::format(format!(
                "buffer too short for header ({} < {} bytes)",
                data.len(),
                Self::SIZE
            )));
        }

        if &data[0..4] != Self::SIGNATURE {
            return Err(ArchiveError::format("bad magic, expected BFPK"));
        }

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);
        let version = read_u32(&mut cursor, "header")?;
        if version != Self::SUPPORTED_VERSION {
            return Err(ArchiveError::format(format!("unsupported version {version}")));
        }

        Ok(Self {
            version,
            num_files: read_u32(&mut cursor, "header")?,
        })
    }
}

/// One index record: length-prefixed path followed by the content extent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub size: u32,
    /// Absolute offset of the content within the pack buffer
    pub offset: u32,
}

impl FileRecord {
    /// name_len + size + offset, with an empty name
    pub const MIN_SIZE: usize = 12;

    pub fn read(cursor: &mut Cursor<&[u8]>) -> Result<Self, ArchiveError> {
        let name_len = read_u32(cursor, "file record")? as usize;

        let remaining = cursor.get_ref().len() as u64 - cursor.position();
        if name_len as u64 > remaining {
            return Err(ArchiveError::format(format!(
                "file name length {name_len} runs past end of buffer"
            )));
        }

        let mut name = vec![0u8; name_len];
        cursor
            .read_exact(&mut name)
            .map_err(|_| ArchiveError::format("truncated file name"))?;
        let path = String::from_utf8_lossy(&name).into_owned();

        Ok(Self {
            path,
            size: read_u32(cursor, "file record")?,
            offset: read_u32(cursor, "file record")?,
        })
    }

    /// Content range within the pack buffer.
    pub fn extent(&self) -> (u64, u64) {
        (self.offset as u64, self.size as u64)
    }
}

fn read_u32(cursor: &mut Cursor<&[u8]>, what: &str) -> Result<u32, ArchiveError> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| ArchiveError::format(format!("truncated {what}")))
}
