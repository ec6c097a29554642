use crate::error::{MobiError, Result};

/// PalmDB database type for books
pub const PDB_TYPE: [u8; 4] = *b"BOOK";

/// PalmDB creator for MOBI documents
pub const PDB_CREATOR: [u8; 4] = *b"MOBI";

/// Width of the database name field (NUL-terminated)
pub const PDB_NAME_SIZE: usize = 32;

/// PalmDB header size before the record directory
pub const PDB_HEADER_SIZE: usize = 78;

/// Size of one record directory entry (offset + id)
pub const RECORD_ENTRY_SIZE: usize = 8;

/// Framing ahead of every record payload: a zero byte and a u32 span length
pub const RECORD_FRAME_SIZE: usize = 5;

/// PalmDOC header size at the start of record 0
pub const PALMDOC_HEADER_SIZE: usize = 16;

/// MOBI header size, including the "MOBI" magic
pub const MOBI_HEADER_SIZE: usize = 232;

pub const MOBI_MAGIC: [u8; 4] = *b"MOBI";
pub const EXTH_MAGIC: [u8; 4] = *b"EXTH";

/// EXTH flag bit announcing a metadata block after the MOBI header
pub const EXTH_FLAG: u32 = 0x40;

/// Sentinel for "no DRM block"
pub const NO_DRM_OFFSET: u32 = 0xFFFF_FFFF;

/// Payload of the last record of every container
pub const EOF_MARKER: [u8; 4] = [0xE9, 0x8E, 0x0D, 0x0A];

// MOBI header field offsets, relative to the "MOBI" magic
pub const MOBI_OFFSET_HEADER_LENGTH: usize = 4;
pub const MOBI_OFFSET_TYPE: usize = 8;
pub const MOBI_OFFSET_ENCODING: usize = 12;
pub const MOBI_OFFSET_UNIQUE_ID: usize = 16;
pub const MOBI_OFFSET_FILE_VERSION: usize = 20;
pub const MOBI_OFFSET_FIRST_NON_BOOK: usize = 64;
pub const MOBI_OFFSET_FULL_NAME: usize = 68;
pub const MOBI_OFFSET_FULL_NAME_LENGTH: usize = 72;
pub const MOBI_OFFSET_LOCALE: usize = 76;
pub const MOBI_OFFSET_FIRST_IMAGE: usize = 92;
pub const MOBI_OFFSET_EXTH_FLAGS: usize = 112;
pub const MOBI_OFFSET_DRM_OFFSET: usize = 152;

/// Compression schemes of the PalmDOC header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    None = 1,
    PalmDoc = 2,
    Huffcdic = 17480,
}

impl Compression {
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            1 => Ok(Self::None),
            2 => Ok(Self::PalmDoc),
            17480 => Ok(Self::Huffcdic),
            _ => Err(MobiError::InvalidFormat(format!(
                "unknown compression type: {}",
                value
            ))),
        }
    }
}

/// The document-info (PalmDOC) header of record 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PalmDocHeader {
    pub compression: Compression,
    pub text_length: u32,
    pub text_record_count: u16,
    pub record_size: u16,
}

impl PalmDocHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PALMDOC_HEADER_SIZE {
            return Err(MobiError::InvalidFormat(
                "record 0 too short for PalmDOC header".to_string(),
            ));
        }
        Ok(Self {
            compression: Compression::from_u16(read_u16(bytes, 0)?)?,
            text_length: read_u32(bytes, 4)?,
            text_record_count: read_u16(bytes, 8)?,
            record_size: read_u16(bytes, 10)?,
        })
    }
}

/// The format (MOBI) header fields a reader needs to locate content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobiHeader {
    pub header_length: u32,
    pub mobi_type: u32,
    pub text_encoding: u32,
    pub unique_id: u32,
    pub file_version: u32,
    pub first_non_book_index: u32,
    pub full_name_offset: u32,
    pub full_name_length: u32,
    pub locale: u32,
    pub first_image_index: u32,
    pub exth_flags: u32,
    pub drm_offset: u32,
}

impl MobiHeader {
    /// Parse a MOBI header starting at its magic
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.get(..4) != Some(&MOBI_MAGIC[..]) {
            return Err(MobiError::InvalidFormat(
                "missing MOBI header magic".to_string(),
            ));
        }
        let header_length = read_u32(bytes, MOBI_OFFSET_HEADER_LENGTH)?;
        if (header_length as usize) < MOBI_OFFSET_DRM_OFFSET + 4 || header_length as usize > bytes.len() {
            return Err(MobiError::InvalidFormat(format!(
                "MOBI header length {} out of range",
                header_length
            )));
        }
        Ok(Self {
            header_length,
            mobi_type: read_u32(bytes, MOBI_OFFSET_TYPE)?,
            text_encoding: read_u32(bytes, MOBI_OFFSET_ENCODING)?,
            unique_id: read_u32(bytes, MOBI_OFFSET_UNIQUE_ID)?,
            file_version: read_u32(bytes, MOBI_OFFSET_FILE_VERSION)?,
            first_non_book_index: read_u32(bytes, MOBI_OFFSET_FIRST_NON_BOOK)?,
            full_name_offset: read_u32(bytes, MOBI_OFFSET_FULL_NAME)?,
            full_name_length: read_u32(bytes, MOBI_OFFSET_FULL_NAME_LENGTH)?,
            locale: read_u32(bytes, MOBI_OFFSET_LOCALE)?,
            first_image_index: read_u32(bytes, MOBI_OFFSET_FIRST_IMAGE)?,
            exth_flags: read_u32(bytes, MOBI_OFFSET_EXTH_FLAGS)?,
            drm_offset: read_u32(bytes, MOBI_OFFSET_DRM_OFFSET)?,
        })
    }

    pub fn has_exth(&self) -> bool {
        self.exth_flags & EXTH_FLAG != 0
    }
}

// Helper functions for reading big-endian primitives out of a slice
pub(crate) fn read_u16(bytes: &[u8], at: usize) -> Result<u16> {
    at.checked_add(2)
        .and_then(|end| bytes.get(at..end))
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| truncated(at))
}

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> Result<u32> {
    at.checked_add(4)
        .and_then(|end| bytes.get(at..end))
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| truncated(at))
}

fn truncated(at: usize) -> MobiError {
    MobiError::InvalidFormat(format!("unexpected end of data at byte {}", at))
}
