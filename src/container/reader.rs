use crate::container::format::{
    read_u16, read_u32, Compression, MobiHeader, PalmDocHeader, EOF_MARKER, EXTH_MAGIC,
    PALMDOC_HEADER_SIZE, PDB_HEADER_SIZE, PDB_NAME_SIZE, RECORD_ENTRY_SIZE, RECORD_FRAME_SIZE,
};
use crate::container::metadata::{lookup, lookup_code};
use crate::error::{MobiError, Result};
use crate::palmdoc;
use std::path::Path;
use tracing::debug;

/// One record directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInfo {
    pub offset: u32,
    pub id: u32,
}

/// One EXTH entry as stored in the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExthEntry {
    pub type_code: u32,
    /// Payload length as written in the entry
    pub length: u32,
    pub value: Vec<u8>,
}

impl ExthEntry {
    /// Registered field name, if the type code is known
    pub fn name(&self) -> Option<&'static str> {
        lookup_code(self.type_code).map(|f| f.name)
    }
}

/// Parsed view of an assembled container
pub struct ContainerReader {
    data: Vec<u8>,
    name: Vec<u8>,
    records: Vec<RecordInfo>,
    palmdoc: PalmDocHeader,
    mobi: MobiHeader,
    metadata: Vec<ExthEntry>,
}

impl ContainerReader {
    /// Read and parse a container file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(data)
    }

    /// Parse a container held in memory
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() < PDB_HEADER_SIZE {
            return Err(MobiError::InvalidFormat(
                "data too short for PalmDB header".to_string(),
            ));
        }

        let name_field = &data[..PDB_NAME_SIZE];
        let name_len = name_field.iter().position(|&b| b == 0).unwrap_or(PDB_NAME_SIZE);
        let name = name_field[..name_len].to_vec();

        if &data[60..68] != b"BOOKMOBI" {
            return Err(MobiError::InvalidFormat(
                "not a BOOK/MOBI database".to_string(),
            ));
        }

        let count = usize::from(read_u16(&data, 76)?);
        let mut records = Vec::with_capacity(count);
        for i in 0..count {
            let at = PDB_HEADER_SIZE + i * RECORD_ENTRY_SIZE;
            records.push(RecordInfo {
                offset: read_u32(&data, at)?,
                id: read_u32(&data, at + 4)?,
            });
        }
        if records.is_empty() {
            return Err(MobiError::InvalidFormat("no records".to_string()));
        }

        let (palmdoc, mobi, metadata) = parse_header_record(record_payload(&data, &records, 0)?)?;

        debug!(
            records = records.len(),
            text_records = palmdoc.text_record_count,
            metadata_entries = metadata.len(),
            "container parsed"
        );
        Ok(Self {
            data,
            name,
            records,
            palmdoc,
            mobi,
            metadata,
        })
    }

    /// Database name from the PalmDB header
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[RecordInfo] {
        &self.records
    }

    pub fn palmdoc_header(&self) -> &PalmDocHeader {
        &self.palmdoc
    }

    pub fn mobi_header(&self) -> &MobiHeader {
        &self.mobi
    }

    pub fn metadata(&self) -> &[ExthEntry] {
        &self.metadata
    }

    /// EXTH entries for a registered field name
    pub fn field(&self, name: &str) -> Vec<&ExthEntry> {
        match lookup(name) {
            Some(field) => self
                .metadata
                .iter()
                .filter(|e| e.type_code == field.type_code)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Full name read at the offset the MOBI header cites
    pub fn title(&self) -> Result<&[u8]> {
        let start = self.mobi.full_name_offset as usize;
        let end = start + self.mobi.full_name_length as usize;
        self.data
            .get(start..end)
            .ok_or_else(|| MobiError::InvalidFormat("full name outside data".to_string()))
    }

    /// Payload of record `index`, with its framing verified and stripped
    pub fn record(&self, index: usize) -> Result<&[u8]> {
        record_payload(&self.data, &self.records, index)
    }

    /// Decompressed text of every text record, concatenated
    pub fn text(&self) -> Result<Vec<u8>> {
        let count = usize::from(self.palmdoc.text_record_count);
        let mut text = Vec::new();
        for index in 1..=count {
            let record = self.record(index)?;
            match self.palmdoc.compression {
                Compression::PalmDoc => text.extend_from_slice(&palmdoc::decompress(record)?),
                Compression::None => text.extend_from_slice(record),
                Compression::Huffcdic => {
                    return Err(MobiError::InvalidFormat(
                        "HUFF/CDIC text is not supported".to_string(),
                    ))
                }
            }
        }
        if text.len() != self.palmdoc.text_length as usize {
            return Err(MobiError::DecompressionFailed(format!(
                "text length {} does not match header ({})",
                text.len(),
                self.palmdoc.text_length
            )));
        }
        Ok(text)
    }

    /// Record index of the cover image, if the metadata names one
    pub fn cover_index(&self) -> Option<usize> {
        let entry = self.field("coveroffset").into_iter().next()?;
        let bytes: [u8; 4] = entry.value.as_slice().try_into().ok()?;
        Some(self.mobi.first_image_index as usize + u32::from_be_bytes(bytes) as usize)
    }

    pub fn cover_image(&self) -> Result<Option<&[u8]>> {
        match self.cover_index() {
            Some(index) => self.record(index).map(Some),
            None => Ok(None),
        }
    }

    /// Image records in order, excluding the cover and the end marker
    pub fn images(&self) -> Result<Vec<&[u8]>> {
        let first = self.mobi.first_image_index as usize;
        let last = self.records.len().saturating_sub(1);
        let cover = self.cover_index();
        (first..last)
            .filter(|&i| Some(i) != cover)
            .map(|i| self.record(i))
            .collect()
    }

    /// Whether the last record is the end-of-file marker
    pub fn has_eof_marker(&self) -> bool {
        self.record(self.records.len() - 1)
            .map(|r| r == EOF_MARKER)
            .unwrap_or(false)
    }
}

fn record_payload<'a>(data: &'a [u8], records: &[RecordInfo], index: usize) -> Result<&'a [u8]> {
    let info = records
        .get(index)
        .ok_or_else(|| MobiError::InvalidFormat(format!("no record {}", index)))?;
    let start = info.offset as usize;
    let end = match records.get(index + 1) {
        Some(next) => next.offset as usize,
        None => data.len(),
    };
    let span = data.get(start..end).ok_or_else(|| {
        MobiError::InvalidFormat(format!("record {} spans {}..{} outside data", index, start, end))
    })?;

    if span.len() < RECORD_FRAME_SIZE || span[0] != 0 {
        return Err(MobiError::InvalidFormat(format!(
            "record {} has no frame",
            index
        )));
    }
    let framed_len = read_u32(span, 1)? as usize;
    if framed_len != span.len() {
        return Err(MobiError::InvalidFormat(format!(
            "record {} frame says {} bytes, directory says {}",
            index,
            framed_len,
            span.len()
        )));
    }
    Ok(&span[RECORD_FRAME_SIZE..])
}

/// Record 0: PalmDOC header, MOBI header and the optional EXTH block
fn parse_header_record(record: &[u8]) -> Result<(PalmDocHeader, MobiHeader, Vec<ExthEntry>)> {
    let palmdoc = PalmDocHeader::parse(record)?;
    let mobi_bytes = &record[PALMDOC_HEADER_SIZE..];
    let mobi = MobiHeader::parse(mobi_bytes)?;

    let mut metadata = Vec::new();
    if mobi.has_exth() {
        let exth = &mobi_bytes[mobi.header_length as usize..];
        if exth.get(..4) != Some(&EXTH_MAGIC[..]) {
            return Err(MobiError::InvalidFormat("missing EXTH magic".to_string()));
        }
        let exth_len = read_u32(exth, 4)? as usize;
        let entry_count = read_u32(exth, 8)?;
        let mut at = 12;
        for _ in 0..entry_count {
            let type_code = read_u32(exth, at)?;
            let length = read_u32(exth, at + 4)?;
            let value = exth
                .get(at + 8..at + 8 + length as usize)
                .ok_or_else(|| MobiError::InvalidFormat("EXTH entry truncated".to_string()))?
                .to_vec();
            metadata.push(ExthEntry {
                type_code,
                length,
                value,
            });
            at += 8 + length as usize;
        }
        if at != exth_len {
            return Err(MobiError::InvalidFormat(format!(
                "EXTH length {} does not match its entries ({} bytes)",
                exth_len, at
            )));
        }
    }

    Ok((palmdoc, mobi, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_short_data() {
        assert!(ContainerReader::from_bytes(vec![0u8; 10]).is_err());
    }

    #[test]
    fn test_rejects_wrong_type() {
        let mut data = vec![0u8; 100];
        data[60..68].copy_from_slice(b"TEXtREAd");
        let err = ContainerReader::from_bytes(data).err().unwrap();
        assert!(err.to_string().contains("BOOK/MOBI"));
    }

    #[test]
    fn test_rejects_record_outside_data() {
        let mut data = vec![0u8; 100];
        data[60..68].copy_from_slice(b"BOOKMOBI");
        data[76..78].copy_from_slice(&1u16.to_be_bytes());
        data[78..82].copy_from_slice(&5000u32.to_be_bytes());
        assert!(ContainerReader::from_bytes(data).is_err());
    }
}
