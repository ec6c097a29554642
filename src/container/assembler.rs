use crate::config::FormatConfig;
use crate::container::format::{
    Compression, EOF_MARKER, EXTH_FLAG, EXTH_MAGIC, MOBI_MAGIC, NO_DRM_OFFSET, PDB_CREATOR,
    PDB_NAME_SIZE, PDB_TYPE,
};
use crate::container::metadata::{Metadata, MetadataEntry};
use crate::error::{MobiError, Result};
use crate::layout::{BufferId, BufferMut, DeferredLayout, Value};
use crate::palmdoc;
use chrono::{DateTime, Utc};
use std::io::Write;
use tracing::debug;

/// Assembles a title, a rendered body and images into one MOBI container
///
/// ```
/// use mobi_forge::ContainerAssembler;
///
/// let mut book = ContainerAssembler::new("Field Notes");
/// book.set_text(b"<html><body>Hello</body></html>".to_vec());
/// book.add_field("author", "Jane Doe")?;
/// let bytes = book.assemble()?;
/// assert_eq!(&bytes[60..68], b"BOOKMOBI");
/// # Ok::<(), mobi_forge::MobiError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ContainerAssembler {
    title: String,
    body: Vec<u8>,
    images: Vec<Vec<u8>>,
    cover: Option<Vec<u8>>,
    metadata: Metadata,
    config: FormatConfig,
    timestamp: Option<DateTime<Utc>>,
    unique_id: Option<u32>,
}

impl ContainerAssembler {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: Vec::new(),
            images: Vec::new(),
            cover: None,
            metadata: Metadata::new(),
            config: FormatConfig::default(),
            timestamp: None,
            unique_id: None,
        }
    }

    /// Use non-default format parameters (validated at assembly)
    pub fn with_config(mut self, config: FormatConfig) -> Self {
        self.config = config;
        self
    }

    /// Fix the header timestamps and the publishing-date default
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Fix the unique ids instead of drawing them at random
    pub fn with_unique_id(mut self, unique_id: u32) -> Self {
        self.unique_id = Some(unique_id);
        self
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Set the rendered body (typically HTML bytes)
    pub fn set_text(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    pub fn add_image(&mut self, image: impl Into<Vec<u8>>) {
        self.images.push(image.into());
    }

    pub fn set_images(&mut self, images: Vec<Vec<u8>>) {
        self.images = images;
    }

    pub fn set_cover_image(&mut self, image: impl Into<Vec<u8>>) {
        self.cover = Some(image.into());
    }

    /// Set a metadata field by its registered name
    pub fn add_field(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.metadata.set(name, value)
    }

    /// Set metadata fields from a JSON object (`{"author": "...", ...}`)
    pub fn add_fields_from_json(&mut self, json: &serde_json::Value) -> Result<()> {
        self.metadata.set_from_json(json)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn config(&self) -> &FormatConfig {
        &self.config
    }

    /// Build the complete container
    pub fn assemble(&self) -> Result<Vec<u8>> {
        self.config.validate()?;
        self.check_image_sizes()?;

        let now = self.timestamp.unwrap_or_else(Utc::now);
        let texts = palmdoc::compress_records(&self.body, self.config.record_size)?;

        let mut metadata = self.metadata.clone();
        if self.cover.is_some() {
            // Relative to the first image record, not the cover's absolute
            // record index
            metadata.set("coveroffset", self.images.len())?;
        }
        let entries = metadata.entries_with_defaults(now.date_naive());

        debug!(
            title = %self.title,
            text_records = texts.len(),
            images = self.images.len(),
            cover = self.cover.is_some(),
            metadata_entries = entries.len(),
            "assembling container"
        );

        let mut layout = DeferredLayout::new();
        let mut directory = self.write_pdb_header(&mut layout, now)?;

        let first_non_text = texts.len() + 1;
        layout.set_variable("text length", self.body.len());
        layout.set_variable("text record count", texts.len());
        layout.set_variable("first non book index", first_non_text);
        layout.set_variable("first image index", first_non_text);

        directory.record(&mut layout, |root| self.write_header_record(root, &entries))?;
        for text in &texts {
            directory.record(&mut layout, |root| root.append(text))?;
        }
        for image in &self.images {
            directory.record(&mut layout, |root| root.append(image))?;
        }
        if let Some(cover) = &self.cover {
            directory.record(&mut layout, |root| root.append(cover))?;
        }
        directory.record(&mut layout, |root| root.append(&EOF_MARKER))?;

        layout.set_variable("record count", directory.count);
        layout.lock()?;
        layout.write()
    }

    /// Assemble and write the container, returning the number of bytes written
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<usize> {
        let bytes = self.assemble()?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(bytes.len())
    }

    fn check_image_sizes(&self) -> Result<()> {
        let max = self.config.max_image_size;
        let oversized = self
            .images
            .iter()
            .chain(self.cover.iter())
            .enumerate()
            .find(|(_, image)| image.len() > max);
        match oversized {
            Some((index, image)) => Err(MobiError::UnsupportedImageSize {
                index,
                size: image.len(),
                max,
            }),
            None => Ok(()),
        }
    }

    fn next_unique_id(&self) -> u32 {
        self.unique_id.unwrap_or_else(rand::random)
    }

    /// PalmDB header followed by an (initially empty) record directory
    fn write_pdb_header(
        &self,
        layout: &mut DeferredLayout,
        now: DateTime<Utc>,
    ) -> Result<RecordDirectory> {
        let timestamp = now.timestamp().clamp(0, i64::from(u32::MAX)) as u32;
        layout.set_variable("database name", database_name(&self.title));

        let mut root = layout.root_mut();
        root.variable("database name", PDB_NAME_SIZE)?;
        root.put_u16(0)?; // attributes
        root.put_u16(0)?; // version
        root.put_u32(timestamp)?; // creation date
        root.put_u32(timestamp)?; // modification date
        root.put_u32(0)?; // last backup date
        root.put_u32(0)?; // modification number
        root.put_u32(0)?; // app info id
        root.put_u32(0)?; // sort info id
        root.append(&PDB_TYPE)?;
        root.append(&PDB_CREATOR)?;
        root.put_u32(self.next_unique_id())?; // unique id seed
        root.put_u32(0)?; // next record list id
        root.variable("record count", 2)?;
        let buffer = root.sub_buffer()?;
        root.put_u16(0)?; // gap to data

        Ok(RecordDirectory { buffer, count: 0 })
    }

    /// Record 0: PalmDOC header, MOBI header, EXTH block and the full name
    fn write_header_record(&self, root: &mut BufferMut<'_>, entries: &[MetadataEntry]) -> Result<()> {
        let config = &self.config;

        root.put_u16(Compression::PalmDoc as u16)?;
        root.put_u16(0)?;
        root.variable("text length", 4)?;
        root.variable("text record count", 2)?;
        root.put_u16(config.record_size as u16)?;
        root.put_u16(0)?; // encryption type
        root.put_u16(0)?;

        root.label("mobi header:start")?;
        root.append(&MOBI_MAGIC)?;
        root.length("mobi header:start", "mobi header:end", 4)?;
        root.put_u32(config.mobi_type)?;
        root.put_u32(config.text_encoding)?;
        root.put_u32(self.next_unique_id())?;
        root.put_u32(config.file_version)?;
        root.reserve(0xFF, 40)?; // secondary index records, none
        root.variable("first non book index", 4)?;
        root.offset("full name:start", 4)?;
        root.length("full name:start", "full name:end", 4)?;
        root.variable_or("locale code", 4, config.locale)?;
        root.variable_or("input language", 4, config.input_language)?;
        root.variable_or("output language", 4, config.output_language)?;
        root.put_u32(config.file_version)?; // minimum reader version
        root.variable("first image index", 4)?;
        root.reserve(0, 16)?; // huffman records, none
        root.variable_or("exth flags", 4, EXTH_FLAG)?;
        root.reserve(0, 36)?;
        root.variable_or("drm offset", 4, NO_DRM_OFFSET)?;
        root.variable_or("drm count", 4, 0u32)?;
        root.variable_or("drm size", 4, 0u32)?;
        root.variable_or("drm flags", 4, 0u32)?;
        root.reserve(0, 62)?;
        root.variable_or("extra data flags", 2, 0u32)?;
        root.label("mobi header:end")?;

        root.label("exth:start")?;
        root.append(&EXTH_MAGIC)?;
        root.length("exth:start", "exth:end", 4)?;
        root.put_u32(entries.len() as u32)?;
        let mut exth_len = 12;
        for (i, entry) in entries.iter().enumerate() {
            let start = format!("exth/{}:start", i);
            let end = format!("exth/{}:end", i);
            root.put_u32(entry.field.type_code)?;
            root.length(start.as_str(), end.as_str(), 4)?;
            root.label(start)?;
            root.append(&entry.value)?;
            root.label(end)?;
            exth_len += 8 + entry.value.len();
        }
        root.label("exth:end")?;
        root.reserve(0, (4 - exth_len % 4) % 4)?;

        root.label("full name:start")?;
        root.append(self.title.as_bytes())?;
        root.label("full name:end")?;
        Ok(())
    }
}

/// Record directory of the PalmDB header, filled as records are declared
struct RecordDirectory {
    buffer: BufferId,
    count: usize,
}

impl RecordDirectory {
    /// Declare the next record: directory entry, framing, then `content`
    fn record<F>(&mut self, layout: &mut DeferredLayout, content: F) -> Result<()>
    where
        F: FnOnce(&mut BufferMut<'_>) -> Result<()>,
    {
        let index = self.count;
        let start = format!("record/{}:start", index);
        let end = format!("record/{}:end", index);

        let mut entries = layout.buffer(self.buffer)?;
        entries.offset(start.as_str(), 4)?;
        entries.put_u32(index as u32)?; // attributes 0, unique id

        let mut root = layout.root_mut();
        root.label(start.as_str())?;
        root.put_u8(0)?;
        root.length(start, end.as_str(), 4)?;
        content(&mut root)?;
        root.label(end)?;

        self.count += 1;
        Ok(())
    }
}

/// Title truncated on a char boundary so the NUL-terminated name fits
fn database_name(title: &str) -> Vec<u8> {
    let mut end = title.len().min(PDB_NAME_SIZE - 1);
    while !title.is_char_boundary(end) {
        end -= 1;
    }
    title.as_bytes()[..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_name_truncation() {
        assert_eq!(database_name("Short"), b"Short".to_vec());
        let long = "x".repeat(40);
        assert_eq!(database_name(&long).len(), 31);
        // 'é' is two bytes; the cut must not split it
        let accented = format!("{}é", "a".repeat(30));
        assert_eq!(database_name(&accented), "a".repeat(30).into_bytes());
    }

    #[test]
    fn test_oversized_cover_rejected() {
        let mut book = ContainerAssembler::new("T").with_config(FormatConfig {
            max_image_size: 16,
            ..FormatConfig::default()
        });
        book.add_image(vec![0u8; 16]);
        book.set_cover_image(vec![0u8; 17]);
        match book.assemble() {
            Err(MobiError::UnsupportedImageSize { index, size, max }) => {
                assert_eq!((index, size, max), (1, 17, 16));
            }
            other => panic!("expected UnsupportedImageSize, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_header_sizes() {
        let book = ContainerAssembler::new("T").with_unique_id(7);
        let bytes = book.assemble().unwrap();
        // Empty body: only the header record and the end marker record
        let records = u16::from_be_bytes([bytes[76], bytes[77]]) as usize;
        assert_eq!(records, 2);
        let record0 = u32::from_be_bytes([bytes[78], bytes[79], bytes[80], bytes[81]]) as usize;
        assert_eq!(record0, 78 + records * 8 + 2);
    }
}
