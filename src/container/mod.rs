mod assembler;
pub mod format;
pub mod metadata;
mod reader;

pub use assembler::ContainerAssembler;
pub use format::{
    Compression, MobiHeader, PalmDocHeader, EOF_MARKER, MOBI_HEADER_SIZE, PALMDOC_HEADER_SIZE,
    PDB_HEADER_SIZE, RECORD_ENTRY_SIZE, RECORD_FRAME_SIZE,
};
pub use metadata::{ExthField, FieldEncoding, Metadata, MetadataEntry, EXTH_FIELDS};
pub use reader::{ContainerReader, ExthEntry, RecordInfo};
