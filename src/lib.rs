//! mobi-forge: PalmDB/MOBI container assembly
//!
//! This library turns a title, a rendered body and a set of images into a
//! single MOBI ebook container, combining:
//! - A deferred layout buffer that resolves forward offsets and lengths
//! - PalmDOC sliding-window compression of the text records
//! - The PalmDB header, record directory, MOBI header and EXTH metadata
//! - A reader that parses assembled containers back
//!
//! # Example
//!
//! ```no_run
//! use mobi_forge::{ContainerAssembler, ContainerReader};
//!
//! // Assemble a book
//! let mut book = ContainerAssembler::new("Field Notes");
//! book.set_text(b"<html><body><p>Hello</p></body></html>".to_vec());
//! book.add_field("author", "Jane Doe")?;
//! book.write_to(std::fs::File::create("field-notes.mobi")?)?;
//!
//! // Read it back
//! let reader = ContainerReader::open("field-notes.mobi")?;
//! assert_eq!(reader.title()?, b"Field Notes");
//! # Ok::<(), mobi_forge::error::MobiError>(())
//! ```

// Core modules
pub mod config;
pub mod container;
pub mod error;
pub mod layout;
pub mod palmdoc;

// Re-export commonly used types
pub use config::FormatConfig;
pub use container::{
    Compression, ContainerAssembler, ContainerReader, ExthEntry, ExthField, Metadata, RecordInfo,
    EXTH_FIELDS,
};
pub use error::{MobiError, Result};
pub use layout::{BufferId, BufferMut, DeferredLayout, FieldFormat, Value};
