//! Format parameters for the target reader
//!
//! The defaults describe the classic MOBI reader. They can be overridden from
//! TOML:
//!
//! ```toml
//! max_image_size = 131072
//! locale = 0x0411
//! ```

use crate::error::{MobiError, Result};
use crate::palmdoc::MAX_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default per-record ceiling for images (63 KiB)
pub const DEFAULT_MAX_IMAGE_SIZE: usize = 63 * 1024;

/// Windows locale id for en-US
pub const DEFAULT_LOCALE: u32 = 0x0409;

/// UTF-8 code page
pub const TEXT_ENCODING_UTF8: u32 = 65001;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Uncompressed size of each text record
    pub record_size: usize,

    /// Largest image accepted as a single record
    pub max_image_size: usize,

    pub locale: u32,
    pub input_language: u32,
    pub output_language: u32,

    /// Text encoding code page written to the MOBI header
    pub text_encoding: u32,

    /// MOBI document type (2 = book)
    pub mobi_type: u32,

    /// MOBI file version, also written as the minimum reader version
    pub file_version: u32,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            record_size: MAX_CHUNK_SIZE,
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
            locale: DEFAULT_LOCALE,
            input_language: 0,
            output_language: 0,
            text_encoding: TEXT_ENCODING_UTF8,
            mobi_type: 2,
            file_version: 6,
        }
    }
}

impl FormatConfig {
    /// Parse and validate a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.record_size == 0 || self.record_size > MAX_CHUNK_SIZE {
            return Err(MobiError::InvalidConfig(format!(
                "record_size must be within 1..={}, got {}",
                MAX_CHUNK_SIZE, self.record_size
            )));
        }
        if self.max_image_size == 0 {
            return Err(MobiError::InvalidConfig(
                "max_image_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
