use crate::error::{MobiError, Result};
use crate::layout::buffer::{BufferId, DeferredLayout};

/// Value stored in the variable table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(u64),
    Bytes(Vec<u8>),
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(u64::from(value))
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Value::Int(u64::from(value))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as u64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Bytes(value.into_bytes())
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

/// How an integer is rendered into its reserved slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldFormat {
    /// Big-endian unsigned integer filling the slot
    #[default]
    BigEndian,
    /// ASCII decimal, left-padded with zeros to the slot width (`0000001234`)
    Decimal,
}

/// One element of a layout buffer
#[derive(Debug, Clone)]
pub(crate) enum Chunk {
    Literal(Vec<u8>),
    Label(String),
    LengthRef {
        start: String,
        end: String,
        width: usize,
    },
    OffsetRef {
        key: String,
        width: usize,
        format: FieldFormat,
    },
    VariableRef {
        key: String,
        width: usize,
        format: FieldFormat,
    },
    Nested(BufferId),
}

impl Chunk {
    /// Byte width of a leaf chunk. Nested buffers are measured by the layout.
    pub(crate) fn width(&self) -> usize {
        match self {
            Chunk::Literal(bytes) => bytes.len(),
            Chunk::Label(_) | Chunk::Nested(_) => 0,
            Chunk::LengthRef { width, .. }
            | Chunk::OffsetRef { width, .. }
            | Chunk::VariableRef { width, .. } => *width,
        }
    }

    /// Emit the final bytes of this chunk
    pub(crate) fn resolve(&self, layout: &DeferredLayout, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Chunk::Literal(bytes) => out.extend_from_slice(bytes),
            Chunk::LengthRef { start, end, width } => {
                let begin = lookup_position(layout, start)?;
                let finish = lookup_position(layout, end)?;
                let length = finish.checked_sub(begin).ok_or_else(|| MobiError::NegativeLength {
                    start: start.clone(),
                    end: end.clone(),
                })?;
                let key = format!("{start}..{end}");
                out.extend_from_slice(&render_int(&key, length, *width, FieldFormat::BigEndian)?);
            }
            Chunk::OffsetRef { key, width, format } => {
                let position = lookup_position(layout, key)?;
                out.extend_from_slice(&render_int(key, position, *width, *format)?);
            }
            Chunk::VariableRef { key, width, format } => {
                let value = layout.variable_value(key).ok_or_else(|| {
                    MobiError::UnresolvedReference {
                        kind: "variable",
                        key: key.clone(),
                    }
                })?;
                match value {
                    Value::Int(n) => out.extend_from_slice(&render_int(key, *n, *width, *format)?),
                    Value::Bytes(bytes) => {
                        if bytes.len() > *width {
                            return Err(MobiError::ValueOverflow {
                                key: key.clone(),
                                width: *width,
                            });
                        }
                        out.extend_from_slice(bytes);
                        out.resize(out.len() + (*width - bytes.len()), 0);
                    }
                }
            }
            // Children are emitted by the layout's walk
            Chunk::Label(_) | Chunk::Nested(_) => {}
        }
        Ok(())
    }
}

fn lookup_position(layout: &DeferredLayout, key: &str) -> Result<u64> {
    layout
        .position(key)
        .ok_or_else(|| MobiError::UnresolvedReference {
            kind: "position",
            key: key.to_string(),
        })
}

/// Render an integer into exactly `width` bytes
pub(crate) fn render_int(key: &str, value: u64, width: usize, format: FieldFormat) -> Result<Vec<u8>> {
    let overflow = || MobiError::ValueOverflow {
        key: key.to_string(),
        width,
    };
    match format {
        FieldFormat::BigEndian => {
            if width == 0 || width > 8 {
                return Err(MobiError::InvalidWidth(width));
            }
            if width < 8 && value >> (width * 8) != 0 {
                return Err(overflow());
            }
            Ok(value.to_be_bytes()[8 - width..].to_vec())
        }
        FieldFormat::Decimal => {
            let digits = format!("{value:0width$}");
            if digits.len() != width {
                return Err(overflow());
            }
            Ok(digits.into_bytes())
        }
    }
}
