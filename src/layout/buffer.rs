use crate::error::{MobiError, Result};
use crate::layout::chunk::{Chunk, FieldFormat, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

static NEXT_LAYOUT: AtomicU64 = AtomicU64::new(0);

/// Handle to one buffer node inside a [`DeferredLayout`]
///
/// Ids carry the identity of the layout that issued them, so a handle from
/// one layout is rejected by another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId {
    layout: u64,
    index: usize,
}

#[derive(Debug, Default)]
struct Node {
    chunks: Vec<Chunk>,
}

/// Two-pass layout of content chunks with forward references
///
/// The layout owns every buffer node plus the position and variable tables
/// they share. Content is described through [`BufferMut`] handles, positions
/// are computed once by [`DeferredLayout::lock`], and the final bytes are
/// produced by [`DeferredLayout::write`].
///
/// ```
/// use mobi_forge::layout::DeferredLayout;
///
/// let mut layout = DeferredLayout::new();
/// let mut root = layout.root_mut();
/// root.offset("body", 4)?;
/// root.append(b"hdr")?;
/// root.label("body")?;
/// root.append(b"payload")?;
///
/// layout.lock()?;
/// let bytes = layout.write()?;
/// assert_eq!(&bytes[..4], &[0, 0, 0, 7]);
/// # Ok::<(), mobi_forge::MobiError>(())
/// ```
#[derive(Debug)]
pub struct DeferredLayout {
    id: u64,
    nodes: Vec<Node>,
    positions: HashMap<String, u64>,
    variables: HashMap<String, Value>,
    locked: bool,
    total_len: u64,
}

impl DeferredLayout {
    /// Create an empty layout with a single root buffer
    pub fn new() -> Self {
        Self {
            id: NEXT_LAYOUT.fetch_add(1, Ordering::Relaxed),
            nodes: vec![Node::default()],
            positions: HashMap::new(),
            variables: HashMap::new(),
            locked: false,
            total_len: 0,
        }
    }

    /// Id of the root buffer
    pub fn root(&self) -> BufferId {
        self.id_at(0)
    }

    /// Mutable handle to the root buffer
    pub fn root_mut(&mut self) -> BufferMut<'_> {
        let id = self.root();
        BufferMut { layout: self, id }
    }

    /// Mutable handle to any buffer of this layout
    pub fn buffer(&mut self, id: BufferId) -> Result<BufferMut<'_>> {
        if id.layout != self.id || id.index >= self.nodes.len() {
            return Err(MobiError::UnknownBuffer(id.index));
        }
        Ok(BufferMut { layout: self, id })
    }

    /// Populate a variable slot. Allowed after lock, since slot widths are fixed.
    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn variable_value(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Absolute position of a label (available after lock)
    pub fn position(&self, key: &str) -> Option<u64> {
        self.positions.get(key).copied()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Total byte length of the layout (available after lock)
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// Compute every label position and freeze the structure
    pub fn lock(&mut self) -> Result<u64> {
        if self.locked {
            return Err(MobiError::LockViolation("lock twice"));
        }

        let mut positions = HashMap::new();
        let mut offset = 0u64;
        self.walk(|chunk, _| {
            if let Chunk::Label(key) = chunk {
                if positions.insert(key.clone(), offset).is_some() {
                    return Err(MobiError::DuplicateLabel(key.clone()));
                }
            }
            offset += chunk.width() as u64;
            Ok(())
        })?;
        self.positions = positions;
        self.total_len = offset;
        self.locked = true;

        debug!(
            total_len = offset,
            labels = self.positions.len(),
            buffers = self.nodes.len(),
            "layout locked"
        );
        for (key, value) in &self.variables {
            trace!(key = %key, value = ?value, "layout variable");
        }
        trace!(tree = %self, "layout tree");

        Ok(offset)
    }

    /// Emit the final bytes, resolving every reference
    pub fn write(&self) -> Result<Vec<u8>> {
        if !self.locked {
            return Err(MobiError::NotLocked);
        }
        let mut out = Vec::with_capacity(self.total_len as usize);
        self.walk(|chunk, _| chunk.resolve(self, &mut out))?;
        debug!(bytes = out.len(), "layout written");
        Ok(out)
    }

    /// Render the chunk tree, one chunk per line, nested buffers indented.
    /// Once locked, every line starts with its absolute position.
    pub fn dump(&self) -> String {
        self.to_string()
    }

    fn id_at(&self, index: usize) -> BufferId {
        BufferId {
            layout: self.id,
            index,
        }
    }

    /// Depth-first visit of every chunk in output order, with its nesting
    /// depth. Iterative, so deep nesting cannot exhaust the call stack.
    fn walk<E, F>(&self, mut visit: F) -> std::result::Result<(), E>
    where
        F: FnMut(&Chunk, usize) -> std::result::Result<(), E>,
    {
        let mut stack = vec![(0usize, 0usize)];
        while let Some((node, index)) = stack.pop() {
            let Some(chunk) = self.nodes.get(node).and_then(|n| n.chunks.get(index)) else {
                continue;
            };
            stack.push((node, index + 1));
            visit(chunk, stack.len() - 1)?;
            if let Chunk::Nested(child) = chunk {
                stack.push((child.index, 0));
            }
        }
        Ok(())
    }
}

impl fmt::Display for DeferredLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut offset = 0u64;
        // Runs of literals print once, like a hex dump's elided lines
        let mut data_depth = None;
        self.walk(|chunk, depth| {
            let position = offset;
            offset += chunk.width() as u64;

            let line = match chunk {
                Chunk::Literal(bytes) => {
                    if data_depth == Some(depth) {
                        return Ok(());
                    }
                    data_depth = Some(depth);
                    let shown = &bytes[..bytes.len().min(29)];
                    format!("Data: {}", shown.escape_ascii())
                }
                Chunk::Nested(_) => {
                    data_depth = None;
                    return Ok(());
                }
                Chunk::Label(key) => format!("Label: {}", key),
                Chunk::LengthRef { start, end, .. } => format!("Length: {} - {}", start, end),
                Chunk::OffsetRef { key, .. } => format!("Offset: {}", key),
                Chunk::VariableRef { key, .. } => format!("Variable: {}", key),
            };
            if !matches!(chunk, Chunk::Literal(_)) {
                data_depth = None;
            }

            write!(f, "{}", "  ".repeat(depth))?;
            if self.locked {
                write!(f, "{:07}: ", position)?;
            }
            writeln!(f, "{}", line)
        })
    }
}

impl Default for DeferredLayout {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable view of one buffer node
///
/// Every mutating call fails with [`MobiError::LockViolation`] once the
/// owning layout is locked.
pub struct BufferMut<'a> {
    layout: &'a mut DeferredLayout,
    id: BufferId,
}

impl BufferMut<'_> {
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Push literal bytes
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.push("append", Chunk::Literal(bytes.to_vec()))
    }

    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.append(&[value])
    }

    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        self.append(&value.to_be_bytes())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        self.append(&value.to_be_bytes())
    }

    /// Push `count` copies of `byte`
    pub fn reserve(&mut self, byte: u8, count: usize) -> Result<()> {
        self.push("reserve", Chunk::Literal(vec![byte; count]))
    }

    /// Mark the current position under `key`
    pub fn label(&mut self, key: impl Into<String>) -> Result<()> {
        self.push("label", Chunk::Label(key.into()))
    }

    /// Reserve `width` bytes for the big-endian position of `key`
    pub fn offset(&mut self, key: impl Into<String>, width: usize) -> Result<()> {
        self.offset_as(key, width, FieldFormat::BigEndian)
    }

    pub fn offset_as(
        &mut self,
        key: impl Into<String>,
        width: usize,
        format: FieldFormat,
    ) -> Result<()> {
        self.ensure_unlocked("offset")?;
        check_width(width, format)?;
        self.push(
            "offset",
            Chunk::OffsetRef {
                key: key.into(),
                width,
                format,
            },
        )
    }

    /// Reserve `width` bytes for `position(end) - position(start)`
    pub fn length(
        &mut self,
        start: impl Into<String>,
        end: impl Into<String>,
        width: usize,
    ) -> Result<()> {
        self.ensure_unlocked("length")?;
        check_width(width, FieldFormat::BigEndian)?;
        self.push(
            "length",
            Chunk::LengthRef {
                start: start.into(),
                end: end.into(),
                width,
            },
        )
    }

    /// Reserve a big-endian variable slot
    pub fn variable(&mut self, key: impl Into<String>, width: usize) -> Result<()> {
        self.variable_as(key, width, FieldFormat::BigEndian)
    }

    /// Reserve a variable slot rendered with `format`.
    ///
    /// The width is not checked here because a byte value may fill any width.
    pub fn variable_as(
        &mut self,
        key: impl Into<String>,
        width: usize,
        format: FieldFormat,
    ) -> Result<()> {
        self.push(
            "variable",
            Chunk::VariableRef {
                key: key.into(),
                width,
                format,
            },
        )
    }

    /// Reserve a big-endian variable slot, setting `default` if the key is unset
    pub fn variable_or(
        &mut self,
        key: impl Into<String>,
        width: usize,
        default: impl Into<Value>,
    ) -> Result<()> {
        let key = key.into();
        self.variable(key.clone(), width)?;
        self.layout.variables.entry(key).or_insert_with(|| default.into());
        Ok(())
    }

    /// Create a nested buffer at the current position
    pub fn sub_buffer(&mut self) -> Result<BufferId> {
        self.ensure_unlocked("sub_buffer")?;
        let child = self.layout.id_at(self.layout.nodes.len());
        self.layout.nodes.push(Node::default());
        self.push("sub_buffer", Chunk::Nested(child))?;
        Ok(child)
    }

    fn ensure_unlocked(&self, op: &'static str) -> Result<()> {
        if self.layout.locked {
            return Err(MobiError::LockViolation(op));
        }
        Ok(())
    }

    fn push(&mut self, op: &'static str, chunk: Chunk) -> Result<()> {
        self.ensure_unlocked(op)?;
        let node = self
            .layout
            .nodes
            .get_mut(self.id.index)
            .ok_or(MobiError::UnknownBuffer(self.id.index))?;
        node.chunks.push(chunk);
        Ok(())
    }
}

fn check_width(width: usize, format: FieldFormat) -> Result<()> {
    match format {
        FieldFormat::BigEndian if width == 0 || width > 8 => Err(MobiError::InvalidWidth(width)),
        FieldFormat::Decimal if width == 0 => Err(MobiError::InvalidWidth(width)),
        _ => Ok(()),
    }
}
