//! Deferred layout: describe content first, resolve offsets and lengths later
//!
//! Headers of the container cite offsets and lengths of content that is only
//! fully known once it has been described. The layout records literals,
//! labels and references as chunks, computes every label position in one
//! depth-first pass ([`DeferredLayout::lock`]) and emits the final bytes in a
//! second pass ([`DeferredLayout::write`]).

mod buffer;
mod chunk;

pub use buffer::{BufferId, BufferMut, DeferredLayout};
pub use chunk::{FieldFormat, Value};
