//! Input layout descriptions for meshes.
//!
//! An input layout tells the input assembler how the bytes of one vertex map
//! onto named shader inputs. Meshes use a single vertex stream, so every
//! entry reads from slot 0 and advances once per vertex.
//!
//! The entry list is terminated by a zeroed sentinel entry, the form
//! expected by pipeline-creation code that walks the list until it hits an
//! entry without a format.
//!
//! # Example
//!
//! ```ignore
//! let elements = [
//!     ElementInfo::new("POSITION", ElementType::Float32, 3, 0),
//!     ElementInfo::new("TEXCOORD", ElementType::Float32, 2, 12),
//! ];
//! let layout = InputLayout::from_elements(&elements)?;
//! assert_eq!(layout.len(), 2);
//! assert!(layout.entries()[2].is_sentinel());
//! ```

use crate::error::GraphicsError;
use crate::types::Format;

use super::element::ElementInfo;

/// How the vertex buffer advances: per-vertex or per-instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepMode {
    /// Buffer advances once per vertex (default).
    #[default]
    Vertex,
    /// Buffer advances once per instance (for instanced rendering).
    Instance,
}

/// A single input layout entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct InputElement {
    /// Shader semantic name.
    pub semantic_name: String,
    /// Index for repeated semantics.
    pub semantic_index: u32,
    /// Storage format, `None` only for the sentinel.
    pub format: Option<Format>,
    /// Vertex buffer slot this entry reads from.
    pub input_slot: u32,
    /// Byte offset within a vertex.
    pub aligned_byte_offset: u32,
    /// Per-vertex or per-instance stepping.
    pub step_mode: VertexStepMode,
    /// Instances drawn per step, 0 for per-vertex data.
    pub instance_step_rate: u32,
}

impl InputElement {
    /// The zeroed terminator entry.
    pub fn sentinel() -> Self {
        Self::default()
    }

    /// Whether this is the terminator entry.
    pub fn is_sentinel(&self) -> bool {
        self.format.is_none()
    }
}

/// Ordered input layout of a mesh, always ending in a sentinel entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputLayout {
    entries: Vec<InputElement>,
}

impl Default for InputLayout {
    fn default() -> Self {
        Self {
            entries: vec![InputElement::sentinel()],
        }
    }
}

impl InputLayout {
    /// Build a single-stream layout, one entry per element.
    ///
    /// Offsets accumulate from element sizes, so a validated contiguous
    /// element list reproduces its own offsets.
    pub fn from_elements(elements: &[ElementInfo]) -> Result<Self, GraphicsError> {
        let mut entries = Vec::with_capacity(elements.len() + 1);
        let mut offset = 0u32;
        for element in elements {
            entries.push(InputElement {
                semantic_name: element.semantic_name.clone(),
                semantic_index: element.semantic_index,
                format: Some(element.format()?),
                input_slot: 0,
                aligned_byte_offset: offset,
                step_mode: VertexStepMode::Vertex,
                instance_step_rate: 0,
            });
            offset = offset.checked_add(element.size).ok_or_else(|| {
                GraphicsError::InvalidElementLayout(format!(
                    "element {}{} ends past the addressable vertex size",
                    element.semantic_name, element.semantic_index
                ))
            })?;
        }
        entries.push(InputElement::sentinel());
        Ok(Self { entries })
    }

    /// Entries without the sentinel.
    pub fn elements(&self) -> &[InputElement] {
        &self.entries[..self.len()]
    }

    /// Entries including the trailing sentinel.
    pub fn entries(&self) -> &[InputElement] {
        &self.entries
    }

    /// Number of real entries.
    pub fn len(&self) -> usize {
        self.entries.len().saturating_sub(1)
    }

    /// Whether the layout has no real entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find an entry by semantic.
    pub fn find(&self, semantic_name: &str, semantic_index: u32) -> Option<&InputElement> {
        self.elements()
            .iter()
            .find(|e| e.semantic_name == semantic_name && e.semantic_index == semantic_index)
    }
}
