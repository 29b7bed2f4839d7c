//! Common types and descriptors for mesh resources.
//!
//! This module contains format enums, usage flags, and descriptor structs
//! shared by the mesh and the backends.

mod buffer;
mod format;
mod topology;

pub use buffer::{BufferDescriptor, BufferUsage, COPY_ALIGNMENT, StructuredViewDescriptor};
pub use format::{COMPONENT_COUNT_RANGE, ElementType, Format, IndexFormat};
pub use topology::PrimitiveTopology;
