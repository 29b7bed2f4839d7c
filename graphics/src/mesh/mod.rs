//! Mesh types for the graphics engine.
//!
//! This module provides the GPU side of a mesh:
//!
//! - [`ElementInfo`] - Per-element vertex metadata supplied by loaders
//! - [`InputLayout`] - Input assembler description derived from the metadata
//! - [`Mesh`] - Vertex/index buffers, structured view and CPU mapping
//!
//! CPU access goes through staging buffers driven by a small per-buffer
//! state machine, see [`MapMode`] and [`MapState`].

mod data;
mod element;
mod layout;
mod staging;

pub use data::{DEFAULT_MESH_LABEL, MapOutcome, Mesh, MeshDescriptor};
pub use element::{ElementInfo, validate_elements, vertex_stride};
pub use layout::{InputElement, InputLayout, VertexStepMode};
pub use staging::{BufferKind, MapMode, MapState, StagingBuffer};
