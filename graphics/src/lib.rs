//! # RedLilium Mesh
//!
//! GPU resource management for meshes in the RedLilium engine.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Mesh`] - Vertex/index buffers, a shader-readable vertex view and an
//!   input layout built from loader-supplied [`ElementInfo`] metadata
//! - [`MapMode`] - CPU access to mesh buffers through lazily created staging
//!   buffers
//! - [`Format`] - Translation from abstract element types to GPU formats
//! - [`GpuBackend`] - Trait for the device/context the mesh draws with
//! - Backends: wgpu and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_mesh::{backend, DummyBackend, ElementInfo, ElementType, Mesh, MeshDescriptor};
//!
//! let device = backend::shared(DummyBackend::new());
//! let elements = [ElementInfo::new("POSITION", ElementType::Float32, 3, 0)];
//!
//! let mut mesh = Mesh::new(device.clone());
//! mesh.create(&MeshDescriptor::new(&elements).with_vertices(&positions)?)?;
//! mesh.draw();
//! ```

pub mod backend;
pub mod error;
pub mod mesh;
pub mod types;

// Re-export main types for convenience
pub use backend::dummy::{DummyBackend, DummyCommand};
#[cfg(feature = "wgpu-backend")]
pub use backend::wgpu_backend::{WgpuBackend, WgpuBackendConfig};
pub use backend::{BufferHandle, GpuBackend, MapStatus, SharedBackend, ViewHandle};
pub use error::GraphicsError;
pub use mesh::{
    BufferKind, ElementInfo, InputElement, InputLayout, MapMode, MapOutcome, MapState, Mesh,
    MeshDescriptor, StagingBuffer, VertexStepMode,
};
pub use types::{
    BufferDescriptor, BufferUsage, COPY_ALIGNMENT, ElementType, Format, IndexFormat,
    PrimitiveTopology, StructuredViewDescriptor,
};

/// Mesh library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the mesh subsystem.
///
/// This should be called before using any mesh functionality.
pub fn init() {
    log::info!("RedLilium Mesh v{} initialized", VERSION);
}
