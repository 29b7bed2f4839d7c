//! Common utilities for mesh integration tests.
//!
//! This module provides shared test infrastructure that can be reused
//! across different backend implementations.

#![allow(dead_code)]

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use redlilium_mesh::{
    DummyBackend, ElementInfo, ElementType, GpuBackend, Mesh, MeshDescriptor, SharedBackend,
    backend,
};

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Available backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dummy backend (host memory, no GPU).
    Dummy,
    /// WebGPU backend (via wgpu).
    WebGpu,
}

impl Backend {
    /// Check if this backend is currently available.
    ///
    /// GPU cases need both the `wgpu-backend` feature and
    /// `REDLILIUM_GPU_TESTS` set in the environment.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            #[cfg(feature = "wgpu-backend")]
            Backend::WebGpu => std::env::var_os("REDLILIUM_GPU_TESTS").is_some(),
            #[cfg(not(feature = "wgpu-backend"))]
            Backend::WebGpu => false,
        }
    }

    /// Create a shared backend, `None` if unavailable.
    pub fn create(self) -> Option<SharedBackend<Box<dyn GpuBackend>>> {
        if !self.is_available() {
            return None;
        }
        let backend: Box<dyn GpuBackend> = match self {
            Backend::Dummy => Box::new(DummyBackend::new()),
            #[cfg(feature = "wgpu-backend")]
            Backend::WebGpu => Box::new(redlilium_mesh::WgpuBackend::new().ok()?),
            #[cfg(not(feature = "wgpu-backend"))]
            Backend::WebGpu => return None,
        };
        Some(backend::shared(backend))
    }
}

/// Initialise logging once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Geometry
// ============================================================================

/// Position + texture coordinate vertex, 20 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.to_array(),
            uv: uv.to_array(),
        }
    }
}

/// Element metadata matching [`Vertex`].
pub fn vertex_elements() -> Vec<ElementInfo> {
    vec![
        ElementInfo::new("POSITION", ElementType::Float32, 3, 0),
        ElementInfo::new("TEXCOORD", ElementType::Float32, 2, 12),
    ]
}

/// Unit quad in the XY plane.
pub fn quad_vertices() -> Vec<Vertex> {
    [
        (Vec3::new(-1.0, -1.0, 0.0), Vec2::new(0.0, 1.0)),
        (Vec3::new(1.0, -1.0, 0.0), Vec2::new(1.0, 1.0)),
        (Vec3::new(1.0, 1.0, 0.0), Vec2::new(1.0, 0.0)),
        (Vec3::new(-1.0, 1.0, 0.0), Vec2::new(0.0, 0.0)),
    ]
    .into_iter()
    .map(|(position, uv)| Vertex::new(position, uv))
    .collect()
}

/// Two triangles covering the quad.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Create an indexed quad mesh labelled `label`.
pub fn create_quad<B: GpuBackend>(backend: &SharedBackend<B>, label: &str) -> Mesh<B> {
    let elements = vertex_elements();
    let vertices = quad_vertices();
    let mut mesh = Mesh::new(backend.clone());
    mesh.create(
        &MeshDescriptor::new(&elements)
            .with_vertices(&vertices)
            .and_then(|desc| desc.with_indices_u16(&QUAD_INDICES))
            .expect("Quad data fits u32 counts")
            .with_label(label),
    )
    .expect("Failed to create quad mesh");
    mesh
}
