//! GPU backend abstraction layer.
//!
//! The mesh never reaches for a global device. Every GPU operation goes
//! through a [`GpuBackend`] the caller hands to the mesh at construction.
//!
//! # Available Backends
//!
//! - `dummy` (always available): host-memory backend for tests and tools
//! - `wgpu-backend`: GPU backend using wgpu
//!
//! # Threading
//!
//! A backend wraps one device context and is driven from the thread that owns
//! it. Meshes share it through [`SharedBackend`], an `Rc<RefCell<_>>`, so
//! neither the backend handle nor the meshes can leave that thread.

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub mod dummy;

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::GraphicsError;
use crate::mesh::MapMode;
use crate::types::{BufferDescriptor, IndexFormat, PrimitiveTopology, StructuredViewDescriptor};

/// Handle to a GPU buffer resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

impl BufferHandle {
    /// Wrap a backend-specific buffer id.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The backend-specific buffer id.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Handle to a shader-readable structured view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle(pub(crate) u64);

impl ViewHandle {
    /// Wrap a backend-specific view id.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The backend-specific view id.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Result of asking the backend to map a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapStatus {
    /// The buffer is mapped and [`GpuBackend::mapped_range`] is valid.
    Mapped,
    /// The resource is still in use by the GPU and the caller asked not to wait.
    WouldBlock,
}

/// Single-thread shared handle to a backend.
pub type SharedBackend<B> = Rc<RefCell<B>>;

/// Wrap a backend for sharing between meshes on the owning thread.
pub fn shared<B: GpuBackend>(backend: B) -> SharedBackend<B> {
    Rc::new(RefCell::new(backend))
}

/// GPU device and command context used by meshes.
///
/// Resource creation reports failures; command recording does not, matching
/// immediate-context semantics where a bad call is a device-level fault.
pub trait GpuBackend {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Create a buffer, optionally filled with `data`.
    ///
    /// The descriptor label becomes the debug name of the buffer. When
    /// `data` is `None` the contents are unspecified until written.
    fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> Result<BufferHandle, GraphicsError>;

    /// Create a structured view exposing `buffer` to shader stages.
    fn create_structured_view(
        &mut self,
        buffer: BufferHandle,
        descriptor: &StructuredViewDescriptor,
    ) -> Result<ViewHandle, GraphicsError>;

    /// Destroy a buffer.
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Destroy a structured view.
    fn destroy_view(&mut self, view: ViewHandle);

    /// Copy the whole contents of `src` into `dst` on the device timeline.
    fn copy_buffer(&mut self, dst: BufferHandle, src: BufferHandle);

    /// Write `data` into the start of `buffer` without a staging buffer.
    fn update_buffer(&mut self, buffer: BufferHandle, data: &[u8]);

    /// Map a staging buffer for CPU access.
    ///
    /// With `wait == false` a busy resource yields [`MapStatus::WouldBlock`]
    /// immediately; with `wait == true` the call blocks until it can map.
    fn map_buffer(
        &mut self,
        buffer: BufferHandle,
        mode: MapMode,
        wait: bool,
    ) -> Result<MapStatus, GraphicsError>;

    /// CPU view of a mapped buffer.
    fn mapped_range(&mut self, buffer: BufferHandle) -> Result<&mut [u8], GraphicsError>;

    /// Release the CPU mapping of a buffer.
    fn unmap_buffer(&mut self, buffer: BufferHandle);

    /// Set the primitive topology for subsequent draws.
    fn set_primitive_topology(&mut self, topology: PrimitiveTopology);

    /// Bind a vertex buffer to an input slot.
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, stride: u32, offset: u64);

    /// Bind the index buffer.
    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat, offset: u64);

    /// Draw non-indexed primitives.
    fn draw(&mut self, vertex_count: u32, first_vertex: u32);

    /// Draw indexed primitives.
    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32);
}

impl<T: GpuBackend + ?Sized> GpuBackend for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> Result<BufferHandle, GraphicsError> {
        (**self).create_buffer(descriptor, data)
    }

    fn create_structured_view(
        &mut self,
        buffer: BufferHandle,
        descriptor: &StructuredViewDescriptor,
    ) -> Result<ViewHandle, GraphicsError> {
        (**self).create_structured_view(buffer, descriptor)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        (**self).destroy_buffer(buffer)
    }

    fn destroy_view(&mut self, view: ViewHandle) {
        (**self).destroy_view(view)
    }

    fn copy_buffer(&mut self, dst: BufferHandle, src: BufferHandle) {
        (**self).copy_buffer(dst, src)
    }

    fn update_buffer(&mut self, buffer: BufferHandle, data: &[u8]) {
        (**self).update_buffer(buffer, data)
    }

    fn map_buffer(
        &mut self,
        buffer: BufferHandle,
        mode: MapMode,
        wait: bool,
    ) -> Result<MapStatus, GraphicsError> {
        (**self).map_buffer(buffer, mode, wait)
    }

    fn mapped_range(&mut self, buffer: BufferHandle) -> Result<&mut [u8], GraphicsError> {
        (**self).mapped_range(buffer)
    }

    fn unmap_buffer(&mut self, buffer: BufferHandle) {
        (**self).unmap_buffer(buffer)
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        (**self).set_primitive_topology(topology)
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, stride: u32, offset: u64) {
        (**self).set_vertex_buffer(slot, buffer, stride, offset)
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat, offset: u64) {
        (**self).set_index_buffer(buffer, format, offset)
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        (**self).draw(vertex_count, first_vertex)
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) {
        (**self).draw_indexed(index_count, first_index, base_vertex)
    }
}

/// Check if a real GPU backend is compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "wgpu-backend")
}
