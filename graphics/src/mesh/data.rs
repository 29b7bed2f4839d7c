//! Mesh definition with vertex/index buffers.
//!
//! A [`Mesh`] owns the GPU resources needed to draw one piece of geometry:
//!
//! - a vertex buffer bound at slot 0,
//! - a shader-readable structured view over the same vertex bytes,
//! - an optional index buffer,
//! - lazily created staging buffers for CPU access.
//!
//! All device work goes through the backend handed to [`Mesh::new`]. The
//! handle is an `Rc<RefCell<_>>`, which keeps meshes on the thread that owns
//! the device context.
//!
//! # Example
//!
//! ```ignore
//! let backend = backend::shared(DummyBackend::new());
//! let elements = [
//!     ElementInfo::new("POSITION", ElementType::Float32, 3, 0),
//!     ElementInfo::new("TEXCOORD", ElementType::Float32, 2, 12),
//! ];
//!
//! let mut mesh = Mesh::new(backend.clone());
//! mesh.create(&MeshDescriptor::new(&elements)
//!     .with_vertices(&vertices)?
//!     .with_indices_u16(&indices)?
//!     .with_label("cube"))?;
//! mesh.draw();
//! ```

use std::cell::RefMut;

use bytemuck::Pod;

use crate::backend::{BufferHandle, GpuBackend, MapStatus, SharedBackend, ViewHandle};
use crate::error::GraphicsError;
use crate::types::{
    BufferDescriptor, BufferUsage, COPY_ALIGNMENT, ElementType, IndexFormat, PrimitiveTopology,
    StructuredViewDescriptor,
};

use super::element::{validate_elements, vertex_stride, ElementInfo};
use super::layout::InputLayout;
use super::staging::{BufferKind, DeviceBuffer, MapMode, MapState, MapSynchronizer};

/// Label used when a descriptor carries none.
pub const DEFAULT_MESH_LABEL: &str = "mesh";

/// Description of the data a mesh is created from.
///
/// # Example
///
/// ```ignore
/// // Uninitialized vertex buffer, filled later through map or update.
/// let desc = MeshDescriptor::new(&elements)
///     .with_vertex_count(1024)
///     .with_label("particles");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MeshDescriptor<'a> {
    /// Per-vertex element metadata.
    pub vertex_elements: &'a [ElementInfo],
    /// Number of vertices.
    pub vertex_count: u32,
    /// Raw vertex bytes; `None` creates the buffer without initial contents.
    pub vertex_data: Option<&'a [u8]>,
    /// Metadata of the index element.
    pub index_element: Option<ElementInfo>,
    /// Number of indices.
    pub index_count: u32,
    /// Raw index bytes.
    pub index_data: Option<&'a [u8]>,
    /// Debug label.
    pub label: Option<String>,
}

impl<'a> MeshDescriptor<'a> {
    /// Create a descriptor for vertices described by `vertex_elements`.
    pub fn new(vertex_elements: &'a [ElementInfo]) -> Self {
        Self {
            vertex_elements,
            ..Default::default()
        }
    }

    /// Set raw vertex bytes and the number of vertices they hold.
    pub fn with_vertex_data(mut self, data: &'a [u8], vertex_count: u32) -> Self {
        self.vertex_data = Some(data);
        self.vertex_count = vertex_count;
        self
    }

    /// Set the vertex count without initial data.
    pub fn with_vertex_count(mut self, vertex_count: u32) -> Self {
        self.vertex_count = vertex_count;
        self
    }

    /// Set vertex data from a slice of plain vertex structs.
    ///
    /// Fails if the slice holds more than `u32::MAX` vertices.
    pub fn with_vertices<V: Pod>(self, vertices: &'a [V]) -> Result<Self, GraphicsError> {
        let count = element_count(vertices.len())?;
        Ok(self.with_vertex_data(bytemuck::cast_slice(vertices), count))
    }

    /// Set index metadata, raw index bytes and the number of indices.
    pub fn with_indices(mut self, element: ElementInfo, data: &'a [u8], index_count: u32) -> Self {
        self.index_element = Some(element);
        self.index_data = Some(data);
        self.index_count = index_count;
        self
    }

    /// Set 16-bit indices.
    pub fn with_indices_u16(self, indices: &'a [u16]) -> Result<Self, GraphicsError> {
        let count = element_count(indices.len())?;
        Ok(self.with_indices(
            ElementInfo::index(ElementType::Uint16),
            bytemuck::cast_slice(indices),
            count,
        ))
    }

    /// Set 32-bit indices.
    pub fn with_indices_u32(self, indices: &'a [u32]) -> Result<Self, GraphicsError> {
        let count = element_count(indices.len())?;
        Ok(self.with_indices(
            ElementInfo::index(ElementType::Uint32),
            bytemuck::cast_slice(indices),
            count,
        ))
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Result of a map request.
#[derive(Debug)]
pub enum MapOutcome<'a> {
    /// The staging buffer is mapped; the guard dereferences to its bytes.
    ///
    /// The guard borrows the shared backend. Drop it before touching any
    /// other mesh that shares the same backend.
    Mapped(RefMut<'a, [u8]>),
    /// The resource is busy and the caller asked not to wait.
    NotReady,
}

impl<'a> MapOutcome<'a> {
    /// Whether the buffer was mapped.
    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }

    /// The mapped bytes, if any.
    pub fn into_mapped(self) -> Option<RefMut<'a, [u8]>> {
        match self {
            Self::Mapped(bytes) => Some(bytes),
            Self::NotReady => None,
        }
    }
}

/// GPU resources of one mesh.
pub struct Mesh<B: GpuBackend> {
    backend: SharedBackend<B>,
    label: String,
    topology: PrimitiveTopology,
    vertex_count: u32,
    vertex_stride: u32,
    index_count: u32,
    index_format: Option<IndexFormat>,
    input_layout: InputLayout,
    vertex_buffer: Option<DeviceBuffer>,
    view_buffer: Option<DeviceBuffer>,
    vertex_view: Option<ViewHandle>,
    index_buffer: Option<DeviceBuffer>,
    vertex_map: MapSynchronizer,
    index_map: MapSynchronizer,
}

impl<B: GpuBackend> Mesh<B> {
    /// Create an empty mesh holding no GPU resources.
    pub fn new(backend: SharedBackend<B>) -> Self {
        Self {
            backend,
            label: DEFAULT_MESH_LABEL.to_string(),
            topology: PrimitiveTopology::TriangleList,
            vertex_count: 0,
            vertex_stride: 0,
            index_count: 0,
            index_format: None,
            input_layout: InputLayout::default(),
            vertex_buffer: None,
            view_buffer: None,
            vertex_view: None,
            index_buffer: None,
            vertex_map: MapSynchronizer::new(BufferKind::Vertex),
            index_map: MapSynchronizer::new(BufferKind::Index),
        }
    }

    /// Allocate GPU resources for `descriptor`, releasing any held before.
    ///
    /// Metadata and data sizes are validated before anything is allocated.
    /// If an allocation fails, everything allocated by this call is released
    /// and the mesh is left empty.
    pub fn create(&mut self, descriptor: &MeshDescriptor<'_>) -> Result<(), GraphicsError> {
        self.release();

        let elements = descriptor.vertex_elements;
        validate_elements(elements)?;
        let stride = vertex_stride(elements)?;
        let input_layout = InputLayout::from_elements(elements)?;

        let vertex_bytes = descriptor.vertex_count as u64 * stride as u64;
        if let Some(data) = descriptor.vertex_data
            && (data.len() as u64) < vertex_bytes
        {
            return Err(GraphicsError::DataSizeMismatch {
                expected: vertex_bytes,
                actual: data.len() as u64,
            });
        }

        let index_format = match (&descriptor.index_element, descriptor.index_data) {
            (Some(element), Some(_)) => {
                let format = IndexFormat::from_format(element.format()?)?;
                if element.size != format.size() {
                    return Err(GraphicsError::InvalidElementLayout(format!(
                        "index element is {} bytes, {format:?} indices are {}",
                        element.size,
                        format.size()
                    )));
                }
                Some(format)
            }
            (None, Some(_)) => {
                return Err(GraphicsError::InvalidParameter(
                    "index data supplied without index metadata".to_string(),
                ));
            }
            (_, None) if descriptor.index_count > 0 => {
                return Err(GraphicsError::InvalidParameter(format!(
                    "index count {} supplied without index data",
                    descriptor.index_count
                )));
            }
            (_, None) => None,
        };

        let index_bytes = index_format
            .map_or(0, |format| descriptor.index_count as u64 * format.size() as u64);
        if let Some(data) = descriptor.index_data
            && (data.len() as u64) < index_bytes
        {
            return Err(GraphicsError::DataSizeMismatch {
                expected: index_bytes,
                actual: data.len() as u64,
            });
        }

        if let Some(label) = &descriptor.label {
            self.label = label.clone();
        }

        let result = self.allocate(
            descriptor,
            stride,
            vertex_bytes,
            index_format.map(|format| (format, index_bytes)),
        );
        if let Err(e) = result {
            log::error!("Failed to create mesh '{}': {e}", self.label);
            self.release();
            return Err(e);
        }

        self.vertex_count = descriptor.vertex_count;
        self.vertex_stride = stride;
        self.index_count = if index_format.is_some() {
            descriptor.index_count
        } else {
            0
        };
        self.index_format = index_format;
        self.input_layout = input_layout;

        log::debug!(
            "Created mesh '{}': {} vertices (stride {}), {} indices",
            self.label,
            self.vertex_count,
            self.vertex_stride,
            self.index_count
        );
        Ok(())
    }

    fn allocate(
        &mut self,
        descriptor: &MeshDescriptor<'_>,
        stride: u32,
        vertex_bytes: u64,
        index: Option<(IndexFormat, u64)>,
    ) -> Result<(), GraphicsError> {
        let mut backend = self
            .backend
            .try_borrow_mut()
            .map_err(|_| backend_in_use())?;
        let label = &self.label;

        if let Some((_, index_bytes)) = index
            && index_bytes > 0
        {
            let desc = BufferDescriptor::new(
                index_bytes,
                BufferUsage::INDEX | BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
            )
            .with_label(format!("{label} index buffer"));
            let data = descriptor
                .index_data
                .map(|data| &data[..index_bytes as usize]);
            let handle = backend.create_buffer(&desc, data)?;
            log::trace!("Created index buffer for '{label}' ({index_bytes} bytes)");
            self.index_buffer = Some(DeviceBuffer {
                handle,
                descriptor: desc,
            });
        }

        if vertex_bytes == 0 {
            return Ok(());
        }

        let data = descriptor
            .vertex_data
            .map(|data| &data[..vertex_bytes as usize]);

        let desc = BufferDescriptor::new(
            vertex_bytes,
            BufferUsage::VERTEX | BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
        )
        .with_label(format!("{label} vertex buffer"));
        let handle = backend.create_buffer(&desc, data)?;
        log::trace!("Created vertex buffer for '{label}' ({vertex_bytes} bytes)");
        self.vertex_buffer = Some(DeviceBuffer {
            handle,
            descriptor: desc,
        });

        let desc = BufferDescriptor::new(vertex_bytes, BufferUsage::STORAGE | BufferUsage::COPY_DST)
            .with_label(format!("{label} vertex buffer for view"))
            .with_structure_stride(stride);
        let view_buffer = backend.create_buffer(&desc, data)?;
        self.view_buffer = Some(DeviceBuffer {
            handle: view_buffer,
            descriptor: desc,
        });

        let view_desc = StructuredViewDescriptor::new(descriptor.vertex_count, stride)
            .with_label(format!("{label} vertex view"));
        self.vertex_view = Some(backend.create_structured_view(view_buffer, &view_desc)?);
        log::trace!("Created vertex view for '{label}'");

        Ok(())
    }

    /// Release every buffer, view and staging buffer.
    ///
    /// The mesh keeps its label and topology and can be created again.
    pub fn release(&mut self) {
        let Ok(mut backend) = self.backend.try_borrow_mut() else {
            log::error!(
                "Cannot release mesh '{}': backend is borrowed, resources leak",
                self.label
            );
            return;
        };
        let backend = &mut *backend;
        let label = &self.label;

        self.vertex_map.release(backend, label);
        self.index_map.release(backend, label);

        if let Some(view) = self.vertex_view.take() {
            log::trace!("Destroying vertex view of '{label}'");
            backend.destroy_view(view);
        }
        for buffer in [
            self.view_buffer.take(),
            self.vertex_buffer.take(),
            self.index_buffer.take(),
        ]
        .into_iter()
        .flatten()
        {
            log::trace!("Destroying {:?}", buffer.descriptor.label);
            backend.destroy_buffer(buffer.handle);
        }

        self.vertex_count = 0;
        self.vertex_stride = 0;
        self.index_count = 0;
        self.index_format = None;
        self.input_layout = InputLayout::default();
    }

    /// Issue one draw of the whole mesh.
    ///
    /// Does nothing for a mesh with neither vertices nor indices.
    pub fn draw(&self) {
        if self.vertex_count == 0 && self.index_count == 0 {
            return;
        }
        let Ok(mut backend) = self.backend.try_borrow_mut() else {
            log::error!("Cannot draw mesh '{}': backend is borrowed", self.label);
            return;
        };

        backend.set_primitive_topology(self.topology);
        if let Some(vertex) = &self.vertex_buffer {
            backend.set_vertex_buffer(0, vertex.handle, self.vertex_stride, 0);
        }

        match (&self.index_buffer, self.index_format) {
            (Some(index), Some(format)) => {
                backend.set_index_buffer(index.handle, format, 0);
                backend.draw_indexed(self.index_count, 0, 0);
            }
            _ => backend.draw(self.vertex_count, 0),
        }
    }

    /// Map a mesh buffer for CPU access.
    ///
    /// Read-capable modes copy the GPU contents into the staging buffer
    /// first. With `wait == false` a busy resource yields
    /// [`MapOutcome::NotReady`] and the buffer stays unmapped.
    ///
    /// # Errors
    ///
    /// - [`GraphicsError::MissingBuffer`] if the mesh holds no such buffer.
    /// - [`GraphicsError::MapModeMismatch`] if the staging buffer was created
    ///   for another mode.
    pub fn map(
        &mut self,
        kind: BufferKind,
        mode: MapMode,
        wait: bool,
    ) -> Result<MapOutcome<'_>, GraphicsError> {
        let (buffer, sync) = match kind {
            BufferKind::Vertex => (self.vertex_buffer.as_ref(), &mut self.vertex_map),
            BufferKind::Index => (self.index_buffer.as_ref(), &mut self.index_map),
        };
        let buffer = buffer.ok_or(GraphicsError::MissingBuffer(kind))?;
        let mut backend = self
            .backend
            .try_borrow_mut()
            .map_err(|_| backend_in_use())?;

        let (status, staging) = sync.map(&mut *backend, buffer, &self.label, mode, wait)?;
        if status == MapStatus::WouldBlock {
            return Ok(MapOutcome::NotReady);
        }

        RefMut::filter_map(backend, |backend| backend.mapped_range(staging).ok())
            .map(MapOutcome::Mapped)
            .map_err(|_| {
                GraphicsError::Internal(format!("{kind} staging buffer mapped without a range"))
            })
    }

    /// Unmap a mesh buffer, copying staging contents back for write modes.
    ///
    /// # Errors
    ///
    /// [`GraphicsError::NotMapped`] if the buffer is not mapped.
    pub fn unmap(&mut self, kind: BufferKind) -> Result<(), GraphicsError> {
        let (buffer, sync) = match kind {
            BufferKind::Vertex => (self.vertex_buffer.as_ref(), &mut self.vertex_map),
            BufferKind::Index => (self.index_buffer.as_ref(), &mut self.index_map),
        };
        let mut backend = self
            .backend
            .try_borrow_mut()
            .map_err(|_| backend_in_use())?;

        let mode = sync.unmap(&mut *backend, buffer, &self.label)?;
        if kind == BufferKind::Vertex && mode.is_write() {
            refresh_view(&mut *backend, buffer, self.view_buffer.as_ref());
        }
        Ok(())
    }

    /// Map the vertex buffer. See [`Mesh::map`].
    pub fn map_vertices(
        &mut self,
        mode: MapMode,
        wait: bool,
    ) -> Result<MapOutcome<'_>, GraphicsError> {
        self.map(BufferKind::Vertex, mode, wait)
    }

    /// Map the index buffer. See [`Mesh::map`].
    pub fn map_indices(
        &mut self,
        mode: MapMode,
        wait: bool,
    ) -> Result<MapOutcome<'_>, GraphicsError> {
        self.map(BufferKind::Index, mode, wait)
    }

    /// Unmap the vertex buffer.
    pub fn unmap_vertices(&mut self) -> Result<(), GraphicsError> {
        self.unmap(BufferKind::Vertex)
    }

    /// Unmap the index buffer.
    pub fn unmap_indices(&mut self) -> Result<(), GraphicsError> {
        self.unmap(BufferKind::Index)
    }

    /// Write `data` into the start of the vertex buffer without staging.
    ///
    /// # Errors
    ///
    /// - [`GraphicsError::MissingBuffer`] if the mesh has no vertex buffer.
    /// - [`GraphicsError::AlreadyMapped`] while the vertex buffer is mapped.
    /// - [`GraphicsError::DataSizeMismatch`] if `data` exceeds the buffer, or
    ///   stops short of its end at a length that is not a multiple of
    ///   [`COPY_ALIGNMENT`].
    pub fn update_vertices(&mut self, data: &[u8]) -> Result<(), GraphicsError> {
        let buffer = self
            .vertex_buffer
            .as_ref()
            .ok_or(GraphicsError::MissingBuffer(BufferKind::Vertex))?;
        if self.vertex_map.state().is_mapped() {
            return Err(GraphicsError::AlreadyMapped(BufferKind::Vertex));
        }
        if data.len() as u64 > buffer.descriptor.size {
            return Err(GraphicsError::DataSizeMismatch {
                expected: buffer.descriptor.size,
                actual: data.len() as u64,
            });
        }
        let len = data.len() as u64;
        if len < buffer.descriptor.size && len % COPY_ALIGNMENT != 0 {
            return Err(GraphicsError::DataSizeMismatch {
                expected: len.next_multiple_of(COPY_ALIGNMENT),
                actual: len,
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        let mut backend = self
            .backend
            .try_borrow_mut()
            .map_err(|_| backend_in_use())?;
        log::debug!("Updating {} vertex bytes of '{}'", data.len(), self.label);
        backend.update_buffer(buffer.handle, data);
        refresh_view(&mut *backend, Some(buffer), self.view_buffer.as_ref());
        Ok(())
    }

    /// Set the primitive topology used by [`Mesh::draw`].
    pub fn set_topology(&mut self, topology: PrimitiveTopology) {
        self.topology = topology;
    }

    /// Get the primitive topology.
    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    /// Get the debug label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Get the shared backend handle.
    pub fn backend(&self) -> &SharedBackend<B> {
        &self.backend
    }

    /// Get the number of vertices.
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Get the number of indices.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Get the byte stride of one vertex.
    pub fn vertex_stride(&self) -> u32 {
        self.vertex_stride
    }

    /// Get the index format, if the mesh is indexed.
    pub fn index_format(&self) -> Option<IndexFormat> {
        self.index_format
    }

    /// Check if this mesh uses indexed drawing.
    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some()
    }

    /// Get the input layout.
    pub fn input_layout(&self) -> &InputLayout {
        &self.input_layout
    }

    /// Get the vertex buffer.
    pub fn vertex_buffer(&self) -> Option<BufferHandle> {
        self.vertex_buffer.as_ref().map(|b| b.handle)
    }

    /// Get the index buffer.
    pub fn index_buffer(&self) -> Option<BufferHandle> {
        self.index_buffer.as_ref().map(|b| b.handle)
    }

    /// Get the buffer behind the structured vertex view.
    pub fn view_buffer(&self) -> Option<BufferHandle> {
        self.view_buffer.as_ref().map(|b| b.handle)
    }

    /// Get the shader-readable vertex view.
    pub fn vertex_view(&self) -> Option<ViewHandle> {
        self.vertex_view
    }

    /// Get the map state of a buffer.
    pub fn map_state(&self, kind: BufferKind) -> MapState {
        match kind {
            BufferKind::Vertex => self.vertex_map.state(),
            BufferKind::Index => self.index_map.state(),
        }
    }

    /// Get the mode a buffer's staging buffer is bound to, if one exists.
    pub fn staging_mode(&self, kind: BufferKind) -> Option<MapMode> {
        let sync = match kind {
            BufferKind::Vertex => &self.vertex_map,
            BufferKind::Index => &self.index_map,
        };
        sync.staging().map(|staging| staging.mode())
    }

    /// Get the number of primitives one draw produces.
    pub fn primitive_count(&self) -> u32 {
        let count = if self.is_indexed() {
            self.index_count
        } else {
            self.vertex_count
        };
        self.topology.primitive_count(count)
    }
}

impl<B: GpuBackend> Drop for Mesh<B> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<B: GpuBackend> std::fmt::Debug for Mesh<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("label", &self.label)
            .field("topology", &self.topology)
            .field("vertex_count", &self.vertex_count)
            .field("vertex_stride", &self.vertex_stride)
            .field("index_count", &self.index_count)
            .field("index_format", &self.index_format)
            .field("vertex_map", &self.vertex_map.state())
            .field("index_map", &self.index_map.state())
            .finish()
    }
}

fn element_count(len: usize) -> Result<u32, GraphicsError> {
    u32::try_from(len).map_err(|_| {
        GraphicsError::InvalidParameter(format!("{len} elements exceed the u32 count range"))
    })
}

fn backend_in_use() -> GraphicsError {
    GraphicsError::Internal("backend is borrowed by a live mapping".to_string())
}

fn refresh_view<B: GpuBackend + ?Sized>(
    backend: &mut B,
    vertex: Option<&DeviceBuffer>,
    view: Option<&DeviceBuffer>,
) {
    if let (Some(vertex), Some(view)) = (vertex, view) {
        log::debug!("Refreshing {:?}", view.descriptor.label);
        backend.copy_buffer(view.handle, vertex.handle);
    }
}
