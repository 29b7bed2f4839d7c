//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't touch a GPU. Buffer memory lives in host vectors,
//! copies and maps act on those vectors, and every call is appended to a
//! command log so tests can check exactly what a mesh asked the device to do.

use std::collections::HashMap;

use crate::error::GraphicsError;
use crate::mesh::MapMode;
use crate::types::{
    BufferDescriptor, BufferUsage, IndexFormat, PrimitiveTopology, StructuredViewDescriptor,
};

use super::{BufferHandle, GpuBackend, MapStatus, ViewHandle};

/// A call recorded by the [`DummyBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DummyCommand {
    CreateBuffer {
        buffer: BufferHandle,
        label: Option<String>,
        size: u64,
        usage: BufferUsage,
        initialized: bool,
    },
    CreateView {
        view: ViewHandle,
        buffer: BufferHandle,
        label: Option<String>,
        element_count: u32,
        element_stride: u32,
    },
    DestroyBuffer(BufferHandle),
    DestroyView(ViewHandle),
    CopyBuffer {
        dst: BufferHandle,
        src: BufferHandle,
    },
    UpdateBuffer {
        buffer: BufferHandle,
        size: u64,
    },
    Map {
        buffer: BufferHandle,
        mode: MapMode,
        wait: bool,
    },
    Unmap(BufferHandle),
    SetTopology(PrimitiveTopology),
    SetVertexBuffer {
        slot: u32,
        buffer: BufferHandle,
        stride: u32,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: BufferHandle,
        format: IndexFormat,
        offset: u64,
    },
    Draw {
        vertex_count: u32,
        first_vertex: u32,
    },
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
    },
}

impl DummyCommand {
    /// Whether this command reaches the draw pipeline (state binding or draw).
    pub fn is_submission(&self) -> bool {
        matches!(
            self,
            Self::SetTopology(_)
                | Self::SetVertexBuffer { .. }
                | Self::SetIndexBuffer { .. }
                | Self::Draw { .. }
                | Self::DrawIndexed { .. }
        )
    }
}

#[derive(Debug)]
struct DummyBuffer {
    descriptor: BufferDescriptor,
    data: Vec<u8>,
    mapped: Option<MapMode>,
}

#[derive(Debug)]
struct DummyView {
    buffer: BufferHandle,
    descriptor: StructuredViewDescriptor,
}

/// Dummy GPU backend.
#[derive(Debug, Default)]
pub struct DummyBackend {
    next_id: u64,
    buffers: HashMap<u64, DummyBuffer>,
    views: HashMap<u64, DummyView>,
    commands: Vec<DummyCommand>,
    busy_polls: u32,
    allocations_left: Option<u32>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the device as busy for the next `polls` non-blocking maps.
    pub fn with_busy_polls(mut self, polls: u32) -> Self {
        self.busy_polls = polls;
        self
    }

    /// Report the device as busy for the next `polls` non-blocking maps.
    pub fn set_busy_polls(&mut self, polls: u32) {
        self.busy_polls = polls;
    }

    /// Let `count` more buffer or view allocations succeed, then fail with
    /// [`GraphicsError::OutOfMemory`].
    pub fn fail_allocations_after(&mut self, count: u32) {
        self.allocations_left = Some(count);
    }

    /// Commands recorded so far.
    pub fn commands(&self) -> &[DummyCommand] {
        &self.commands
    }

    /// Take the recorded commands, leaving the log empty.
    pub fn take_commands(&mut self) -> Vec<DummyCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Number of buffers currently alive.
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of views currently alive.
    pub fn live_view_count(&self) -> usize {
        self.views.len()
    }

    /// Contents of a live buffer.
    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(|b| b.data.as_slice())
    }

    /// Descriptor a live buffer was created with.
    pub fn buffer_descriptor(&self, buffer: BufferHandle) -> Option<&BufferDescriptor> {
        self.buffers.get(&buffer.0).map(|b| &b.descriptor)
    }

    /// Buffer a live view reads from.
    pub fn view_buffer(&self, view: ViewHandle) -> Option<BufferHandle> {
        self.views.get(&view.0).map(|v| v.buffer)
    }

    /// Descriptor a live view was created with.
    pub fn view_descriptor(&self, view: ViewHandle) -> Option<&StructuredViewDescriptor> {
        self.views.get(&view.0).map(|v| &v.descriptor)
    }

    /// Overwrite buffer contents as if a shader had written them.
    pub fn write_from_gpu(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) {
        if let Some(target) = self.buffers.get_mut(&buffer.0) {
            let end = (offset + data.len()).min(target.data.len());
            if offset < end {
                target.data[offset..end].copy_from_slice(&data[..end - offset]);
            }
        }
    }

    fn allocate_id(&mut self) -> Result<u64, GraphicsError> {
        if let Some(left) = self.allocations_left.as_mut() {
            if *left == 0 {
                return Err(GraphicsError::OutOfMemory);
            }
            *left -= 1;
        }
        self.next_id += 1;
        Ok(self.next_id)
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> Result<BufferHandle, GraphicsError> {
        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }

        let id = self.allocate_id()?;
        let size = descriptor.size as usize;
        let mut contents = vec![0u8; size];
        if let Some(data) = data {
            let len = data.len().min(size);
            contents[..len].copy_from_slice(&data[..len]);
        }

        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {}, usage: {:?})",
            descriptor.label,
            descriptor.size,
            descriptor.usage
        );

        let handle = BufferHandle(id);
        self.buffers.insert(
            id,
            DummyBuffer {
                descriptor: descriptor.clone(),
                data: contents,
                mapped: None,
            },
        );
        self.commands.push(DummyCommand::CreateBuffer {
            buffer: handle,
            label: descriptor.label.clone(),
            size: descriptor.size,
            usage: descriptor.usage,
            initialized: data.is_some(),
        });
        Ok(handle)
    }

    fn create_structured_view(
        &mut self,
        buffer: BufferHandle,
        descriptor: &StructuredViewDescriptor,
    ) -> Result<ViewHandle, GraphicsError> {
        let Some(target) = self.buffers.get(&buffer.0) else {
            return Err(GraphicsError::InvalidParameter(format!(
                "view over unknown buffer {buffer:?}"
            )));
        };
        if !target.descriptor.usage.contains(BufferUsage::STORAGE) {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer {:?} is not shader-readable",
                target.descriptor.label
            )));
        }
        let end = (descriptor.first_element as u64 + descriptor.element_count as u64)
            * descriptor.element_stride as u64;
        if end > target.descriptor.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "view covers {end} bytes of a {} byte buffer",
                target.descriptor.size
            )));
        }

        let id = self.allocate_id()?;
        log::trace!("DummyBackend: creating view {:?}", descriptor.label);

        let view = ViewHandle(id);
        self.views.insert(
            id,
            DummyView {
                buffer,
                descriptor: descriptor.clone(),
            },
        );
        self.commands.push(DummyCommand::CreateView {
            view,
            buffer,
            label: descriptor.label.clone(),
            element_count: descriptor.element_count,
            element_stride: descriptor.element_stride,
        });
        Ok(view)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_none() {
            log::warn!("DummyBackend: destroying unknown buffer {buffer:?}");
        }
        self.commands.push(DummyCommand::DestroyBuffer(buffer));
    }

    fn destroy_view(&mut self, view: ViewHandle) {
        if self.views.remove(&view.0).is_none() {
            log::warn!("DummyBackend: destroying unknown view {view:?}");
        }
        self.commands.push(DummyCommand::DestroyView(view));
    }

    fn copy_buffer(&mut self, dst: BufferHandle, src: BufferHandle) {
        log::trace!("DummyBackend: copy_buffer {src:?} -> {dst:?}");
        self.commands.push(DummyCommand::CopyBuffer { dst, src });

        let Some(source) = self.buffers.get(&src.0).map(|b| b.data.clone()) else {
            log::error!("DummyBackend: copy from unknown buffer {src:?}");
            return;
        };
        let Some(target) = self.buffers.get_mut(&dst.0) else {
            log::error!("DummyBackend: copy into unknown buffer {dst:?}");
            return;
        };
        let len = source.len().min(target.data.len());
        target.data[..len].copy_from_slice(&source[..len]);
    }

    fn update_buffer(&mut self, buffer: BufferHandle, data: &[u8]) {
        log::trace!("DummyBackend: update_buffer {buffer:?} len={}", data.len());
        self.commands.push(DummyCommand::UpdateBuffer {
            buffer,
            size: data.len() as u64,
        });

        let Some(target) = self.buffers.get_mut(&buffer.0) else {
            log::error!("DummyBackend: update of unknown buffer {buffer:?}");
            return;
        };
        let len = data.len().min(target.data.len());
        target.data[..len].copy_from_slice(&data[..len]);
    }

    fn map_buffer(
        &mut self,
        buffer: BufferHandle,
        mode: MapMode,
        wait: bool,
    ) -> Result<MapStatus, GraphicsError> {
        self.commands.push(DummyCommand::Map { buffer, mode, wait });

        let Some(target) = self.buffers.get_mut(&buffer.0) else {
            return Err(GraphicsError::InvalidParameter(format!(
                "map of unknown buffer {buffer:?}"
            )));
        };
        if !target.descriptor.usage.contains(mode.cpu_access()) {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer {:?} was not created for {mode:?} access",
                target.descriptor.label
            )));
        }
        if target.mapped.is_some() {
            return Err(GraphicsError::Internal(format!(
                "buffer {:?} is already mapped",
                target.descriptor.label
            )));
        }

        if self.busy_polls > 0 {
            if !wait {
                self.busy_polls -= 1;
                log::trace!("DummyBackend: map of {buffer:?} would block");
                return Ok(MapStatus::WouldBlock);
            }
            // A blocking map waits out the outstanding work.
            self.busy_polls = 0;
        }

        target.mapped = Some(mode);
        Ok(MapStatus::Mapped)
    }

    fn mapped_range(&mut self, buffer: BufferHandle) -> Result<&mut [u8], GraphicsError> {
        match self.buffers.get_mut(&buffer.0) {
            Some(target) if target.mapped.is_some() => Ok(target.data.as_mut_slice()),
            Some(target) => Err(GraphicsError::Internal(format!(
                "buffer {:?} is not mapped",
                target.descriptor.label
            ))),
            None => Err(GraphicsError::InvalidParameter(format!(
                "unknown buffer {buffer:?}"
            ))),
        }
    }

    fn unmap_buffer(&mut self, buffer: BufferHandle) {
        self.commands.push(DummyCommand::Unmap(buffer));
        match self.buffers.get_mut(&buffer.0) {
            Some(target) => {
                if target.mapped.take().is_none() {
                    log::warn!("DummyBackend: unmap of unmapped buffer {buffer:?}");
                }
            }
            None => log::error!("DummyBackend: unmap of unknown buffer {buffer:?}"),
        }
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.commands.push(DummyCommand::SetTopology(topology));
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, stride: u32, offset: u64) {
        self.commands.push(DummyCommand::SetVertexBuffer {
            slot,
            buffer,
            stride,
            offset,
        });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat, offset: u64) {
        self.commands.push(DummyCommand::SetIndexBuffer {
            buffer,
            format,
            offset,
        });
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        log::trace!("DummyBackend: draw {vertex_count} vertices");
        self.commands.push(DummyCommand::Draw {
            vertex_count,
            first_vertex,
        });
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) {
        log::trace!("DummyBackend: draw_indexed {index_count} indices");
        self.commands.push(DummyCommand::DrawIndexed {
            index_count,
            first_index,
            base_vertex,
        });
    }
}
