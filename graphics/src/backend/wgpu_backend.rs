//! wgpu GPU backend implementation.
//!
//! This backend uses wgpu for cross-platform GPU access, supporting
//! Vulkan, Metal, DX12, and WebGPU.
//!
//! wgpu has no immediate context, so draw state and draw calls issued by
//! meshes are recorded and replayed into a render pass by
//! [`WgpuBackend::encode_draws`]. Staging buffers live in host memory;
//! read-capable ones own a `MAP_READ` readback buffer that GPU contents are
//! copied into before the host copy is refreshed.

mod conversion;

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::ops::Range;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

use wgpu::util::DeviceExt;

use crate::error::GraphicsError;
use crate::mesh::MapMode;
use crate::types::{
    BufferDescriptor, BufferUsage, IndexFormat, PrimitiveTopology, StructuredViewDescriptor,
};

use super::{BufferHandle, GpuBackend, MapStatus, ViewHandle};

pub use conversion::{
    convert_buffer_usage, convert_index_format, convert_input_layout, convert_step_mode,
    convert_topology, convert_vertex_format,
};

/// Configuration for [`WgpuBackend`].
#[derive(Debug, Clone)]
pub struct WgpuBackendConfig {
    /// Adapter power preference.
    pub power_preference: wgpu::PowerPreference,
    /// Debug label of the device.
    pub device_label: String,
    /// Longest a blocking map waits for the GPU.
    pub map_timeout: Duration,
}

impl Default for WgpuBackendConfig {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            device_label: "RedLilium Mesh Device".to_string(),
            map_timeout: Duration::from_secs(10),
        }
    }
}

impl WgpuBackendConfig {
    /// Set the power preference.
    pub fn with_power_preference(mut self, power_preference: wgpu::PowerPreference) -> Self {
        self.power_preference = power_preference;
        self
    }

    /// Set the device label.
    pub fn with_device_label(mut self, label: impl Into<String>) -> Self {
        self.device_label = label.into();
        self
    }

    /// Set the blocking map timeout.
    pub fn with_map_timeout(mut self, timeout: Duration) -> Self {
        self.map_timeout = timeout;
        self
    }
}

enum ReadbackState {
    /// Host copy is current.
    Idle,
    /// A GPU copy into the readback buffer was submitted.
    Copied(wgpu::SubmissionIndex),
    /// The readback buffer is being mapped.
    Mapping {
        submission: wgpu::SubmissionIndex,
        receiver: Receiver<Result<(), wgpu::BufferAsyncError>>,
    },
}

struct Readback {
    buffer: wgpu::Buffer,
    state: ReadbackState,
}

impl Readback {
    /// Pull pending GPU contents into `dst`. Returns `false` while busy.
    fn resolve(
        &mut self,
        device: &wgpu::Device,
        dst: &mut [u8],
        wait: bool,
        timeout: Duration,
    ) -> Result<bool, GraphicsError> {
        let (submission, receiver) = match std::mem::replace(&mut self.state, ReadbackState::Idle)
        {
            ReadbackState::Idle => return Ok(true),
            ReadbackState::Copied(submission) => {
                let (tx, rx) = mpsc::channel();
                self.buffer
                    .slice(..)
                    .map_async(wgpu::MapMode::Read, move |result| {
                        let _ = tx.send(result);
                    });
                (submission, rx)
            }
            ReadbackState::Mapping {
                submission,
                receiver,
            } => (submission, receiver),
        };

        let poll = if wait {
            wgpu::PollType::Wait {
                submission_index: Some(submission.clone()),
                timeout: Some(timeout),
            }
        } else {
            wgpu::PollType::Poll
        };
        let _ = device.poll(poll);

        match receiver.try_recv() {
            Ok(Ok(())) => {
                {
                    let range = self.buffer.slice(..).get_mapped_range();
                    let len = range.len().min(dst.len());
                    dst[..len].copy_from_slice(&range[..len]);
                }
                self.buffer.unmap();
                Ok(true)
            }
            Ok(Err(e)) => Err(GraphicsError::Internal(format!("readback map failed: {e}"))),
            Err(TryRecvError::Empty) => {
                self.state = ReadbackState::Mapping {
                    submission,
                    receiver,
                };
                if wait {
                    Err(GraphicsError::Internal(format!(
                        "readback not ready after {timeout:?}"
                    )))
                } else {
                    Ok(false)
                }
            }
            Err(TryRecvError::Disconnected) => Err(GraphicsError::DeviceLost),
        }
    }
}

struct HostStaging {
    data: Vec<u8>,
    size: u64,
    usage: BufferUsage,
    mapped: Option<MapMode>,
    readback: Option<Readback>,
}

enum WgpuBuffer {
    /// `size` is padded to the copy alignment; `len` is the requested size.
    Device {
        buffer: wgpu::Buffer,
        size: u64,
        len: u64,
    },
    Host(HostStaging),
}

enum RecordedCommand {
    SetTopology(PrimitiveTopology),
    SetVertexBuffer {
        slot: u32,
        buffer: BufferHandle,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: BufferHandle,
        format: IndexFormat,
        offset: u64,
    },
    Draw {
        vertices: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
    },
}

/// wgpu-based GPU backend.
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: WgpuBackendConfig,
    view_layout: wgpu::BindGroupLayout,
    next_id: u64,
    buffers: HashMap<u64, WgpuBuffer>,
    views: HashMap<u64, wgpu::BindGroup>,
    recorded: Vec<RecordedCommand>,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter.get_info().name)
            .field("buffers", &self.buffers.len())
            .field("views", &self.views.len())
            .finish()
    }
}

impl WgpuBackend {
    /// Create a new wgpu backend with the default configuration.
    pub fn new() -> Result<Self, GraphicsError> {
        Self::with_config(WgpuBackendConfig::default())
    }

    /// Create a new wgpu backend.
    pub fn with_config(config: WgpuBackendConfig) -> Result<Self, GraphicsError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            backend_options: wgpu::BackendOptions::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: config.power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| GraphicsError::InitializationFailed(format!("No compatible GPU adapter: {e}")))?;

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some(&config.device_label),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| GraphicsError::InitializationFailed(format!("Device creation failed: {e}")))?;

        let view_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mesh Vertex View Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT | wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            config,
            view_layout,
            next_id: 0,
            buffers: HashMap::new(),
            views: HashMap::new(),
            recorded: Vec::new(),
        })
    }

    /// Get the wgpu device.
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// Get the wgpu queue.
    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &WgpuBackendConfig {
        &self.config
    }

    /// Bind group layout shared by every structured vertex view.
    pub fn view_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.view_layout
    }

    /// Bind group exposing a structured view to shaders.
    pub fn view_bind_group(&self, view: ViewHandle) -> Option<&wgpu::BindGroup> {
        self.views.get(&view.0)
    }

    /// The wgpu buffer behind a device buffer handle.
    pub fn wgpu_buffer(&self, buffer: BufferHandle) -> Option<&wgpu::Buffer> {
        match self.buffers.get(&buffer.0) {
            Some(WgpuBuffer::Device { buffer, .. }) => Some(buffer),
            _ => None,
        }
    }

    /// Number of recorded commands waiting for [`WgpuBackend::encode_draws`].
    pub fn recorded_command_count(&self) -> usize {
        self.recorded.len()
    }

    /// Drop recorded commands without encoding them.
    pub fn clear_recorded(&mut self) {
        self.recorded.clear();
    }

    /// Replay recorded draw state and draws into `pass`.
    ///
    /// `pipeline_for` supplies the pipeline for each topology; draws whose
    /// topology has no pipeline are skipped. Returns the number of draws
    /// encoded.
    pub fn encode_draws<'a>(
        &mut self,
        pass: &mut wgpu::RenderPass<'_>,
        mut pipeline_for: impl FnMut(PrimitiveTopology) -> Option<&'a wgpu::RenderPipeline>,
    ) -> u32 {
        let mut drawn = 0;
        let mut topology = PrimitiveTopology::default();
        let mut has_pipeline = false;

        for command in std::mem::take(&mut self.recorded) {
            match command {
                RecordedCommand::SetTopology(next) => {
                    topology = next;
                    has_pipeline = match pipeline_for(next) {
                        Some(pipeline) => {
                            pass.set_pipeline(pipeline);
                            true
                        }
                        None => false,
                    };
                }
                RecordedCommand::SetVertexBuffer {
                    slot,
                    buffer,
                    offset,
                } => {
                    if let Some(WgpuBuffer::Device { buffer, .. }) = self.buffers.get(&buffer.0) {
                        pass.set_vertex_buffer(slot, buffer.slice(offset..));
                    }
                }
                RecordedCommand::SetIndexBuffer {
                    buffer,
                    format,
                    offset,
                } => {
                    if let Some(WgpuBuffer::Device { buffer, .. }) = self.buffers.get(&buffer.0) {
                        pass.set_index_buffer(buffer.slice(offset..), convert_index_format(format));
                    }
                }
                RecordedCommand::Draw { vertices } if has_pipeline => {
                    pass.draw(vertices, 0..1);
                    drawn += 1;
                }
                RecordedCommand::DrawIndexed {
                    indices,
                    base_vertex,
                } if has_pipeline => {
                    pass.draw_indexed(indices, base_vertex, 0..1);
                    drawn += 1;
                }
                RecordedCommand::Draw { .. } | RecordedCommand::DrawIndexed { .. } => {
                    log::warn!("Skipping draw: no pipeline for {topology:?}");
                }
            }
        }

        drawn
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Run `create` inside error scopes and turn captured errors into results.
    fn scoped<T>(
        &self,
        what: &str,
        create: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, GraphicsError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        if out_of_memory.is_some() {
            return Err(GraphicsError::OutOfMemory);
        }
        if let Some(e) = validation {
            return Err(GraphicsError::ResourceCreationFailed(format!("{what}: {e}")));
        }
        Ok(value)
    }

    fn submit_copy(&self, src: &wgpu::Buffer, dst: &wgpu::Buffer, size: u64) -> wgpu::SubmissionIndex {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Mesh Copy Encoder"),
            });
        encoder.copy_buffer_to_buffer(src, 0, dst, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()))
    }
}

fn padded_size(size: u64) -> u64 {
    wgpu::util::align_to(size, wgpu::COPY_BUFFER_ALIGNMENT)
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu Backend"
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
        let size = padded_size(descriptor.size);
        let label = descriptor.label.as_deref();

        let entry = if descriptor.usage.is_staging() {
            let mut contents = vec![0u8; size as usize];
            if let Some(data) = data {
                let len = data.len().min(contents.len());
                contents[..len].copy_from_slice(&data[..len]);
            }
            let readback = if descriptor.usage.contains(BufferUsage::MAP_READ) {
                let readback_label = label.map(|label| format!("{label} readback"));
                let buffer = self.scoped("readback buffer", |device| {
                    device.create_buffer(&wgpu::BufferDescriptor {
                        label: readback_label.as_deref(),
                        size,
                        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    })
                })?;
                Some(Readback {
                    buffer,
                    state: ReadbackState::Idle,
                })
            } else {
                None
            };
            WgpuBuffer::Host(HostStaging {
                data: contents,
                size: descriptor.size,
                usage: descriptor.usage,
                mapped: None,
                readback,
            })
        } else {
            let usage = convert_buffer_usage(descriptor.usage)
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST;
            let buffer = match data {
                Some(data) => {
                    let mut contents = vec![0u8; size as usize];
                    let len = data.len().min(contents.len());
                    contents[..len].copy_from_slice(&data[..len]);
                    self.scoped("buffer", |device| {
                        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label,
                            contents: &contents,
                            usage,
                        })
                    })?
                }
                None => self.scoped("buffer", |device| {
                    device.create_buffer(&wgpu::BufferDescriptor {
                        label,
                        size,
                        usage,
                        mapped_at_creation: false,
                    })
                })?,
            };
            WgpuBuffer::Device {
                buffer,
                size,
                len: descriptor.size,
            }
        };

        log::trace!(
            "wgpu: created buffer {:?} (size: {}, usage: {:?})",
            descriptor.label,
            descriptor.size,
            descriptor.usage
        );

        let id = self.allocate_id();
        self.buffers.insert(id, entry);
        Ok(BufferHandle(id))
    }

    fn create_structured_view(
        &mut self,
        buffer: BufferHandle,
        descriptor: &StructuredViewDescriptor,
    ) -> Result<ViewHandle, GraphicsError> {
        let Some(WgpuBuffer::Device {
            buffer: target,
            size,
            ..
        }) = self.buffers.get(&buffer.0)
        else {
            return Err(GraphicsError::InvalidParameter(format!(
                "structured view over non-device buffer {buffer:?}"
            )));
        };

        let offset = descriptor.first_element as u64 * descriptor.element_stride as u64;
        let byte_size = descriptor.byte_size();
        if offset + byte_size > *size {
            return Err(GraphicsError::InvalidParameter(format!(
                "view covers {} bytes of a {size} byte buffer",
                offset + byte_size
            )));
        }

        let bind_group = self.scoped("structured view", |device| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: descriptor.label.as_deref(),
                layout: &self.view_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: target,
                        offset,
                        size: NonZeroU64::new(padded_size(byte_size).min(*size - offset)),
                    }),
                }],
            })
        })?;

        log::trace!("wgpu: created view {:?}", descriptor.label);

        let id = self.allocate_id();
        self.views.insert(id, bind_group);
        Ok(ViewHandle(id))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        match self.buffers.remove(&buffer.0) {
            Some(WgpuBuffer::Device { buffer, .. }) => buffer.destroy(),
            Some(WgpuBuffer::Host(host)) => {
                if let Some(readback) = host.readback {
                    readback.buffer.destroy();
                }
            }
            None => log::warn!("wgpu: destroying unknown buffer {buffer:?}"),
        }
    }

    fn destroy_view(&mut self, view: ViewHandle) {
        if self.views.remove(&view.0).is_none() {
            log::warn!("wgpu: destroying unknown view {view:?}");
        }
    }

    fn copy_buffer(&mut self, dst: BufferHandle, src: BufferHandle) {
        let submission = match (self.buffers.get(&src.0), self.buffers.get(&dst.0)) {
            (
                Some(WgpuBuffer::Device {
                    buffer: s,
                    size: ss,
                    ..
                }),
                Some(WgpuBuffer::Device {
                    buffer: d,
                    size: ds,
                    ..
                }),
            ) => {
                self.submit_copy(s, d, (*ss).min(*ds));
                return;
            }
            (Some(WgpuBuffer::Device { buffer: s, size, .. }), Some(WgpuBuffer::Host(host))) => {
                let Some(readback) = &host.readback else {
                    log::error!("wgpu: copy into write-only staging buffer {dst:?}");
                    return;
                };
                if matches!(readback.state, ReadbackState::Mapping { .. }) {
                    log::warn!("wgpu: staging buffer {dst:?} is being mapped, copy skipped");
                    return;
                }
                let len = (*size).min(host.data.len() as u64);
                self.submit_copy(s, &readback.buffer, len)
            }
            (Some(WgpuBuffer::Host(host)), Some(WgpuBuffer::Device { buffer: d, size, .. })) => {
                let len = (host.data.len() as u64).min(*size) as usize;
                self.queue.write_buffer(d, 0, &host.data[..len]);
                return;
            }
            _ => {
                log::error!("wgpu: unsupported copy {src:?} -> {dst:?}");
                return;
            }
        };

        if let Some(WgpuBuffer::Host(host)) = self.buffers.get_mut(&dst.0)
            && let Some(readback) = host.readback.as_mut()
        {
            readback.state = ReadbackState::Copied(submission);
        }
    }

    fn update_buffer(&mut self, buffer: BufferHandle, data: &[u8]) {
        let Some(WgpuBuffer::Device { buffer, size, len }) = self.buffers.get(&buffer.0) else {
            log::error!("wgpu: update of non-device buffer {buffer:?}");
            return;
        };
        let aligned = padded_size(data.len() as u64).min(*size) as usize;
        if aligned == data.len() {
            self.queue.write_buffer(buffer, 0, data);
        } else if (data.len() as u64) < *len {
            log::error!(
                "wgpu: unaligned partial update of {} bytes refused, it would clobber live bytes",
                data.len()
            );
        } else {
            // Only alignment padding past the requested size is zeroed.
            let mut padded = vec![0u8; aligned];
            let len = data.len().min(aligned);
            padded[..len].copy_from_slice(&data[..len]);
            self.queue.write_buffer(buffer, 0, &padded);
        }
    }

    fn map_buffer(
        &mut self,
        buffer: BufferHandle,
        mode: MapMode,
        wait: bool,
    ) -> Result<MapStatus, GraphicsError> {
        let Some(WgpuBuffer::Host(host)) = self.buffers.get_mut(&buffer.0) else {
            return Err(GraphicsError::InvalidParameter(format!(
                "{buffer:?} is not a staging buffer"
            )));
        };
        if !host.usage.contains(mode.cpu_access()) {
            return Err(GraphicsError::InvalidParameter(format!(
                "staging buffer {buffer:?} was not created for {mode:?} access"
            )));
        }
        if host.mapped.is_some() {
            return Err(GraphicsError::Internal(format!(
                "staging buffer {buffer:?} is already mapped"
            )));
        }

        if mode.is_read()
            && let Some(readback) = host.readback.as_mut()
            && !readback.resolve(&self.device, &mut host.data, wait, self.config.map_timeout)?
        {
            log::trace!("wgpu: map of {buffer:?} would block");
            return Ok(MapStatus::WouldBlock);
        }

        host.mapped = Some(mode);
        Ok(MapStatus::Mapped)
    }

    fn mapped_range(&mut self, buffer: BufferHandle) -> Result<&mut [u8], GraphicsError> {
        match self.buffers.get_mut(&buffer.0) {
            Some(WgpuBuffer::Host(host)) if host.mapped.is_some() => {
                Ok(&mut host.data[..host.size as usize])
            }
            Some(_) => Err(GraphicsError::Internal(format!(
                "buffer {buffer:?} is not mapped"
            ))),
            None => Err(GraphicsError::InvalidParameter(format!(
                "unknown buffer {buffer:?}"
            ))),
        }
    }

    fn unmap_buffer(&mut self, buffer: BufferHandle) {
        match self.buffers.get_mut(&buffer.0) {
            Some(WgpuBuffer::Host(host)) => {
                if host.mapped.take().is_none() {
                    log::warn!("wgpu: unmap of unmapped buffer {buffer:?}");
                }
            }
            _ => log::error!("wgpu: unmap of non-staging buffer {buffer:?}"),
        }
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.recorded.push(RecordedCommand::SetTopology(topology));
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, _stride: u32, offset: u64) {
        // The stride lives in the pipeline's vertex buffer layout.
        self.recorded.push(RecordedCommand::SetVertexBuffer {
            slot,
            buffer,
            offset,
        });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat, offset: u64) {
        self.recorded.push(RecordedCommand::SetIndexBuffer {
            buffer,
            format,
            offset,
        });
    }

    fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        self.recorded.push(RecordedCommand::Draw {
            vertices: first_vertex..first_vertex + vertex_count,
        });
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) {
        self.recorded.push(RecordedCommand::DrawIndexed {
            indices: first_index..first_index + index_count,
            base_vertex,
        });
    }
}
