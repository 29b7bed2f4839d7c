//! Staging buffers and the per-buffer map/unmap state machine.
//!
//! GPU-resident mesh buffers are never mapped directly. The first map of a
//! buffer creates a CPU-accessible staging buffer bound for good to the
//! requested [`MapMode`]; reads pull the GPU contents into it before the CPU
//! sees them and writes push it back to the GPU on unmap.
//!
//! ```text
//!             map(mode)                unmap
//! Undefined ------------> Mapped(mode) -----> Undefined
//!     ^                       |  map(mode): same mapping
//!     +--- map busy ----------+  map(other): MapModeMismatch
//! ```

use std::fmt;

use crate::backend::{BufferHandle, GpuBackend, MapStatus};
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, BufferUsage};

/// CPU access mode requested when mapping a mesh buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapMode {
    /// Read current GPU contents.
    Read,
    /// Read current GPU contents and write changes back.
    ReadWrite,
    /// Write without reading.
    Write,
    /// Write, discarding previous contents.
    WriteDiscard,
    /// Write regions the GPU is not currently using.
    NoOverwrite,
}

impl MapMode {
    /// CPU access flags a staging buffer needs for this mode.
    pub fn cpu_access(self) -> BufferUsage {
        match self {
            Self::Read => BufferUsage::MAP_READ,
            Self::ReadWrite => BufferUsage::MAP_READ | BufferUsage::MAP_WRITE,
            Self::Write | Self::WriteDiscard | Self::NoOverwrite => BufferUsage::MAP_WRITE,
        }
    }

    /// Whether mapping must first pull GPU contents into the staging buffer.
    pub fn is_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Whether unmapping must push staging contents back to the GPU.
    pub fn is_write(self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// Current map state of one mesh buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MapState {
    /// Not mapped.
    #[default]
    Undefined,
    /// Mapped for the given mode.
    Mapped(MapMode),
}

impl MapState {
    /// The active mode, if mapped.
    pub fn mode(self) -> Option<MapMode> {
        match self {
            Self::Undefined => None,
            Self::Mapped(mode) => Some(mode),
        }
    }

    /// Whether the buffer is mapped.
    pub fn is_mapped(self) -> bool {
        matches!(self, Self::Mapped(_))
    }
}

/// Which mesh buffer an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Index => write!(f, "index"),
        }
    }
}

/// A GPU buffer owned by a mesh together with its creation descriptor.
#[derive(Debug, Clone)]
pub(crate) struct DeviceBuffer {
    pub(crate) handle: BufferHandle,
    pub(crate) descriptor: BufferDescriptor,
}

/// CPU-accessible mirror of a mesh buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingBuffer {
    handle: BufferHandle,
    mode: MapMode,
    // Set while a GPU->staging copy has been issued but the map is still busy.
    copy_pending: bool,
}

impl StagingBuffer {
    /// Backend handle of the staging buffer.
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Mode this staging buffer was created for.
    pub fn mode(&self) -> MapMode {
        self.mode
    }
}

/// Map/unmap state machine for one buffer kind.
#[derive(Debug)]
pub(crate) struct MapSynchronizer {
    kind: BufferKind,
    staging: Option<StagingBuffer>,
    state: MapState,
}

impl MapSynchronizer {
    pub(crate) fn new(kind: BufferKind) -> Self {
        Self {
            kind,
            staging: None,
            state: MapState::Undefined,
        }
    }

    pub(crate) fn state(&self) -> MapState {
        self.state
    }

    pub(crate) fn staging(&self) -> Option<&StagingBuffer> {
        self.staging.as_ref()
    }

    /// Drive `Undefined -> Mapped(mode)`.
    ///
    /// On [`MapStatus::Mapped`] the staging buffer is mapped in the backend
    /// and its handle is returned alongside.
    pub(crate) fn map<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        buffer: &DeviceBuffer,
        label: &str,
        mode: MapMode,
        wait: bool,
    ) -> Result<(MapStatus, BufferHandle), GraphicsError> {
        if let Some(staging) = &self.staging {
            if staging.mode != mode {
                return Err(GraphicsError::MapModeMismatch {
                    kind: self.kind,
                    bound: staging.mode,
                    requested: mode,
                });
            }
            if self.state.is_mapped() {
                log::debug!("{} buffer of '{label}' already mapped for {mode:?}", self.kind);
                return Ok((MapStatus::Mapped, staging.handle));
            }
        }

        if self.staging.is_none() {
            let descriptor = buffer
                .descriptor
                .staging(mode.cpu_access())
                .with_label(format!("{label} staging buffer"));
            let handle = backend.create_buffer(&descriptor, None)?;
            log::trace!(
                "Created {} staging buffer for '{label}' ({mode:?}, {} bytes)",
                self.kind,
                descriptor.size
            );
            self.staging = Some(StagingBuffer {
                handle,
                mode,
                copy_pending: false,
            });
        }
        let Some(staging) = self.staging.as_mut() else {
            return Err(GraphicsError::Internal("staging buffer missing".to_string()));
        };

        if mode.is_read() && !staging.copy_pending {
            log::debug!("Copying {} buffer of '{label}' to staging", self.kind);
            backend.copy_buffer(staging.handle, buffer.handle);
        }

        match backend.map_buffer(staging.handle, mode, wait)? {
            MapStatus::Mapped => {
                staging.copy_pending = false;
                self.state = MapState::Mapped(mode);
                log::debug!("Mapped {} buffer of '{label}' for {mode:?}", self.kind);
                Ok((MapStatus::Mapped, staging.handle))
            }
            MapStatus::WouldBlock => {
                staging.copy_pending = mode.is_read();
                log::warn!(
                    "{} buffer of '{label}' is busy, non-blocking map refused",
                    self.kind
                );
                Ok((MapStatus::WouldBlock, staging.handle))
            }
        }
    }

    /// Drive `Mapped(mode) -> Undefined`, returning the mode that was active.
    pub(crate) fn unmap<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        buffer: Option<&DeviceBuffer>,
        label: &str,
    ) -> Result<MapMode, GraphicsError> {
        let (MapState::Mapped(mode), Some(staging)) = (self.state, self.staging.as_ref()) else {
            return Err(GraphicsError::NotMapped(self.kind));
        };

        backend.unmap_buffer(staging.handle);
        if mode.is_write() {
            match buffer {
                Some(buffer) => {
                    log::debug!("Copying {} staging buffer of '{label}' to GPU", self.kind);
                    backend.copy_buffer(buffer.handle, staging.handle);
                }
                None => log::error!("{} buffer of '{label}' vanished while mapped", self.kind),
            }
        }
        self.state = MapState::Undefined;
        log::debug!("Unmapped {} buffer of '{label}'", self.kind);
        Ok(mode)
    }

    /// Unmap if needed and destroy the staging buffer.
    pub(crate) fn release<B: GpuBackend + ?Sized>(&mut self, backend: &mut B, label: &str) {
        if let Some(staging) = self.staging.take() {
            if self.state.is_mapped() {
                log::warn!("Releasing {} buffer of '{label}' while mapped", self.kind);
                backend.unmap_buffer(staging.handle);
            }
            log::trace!("Destroying {} staging buffer of '{label}'", self.kind);
            backend.destroy_buffer(staging.handle);
        }
        self.state = MapState::Undefined;
    }
}
