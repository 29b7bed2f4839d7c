//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    ///
    /// `MAP_READ` and `MAP_WRITE` are the CPU access flags; a buffer carrying
    /// either of them is a staging buffer and is never bound for drawing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be read by shaders through a structured view.
        const STORAGE = 1 << 2;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 3;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 4;
        /// Buffer is mappable for CPU reads.
        const MAP_READ = 1 << 5;
        /// Buffer is mappable for CPU writes.
        const MAP_WRITE = 1 << 6;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

impl BufferUsage {
    /// Whether the CPU can map this buffer.
    pub fn is_staging(&self) -> bool {
        self.intersects(Self::MAP_READ | Self::MAP_WRITE)
    }
}

/// Granularity of device-side buffer writes, in bytes.
///
/// Partial writes must cover a multiple of this; a write that reaches the
/// end of a buffer may stop anywhere.
pub const COPY_ALIGNMENT: u64 = 4;

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Byte stride of one structure for structured buffers, 0 otherwise.
    pub structure_stride: u32,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            structure_stride: 0,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Mark the buffer as structured with the given element stride.
    pub fn with_structure_stride(mut self, stride: u32) -> Self {
        self.structure_stride = stride;
        self
    }

    /// Derive a staging descriptor with the same size and stride.
    ///
    /// Role flags are dropped; only the CPU access and copy flags remain.
    pub fn staging(&self, cpu_access: BufferUsage) -> Self {
        Self {
            label: None,
            size: self.size,
            usage: (cpu_access & (BufferUsage::MAP_READ | BufferUsage::MAP_WRITE))
                | BufferUsage::COPY_SRC
                | BufferUsage::COPY_DST,
            structure_stride: self.structure_stride,
        }
    }
}

/// Descriptor for a shader-readable structured view over a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StructuredViewDescriptor {
    /// Debug label for the view.
    pub label: Option<String>,
    /// Index of the first structure visible through the view.
    pub first_element: u32,
    /// Number of structures visible through the view.
    pub element_count: u32,
    /// Byte stride of one structure.
    pub element_stride: u32,
}

impl StructuredViewDescriptor {
    /// Create a view over `element_count` structures of `element_stride` bytes.
    pub fn new(element_count: u32, element_stride: u32) -> Self {
        Self {
            label: None,
            first_element: 0,
            element_count,
            element_stride,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Number of bytes covered by the view.
    pub fn byte_size(&self) -> u64 {
        self.element_count as u64 * self.element_stride as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_descriptor_keeps_size() {
        let desc = BufferDescriptor::new(480, BufferUsage::VERTEX | BufferUsage::COPY_DST)
            .with_label("mesh vertex buffer")
            .with_structure_stride(24);
        let staging = desc.staging(BufferUsage::MAP_READ | BufferUsage::VERTEX);

        assert_eq!(staging.size, 480);
        assert_eq!(staging.structure_stride, 24);
        assert!(staging.usage.contains(BufferUsage::MAP_READ));
        assert!(!staging.usage.contains(BufferUsage::VERTEX));
        assert!(staging.usage.is_staging());
        assert!(!desc.usage.is_staging());
        assert_eq!(staging.label, None);
    }

    #[test]
    fn test_view_byte_size() {
        let view = StructuredViewDescriptor::new(10, 20).with_label("view");
        assert_eq!(view.byte_size(), 200);
        assert_eq!(view.label.as_deref(), Some("view"));
    }
}
