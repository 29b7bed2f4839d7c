//! Type conversions between mesh types and wgpu types.

use crate::mesh::{InputLayout, VertexStepMode};
use crate::types::{BufferUsage, Format, IndexFormat, PrimitiveTopology};

/// Convert BufferUsage flags to wgpu buffer usages.
pub fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut result = wgpu::BufferUsages::empty();

    if usage.contains(BufferUsage::VERTEX) {
        result |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::STORAGE) {
        result |= wgpu::BufferUsages::STORAGE;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        result |= wgpu::BufferUsages::COPY_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        result |= wgpu::BufferUsages::COPY_DST;
    }
    if usage.contains(BufferUsage::MAP_READ) {
        result |= wgpu::BufferUsages::MAP_READ;
    }
    if usage.contains(BufferUsage::MAP_WRITE) {
        result |= wgpu::BufferUsages::MAP_WRITE;
    }

    result
}

/// Convert a storage format to a wgpu vertex format.
pub fn convert_vertex_format(format: Format) -> wgpu::VertexFormat {
    match format {
        Format::R32Float => wgpu::VertexFormat::Float32,
        Format::Rg32Float => wgpu::VertexFormat::Float32x2,
        Format::Rgb32Float => wgpu::VertexFormat::Float32x3,
        Format::Rgba32Float => wgpu::VertexFormat::Float32x4,
        Format::R32Uint => wgpu::VertexFormat::Uint32,
        Format::Rg32Uint => wgpu::VertexFormat::Uint32x2,
        Format::Rgb32Uint => wgpu::VertexFormat::Uint32x3,
        Format::Rgba32Uint => wgpu::VertexFormat::Uint32x4,
        Format::R16Uint => wgpu::VertexFormat::Uint16,
        Format::Rg16Uint => wgpu::VertexFormat::Uint16x2,
        Format::Rgba16Uint => wgpu::VertexFormat::Uint16x4,
        Format::R8Uint => wgpu::VertexFormat::Uint8,
        Format::Rg8Uint => wgpu::VertexFormat::Uint8x2,
        Format::Rgba8Uint => wgpu::VertexFormat::Uint8x4,
    }
}

/// Convert IndexFormat to wgpu index format.
pub fn convert_index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
        IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
    }
}

/// Convert a primitive topology to wgpu.
///
/// wgpu has no adjacency topologies, so those yield `None`.
pub fn convert_topology(topology: PrimitiveTopology) -> Option<wgpu::PrimitiveTopology> {
    match topology {
        PrimitiveTopology::PointList => Some(wgpu::PrimitiveTopology::PointList),
        PrimitiveTopology::LineList => Some(wgpu::PrimitiveTopology::LineList),
        PrimitiveTopology::LineStrip => Some(wgpu::PrimitiveTopology::LineStrip),
        PrimitiveTopology::TriangleList => Some(wgpu::PrimitiveTopology::TriangleList),
        PrimitiveTopology::TriangleStrip => Some(wgpu::PrimitiveTopology::TriangleStrip),
        PrimitiveTopology::LineListAdjacency
        | PrimitiveTopology::LineStripAdjacency
        | PrimitiveTopology::TriangleListAdjacency
        | PrimitiveTopology::TriangleStripAdjacency => None,
    }
}

/// Convert VertexStepMode to wgpu.
pub fn convert_step_mode(mode: VertexStepMode) -> wgpu::VertexStepMode {
    match mode {
        VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
        VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
    }
}

/// Vertex attributes of an input layout, shader locations in entry order.
pub fn convert_input_layout(layout: &InputLayout) -> Vec<wgpu::VertexAttribute> {
    layout
        .elements()
        .iter()
        .enumerate()
        .filter_map(|(location, element)| {
            element.format.map(|format| wgpu::VertexAttribute {
                format: convert_vertex_format(format),
                offset: element.aligned_byte_offset as u64,
                shader_location: location as u32,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::ElementInfo;
    use crate::types::ElementType;

    #[test]
    fn test_vertex_format_sizes_match() {
        for format in [
            Format::R32Float,
            Format::Rgb32Float,
            Format::Rgba32Uint,
            Format::Rg16Uint,
            Format::Rgba8Uint,
        ] {
            assert_eq!(convert_vertex_format(format).size(), format.size() as u64);
        }
    }

    #[test]
    fn test_adjacency_has_no_wgpu_topology() {
        assert_eq!(
            convert_topology(PrimitiveTopology::TriangleListAdjacency),
            None
        );
        assert_eq!(
            convert_topology(PrimitiveTopology::TriangleStrip),
            Some(wgpu::PrimitiveTopology::TriangleStrip)
        );
    }

    #[test]
    fn test_input_layout_attributes() {
        let elements = [
            ElementInfo::new("POSITION", ElementType::Float32, 3, 0),
            ElementInfo::new("COLOR", ElementType::Uint8, 4, 12),
        ];
        let layout = InputLayout::from_elements(&elements).unwrap();
        let attributes = convert_input_layout(&layout);

        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[1].shader_location, 1);
        assert_eq!(attributes[1].format, wgpu::VertexFormat::Uint8x4);
    }
}
