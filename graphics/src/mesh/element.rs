//! Per-element vertex and index metadata.

use crate::error::GraphicsError;
use crate::types::{ElementType, Format};

/// Description of one vertex attribute (or of the index element).
///
/// Supplied by the model loader and immutable once handed to a mesh.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementInfo {
    /// Shader semantic name, e.g. `POSITION`.
    pub semantic_name: String,
    /// Index distinguishing repeated semantics (`TEXCOORD0`, `TEXCOORD1`, ...).
    pub semantic_index: u32,
    /// Scalar type of each component.
    pub element_type: ElementType,
    /// Number of components, 1 to 4.
    pub component_count: u32,
    /// Byte offset of this element within a vertex.
    pub offset: u32,
    /// Size of this element in bytes.
    pub size: u32,
}

impl ElementInfo {
    /// Create an element whose size is `component_count` scalars of `element_type`.
    pub fn new(
        semantic_name: impl Into<String>,
        element_type: ElementType,
        component_count: u32,
        offset: u32,
    ) -> Self {
        // Saturate so an absurd count still reaches format translation.
        let size = element_type
            .component_size()
            .map_or(0, |component| component.saturating_mul(component_count));
        Self {
            semantic_name: semantic_name.into(),
            semantic_index: 0,
            element_type,
            component_count,
            offset,
            size,
        }
    }

    /// Metadata for an index element of the given scalar type.
    pub fn index(element_type: ElementType) -> Self {
        Self::new("INDEX", element_type, 1, 0)
    }

    /// Set the semantic index.
    pub fn with_semantic_index(mut self, index: u32) -> Self {
        self.semantic_index = index;
        self
    }

    /// Override the byte size.
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// First byte past this element, `None` if it lies beyond `u32::MAX`.
    pub fn end(&self) -> Option<u32> {
        self.offset.checked_add(self.size)
    }

    fn checked_end(&self) -> Result<u32, GraphicsError> {
        self.end().ok_or_else(|| {
            GraphicsError::InvalidElementLayout(format!(
                "element {}{} ends past the addressable vertex size",
                self.semantic_name, self.semantic_index
            ))
        })
    }

    /// Storage format of this element.
    pub fn format(&self) -> Result<Format, GraphicsError> {
        Format::from_element(self.element_type, self.component_count)
    }
}

/// Byte stride of one vertex: the end of the last element.
pub fn vertex_stride(elements: &[ElementInfo]) -> Result<u32, GraphicsError> {
    elements.last().map_or(Ok(0), ElementInfo::checked_end)
}

/// Check that `elements` describe one tightly packed vertex.
///
/// Elements must start at offset 0 and each must begin where the previous
/// one ends. Every element must translate to a storage format and be at
/// least as large as that format.
pub fn validate_elements(elements: &[ElementInfo]) -> Result<(), GraphicsError> {
    if elements.is_empty() {
        return Err(GraphicsError::InvalidElementLayout(
            "at least one vertex element is required".to_string(),
        ));
    }

    let mut expected_offset = 0u32;
    for element in elements {
        let format = element.format()?;
        if element.size < format.size() {
            return Err(GraphicsError::InvalidElementLayout(format!(
                "element {}{} is {} bytes, {format:?} needs {}",
                element.semantic_name,
                element.semantic_index,
                element.size,
                format.size()
            )));
        }
        if element.offset != expected_offset {
            return Err(GraphicsError::InvalidElementLayout(format!(
                "element {}{} at offset {} (expected {expected_offset})",
                element.semantic_name, element.semantic_index, element.offset
            )));
        }
        expected_offset = element.checked_end()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position_uv() -> Vec<ElementInfo> {
        vec![
            ElementInfo::new("POSITION", ElementType::Float32, 3, 0),
            ElementInfo::new("TEXCOORD", ElementType::Float32, 2, 12),
        ]
    }

    #[test]
    fn test_stride_from_last_element() {
        let elements = position_uv();
        assert_eq!(elements[0].size, 12);
        assert_eq!(elements[1].size, 8);
        assert_eq!(vertex_stride(&elements), Ok(20));
        assert!(validate_elements(&elements).is_ok());
    }

    #[test]
    fn test_explicit_sizes() {
        let elements = vec![
            ElementInfo::new("POSITION", ElementType::Float32, 3, 0).with_size(12),
            ElementInfo::new("TEXCOORD", ElementType::Float32, 2, 12).with_size(8),
        ];
        assert_eq!(vertex_stride(&elements), Ok(20));
    }

    #[test]
    fn test_empty_layout_rejected() {
        assert_eq!(vertex_stride(&[]), Ok(0));
        assert!(matches!(
            validate_elements(&[]),
            Err(GraphicsError::InvalidElementLayout(_))
        ));
    }

    #[test]
    fn test_gap_rejected() {
        let elements = vec![
            ElementInfo::new("POSITION", ElementType::Float32, 3, 0),
            ElementInfo::new("TEXCOORD", ElementType::Float32, 2, 16),
        ];
        assert!(matches!(
            validate_elements(&elements),
            Err(GraphicsError::InvalidElementLayout(_))
        ));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let elements = vec![
            ElementInfo::new("TEXCOORD", ElementType::Float32, 2, 12),
            ElementInfo::new("POSITION", ElementType::Float32, 3, 0),
        ];
        assert!(validate_elements(&elements).is_err());
    }

    #[test]
    fn test_untranslatable_element_rejected() {
        let elements = vec![ElementInfo::new("COLOR", ElementType::Uint8, 3, 0)];
        assert!(matches!(
            validate_elements(&elements),
            Err(GraphicsError::InvalidComponentCount { count: 3, .. })
        ));

        let elements = vec![ElementInfo::new("WEIGHT", ElementType::Float64, 1, 0)];
        assert_eq!(
            validate_elements(&elements),
            Err(GraphicsError::UnsupportedElementType(ElementType::Float64))
        );
    }

    #[test]
    fn test_semantic_index() {
        let element = ElementInfo::new("TEXCOORD", ElementType::Float32, 2, 0).with_semantic_index(1);
        assert_eq!(element.semantic_index, 1);
        assert_eq!(element.format(), Ok(Format::Rg32Float));
    }

    #[test]
    fn test_element_end_overflow_rejected() {
        let elements = vec![
            ElementInfo::new("A", ElementType::Float32, 1, 0),
            ElementInfo::new("B", ElementType::Float32, 1, 4).with_size(u32::MAX),
        ];
        assert_eq!(elements[1].end(), None);
        assert!(matches!(
            validate_elements(&elements),
            Err(GraphicsError::InvalidElementLayout(_))
        ));
        assert!(matches!(
            vertex_stride(&elements),
            Err(GraphicsError::InvalidElementLayout(_))
        ));
    }

    #[test]
    fn test_huge_component_count_saturates() {
        let element = ElementInfo::new("A", ElementType::Float32, 0x4000_0001, 0);
        assert_eq!(element.size, u32::MAX);
        assert_eq!(
            validate_elements(&[element]),
            Err(GraphicsError::InvalidComponentCount {
                element_type: ElementType::Float32,
                count: 0x4000_0001
            })
        );
    }

    #[test]
    fn test_element_smaller_than_format_rejected() {
        let elements = vec![ElementInfo::new("POSITION", ElementType::Float32, 3, 0).with_size(4)];
        assert!(matches!(
            validate_elements(&elements),
            Err(GraphicsError::InvalidElementLayout(_))
        ));

        // Trailing padding inside an element is allowed.
        let padded = vec![
            ElementInfo::new("POSITION", ElementType::Float32, 3, 0).with_size(16),
            ElementInfo::new("TEXCOORD", ElementType::Float32, 2, 16),
        ];
        assert!(validate_elements(&padded).is_ok());
        assert_eq!(vertex_stride(&padded), Ok(24));
    }
}
