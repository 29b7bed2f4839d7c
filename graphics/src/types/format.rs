//! Element types and GPU storage formats.
//!
//! Model loaders describe vertex and index data with an abstract
//! [`ElementType`] plus a component count. The GPU consumes a concrete
//! [`Format`]. [`Format::from_element`] is the only place the two meet.

use crate::error::GraphicsError;

/// Abstract scalar type of one vertex or index element component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Type not known to the loader.
    Unknown,
    /// 64-bit float.
    Float64,
    /// 32-bit float.
    Float32,
    /// 64-bit unsigned integer.
    Uint64,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit unsigned integer.
    Uint32,
    /// 32-bit signed integer.
    Int32,
    /// 16-bit unsigned integer.
    Uint16,
    /// 16-bit signed integer.
    Int16,
    /// 8-bit unsigned integer.
    Uint8,
    /// 8-bit signed integer.
    Int8,
    /// 8-bit character.
    Char,
    /// 8-bit boolean.
    Bool,
}

impl ElementType {
    /// Size in bytes of a single component, `None` for [`ElementType::Unknown`].
    pub fn component_size(&self) -> Option<u32> {
        match self {
            Self::Unknown => None,
            Self::Float64 | Self::Uint64 | Self::Int64 => Some(8),
            Self::Float32 | Self::Uint32 | Self::Int32 => Some(4),
            Self::Uint16 | Self::Int16 => Some(2),
            Self::Uint8 | Self::Int8 | Self::Char | Self::Bool => Some(1),
        }
    }
}

/// Concrete GPU storage format of a vertex attribute or index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    R32Float,
    Rg32Float,
    Rgb32Float,
    Rgba32Float,
    R32Uint,
    Rg32Uint,
    Rgb32Uint,
    Rgba32Uint,
    R16Uint,
    Rg16Uint,
    Rgba16Uint,
    R8Uint,
    Rg8Uint,
    Rgba8Uint,
}

// Ordered by component count; `None` marks counts with no packed format.
const FLOAT32_FORMATS: [Option<Format>; 4] = [
    Some(Format::R32Float),
    Some(Format::Rg32Float),
    Some(Format::Rgb32Float),
    Some(Format::Rgba32Float),
];

const UINT32_FORMATS: [Option<Format>; 4] = [
    Some(Format::R32Uint),
    Some(Format::Rg32Uint),
    Some(Format::Rgb32Uint),
    Some(Format::Rgba32Uint),
];

const UINT16_FORMATS: [Option<Format>; 4] = [
    Some(Format::R16Uint),
    Some(Format::Rg16Uint),
    None,
    Some(Format::Rgba16Uint),
];

const UINT8_FORMATS: [Option<Format>; 4] = [
    Some(Format::R8Uint),
    Some(Format::Rg8Uint),
    None,
    Some(Format::Rgba8Uint),
];

/// Valid component counts for any element.
pub const COMPONENT_COUNT_RANGE: std::ops::RangeInclusive<u32> = 1..=4;

impl Format {
    /// Translate an element type and component count into a storage format.
    ///
    /// # Errors
    ///
    /// - [`GraphicsError::InvalidComponentCount`] when `component_count` is
    ///   outside `1..=4`, whatever the type, or when the type has no packed
    ///   format for that count (3 components of 16 or 8 bits).
    /// - [`GraphicsError::UnsupportedElementType`] for types other than
    ///   32-bit float and 32/16/8-bit unsigned integers.
    pub fn from_element(
        element_type: ElementType,
        component_count: u32,
    ) -> Result<Self, GraphicsError> {
        let invalid_count = || GraphicsError::InvalidComponentCount {
            element_type,
            count: component_count,
        };

        if !COMPONENT_COUNT_RANGE.contains(&component_count) {
            return Err(invalid_count());
        }

        let table = match element_type {
            ElementType::Float32 => &FLOAT32_FORMATS,
            ElementType::Uint32 => &UINT32_FORMATS,
            ElementType::Uint16 => &UINT16_FORMATS,
            ElementType::Uint8 => &UINT8_FORMATS,
            other => return Err(GraphicsError::UnsupportedElementType(other)),
        };

        table
            .get(component_count as usize - 1)
            .copied()
            .flatten()
            .ok_or_else(invalid_count)
    }

    /// Number of components in this format.
    pub fn component_count(&self) -> u32 {
        match self {
            Self::R32Float | Self::R32Uint | Self::R16Uint | Self::R8Uint => 1,
            Self::Rg32Float | Self::Rg32Uint | Self::Rg16Uint | Self::Rg8Uint => 2,
            Self::Rgb32Float | Self::Rgb32Uint => 3,
            Self::Rgba32Float | Self::Rgba32Uint | Self::Rgba16Uint | Self::Rgba8Uint => 4,
        }
    }

    /// Size in bytes of one element in this format.
    pub fn size(&self) -> u32 {
        let component = match self {
            Self::R32Float
            | Self::Rg32Float
            | Self::Rgb32Float
            | Self::Rgba32Float
            | Self::R32Uint
            | Self::Rg32Uint
            | Self::Rgb32Uint
            | Self::Rgba32Uint => 4,
            Self::R16Uint | Self::Rg16Uint | Self::Rgba16Uint => 2,
            Self::R8Uint | Self::Rg8Uint | Self::Rgba8Uint => 1,
        };
        component * self.component_count()
    }
}

/// Format of the indices in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit unsigned indices.
    Uint16,
    /// 32-bit unsigned indices.
    Uint32,
}

impl IndexFormat {
    /// Derive the index format from a translated storage format.
    ///
    /// Only single-component 16- and 32-bit unsigned formats can index.
    pub fn from_format(format: Format) -> Result<Self, GraphicsError> {
        match format {
            Format::R16Uint => Ok(Self::Uint16),
            Format::R32Uint => Ok(Self::Uint32),
            other => Err(GraphicsError::UnsupportedIndexFormat(format!(
                "{other:?} cannot be used for indices"
            ))),
        }
    }

    /// Size in bytes of a single index.
    pub fn size(&self) -> u32 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}
