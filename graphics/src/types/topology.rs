//! Primitive topology.

/// How vertices are assembled into primitives.
///
/// Discriminants mirror the raw values used by model files, so translating
/// to the backend enumeration is a plain value mapping.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Each vertex is a point.
    PointList = 1,
    /// Each pair of vertices is a line.
    LineList = 2,
    /// Consecutive vertices form a connected line.
    LineStrip = 3,
    /// Each triple of vertices is a triangle.
    #[default]
    TriangleList = 4,
    /// Consecutive vertices form connected triangles.
    TriangleStrip = 5,
    /// Line list with adjacency.
    LineListAdjacency = 10,
    /// Line strip with adjacency.
    LineStripAdjacency = 11,
    /// Triangle list with adjacency.
    TriangleListAdjacency = 12,
    /// Triangle strip with adjacency.
    TriangleStripAdjacency = 13,
}

impl PrimitiveTopology {
    /// Map a raw topology value onto the enum.
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::PointList),
            2 => Some(Self::LineList),
            3 => Some(Self::LineStrip),
            4 => Some(Self::TriangleList),
            5 => Some(Self::TriangleStrip),
            10 => Some(Self::LineListAdjacency),
            11 => Some(Self::LineStripAdjacency),
            12 => Some(Self::TriangleListAdjacency),
            13 => Some(Self::TriangleStripAdjacency),
            _ => None,
        }
    }

    /// The raw value of this topology.
    pub fn raw(self) -> u32 {
        self as u32
    }

    /// Number of primitives assembled from `count` vertices or indices.
    pub fn primitive_count(self, count: u32) -> u32 {
        match self {
            Self::PointList => count,
            Self::LineList => count / 2,
            Self::LineStrip => count.saturating_sub(1),
            Self::TriangleList => count / 3,
            Self::TriangleStrip => count.saturating_sub(2),
            Self::LineListAdjacency => count / 4,
            Self::LineStripAdjacency => count.saturating_sub(3),
            Self::TriangleListAdjacency => count / 6,
            Self::TriangleStripAdjacency => count.saturating_sub(4) / 2,
        }
    }
}
