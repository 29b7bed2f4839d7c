//! Graphics error types.

use thiserror::Error;

use crate::mesh::{BufferKind, MapMode};
use crate::types::ElementType;

/// Errors that can occur while creating, mapping or drawing mesh resources.
///
/// Most variants describe a condition the mesh cannot recover from on its
/// own: either the device refused an allocation or the caller broke the
/// buffer contract. [`GraphicsError::is_fatal`] tells the two classes apart. A busy
/// non-blocking map is not an error; see [`crate::MapOutcome::NotReady`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize the graphics system.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    /// The device refused to create a buffer or view.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// Out of GPU memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// Vertex element metadata does not describe a contiguous vertex.
    #[error("invalid element layout: {0}")]
    InvalidElementLayout(String),
    /// A component count outside `1..=4`, or a count with no native format.
    #[error("invalid component count {count} for {element_type:?}")]
    InvalidComponentCount {
        /// Element type the count was paired with.
        element_type: ElementType,
        /// Offending component count.
        count: u32,
    },
    /// The element type has no GPU storage format.
    #[error("unsupported element type {0:?}")]
    UnsupportedElementType(ElementType),
    /// Index metadata does not translate to a 16- or 32-bit index format.
    #[error("unsupported index format: {0}")]
    UnsupportedIndexFormat(String),
    /// The staging buffer was created for a different access mode.
    #[error("{kind} staging buffer was created for {bound:?}, cannot map for {requested:?}")]
    MapModeMismatch {
        /// Which mesh buffer was being mapped.
        kind: BufferKind,
        /// Mode the staging buffer is permanently bound to.
        bound: MapMode,
        /// Mode requested by the caller.
        requested: MapMode,
    },
    /// Unmap was called on a buffer that is not mapped.
    #[error("{0} buffer is not mapped")]
    NotMapped(BufferKind),
    /// The buffer is mapped and the operation needs it unmapped.
    #[error("{0} buffer is mapped")]
    AlreadyMapped(BufferKind),
    /// The mesh holds no buffer of this kind.
    #[error("mesh has no {0} buffer")]
    MissingBuffer(BufferKind),
    /// Supplied bytes do not match the size the buffer needs.
    #[error("data size mismatch: expected {expected} bytes, got {actual}")]
    DataSizeMismatch {
        /// Bytes the operation requires.
        expected: u64,
        /// Bytes provided.
        actual: u64,
    },
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GraphicsError {
    /// Whether this error means the mesh must be re-created or dropped.
    ///
    /// Allocation failures and broken buffer contracts are fatal. Parameter
    /// validation failures are reported before anything is allocated and
    /// leave the mesh untouched.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidParameter(_) | Self::DataSizeMismatch { .. })
    }
}
