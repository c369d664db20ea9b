//! Error types for the GPU backend.

use thiserror::Error;

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Failures reported by a [`Backend`](crate::Backend) or one of the caches
/// sitting on top of it.
///
/// Programming errors (degenerate rectangles, missing attachments, use after
/// shutdown) are not represented here; they panic at the call site.
#[derive(Error, Debug)]
pub enum BackendError {
    /// A shader module failed to compile or validate.
    #[error("shader compilation failed for `{label}`: {message}")]
    ShaderCompilation { label: String, message: String },

    /// A graphics pipeline could not be created.
    #[error("pipeline creation failed for `{label}`: {message}")]
    PipelineCreation { label: String, message: String },

    /// A buffer (vertex, uniform or staging) could not be allocated.
    #[error("buffer allocation of {size} bytes failed: {message}")]
    BufferAllocation { size: u64, message: String },

    /// The device was lost or is otherwise unusable.
    #[error("device lost: {0}")]
    DeviceLost(String),

    /// No adapter matched the request.
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error(transparent)]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}
