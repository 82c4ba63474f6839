//! Error types for GPU resource setup.

use std::fmt;

use crate::gpu::{ObjectKind, ShaderStage};

/// Result type alias using [`GlError`].
pub type GlResult<T> = Result<T, GlError>;

/// Failures while creating GPU resources.
///
/// None of these are fatal: the owning object is left as if it had never
/// been initialized, and the caller may retry on a later frame.
#[derive(Debug, Clone, PartialEq)]
pub enum GlError {
    /// The driver returned no object for a create/gen call.
    ObjectCreation { kind: ObjectKind },
    /// The requested target has no pixels.
    InvalidSize { width: i32, height: i32 },
    /// The framebuffer completeness check failed.
    IncompleteFramebuffer { width: i32, height: i32 },
    /// A shader stage failed to compile.
    ShaderCompile { stage: ShaderStage, log: String },
    /// The program failed to link.
    ProgramLink { log: String },
    /// An operation needed an object that has not been initialized.
    NotInitialized { what: &'static str },
}

impl fmt::Display for GlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlError::ObjectCreation { kind } => {
                write!(f, "failed to create {kind:?} object")
            }
            GlError::InvalidSize { width, height } => {
                write!(f, "invalid render target size {width}x{height}")
            }
            GlError::IncompleteFramebuffer { width, height } => {
                write!(f, "framebuffer {width}x{height} is incomplete")
            }
            GlError::ShaderCompile { stage, log } => {
                write!(f, "failed to compile {} shader: {}", stage.label(), log.trim())
            }
            GlError::ProgramLink { log } => write!(f, "failed to link program: {}", log.trim()),
            GlError::NotInitialized { what } => write!(f, "{what} is not initialized"),
        }
    }
}

impl std::error::Error for GlError {}

impl GlError {
    pub fn is_shader_error(&self) -> bool {
        matches!(self, GlError::ShaderCompile { .. } | GlError::ProgramLink { .. })
    }
}
