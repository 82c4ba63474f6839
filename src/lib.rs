//! Run-time synthesized GPU image filters over OpenGL.
//!
//! A [`Filter`] owns the GPU program and intermediate framebuffer of one
//! single-input effect and rebuilds them lazily when the output size or the
//! effect's configuration changes. [`GaussianBlurFilter`] is the two-pass
//! separable blur whose shaders are generated from its radius and sigma.

pub mod config;
pub mod error;
pub mod filter;
pub mod framebuffer;
pub mod gaussian_blur;
pub mod gpu;
pub mod logging;
pub mod program;
pub mod shaders;

pub use config::{FilterConfig, FilterKind, GaussianBlurConfig};
pub use error::{GlError, GlResult};
pub use filter::{Filter, FilterStage, FilterState, PassThrough};
pub use framebuffer::{Framebuffer, FramebufferBinding};
pub use gaussian_blur::{GaussianBlur, GaussianBlurFilter, GaussianKernel};
pub use gpu::{GlApi, GlowGl, RecordingGl, SharedGl, TextureId};
pub use program::Program;
pub use shaders::ShaderDialect;
