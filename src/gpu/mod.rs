//! Graphics-API seam.
//!
//! Everything the filter pipeline needs from OpenGL goes through [`GlApi`].
//! Two implementations ship with the crate:
//! - [`GlowGl`]: forwards to a live `glow::Context`.
//! - [`RecordingGl`]: a headless, in-memory context that tracks object
//!   lifetimes, bindings and draws, with fault injection for tests.
//!
//! Handles are `NonZeroU32` newtypes. GL's "name 0" is `None`.

use std::{num::NonZeroU32, rc::Rc};

mod glow_backend;
mod recording;

pub use glow_backend::GlowGl;
pub use recording::{DrawCall, ObjectKind, RecordingGl};

/// Shared handle to the current graphics context.
///
/// Owners of GPU objects keep one of these so `Drop` can release them.
pub type SharedGl = Rc<dyn GlApi>;

macro_rules! gl_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub NonZeroU32);

            impl $name {
                pub fn from_raw(raw: u32) -> Option<Self> {
                    NonZeroU32::new(raw).map(Self)
                }

                pub fn raw(self) -> u32 {
                    self.0.get()
                }
            }
        )*
    };
}

gl_handle!(
    /// A compiled shader stage.
    ShaderId,
    /// A linked program object.
    ProgramId,
    BufferId,
    /// A 2-D texture. Also the opaque input handle hosts pass to filters.
    TextureId,
    RenderbufferId,
    FramebufferId,
);

/// A uniform location inside a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn label(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturate,
}

impl BlendFactor {
    pub fn to_gl(self) -> u32 {
        match self {
            BlendFactor::Zero => glow::ZERO,
            BlendFactor::One => glow::ONE,
            BlendFactor::SrcColor => glow::SRC_COLOR,
            BlendFactor::OneMinusSrcColor => glow::ONE_MINUS_SRC_COLOR,
            BlendFactor::SrcAlpha => glow::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstColor => glow::DST_COLOR,
            BlendFactor::OneMinusDstColor => glow::ONE_MINUS_DST_COLOR,
            BlendFactor::DstAlpha => glow::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
            BlendFactor::SrcAlphaSaturate => glow::SRC_ALPHA_SATURATE,
        }
    }

    pub fn from_gl(value: u32) -> Option<Self> {
        Some(match value {
            glow::ZERO => BlendFactor::Zero,
            glow::ONE => BlendFactor::One,
            glow::SRC_COLOR => BlendFactor::SrcColor,
            glow::ONE_MINUS_SRC_COLOR => BlendFactor::OneMinusSrcColor,
            glow::SRC_ALPHA => BlendFactor::SrcAlpha,
            glow::ONE_MINUS_SRC_ALPHA => BlendFactor::OneMinusSrcAlpha,
            glow::DST_COLOR => BlendFactor::DstColor,
            glow::ONE_MINUS_DST_COLOR => BlendFactor::OneMinusDstColor,
            glow::DST_ALPHA => BlendFactor::DstAlpha,
            glow::ONE_MINUS_DST_ALPHA => BlendFactor::OneMinusDstAlpha,
            glow::SRC_ALPHA_SATURATE => BlendFactor::SrcAlphaSaturate,
            _ => return None,
        })
    }
}

/// Blend function with separate color and alpha factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendFunc {
    pub src_rgb: BlendFactor,
    pub dst_rgb: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
}

impl BlendFunc {
    /// `(ONE, ONE_MINUS_SRC_ALPHA)`: premultiplied-alpha compositing.
    pub const PREMULTIPLIED_ALPHA: BlendFunc =
        BlendFunc::uniform(BlendFactor::One, BlendFactor::OneMinusSrcAlpha);

    /// `(ONE, ZERO)`: overwrite the destination.
    pub const REPLACE: BlendFunc = BlendFunc::uniform(BlendFactor::One, BlendFactor::Zero);

    pub const fn uniform(src: BlendFactor, dst: BlendFactor) -> Self {
        BlendFunc {
            src_rgb: src,
            dst_rgb: dst,
            src_alpha: src,
            dst_alpha: dst,
        }
    }
}

impl Default for BlendFunc {
    // GL's initial blend function.
    fn default() -> Self {
        BlendFunc::REPLACE
    }
}

/// The subset of OpenGL (ES 2.0 compatible) used by the filter pipeline.
///
/// Every method must be called on the thread that holds the current context.
/// Creation methods return `None` when the driver hands back no object.
pub trait GlApi {
    // Shaders and programs.
    fn create_shader(&self, stage: ShaderStage) -> Option<ShaderId>;
    fn shader_source(&self, shader: ShaderId, source: &str);
    fn compile_shader(&self, shader: ShaderId);
    fn shader_compile_status(&self, shader: ShaderId) -> bool;
    fn shader_info_log(&self, shader: ShaderId) -> String;
    fn delete_shader(&self, shader: ShaderId);

    fn create_program(&self) -> Option<ProgramId>;
    fn attach_shader(&self, program: ProgramId, shader: ShaderId);
    fn link_program(&self, program: ProgramId);
    fn program_link_status(&self, program: ProgramId) -> bool;
    fn program_info_log(&self, program: ProgramId) -> String;
    fn delete_program(&self, program: ProgramId);
    fn use_program(&self, program: Option<ProgramId>);
    fn current_program(&self) -> Option<ProgramId>;
    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32>;
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    fn uniform_1i(&self, location: Option<UniformLocation>, value: i32);
    fn uniform_1f(&self, location: Option<UniformLocation>, value: f32);

    // Buffers and vertex attributes.
    fn create_buffer(&self) -> Option<BufferId>;
    fn delete_buffer(&self, buffer: BufferId);
    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferId>);
    fn buffer_data(&self, target: BufferTarget, data: &[u8]);
    fn enable_vertex_attrib_array(&self, index: u32);
    fn disable_vertex_attrib_array(&self, index: u32);
    fn vertex_attrib_pointer_f32(&self, index: u32, size: i32, stride: i32, offset: i32);
    /// Indexed `GL_TRIANGLES` draw with `GL_UNSIGNED_INT` indices from the
    /// bound element buffer.
    fn draw_triangles(&self, index_count: i32);

    // Textures.
    fn create_texture(&self) -> Option<TextureId>;
    fn delete_texture(&self, texture: TextureId);
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, texture: Option<TextureId>);
    fn unpack_alignment(&self, alignment: i32);
    /// Allocates RGBA8 storage for the bound texture without uploading data.
    fn tex_image_2d_rgba8(&self, width: i32, height: i32);
    /// Linear min/mag filtering, clamp-to-edge on both axes.
    fn tex_parameters_linear_clamp(&self);
    /// Copies the lower-left `width x height` region of the bound read
    /// framebuffer into the bound texture.
    fn copy_tex_sub_image_2d(&self, width: i32, height: i32);

    // Renderbuffers.
    fn create_renderbuffer(&self) -> Option<RenderbufferId>;
    fn delete_renderbuffer(&self, renderbuffer: RenderbufferId);
    fn bind_renderbuffer(&self, renderbuffer: Option<RenderbufferId>);
    fn renderbuffer_binding(&self) -> Option<RenderbufferId>;
    fn renderbuffer_storage_stencil8(&self, width: i32, height: i32);

    // Framebuffers.
    fn create_framebuffer(&self) -> Option<FramebufferId>;
    fn delete_framebuffer(&self, framebuffer: FramebufferId);
    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>);
    fn framebuffer_binding(&self) -> Option<FramebufferId>;
    fn framebuffer_color_texture(&self, texture: Option<TextureId>);
    fn framebuffer_stencil_renderbuffer(&self, renderbuffer: Option<RenderbufferId>);
    fn framebuffer_complete(&self) -> bool;

    // Fixed-function state.
    fn blend_enabled(&self) -> bool;
    fn set_blend_enabled(&self, enabled: bool);
    fn blend_func(&self) -> BlendFunc;
    fn set_blend_func(&self, func: BlendFunc);
    fn color_mask_all(&self);
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    /// Current viewport as `[x, y, width, height]`.
    fn viewport_rect(&self) -> [i32; 4];
    /// Clears color (to `rgba`) and stencil of the bound framebuffer.
    fn clear_color_and_stencil(&self, rgba: [f32; 4]);
    fn flush(&self);
    /// Reads back the lower-left `width x height` region as tightly packed
    /// RGBA8 rows, bottom row first.
    fn read_pixels_rgba8(&self, width: i32, height: i32) -> Vec<u8>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_factor_gl_round_trip() {
        for factor in [
            BlendFactor::Zero,
            BlendFactor::One,
            BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha,
            BlendFactor::DstColor,
            BlendFactor::SrcAlphaSaturate,
        ] {
            assert_eq!(BlendFactor::from_gl(factor.to_gl()), Some(factor));
        }
        assert_eq!(BlendFactor::from_gl(0xdead), None);
    }

    #[test]
    fn zero_is_not_a_handle() {
        assert_eq!(TextureId::from_raw(0), None);
        assert_eq!(TextureId::from_raw(7).map(TextureId::raw), Some(7));
    }
}
