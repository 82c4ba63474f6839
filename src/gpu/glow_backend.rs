use glow::{HasContext, PixelPackData, PixelUnpackData};

use super::{
    BlendFactor, BlendFunc, BufferId, BufferTarget, FramebufferId, GlApi, ProgramId,
    RenderbufferId, ShaderId, ShaderStage, TextureId, UniformLocation,
};

/// [`GlApi`] over a live `glow` context.
///
/// # Example
///
/// ```no_run
/// # use std::rc::Rc;
/// # use gl_filter_chain::gpu::{GlowGl, SharedGl};
/// # fn example(context: glow::Context) {
/// // With the context current on this thread:
/// let gl: SharedGl = Rc::new(unsafe { GlowGl::new(context) });
/// # }
/// ```
pub struct GlowGl {
    gl: glow::Context,
}

impl GlowGl {
    /// Wraps `gl`.
    ///
    /// # Safety
    ///
    /// The context must be current on the calling thread for as long as the
    /// returned value (and every object created through it) is alive.
    pub unsafe fn new(gl: glow::Context) -> Self {
        Self { gl }
    }

    pub fn context(&self) -> &glow::Context {
        &self.gl
    }

    fn parameter_u32(&self, parameter: u32) -> u32 {
        let value = unsafe { self.gl.get_parameter_i32(parameter) };
        u32::try_from(value).unwrap_or(0)
    }

    fn parameter_blend_factor(&self, parameter: u32) -> BlendFactor {
        BlendFactor::from_gl(self.parameter_u32(parameter)).unwrap_or(BlendFactor::One)
    }
}

fn buffer_target(target: BufferTarget) -> u32 {
    match target {
        BufferTarget::Array => glow::ARRAY_BUFFER,
        BufferTarget::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
    }
}

fn native_shader(id: ShaderId) -> glow::NativeShader {
    glow::NativeShader(id.0)
}

fn native_program(id: ProgramId) -> glow::NativeProgram {
    glow::NativeProgram(id.0)
}

fn native_buffer(id: BufferId) -> glow::NativeBuffer {
    glow::NativeBuffer(id.0)
}

fn native_texture(id: TextureId) -> glow::NativeTexture {
    glow::NativeTexture(id.0)
}

fn native_renderbuffer(id: RenderbufferId) -> glow::NativeRenderbuffer {
    glow::NativeRenderbuffer(id.0)
}

fn native_framebuffer(id: FramebufferId) -> glow::NativeFramebuffer {
    glow::NativeFramebuffer(id.0)
}

fn native_uniform(location: Option<UniformLocation>) -> Option<glow::NativeUniformLocation> {
    location.map(|l| glow::NativeUniformLocation(l.0))
}

impl GlApi for GlowGl {
    fn create_shader(&self, stage: ShaderStage) -> Option<ShaderId> {
        let ty = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe { self.gl.create_shader(ty) }.ok().map(|s| ShaderId(s.0))
    }

    fn shader_source(&self, shader: ShaderId, source: &str) {
        unsafe { self.gl.shader_source(native_shader(shader), source) }
    }

    fn compile_shader(&self, shader: ShaderId) {
        unsafe { self.gl.compile_shader(native_shader(shader)) }
    }

    fn shader_compile_status(&self, shader: ShaderId) -> bool {
        unsafe { self.gl.get_shader_compile_status(native_shader(shader)) }
    }

    fn shader_info_log(&self, shader: ShaderId) -> String {
        unsafe { self.gl.get_shader_info_log(native_shader(shader)) }
    }

    fn delete_shader(&self, shader: ShaderId) {
        unsafe { self.gl.delete_shader(native_shader(shader)) }
    }

    fn create_program(&self) -> Option<ProgramId> {
        unsafe { self.gl.create_program() }.ok().map(|p| ProgramId(p.0))
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) {
        unsafe {
            self.gl
                .attach_shader(native_program(program), native_shader(shader))
        }
    }

    fn link_program(&self, program: ProgramId) {
        unsafe { self.gl.link_program(native_program(program)) }
    }

    fn program_link_status(&self, program: ProgramId) -> bool {
        unsafe { self.gl.get_program_link_status(native_program(program)) }
    }

    fn program_info_log(&self, program: ProgramId) -> String {
        unsafe { self.gl.get_program_info_log(native_program(program)) }
    }

    fn delete_program(&self, program: ProgramId) {
        unsafe { self.gl.delete_program(native_program(program)) }
    }

    fn use_program(&self, program: Option<ProgramId>) {
        unsafe { self.gl.use_program(program.map(native_program)) }
    }

    fn current_program(&self) -> Option<ProgramId> {
        ProgramId::from_raw(self.parameter_u32(glow::CURRENT_PROGRAM))
    }

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        unsafe { self.gl.get_attrib_location(native_program(program), name) }
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        unsafe { self.gl.get_uniform_location(native_program(program), name) }
            .map(|l| UniformLocation(l.0))
    }

    fn uniform_1i(&self, location: Option<UniformLocation>, value: i32) {
        let location = native_uniform(location);
        unsafe { self.gl.uniform_1_i32(location.as_ref(), value) }
    }

    fn uniform_1f(&self, location: Option<UniformLocation>, value: f32) {
        let location = native_uniform(location);
        unsafe { self.gl.uniform_1_f32(location.as_ref(), value) }
    }

    fn create_buffer(&self) -> Option<BufferId> {
        unsafe { self.gl.create_buffer() }.ok().map(|b| BufferId(b.0))
    }

    fn delete_buffer(&self, buffer: BufferId) {
        unsafe { self.gl.delete_buffer(native_buffer(buffer)) }
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferId>) {
        unsafe {
            self.gl
                .bind_buffer(buffer_target(target), buffer.map(native_buffer))
        }
    }

    fn buffer_data(&self, target: BufferTarget, data: &[u8]) {
        unsafe {
            self.gl
                .buffer_data_u8_slice(buffer_target(target), data, glow::STATIC_DRAW)
        }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }

    fn disable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(index) }
    }

    fn vertex_attrib_pointer_f32(&self, index: u32, size: i32, stride: i32, offset: i32) {
        unsafe {
            self.gl
                .vertex_attrib_pointer_f32(index, size, glow::FLOAT, false, stride, offset)
        }
    }

    fn draw_triangles(&self, index_count: i32) {
        unsafe {
            self.gl
                .draw_elements(glow::TRIANGLES, index_count, glow::UNSIGNED_INT, 0)
        }
    }

    fn create_texture(&self) -> Option<TextureId> {
        unsafe { self.gl.create_texture() }.ok().map(|t| TextureId(t.0))
    }

    fn delete_texture(&self, texture: TextureId) {
        unsafe { self.gl.delete_texture(native_texture(texture)) }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture(&self, texture: Option<TextureId>) {
        unsafe {
            self.gl
                .bind_texture(glow::TEXTURE_2D, texture.map(native_texture))
        }
    }

    fn unpack_alignment(&self, alignment: i32) {
        unsafe { self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, alignment) }
    }

    fn tex_image_2d_rgba8(&self, width: i32, height: i32) {
        unsafe {
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(None),
            )
        }
    }

    fn tex_parameters_linear_clamp(&self) {
        unsafe {
            let gl = &self.gl;
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            let clamp = glow::CLAMP_TO_EDGE as i32;
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, clamp);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, clamp);
        }
    }

    fn copy_tex_sub_image_2d(&self, width: i32, height: i32) {
        unsafe {
            self.gl
                .copy_tex_sub_image_2d(glow::TEXTURE_2D, 0, 0, 0, 0, 0, width, height)
        }
    }

    fn create_renderbuffer(&self) -> Option<RenderbufferId> {
        unsafe { self.gl.create_renderbuffer() }
            .ok()
            .map(|r| RenderbufferId(r.0))
    }

    fn delete_renderbuffer(&self, renderbuffer: RenderbufferId) {
        unsafe { self.gl.delete_renderbuffer(native_renderbuffer(renderbuffer)) }
    }

    fn bind_renderbuffer(&self, renderbuffer: Option<RenderbufferId>) {
        unsafe {
            self.gl
                .bind_renderbuffer(glow::RENDERBUFFER, renderbuffer.map(native_renderbuffer))
        }
    }

    fn renderbuffer_binding(&self) -> Option<RenderbufferId> {
        RenderbufferId::from_raw(self.parameter_u32(glow::RENDERBUFFER_BINDING))
    }

    fn renderbuffer_storage_stencil8(&self, width: i32, height: i32) {
        unsafe {
            self.gl
                .renderbuffer_storage(glow::RENDERBUFFER, glow::STENCIL_INDEX8, width, height)
        }
    }

    fn create_framebuffer(&self) -> Option<FramebufferId> {
        unsafe { self.gl.create_framebuffer() }
            .ok()
            .map(|f| FramebufferId(f.0))
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        unsafe { self.gl.delete_framebuffer(native_framebuffer(framebuffer)) }
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>) {
        unsafe {
            self.gl
                .bind_framebuffer(glow::FRAMEBUFFER, framebuffer.map(native_framebuffer))
        }
    }

    fn framebuffer_binding(&self) -> Option<FramebufferId> {
        FramebufferId::from_raw(self.parameter_u32(glow::FRAMEBUFFER_BINDING))
    }

    fn framebuffer_color_texture(&self, texture: Option<TextureId>) {
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                texture.map(native_texture),
                0,
            )
        }
    }

    fn framebuffer_stencil_renderbuffer(&self, renderbuffer: Option<RenderbufferId>) {
        unsafe {
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::STENCIL_ATTACHMENT,
                glow::RENDERBUFFER,
                renderbuffer.map(native_renderbuffer),
            )
        }
    }

    fn framebuffer_complete(&self) -> bool {
        unsafe { self.gl.check_framebuffer_status(glow::FRAMEBUFFER) == glow::FRAMEBUFFER_COMPLETE }
    }

    fn blend_enabled(&self) -> bool {
        unsafe { self.gl.is_enabled(glow::BLEND) }
    }

    fn set_blend_enabled(&self, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(glow::BLEND);
            } else {
                self.gl.disable(glow::BLEND);
            }
        }
    }

    fn blend_func(&self) -> BlendFunc {
        BlendFunc {
            src_rgb: self.parameter_blend_factor(glow::BLEND_SRC_RGB),
            dst_rgb: self.parameter_blend_factor(glow::BLEND_DST_RGB),
            src_alpha: self.parameter_blend_factor(glow::BLEND_SRC_ALPHA),
            dst_alpha: self.parameter_blend_factor(glow::BLEND_DST_ALPHA),
        }
    }

    fn set_blend_func(&self, func: BlendFunc) {
        unsafe {
            self.gl.blend_func_separate(
                func.src_rgb.to_gl(),
                func.dst_rgb.to_gl(),
                func.src_alpha.to_gl(),
                func.dst_alpha.to_gl(),
            )
        }
    }

    fn color_mask_all(&self) {
        unsafe { self.gl.color_mask(true, true, true, true) }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn viewport_rect(&self) -> [i32; 4] {
        let mut rect = [0; 4];
        unsafe { self.gl.get_parameter_i32_slice(glow::VIEWPORT, &mut rect) };
        rect
    }

    fn clear_color_and_stencil(&self, rgba: [f32; 4]) {
        unsafe {
            self.gl.clear_color(rgba[0], rgba[1], rgba[2], rgba[3]);
            self.gl.clear(glow::COLOR_BUFFER_BIT | glow::STENCIL_BUFFER_BIT);
        }
    }

    fn flush(&self) {
        unsafe { self.gl.flush() }
    }

    fn read_pixels_rgba8(&self, width: i32, height: i32) -> Vec<u8> {
        let len = (width.max(0) as usize) * (height.max(0) as usize) * 4;
        let mut data = vec![0u8; len];
        unsafe {
            self.gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            self.gl.read_pixels(
                0,
                0,
                width,
                height,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelPackData::Slice(Some(&mut data)),
            );
            self.gl.pixel_store_i32(glow::PACK_ALIGNMENT, 4);
        }
        data
    }
}
