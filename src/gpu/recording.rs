//! Headless [`GlApi`] implementation.
//!
//! `RecordingGl` keeps the binding state a real context would, hands out
//! unique non-zero names, and records every draw together with the state it
//! was issued under. Fault switches make object creation, shader compilation,
//! program linking or framebuffer completeness fail on demand.

use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, BTreeSet, HashMap},
};

use super::{
    BlendFunc, BufferId, BufferTarget, FramebufferId, GlApi, ProgramId, RenderbufferId, ShaderId,
    ShaderStage, TextureId, UniformLocation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Shader,
    Program,
    Buffer,
    Texture,
    Renderbuffer,
    Framebuffer,
}

/// One `draw_triangles` call and the state it observed.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: Option<ProgramId>,
    /// Texture bound to unit 0.
    pub texture: Option<TextureId>,
    /// Render target; `None` is the default framebuffer.
    pub framebuffer: Option<FramebufferId>,
    pub blend_enabled: bool,
    pub blend_func: BlendFunc,
    pub index_count: i32,
    pub enabled_attributes: Vec<u32>,
    /// Float uniforms of the active program, by name.
    pub float_uniforms: BTreeMap<String, f32>,
    pub sampler_unit: Option<i32>,
}

#[derive(Debug, Default)]
struct ShaderObject {
    stage: Option<ShaderStage>,
    source: String,
    compiled: bool,
}

#[derive(Debug, Default)]
struct ProgramObject {
    shaders: Vec<ShaderId>,
    linked: bool,
    attributes: BTreeMap<String, u32>,
    uniforms: BTreeMap<String, u32>,
    float_values: BTreeMap<u32, f32>,
    int_values: BTreeMap<u32, i32>,
}

#[derive(Debug, Default)]
struct TextureObject {
    width: i32,
    height: i32,
    pixels: Vec<u8>,
}

#[derive(Debug, Default)]
struct FramebufferObject {
    color: Option<TextureId>,
    stencil: Option<RenderbufferId>,
}

#[derive(Debug, Default)]
struct State {
    next_name: u32,
    live: BTreeMap<ObjectKind, BTreeSet<u32>>,
    created: BTreeMap<ObjectKind, usize>,
    deleted: BTreeMap<ObjectKind, usize>,

    shaders: HashMap<ShaderId, ShaderObject>,
    programs: HashMap<ProgramId, ProgramObject>,
    textures: HashMap<TextureId, TextureObject>,
    renderbuffer_sizes: HashMap<RenderbufferId, (i32, i32)>,
    framebuffers: HashMap<FramebufferId, FramebufferObject>,
    buffer_sizes: HashMap<BufferId, usize>,

    current_program: Option<ProgramId>,
    array_buffer: Option<BufferId>,
    element_buffer: Option<BufferId>,
    active_unit: u32,
    unit_textures: BTreeMap<u32, TextureId>,
    renderbuffer: Option<RenderbufferId>,
    framebuffer: Option<FramebufferId>,
    enabled_attributes: BTreeSet<u32>,
    unpack_alignment: i32,
    blend_enabled: bool,
    blend_func: BlendFunc,
    color_mask_calls: usize,
    viewport: [i32; 4],
    flushes: usize,

    draws: Vec<DrawCall>,
    copies: Vec<(Option<FramebufferId>, Option<TextureId>)>,
}

impl State {
    fn allocate(&mut self, kind: ObjectKind) -> u32 {
        self.next_name += 1;
        let name = self.next_name;
        self.live.entry(kind).or_default().insert(name);
        *self.created.entry(kind).or_default() += 1;
        name
    }

    fn release(&mut self, kind: ObjectKind, name: u32) {
        if self.live.entry(kind).or_default().remove(&name) {
            *self.deleted.entry(kind).or_default() += 1;
        }
    }

    fn bound_texture(&self) -> Option<TextureId> {
        self.unit_textures.get(&self.active_unit).copied()
    }
}

/// In-memory graphics context for headless runs and tests.
#[derive(Debug)]
pub struct RecordingGl {
    state: RefCell<State>,
    fail_completeness: Cell<bool>,
    fail_compile: Cell<Option<ShaderStage>>,
    fail_link: Cell<bool>,
    fail_creation: Cell<Option<ObjectKind>>,
}

impl Default for RecordingGl {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingGl {
    pub fn new() -> Self {
        let state = State {
            unpack_alignment: 4,
            ..State::default()
        };
        Self {
            state: RefCell::new(state),
            fail_completeness: Cell::new(false),
            fail_compile: Cell::new(None),
            fail_link: Cell::new(false),
            fail_creation: Cell::new(None),
        }
    }

    pub fn fail_framebuffer_completeness(&self, fail: bool) {
        self.fail_completeness.set(fail);
    }

    pub fn fail_shader_compile(&self, stage: Option<ShaderStage>) {
        self.fail_compile.set(stage);
    }

    pub fn fail_link(&self, fail: bool) {
        self.fail_link.set(fail);
    }

    pub fn fail_object_creation(&self, kind: Option<ObjectKind>) {
        self.fail_creation.set(kind);
    }

    /// Creates a texture holding `rgba` (tightly packed RGBA8 rows) without
    /// disturbing the current texture binding.
    pub fn upload_texture(&self, width: i32, height: i32, rgba: &[u8]) -> Option<TextureId> {
        let mut state = self.state.borrow_mut();
        let name = state.allocate(ObjectKind::Texture);
        let id = TextureId::from_raw(name)?;
        state.textures.insert(
            id,
            TextureObject {
                width,
                height,
                pixels: rgba.to_vec(),
            },
        );
        Some(id)
    }

    /// Replaces the contents of a live texture, rows bottom-up as GL stores
    /// them. Returns false for unknown textures or a length mismatch.
    pub fn write_texture(&self, texture: TextureId, rgba: &[u8]) -> bool {
        let mut state = self.state.borrow_mut();
        match state.textures.get_mut(&texture) {
            Some(object) if object.pixels.len() == rgba.len() => {
                object.pixels.copy_from_slice(rgba);
                true
            }
            _ => false,
        }
    }

    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.state.borrow().live.get(&kind).map_or(0, BTreeSet::len)
    }

    pub fn total_live(&self) -> usize {
        self.state.borrow().live.values().map(BTreeSet::len).sum()
    }

    pub fn created_count(&self, kind: ObjectKind) -> usize {
        self.state.borrow().created.get(&kind).copied().unwrap_or(0)
    }

    pub fn deleted_count(&self, kind: ObjectKind) -> usize {
        self.state.borrow().deleted.get(&kind).copied().unwrap_or(0)
    }

    pub fn is_live(&self, kind: ObjectKind, name: u32) -> bool {
        self.state
            .borrow()
            .live
            .get(&kind)
            .is_some_and(|set| set.contains(&name))
    }

    pub fn draws(&self) -> Vec<DrawCall> {
        self.state.borrow().draws.clone()
    }

    pub fn clear_draws(&self) {
        let mut state = self.state.borrow_mut();
        state.draws.clear();
        state.copies.clear();
    }

    /// `(read framebuffer, destination texture)` for every copy issued.
    pub fn copies(&self) -> Vec<(Option<FramebufferId>, Option<TextureId>)> {
        self.state.borrow().copies.clone()
    }

    /// Sources attached to `program`, vertex stage first.
    pub fn program_sources(&self, program: ProgramId) -> Vec<String> {
        let state = self.state.borrow();
        let Some(object) = state.programs.get(&program) else {
            return Vec::new();
        };
        let mut sources: Vec<(bool, String)> = object
            .shaders
            .iter()
            .filter_map(|id| state.shaders.get(id))
            .map(|s| (s.stage != Some(ShaderStage::Vertex), s.source.clone()))
            .collect();
        sources.sort_by_key(|(is_fragment, _)| *is_fragment);
        sources.into_iter().map(|(_, s)| s).collect()
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<(i32, i32)> {
        self.state
            .borrow()
            .textures
            .get(&texture)
            .map(|t| (t.width, t.height))
    }

    pub fn framebuffer_attachments(
        &self,
        framebuffer: FramebufferId,
    ) -> Option<(Option<TextureId>, Option<RenderbufferId>)> {
        self.state
            .borrow()
            .framebuffers
            .get(&framebuffer)
            .map(|f| (f.color, f.stencil))
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferId> {
        self.state.borrow().framebuffer
    }

    pub fn bound_renderbuffer(&self) -> Option<RenderbufferId> {
        self.state.borrow().renderbuffer
    }

    pub fn bound_program(&self) -> Option<ProgramId> {
        self.state.borrow().current_program
    }

    pub fn bound_texture(&self) -> Option<TextureId> {
        self.state.borrow().bound_texture()
    }

    pub fn bound_buffers(&self) -> (Option<BufferId>, Option<BufferId>) {
        let state = self.state.borrow();
        (state.array_buffer, state.element_buffer)
    }

    pub fn enabled_attributes(&self) -> Vec<u32> {
        self.state
            .borrow()
            .enabled_attributes
            .iter()
            .copied()
            .collect()
    }

    pub fn current_unpack_alignment(&self) -> i32 {
        self.state.borrow().unpack_alignment
    }

    pub fn flush_count(&self) -> usize {
        self.state.borrow().flushes
    }

    pub fn color_mask_calls(&self) -> usize {
        self.state.borrow().color_mask_calls
    }

    fn creation_blocked(&self, kind: ObjectKind) -> bool {
        self.fail_creation.get() == Some(kind)
    }

    fn source_declares(source: &str, name: &str) -> bool {
        source
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .any(|token| token == name)
    }
}

impl GlApi for RecordingGl {
    fn create_shader(&self, stage: ShaderStage) -> Option<ShaderId> {
        if self.creation_blocked(ObjectKind::Shader) {
            return None;
        }
        let mut state = self.state.borrow_mut();
        let id = ShaderId::from_raw(state.allocate(ObjectKind::Shader))?;
        state.shaders.insert(
            id,
            ShaderObject {
                stage: Some(stage),
                ..ShaderObject::default()
            },
        );
        Some(id)
    }

    fn shader_source(&self, shader: ShaderId, source: &str) {
        if let Some(object) = self.state.borrow_mut().shaders.get_mut(&shader) {
            object.source = source.to_string();
        }
    }

    fn compile_shader(&self, shader: ShaderId) {
        let forced_failure = self.fail_compile.get();
        if let Some(object) = self.state.borrow_mut().shaders.get_mut(&shader) {
            object.compiled = forced_failure != object.stage
                && Self::source_declares(&object.source, "main");
        }
    }

    fn shader_compile_status(&self, shader: ShaderId) -> bool {
        self.state
            .borrow()
            .shaders
            .get(&shader)
            .is_some_and(|s| s.compiled)
    }

    fn shader_info_log(&self, shader: ShaderId) -> String {
        if self.shader_compile_status(shader) {
            String::new()
        } else {
            "ERROR: 0:1: compilation failed".to_string()
        }
    }

    fn delete_shader(&self, shader: ShaderId) {
        let mut state = self.state.borrow_mut();
        state.shaders.remove(&shader);
        state.release(ObjectKind::Shader, shader.raw());
    }

    fn create_program(&self) -> Option<ProgramId> {
        if self.creation_blocked(ObjectKind::Program) {
            return None;
        }
        let mut state = self.state.borrow_mut();
        let id = ProgramId::from_raw(state.allocate(ObjectKind::Program))?;
        state.programs.insert(id, ProgramObject::default());
        Some(id)
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) {
        if let Some(object) = self.state.borrow_mut().programs.get_mut(&program) {
            object.shaders.push(shader);
        }
    }

    fn link_program(&self, program: ProgramId) {
        let forced_failure = self.fail_link.get();
        let mut state = self.state.borrow_mut();
        let stages: Vec<(Option<ShaderStage>, bool)> = match state.programs.get(&program) {
            Some(object) => object
                .shaders
                .iter()
                .filter_map(|id| state.shaders.get(id))
                .map(|s| (s.stage, s.compiled))
                .collect(),
            None => return,
        };
        let has = |stage| stages.iter().any(|(s, ok)| *s == Some(stage) && *ok);
        let linked =
            !forced_failure && has(ShaderStage::Vertex) && has(ShaderStage::Fragment);
        if let Some(object) = state.programs.get_mut(&program) {
            object.linked = linked;
        }
    }

    fn program_link_status(&self, program: ProgramId) -> bool {
        self.state
            .borrow()
            .programs
            .get(&program)
            .is_some_and(|p| p.linked)
    }

    fn program_info_log(&self, program: ProgramId) -> String {
        if self.program_link_status(program) {
            String::new()
        } else {
            "ERROR: link failed".to_string()
        }
    }

    fn delete_program(&self, program: ProgramId) {
        let mut state = self.state.borrow_mut();
        state.programs.remove(&program);
        if state.current_program == Some(program) {
            state.current_program = None;
        }
        state.release(ObjectKind::Program, program.raw());
    }

    fn use_program(&self, program: Option<ProgramId>) {
        self.state.borrow_mut().current_program = program;
    }

    fn current_program(&self) -> Option<ProgramId> {
        self.state.borrow().current_program
    }

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let object = state.programs.get_mut(&program)?;
        if !object.linked {
            return None;
        }
        if let Some(location) = object.attributes.get(name) {
            return Some(*location);
        }
        let declared = object.shaders.iter().any(|id| {
            state.shaders.get(id).is_some_and(|s| {
                s.stage == Some(ShaderStage::Vertex) && Self::source_declares(&s.source, name)
            })
        });
        if !declared {
            return None;
        }
        let location = object.attributes.len() as u32;
        object.attributes.insert(name.to_string(), location);
        Some(location)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        let object = state.programs.get_mut(&program)?;
        if !object.linked {
            return None;
        }
        if let Some(location) = object.uniforms.get(name) {
            return Some(UniformLocation(*location));
        }
        let declared = object.shaders.iter().any(|id| {
            state
                .shaders
                .get(id)
                .is_some_and(|s| Self::source_declares(&s.source, name))
        });
        if !declared {
            return None;
        }
        let location = object.uniforms.len() as u32;
        object.uniforms.insert(name.to_string(), location);
        Some(UniformLocation(location))
    }

    fn uniform_1i(&self, location: Option<UniformLocation>, value: i32) {
        let mut state = self.state.borrow_mut();
        let (Some(location), Some(program)) = (location, state.current_program) else {
            return;
        };
        if let Some(object) = state.programs.get_mut(&program) {
            object.int_values.insert(location.0, value);
        }
    }

    fn uniform_1f(&self, location: Option<UniformLocation>, value: f32) {
        let mut state = self.state.borrow_mut();
        let (Some(location), Some(program)) = (location, state.current_program) else {
            return;
        };
        if let Some(object) = state.programs.get_mut(&program) {
            object.float_values.insert(location.0, value);
        }
    }

    fn create_buffer(&self) -> Option<BufferId> {
        if self.creation_blocked(ObjectKind::Buffer) {
            return None;
        }
        let mut state = self.state.borrow_mut();
        BufferId::from_raw(state.allocate(ObjectKind::Buffer))
    }

    fn delete_buffer(&self, buffer: BufferId) {
        let mut state = self.state.borrow_mut();
        state.buffer_sizes.remove(&buffer);
        if state.array_buffer == Some(buffer) {
            state.array_buffer = None;
        }
        if state.element_buffer == Some(buffer) {
            state.element_buffer = None;
        }
        state.release(ObjectKind::Buffer, buffer.raw());
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferId>) {
        let mut state = self.state.borrow_mut();
        match target {
            BufferTarget::Array => state.array_buffer = buffer,
            BufferTarget::ElementArray => state.element_buffer = buffer,
        }
    }

    fn buffer_data(&self, target: BufferTarget, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        let bound = match target {
            BufferTarget::Array => state.array_buffer,
            BufferTarget::ElementArray => state.element_buffer,
        };
        if let Some(buffer) = bound {
            state.buffer_sizes.insert(buffer, data.len());
        }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        self.state.borrow_mut().enabled_attributes.insert(index);
    }

    fn disable_vertex_attrib_array(&self, index: u32) {
        self.state.borrow_mut().enabled_attributes.remove(&index);
    }

    fn vertex_attrib_pointer_f32(&self, _index: u32, _size: i32, _stride: i32, _offset: i32) {}

    fn draw_triangles(&self, index_count: i32) {
        let mut state = self.state.borrow_mut();
        let (float_uniforms, sampler_unit) = match state
            .current_program
            .and_then(|p| state.programs.get(&p))
        {
            Some(object) => {
                let floats = object
                    .uniforms
                    .iter()
                    .filter_map(|(name, loc)| {
                        object.float_values.get(loc).map(|v| (name.clone(), *v))
                    })
                    .collect();
                let sampler = object
                    .uniforms
                    .get("inputImageTexture")
                    .and_then(|loc| object.int_values.get(loc))
                    .copied();
                (floats, sampler)
            }
            None => (BTreeMap::new(), None),
        };
        let call = DrawCall {
            program: state.current_program,
            texture: state.unit_textures.get(&0).copied(),
            framebuffer: state.framebuffer,
            blend_enabled: state.blend_enabled,
            blend_func: state.blend_func,
            index_count,
            enabled_attributes: state.enabled_attributes.iter().copied().collect(),
            float_uniforms,
            sampler_unit,
        };
        state.draws.push(call);
    }

    fn create_texture(&self) -> Option<TextureId> {
        if self.creation_blocked(ObjectKind::Texture) {
            return None;
        }
        let mut state = self.state.borrow_mut();
        let id = TextureId::from_raw(state.allocate(ObjectKind::Texture))?;
        state.textures.insert(id, TextureObject::default());
        Some(id)
    }

    fn delete_texture(&self, texture: TextureId) {
        let mut state = self.state.borrow_mut();
        state.textures.remove(&texture);
        state.unit_textures.retain(|_, bound| *bound != texture);
        state.release(ObjectKind::Texture, texture.raw());
    }

    fn active_texture(&self, unit: u32) {
        self.state.borrow_mut().active_unit = unit;
    }

    fn bind_texture(&self, texture: Option<TextureId>) {
        let mut state = self.state.borrow_mut();
        let unit = state.active_unit;
        match texture {
            Some(texture) => {
                state.unit_textures.insert(unit, texture);
            }
            None => {
                state.unit_textures.remove(&unit);
            }
        }
    }

    fn unpack_alignment(&self, alignment: i32) {
        self.state.borrow_mut().unpack_alignment = alignment;
    }

    fn tex_image_2d_rgba8(&self, width: i32, height: i32) {
        let mut state = self.state.borrow_mut();
        let Some(bound) = state.bound_texture() else {
            return;
        };
        if let Some(texture) = state.textures.get_mut(&bound) {
            texture.width = width;
            texture.height = height;
            texture.pixels = vec![0; (width.max(0) * height.max(0) * 4) as usize];
        }
    }

    fn tex_parameters_linear_clamp(&self) {}

    fn copy_tex_sub_image_2d(&self, width: i32, height: i32) {
        let mut state = self.state.borrow_mut();
        let read = state.framebuffer;
        let destination = state.bound_texture();
        state.copies.push((read, destination));

        let source = read
            .and_then(|fb| state.framebuffers.get(&fb))
            .and_then(|fb| fb.color)
            .and_then(|color| state.textures.get(&color))
            .map(|t| (t.width, t.pixels.clone()));
        let (Some((source_width, pixels)), Some(destination)) = (source, destination) else {
            return;
        };
        let Some(target) = state.textures.get_mut(&destination) else {
            return;
        };
        let rows = height.min(target.height).max(0) as usize;
        let cols = width.min(target.width).min(source_width).max(0) as usize;
        for row in 0..rows {
            let src = row * source_width as usize * 4;
            let dst = row * target.width as usize * 4;
            if src + cols * 4 <= pixels.len() && dst + cols * 4 <= target.pixels.len() {
                target.pixels[dst..dst + cols * 4].copy_from_slice(&pixels[src..src + cols * 4]);
            }
        }
    }

    fn create_renderbuffer(&self) -> Option<RenderbufferId> {
        if self.creation_blocked(ObjectKind::Renderbuffer) {
            return None;
        }
        let mut state = self.state.borrow_mut();
        RenderbufferId::from_raw(state.allocate(ObjectKind::Renderbuffer))
    }

    fn delete_renderbuffer(&self, renderbuffer: RenderbufferId) {
        let mut state = self.state.borrow_mut();
        state.renderbuffer_sizes.remove(&renderbuffer);
        if state.renderbuffer == Some(renderbuffer) {
            state.renderbuffer = None;
        }
        state.release(ObjectKind::Renderbuffer, renderbuffer.raw());
    }

    fn bind_renderbuffer(&self, renderbuffer: Option<RenderbufferId>) {
        self.state.borrow_mut().renderbuffer = renderbuffer;
    }

    fn renderbuffer_binding(&self) -> Option<RenderbufferId> {
        self.state.borrow().renderbuffer
    }

    fn renderbuffer_storage_stencil8(&self, width: i32, height: i32) {
        let mut state = self.state.borrow_mut();
        if let Some(bound) = state.renderbuffer {
            state.renderbuffer_sizes.insert(bound, (width, height));
        }
    }

    fn create_framebuffer(&self) -> Option<FramebufferId> {
        if self.creation_blocked(ObjectKind::Framebuffer) {
            return None;
        }
        let mut state = self.state.borrow_mut();
        let id = FramebufferId::from_raw(state.allocate(ObjectKind::Framebuffer))?;
        state.framebuffers.insert(id, FramebufferObject::default());
        Some(id)
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        let mut state = self.state.borrow_mut();
        state.framebuffers.remove(&framebuffer);
        // Deleting the bound framebuffer reverts the binding to the default one.
        if state.framebuffer == Some(framebuffer) {
            state.framebuffer = None;
        }
        state.release(ObjectKind::Framebuffer, framebuffer.raw());
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>) {
        self.state.borrow_mut().framebuffer = framebuffer;
    }

    fn framebuffer_binding(&self) -> Option<FramebufferId> {
        self.state.borrow().framebuffer
    }

    fn framebuffer_color_texture(&self, texture: Option<TextureId>) {
        let mut state = self.state.borrow_mut();
        if let Some(bound) = state.framebuffer
            && let Some(object) = state.framebuffers.get_mut(&bound)
        {
            object.color = texture;
        }
    }

    fn framebuffer_stencil_renderbuffer(&self, renderbuffer: Option<RenderbufferId>) {
        let mut state = self.state.borrow_mut();
        if let Some(bound) = state.framebuffer
            && let Some(object) = state.framebuffers.get_mut(&bound)
        {
            object.stencil = renderbuffer;
        }
    }

    fn framebuffer_complete(&self) -> bool {
        if self.fail_completeness.get() {
            return false;
        }
        let state = self.state.borrow();
        let Some(object) = state.framebuffer.and_then(|fb| state.framebuffers.get(&fb)) else {
            // The default framebuffer is always complete.
            return true;
        };
        let color_size = object
            .color
            .and_then(|t| state.textures.get(&t))
            .map(|t| (t.width, t.height));
        let stencil_size = object
            .stencil
            .and_then(|r| state.renderbuffer_sizes.get(&r))
            .copied();
        match (color_size, stencil_size) {
            (Some((w, h)), Some(stencil)) => w > 0 && h > 0 && stencil == (w, h),
            (Some((w, h)), None) => w > 0 && h > 0,
            _ => false,
        }
    }

    fn blend_enabled(&self) -> bool {
        self.state.borrow().blend_enabled
    }

    fn set_blend_enabled(&self, enabled: bool) {
        self.state.borrow_mut().blend_enabled = enabled;
    }

    fn blend_func(&self) -> BlendFunc {
        self.state.borrow().blend_func
    }

    fn set_blend_func(&self, func: BlendFunc) {
        self.state.borrow_mut().blend_func = func;
    }

    fn color_mask_all(&self) {
        self.state.borrow_mut().color_mask_calls += 1;
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.state.borrow_mut().viewport = [x, y, width, height];
    }

    fn viewport_rect(&self) -> [i32; 4] {
        self.state.borrow().viewport
    }

    fn clear_color_and_stencil(&self, rgba: [f32; 4]) {
        let mut state = self.state.borrow_mut();
        let Some(color) = state
            .framebuffer
            .and_then(|fb| state.framebuffers.get(&fb))
            .and_then(|fb| fb.color)
        else {
            return;
        };
        let texel = rgba.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        if let Some(texture) = state.textures.get_mut(&color) {
            for pixel in texture.pixels.chunks_exact_mut(4) {
                pixel.copy_from_slice(&texel);
            }
        }
    }

    fn flush(&self) {
        self.state.borrow_mut().flushes += 1;
    }

    fn read_pixels_rgba8(&self, width: i32, height: i32) -> Vec<u8> {
        let state = self.state.borrow();
        let len = (width.max(0) * height.max(0) * 4) as usize;
        let source = state
            .framebuffer
            .and_then(|fb| state.framebuffers.get(&fb))
            .and_then(|fb| fb.color)
            .and_then(|color| state.textures.get(&color));
        let Some(texture) = source else {
            return vec![0; len];
        };
        let mut out = Vec::with_capacity(len);
        for row in 0..height.max(0) {
            for col in 0..width.max(0) {
                let index = ((row * texture.width + col) * 4) as usize;
                match texture.pixels.get(index..index + 4) {
                    Some(px) if col < texture.width => out.extend_from_slice(px),
                    _ => out.extend_from_slice(&[0; 4]),
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_tracked() {
        let gl = RecordingGl::new();
        let a = gl.create_texture().unwrap();
        let b = gl.create_texture().unwrap();
        assert_ne!(a, b);
        assert_eq!(gl.live_count(ObjectKind::Texture), 2);
        gl.delete_texture(a);
        assert_eq!(gl.live_count(ObjectKind::Texture), 1);
        assert_eq!(gl.deleted_count(ObjectKind::Texture), 1);
        // Double delete is a no-op, as in GL.
        gl.delete_texture(a);
        assert_eq!(gl.deleted_count(ObjectKind::Texture), 1);
    }

    #[test]
    fn link_requires_both_compiled_stages() {
        let gl = RecordingGl::new();
        let program = gl.create_program().unwrap();
        let vs = gl.create_shader(ShaderStage::Vertex).unwrap();
        gl.shader_source(vs, "attribute vec4 position; void main() {}");
        gl.compile_shader(vs);
        assert!(gl.shader_compile_status(vs));
        gl.attach_shader(program, vs);
        gl.link_program(program);
        assert!(!gl.program_link_status(program));

        let fs = gl.create_shader(ShaderStage::Fragment).unwrap();
        gl.shader_source(fs, "void main() {}");
        gl.compile_shader(fs);
        gl.attach_shader(program, fs);
        gl.link_program(program);
        assert!(gl.program_link_status(program));
        assert_eq!(gl.attrib_location(program, "position"), Some(0));
        assert_eq!(gl.attrib_location(program, "missing"), None);
    }

    #[test]
    fn completeness_follows_attachments_and_fault_switch() {
        let gl = RecordingGl::new();
        let fb = gl.create_framebuffer().unwrap();
        gl.bind_framebuffer(Some(fb));
        assert!(!gl.framebuffer_complete());

        let tex = gl.create_texture().unwrap();
        gl.bind_texture(Some(tex));
        gl.tex_image_2d_rgba8(4, 4);
        gl.framebuffer_color_texture(Some(tex));
        assert!(gl.framebuffer_complete());

        gl.fail_framebuffer_completeness(true);
        assert!(!gl.framebuffer_complete());
    }

    #[test]
    fn clear_fills_the_color_attachment() {
        let gl = RecordingGl::new();
        let fb = gl.create_framebuffer().unwrap();
        let tex = gl.create_texture().unwrap();
        gl.bind_texture(Some(tex));
        gl.tex_image_2d_rgba8(2, 1);
        gl.bind_framebuffer(Some(fb));
        gl.framebuffer_color_texture(Some(tex));
        gl.clear_color_and_stencil([1.0, 0.0, 0.0, 1.0]);
        assert_eq!(gl.read_pixels_rgba8(2, 1), vec![255, 0, 0, 255, 255, 0, 0, 255]);
    }
}
