//! GPU program lifecycle: compile, link, draw a full-screen quad, release.

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::{
    error::{GlError, GlResult},
    gpu::{
        BufferId, BufferTarget, GlApi, ObjectKind, ProgramId, ShaderId, ShaderStage, SharedGl,
        TextureId, UniformLocation,
    },
    shaders::{INPUT_TEXTURE_UNIFORM, POSITION_ATTRIBUTE, TEXTURE_COORDINATE_ATTRIBUTE},
};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 2],
    texture_coordinate: [f32; 2],
}

const QUAD_VERTICES: [Vertex; 4] = [
    // top-left
    Vertex {
        position: [-1.0, 1.0],
        texture_coordinate: [0.0, 1.0],
    },
    // bottom-left
    Vertex {
        position: [-1.0, -1.0],
        texture_coordinate: [0.0, 0.0],
    },
    // bottom-right
    Vertex {
        position: [1.0, -1.0],
        texture_coordinate: [1.0, 0.0],
    },
    // top-right
    Vertex {
        position: [1.0, 1.0],
        texture_coordinate: [1.0, 1.0],
    },
];

const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

/// Number of indices drawn per quad (two triangles).
pub const QUAD_INDEX_COUNT: i32 = QUAD_INDICES.len() as i32;

const VERTEX_STRIDE: i32 = std::mem::size_of::<Vertex>() as i32;
const TEXTURE_COORDINATE_OFFSET: i32 = std::mem::size_of::<[f32; 2]>() as i32;

#[derive(Debug)]
struct ProgramObjects {
    program: ProgramId,
    vertex_shader: ShaderId,
    fragment_shader: ShaderId,
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    position_attribute: u32,
    texture_coordinate_attribute: u32,
    texture_uniform: Option<UniformLocation>,
}

impl ProgramObjects {
    fn release(self, gl: &dyn GlApi) {
        gl.delete_buffer(self.vertex_buffer);
        gl.delete_buffer(self.index_buffer);
        gl.delete_shader(self.vertex_shader);
        gl.delete_shader(self.fragment_shader);
        gl.delete_program(self.program);
    }
}

/// Objects created so far by an in-progress `init`; deleted on drop unless
/// taken by `finish`.
struct Staged<'a> {
    gl: &'a dyn GlApi,
    program: Option<ProgramId>,
    shaders: Vec<ShaderId>,
    buffers: Vec<BufferId>,
}

impl<'a> Staged<'a> {
    fn new(gl: &'a dyn GlApi) -> Self {
        Self {
            gl,
            program: None,
            shaders: Vec::new(),
            buffers: Vec::new(),
        }
    }

    fn finish(mut self) {
        self.program = None;
        self.shaders.clear();
        self.buffers.clear();
    }
}

impl Drop for Staged<'_> {
    fn drop(&mut self) {
        for buffer in self.buffers.drain(..) {
            self.gl.delete_buffer(buffer);
        }
        for shader in self.shaders.drain(..) {
            self.gl.delete_shader(shader);
        }
        if let Some(program) = self.program.take() {
            self.gl.delete_program(program);
        }
    }
}

fn compile_shader(
    gl: &dyn GlApi,
    stage: ShaderStage,
    source: &str,
    staged: &mut Staged<'_>,
) -> GlResult<ShaderId> {
    let shader = gl
        .create_shader(stage)
        .ok_or(GlError::ObjectCreation { kind: ObjectKind::Shader })?;
    staged.shaders.push(shader);

    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.shader_compile_status(shader) {
        let log = gl.shader_info_log(shader);
        debug!(
            "failed to compile {} shader: {}\n--- {} shader source ---\n{}\n--- end ---",
            stage.label(),
            log.trim(),
            stage.label(),
            source
        );
        return Err(GlError::ShaderCompile { stage, log });
    }
    Ok(shader)
}

/// A linked shader program plus the vertex/index buffers of a unit quad.
///
/// Shaders must declare `attribute vec4 position`,
/// `attribute vec2 inputTextureCoordinate` and
/// `uniform sampler2D inputImageTexture`. Any other uniform must be set by
/// the caller between [`use_program`](Self::use_program) and
/// [`render`](Self::render).
pub struct Program {
    gl: SharedGl,
    objects: Option<ProgramObjects>,
    vertex_source: String,
    fragment_source: String,
}

impl Program {
    pub fn new(gl: SharedGl) -> Self {
        Self {
            gl,
            objects: None,
            vertex_source: String::new(),
            fragment_source: String::new(),
        }
    }

    /// Compiles both stages, links them and resolves the interface locations.
    ///
    /// An already initialized program is finalized first. On failure every
    /// object created by this call is released and the program stays
    /// uninitialized.
    pub fn init(&mut self, vertex_source: &str, fragment_source: &str) -> GlResult<()> {
        self.finalize();

        let objects = Self::build(self.gl.as_ref(), vertex_source, fragment_source)?;
        self.objects = Some(objects);
        self.vertex_source = vertex_source.to_string();
        self.fragment_source = fragment_source.to_string();
        Ok(())
    }

    fn build(
        gl: &dyn GlApi,
        vertex_source: &str,
        fragment_source: &str,
    ) -> GlResult<ProgramObjects> {
        let mut staged = Staged::new(gl);

        let program = gl
            .create_program()
            .ok_or(GlError::ObjectCreation { kind: ObjectKind::Program })?;
        staged.program = Some(program);

        let vertex_shader = compile_shader(gl, ShaderStage::Vertex, vertex_source, &mut staged)?;
        let fragment_shader =
            compile_shader(gl, ShaderStage::Fragment, fragment_source, &mut staged)?;

        gl.attach_shader(program, vertex_shader);
        gl.attach_shader(program, fragment_shader);
        gl.link_program(program);
        if !gl.program_link_status(program) {
            let log = gl.program_info_log(program);
            debug!("failed to link program: {}", log.trim());
            return Err(GlError::ProgramLink { log });
        }

        // Locations are resolved with the new program current; the caller's
        // program is restored afterwards.
        let previous_program = gl.current_program();
        gl.use_program(Some(program));
        let position_attribute = gl.attrib_location(program, POSITION_ATTRIBUTE);
        let texture_coordinate_attribute =
            gl.attrib_location(program, TEXTURE_COORDINATE_ATTRIBUTE);
        let texture_uniform = gl.uniform_location(program, INPUT_TEXTURE_UNIFORM);
        gl.use_program(previous_program);

        let (Some(position_attribute), Some(texture_coordinate_attribute)) =
            (position_attribute, texture_coordinate_attribute)
        else {
            let log = format!(
                "vertex shader must declare `{POSITION_ATTRIBUTE}` and `{TEXTURE_COORDINATE_ATTRIBUTE}`"
            );
            debug!("failed to resolve program attributes: {log}");
            return Err(GlError::ProgramLink { log });
        };

        let vertex_buffer = gl
            .create_buffer()
            .ok_or(GlError::ObjectCreation { kind: ObjectKind::Buffer })?;
        staged.buffers.push(vertex_buffer);
        let index_buffer = gl
            .create_buffer()
            .ok_or(GlError::ObjectCreation { kind: ObjectKind::Buffer })?;
        staged.buffers.push(index_buffer);

        // Upload the quad once; `use_program` re-binds it for every draw.
        gl.bind_buffer(BufferTarget::Array, Some(vertex_buffer));
        gl.buffer_data(BufferTarget::Array, bytemuck::cast_slice(&QUAD_VERTICES));
        gl.bind_buffer(BufferTarget::ElementArray, Some(index_buffer));
        gl.buffer_data(BufferTarget::ElementArray, bytemuck::cast_slice(&QUAD_INDICES));
        gl.bind_buffer(BufferTarget::Array, None);
        gl.bind_buffer(BufferTarget::ElementArray, None);

        staged.finish();
        Ok(ProgramObjects {
            program,
            vertex_shader,
            fragment_shader,
            vertex_buffer,
            index_buffer,
            position_attribute,
            texture_coordinate_attribute,
            texture_uniform,
        })
    }

    /// Releases every GPU object and returns to the uninitialized state.
    pub fn finalize(&mut self) {
        if let Some(objects) = self.objects.take() {
            objects.release(self.gl.as_ref());
        }
        self.vertex_source.clear();
        self.fragment_source.clear();
    }

    pub fn is_initialized(&self) -> bool {
        self.objects.is_some()
    }

    pub fn id(&self) -> Option<ProgramId> {
        self.objects.as_ref().map(|o| o.program)
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        let program = self.id()?;
        self.gl.uniform_location(program, name)
    }

    /// Sets a float uniform on this program. The program must be in use.
    pub fn set_uniform_f32(&self, name: &str, value: f32) {
        if self.objects.is_some() {
            self.gl.uniform_1f(self.uniform_location(name), value);
        }
    }

    /// Activates the program and the quad's vertex state.
    ///
    /// Enables blending and full color writes. Must precede [`render`](Self::render).
    pub fn use_program(&self) {
        let Some(objects) = &self.objects else {
            return;
        };
        let gl = self.gl.as_ref();
        gl.use_program(Some(objects.program));
        gl.color_mask_all();
        gl.set_blend_enabled(true);

        gl.bind_buffer(BufferTarget::Array, Some(objects.vertex_buffer));
        gl.buffer_data(BufferTarget::Array, bytemuck::cast_slice(&QUAD_VERTICES));

        gl.enable_vertex_attrib_array(objects.position_attribute);
        gl.vertex_attrib_pointer_f32(objects.position_attribute, 2, VERTEX_STRIDE, 0);

        gl.enable_vertex_attrib_array(objects.texture_coordinate_attribute);
        gl.vertex_attrib_pointer_f32(
            objects.texture_coordinate_attribute,
            2,
            VERTEX_STRIDE,
            TEXTURE_COORDINATE_OFFSET,
        );

        gl.bind_buffer(BufferTarget::ElementArray, Some(objects.index_buffer));
        gl.buffer_data(BufferTarget::ElementArray, bytemuck::cast_slice(&QUAD_INDICES));
    }

    /// Draws `input_texture` through the program into the bound target.
    ///
    /// Leaves no program, buffer, texture or vertex attribute bound, and
    /// flushes the command stream.
    pub fn render(&self, input_texture: TextureId) {
        let Some(objects) = &self.objects else {
            return;
        };
        let gl = self.gl.as_ref();
        gl.active_texture(0);
        gl.bind_texture(Some(input_texture));
        gl.uniform_1i(objects.texture_uniform, 0);

        gl.draw_triangles(QUAD_INDEX_COUNT);

        gl.disable_vertex_attrib_array(objects.position_attribute);
        gl.disable_vertex_attrib_array(objects.texture_coordinate_attribute);
        gl.bind_buffer(BufferTarget::Array, None);
        gl.bind_buffer(BufferTarget::ElementArray, None);
        gl.use_program(None);
        gl.bind_texture(None);
        gl.flush();
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("objects", &self.objects)
            .finish_non_exhaustive()
    }
}
