//! Filter orchestration.
//!
//! A [`Filter`] owns one [`Program`] and one intermediate [`Framebuffer`] and
//! keeps both valid for the requested output size and the stage's current
//! configuration. What actually gets drawn is up to its [`FilterStage`].

use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::{
    error::GlResult,
    framebuffer::Framebuffer,
    gpu::{SharedGl, TextureId},
    program::Program,
    shaders::{PASS_THROUGH_VERTEX_SHADER, ShaderDialect, pass_through_fragment_shader},
};

mod pass_through;

pub use pass_through::PassThrough;

/// The pluggable half of a filter: shader sources, uniforms and the passes
/// that draw with them.
pub trait FilterStage {
    /// Vertex shader source. Empty means "no effect": the filter falls back
    /// to the pass-through pair.
    fn vertex_shader(&self) -> String;

    /// Fragment shader source. Empty means "no effect", as for
    /// [`vertex_shader`](Self::vertex_shader).
    fn fragment_shader(&self) -> String;

    /// Pushes stage-specific uniforms. Called with `program` in use.
    fn set_uniforms(&self, _program: &Program) {}

    /// True when configuration affecting the shader sources changed since
    /// the last successful build.
    fn should_update_shaders(&self) -> bool {
        false
    }

    /// Called after the program was rebuilt from this stage's sources.
    fn shaders_updated(&mut self) {}

    fn device_pixel_ratio(&self) -> f32;

    fn set_device_pixel_ratio(&mut self, ratio: f32);

    fn dialect(&self) -> ShaderDialect {
        ShaderDialect::default()
    }

    /// Draws `input_texture` through `program`.
    ///
    /// The default is a single pass straight into the caller's bound target;
    /// `framebuffer` is available to stages that need an intermediate.
    fn apply_filter_to_framebuffer(
        &mut self,
        input_texture: TextureId,
        program: &Program,
        _framebuffer: &mut Framebuffer,
    ) -> GlResult<()> {
        apply_single_pass(self, input_texture, program);
        Ok(())
    }
}

impl<S: FilterStage + ?Sized> FilterStage for Box<S> {
    fn vertex_shader(&self) -> String {
        (**self).vertex_shader()
    }

    fn fragment_shader(&self) -> String {
        (**self).fragment_shader()
    }

    fn set_uniforms(&self, program: &Program) {
        (**self).set_uniforms(program)
    }

    fn should_update_shaders(&self) -> bool {
        (**self).should_update_shaders()
    }

    fn shaders_updated(&mut self) {
        (**self).shaders_updated()
    }

    fn device_pixel_ratio(&self) -> f32 {
        (**self).device_pixel_ratio()
    }

    fn set_device_pixel_ratio(&mut self, ratio: f32) {
        (**self).set_device_pixel_ratio(ratio)
    }

    fn dialect(&self) -> ShaderDialect {
        (**self).dialect()
    }

    fn apply_filter_to_framebuffer(
        &mut self,
        input_texture: TextureId,
        program: &Program,
        framebuffer: &mut Framebuffer,
    ) -> GlResult<()> {
        (**self).apply_filter_to_framebuffer(input_texture, program, framebuffer)
    }
}

/// `use_program`, `set_uniforms`, `render`: one draw into whatever target is
/// bound.
pub fn apply_single_pass<S: FilterStage + ?Sized>(
    stage: &S,
    input_texture: TextureId,
    program: &Program,
) {
    program.use_program();
    stage.set_uniforms(program);
    program.render(input_texture);
}

/// Where a [`Filter`] is in its lazy (re)initialization cycle.
///
/// `Resizing` and `ShaderStale` are only observed after a render failed
/// part-way through rebuilding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterState {
    #[default]
    Uninitialized,
    Ready,
    Resizing,
    ShaderStale,
}

/// Physical pixel size for a logical size at `device_pixel_ratio`.
pub fn scaled_size(width: f32, height: f32, device_pixel_ratio: f32) -> (i32, i32) {
    (
        (width * device_pixel_ratio).round() as i32,
        (height * device_pixel_ratio).round() as i32,
    )
}

/// A single-input filter: a [`FilterStage`] plus the GPU resources it draws
/// with.
pub struct Filter<S> {
    gl: SharedGl,
    stage: S,
    framebuffer: Option<Framebuffer>,
    program: Program,
    state: FilterState,
}

impl<S: FilterStage> Filter<S> {
    pub fn new(gl: SharedGl, stage: S) -> Self {
        let program = Program::new(gl.clone());
        Self {
            gl,
            stage,
            framebuffer: None,
            program,
            state: FilterState::Uninitialized,
        }
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut S {
        &mut self.stage
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn framebuffer(&self) -> Option<&Framebuffer> {
        self.framebuffer.as_ref()
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Filters `input_texture` into the target bound by the caller.
    ///
    /// `width` and `height` are logical sizes; the intermediate target is
    /// `round(width * device_pixel_ratio) x round(height * device_pixel_ratio)`.
    /// The framebuffer is rebuilt when that size changes and the program when
    /// it was never built or the stage reports stale shaders.
    ///
    /// Errors carry a [`GlError`](crate::GlError) at their root. Nothing
    /// allocated by a failed step survives, so the call can be retried.
    pub fn render(
        &mut self,
        input_texture: TextureId,
        width: f32,
        height: f32,
        device_pixel_ratio: f32,
    ) -> Result<()> {
        let (scaled_width, scaled_height) = scaled_size(width, height, device_pixel_ratio);
        self.stage.set_device_pixel_ratio(device_pixel_ratio);

        if let Some(framebuffer) = &self.framebuffer
            && (framebuffer.width() != scaled_width || framebuffer.height() != scaled_height)
        {
            trace!(
                from_width = framebuffer.width(),
                from_height = framebuffer.height(),
                scaled_width,
                scaled_height,
                "resizing filter framebuffer"
            );
            self.state = FilterState::Resizing;
            self.framebuffer = None;
        }

        let framebuffer = match self.framebuffer.take() {
            Some(framebuffer) => framebuffer,
            None => {
                let mut framebuffer = Framebuffer::with_dialect(
                    self.gl.clone(),
                    scaled_width,
                    scaled_height,
                    self.stage.dialect(),
                );
                if let Err(e) = framebuffer.init() {
                    debug!("failed to initialize framebuffer: {e}");
                    self.state = FilterState::Uninitialized;
                    return Err(e).context("failed to initialize framebuffer");
                }
                framebuffer
            }
        };
        let framebuffer = self.framebuffer.insert(framebuffer);

        if !self.program.is_initialized() || self.stage.should_update_shaders() {
            if self.program.is_initialized() {
                self.state = FilterState::ShaderStale;
            }
            let mut vertex = self.stage.vertex_shader();
            let mut fragment = self.stage.fragment_shader();
            if vertex.is_empty() || fragment.is_empty() {
                vertex = PASS_THROUGH_VERTEX_SHADER.to_string();
                fragment = pass_through_fragment_shader(self.stage.dialect());
            }
            if let Err(e) = self.program.init(&vertex, &fragment) {
                debug!("failed to initialize program: {e}");
                return Err(e).context("failed to initialize program");
            }
            self.stage.shaders_updated();
        }

        self.stage
            .apply_filter_to_framebuffer(input_texture, &self.program, framebuffer)
            .context("failed to apply filter")?;
        self.state = FilterState::Ready;
        Ok(())
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for Filter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("stage", &self.stage)
            .field("state", &self.state)
            .field("framebuffer", &self.framebuffer)
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{
        error::GlError,
        gpu::{ObjectKind, RecordingGl},
    };

    fn input(gl: &RecordingGl) -> TextureId {
        gl.upload_texture(2, 2, &[255; 16]).unwrap()
    }

    #[test]
    fn scaled_size_rounds() {
        assert_eq!(scaled_size(10.0, 5.0, 1.5), (15, 8));
        assert_eq!(scaled_size(3.3, 3.7, 1.0), (3, 4));
    }

    #[test]
    fn first_render_builds_everything() {
        let gl = Rc::new(RecordingGl::new());
        let texture = input(&gl);
        let mut filter = Filter::new(gl.clone(), PassThrough::default());
        assert_eq!(filter.state(), FilterState::Uninitialized);

        filter.render(texture, 4.0, 3.0, 2.0).unwrap();

        assert_eq!(filter.state(), FilterState::Ready);
        let framebuffer = filter.framebuffer().unwrap();
        assert_eq!((framebuffer.width(), framebuffer.height()), (8, 6));
        assert!(filter.program().is_initialized());
        assert_eq!(filter.stage().device_pixel_ratio(), 2.0);
    }

    #[test]
    fn framebuffer_failure_leaves_filter_uninitialized() {
        let gl = Rc::new(RecordingGl::new());
        let texture = input(&gl);
        let mut filter = Filter::new(gl.clone(), PassThrough::default());
        gl.fail_framebuffer_completeness(true);

        let err = filter.render(texture, 4.0, 4.0, 1.0).unwrap_err();
        assert_eq!(
            err.downcast_ref::<GlError>(),
            Some(&GlError::IncompleteFramebuffer { width: 4, height: 4 })
        );
        assert_eq!(filter.state(), FilterState::Uninitialized);
        assert!(filter.framebuffer().is_none());
        assert_eq!(gl.live_count(ObjectKind::Framebuffer), 0);
        assert!(gl.draws().is_empty());

        gl.fail_framebuffer_completeness(false);
        filter.render(texture, 4.0, 4.0, 1.0).unwrap();
        assert_eq!(filter.state(), FilterState::Ready);
    }

    #[test]
    fn program_failure_is_reported_and_retried() {
        let gl = Rc::new(RecordingGl::new());
        let texture = input(&gl);
        let mut filter = Filter::new(gl.clone(), PassThrough::default());
        gl.fail_link(true);

        let err = filter.render(texture, 4.0, 4.0, 1.0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GlError>(),
            Some(GlError::ProgramLink { .. })
        ));
        assert!(!filter.program().is_initialized());
        assert!(gl.draws().is_empty());

        gl.fail_link(false);
        filter.render(texture, 4.0, 4.0, 1.0).unwrap();
        assert!(filter.program().is_initialized());
        assert_eq!(gl.draws().len(), 1);
    }

    #[test]
    fn boxed_stages_forward_everything() {
        let gl = Rc::new(RecordingGl::new());
        let texture = input(&gl);
        let stage: Box<dyn FilterStage> = Box::new(PassThrough::default());
        let mut filter = Filter::new(gl.clone(), stage);
        filter.render(texture, 2.0, 2.0, 1.5).unwrap();
        assert_eq!(filter.stage().device_pixel_ratio(), 1.5);
        assert_eq!(gl.draws()[0].texture, Some(texture));
        assert_eq!(gl.bound_framebuffer(), None);
    }
}
