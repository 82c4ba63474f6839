//! Off-screen render target lifecycle.
//!
//! A [`Framebuffer`] owns an RGBA8 color texture and an 8-bit stencil
//! renderbuffer of a fixed size. [`Framebuffer::bind`] returns a
//! [`FramebufferBinding`] guard; dropping the guard (or calling
//! [`FramebufferBinding::unbind`]) restores the framebuffer binding, viewport
//! and blend state captured when it was created.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::{
    error::{GlError, GlResult},
    gpu::{BlendFunc, FramebufferId, GlApi, ObjectKind, RenderbufferId, SharedGl, TextureId},
    program::Program,
    shaders::{PASS_THROUGH_VERTEX_SHADER, ShaderDialect, pass_through_fragment_shader},
};

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

#[derive(Debug, Clone, Copy)]
struct FramebufferObjects {
    framebuffer: FramebufferId,
    texture: TextureId,
    renderbuffer: RenderbufferId,
}

impl FramebufferObjects {
    fn release(self, gl: &dyn GlApi) {
        gl.delete_framebuffer(self.framebuffer);
        gl.delete_renderbuffer(self.renderbuffer);
        gl.delete_texture(self.texture);
    }
}

/// Blend enable flag and factors as found on the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendSnapshot {
    pub enabled: bool,
    pub func: BlendFunc,
}

impl BlendSnapshot {
    pub fn capture(gl: &dyn GlApi) -> Self {
        Self {
            enabled: gl.blend_enabled(),
            func: gl.blend_func(),
        }
    }

    pub fn restore(self, gl: &dyn GlApi) {
        gl.set_blend_func(self.func);
        gl.set_blend_enabled(self.enabled);
    }
}

/// Restores the framebuffer and renderbuffer bindings and the viewport on
/// drop.
struct RestoreBindings<'a> {
    gl: &'a dyn GlApi,
    framebuffer: Option<FramebufferId>,
    renderbuffer: Option<RenderbufferId>,
    viewport: [i32; 4],
}

impl<'a> RestoreBindings<'a> {
    fn capture(gl: &'a dyn GlApi) -> Self {
        Self {
            gl,
            framebuffer: gl.framebuffer_binding(),
            renderbuffer: gl.renderbuffer_binding(),
            viewport: gl.viewport_rect(),
        }
    }
}

impl Drop for RestoreBindings<'_> {
    fn drop(&mut self) {
        self.gl.bind_framebuffer(self.framebuffer);
        self.gl.bind_renderbuffer(self.renderbuffer);
        let [x, y, width, height] = self.viewport;
        self.gl.viewport(x, y, width, height);
    }
}

fn allocate_texture(gl: &dyn GlApi, width: i32, height: i32) -> GlResult<TextureId> {
    let texture = gl
        .create_texture()
        .ok_or(GlError::ObjectCreation { kind: ObjectKind::Texture })?;
    gl.bind_texture(Some(texture));
    gl.unpack_alignment(1);
    gl.tex_image_2d_rgba8(width, height);
    gl.tex_parameters_linear_clamp();
    gl.unpack_alignment(4);
    gl.bind_texture(None);
    Ok(texture)
}

/// An off-screen color + stencil render target of fixed size.
pub struct Framebuffer {
    gl: SharedGl,
    width: i32,
    height: i32,
    objects: Option<FramebufferObjects>,
    /// Copy of the color attachment sampled by `update_texture`.
    scratch_texture: Option<TextureId>,
    blit: Program,
    dialect: ShaderDialect,
}

impl Framebuffer {
    pub fn new(gl: SharedGl, width: i32, height: i32) -> Self {
        Self::with_dialect(gl, width, height, ShaderDialect::default())
    }

    pub fn with_dialect(gl: SharedGl, width: i32, height: i32, dialect: ShaderDialect) -> Self {
        let blit = Program::new(gl.clone());
        Self {
            gl,
            width,
            height,
            objects: None,
            scratch_texture: None,
            blit,
            dialect,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// The color attachment, once initialized.
    pub fn texture(&self) -> Option<TextureId> {
        self.objects.map(|o| o.texture)
    }

    pub fn id(&self) -> Option<FramebufferId> {
        self.objects.map(|o| o.framebuffer)
    }

    pub fn renderbuffer(&self) -> Option<RenderbufferId> {
        self.objects.map(|o| o.renderbuffer)
    }

    pub fn is_initialized(&self) -> bool {
        self.objects.is_some()
    }

    /// Allocates the color texture, stencil renderbuffer and framebuffer
    /// object, checks completeness and clears the new target.
    ///
    /// The framebuffer and renderbuffer bound before the call, and the
    /// viewport, are restored on return whatever the outcome. On failure
    /// nothing allocated by this call survives.
    pub fn init(&mut self) -> GlResult<()> {
        self.finalize();

        if self.width <= 0 || self.height <= 0 {
            return Err(GlError::InvalidSize {
                width: self.width,
                height: self.height,
            });
        }

        if !self.blit.is_initialized() {
            let fragment = pass_through_fragment_shader(self.dialect);
            if let Err(e) = self.blit.init(PASS_THROUGH_VERTEX_SHADER, &fragment) {
                debug!("failed to initialize the framebuffer blit program: {e}");
                return Err(e);
            }
        }

        let gl = self.gl.as_ref();
        let _restore = RestoreBindings::capture(gl);
        let objects = Self::allocate(gl, self.width, self.height)?;

        gl.bind_framebuffer(Some(objects.framebuffer));
        self.objects = Some(objects);
        self.clear();
        trace!(
            width = self.width,
            height = self.height,
            "framebuffer initialized"
        );
        Ok(())
    }

    fn allocate(gl: &dyn GlApi, width: i32, height: i32) -> GlResult<FramebufferObjects> {
        let texture = allocate_texture(gl, width, height)?;

        let Some(framebuffer) = gl.create_framebuffer() else {
            gl.delete_texture(texture);
            return Err(GlError::ObjectCreation { kind: ObjectKind::Framebuffer });
        };
        gl.bind_framebuffer(Some(framebuffer));

        let Some(renderbuffer) = gl.create_renderbuffer() else {
            gl.delete_framebuffer(framebuffer);
            gl.delete_texture(texture);
            return Err(GlError::ObjectCreation { kind: ObjectKind::Renderbuffer });
        };
        gl.bind_renderbuffer(Some(renderbuffer));
        gl.renderbuffer_storage_stencil8(width, height);

        gl.framebuffer_color_texture(Some(texture));
        gl.framebuffer_stencil_renderbuffer(Some(renderbuffer));

        let objects = FramebufferObjects {
            framebuffer,
            texture,
            renderbuffer,
        };
        if !gl.framebuffer_complete() {
            debug!("framebuffer {width}x{height} failed the completeness check");
            objects.release(gl);
            return Err(GlError::IncompleteFramebuffer { width, height });
        }
        Ok(objects)
    }

    /// Deletes the framebuffer, renderbuffer, color texture and cached copy.
    pub fn finalize(&mut self) {
        let gl = self.gl.as_ref();
        if let Some(objects) = self.objects.take() {
            objects.release(gl);
        }
        if let Some(texture) = self.scratch_texture.take() {
            gl.delete_texture(texture);
        }
    }

    /// Sets the viewport to the whole target and clears color and stencil.
    ///
    /// Operates on whatever framebuffer is bound; callers bind this one first.
    pub fn clear(&self) {
        let gl = self.gl.as_ref();
        gl.viewport(0, 0, self.width, self.height);
        gl.clear_color_and_stencil(CLEAR_COLOR);
    }

    /// Makes this framebuffer the render target until the returned guard is
    /// dropped.
    ///
    /// Blending is forced on with `(ONE, ONE_MINUS_SRC_ALPHA)`. The guard
    /// borrows the framebuffer mutably, so bindings cannot nest.
    pub fn bind(&mut self) -> GlResult<FramebufferBinding<'_>> {
        let Some(objects) = self.objects else {
            return Err(GlError::NotInitialized { what: "framebuffer" });
        };
        let gl = self.gl.as_ref();
        let saved = SavedState {
            framebuffer: gl.framebuffer_binding(),
            viewport: gl.viewport_rect(),
            blend: BlendSnapshot::capture(gl),
        };
        gl.bind_framebuffer(Some(objects.framebuffer));
        gl.viewport(0, 0, self.width, self.height);
        if !saved.blend.enabled {
            gl.set_blend_enabled(true);
        }
        gl.set_blend_func(BlendFunc::PREMULTIPLIED_ALPHA);
        Ok(FramebufferBinding {
            framebuffer: self,
            saved,
        })
    }

    /// Draws the color attachment into the currently bound target, replacing
    /// its contents.
    ///
    /// Call with this framebuffer unbound. The blend state is restored after
    /// the draw.
    pub fn render(&self) -> GlResult<()> {
        let texture = self
            .texture()
            .ok_or(GlError::NotInitialized { what: "framebuffer" })?;
        let gl = self.gl.as_ref();
        let blend = BlendSnapshot::capture(gl);
        self.blit.use_program();
        gl.set_blend_func(BlendFunc::REPLACE);
        self.blit.render(texture);
        blend.restore(gl);
        Ok(())
    }

    fn ensure_scratch_texture(&mut self) -> GlResult<TextureId> {
        if let Some(texture) = self.scratch_texture {
            return Ok(texture);
        }
        let texture = allocate_texture(self.gl.as_ref(), self.width, self.height)?;
        self.scratch_texture = Some(texture);
        Ok(texture)
    }

    /// Reads the color attachment back as an image, top row first.
    pub fn read_pixels(&self) -> GlResult<image::RgbaImage> {
        let objects = self
            .objects
            .ok_or(GlError::NotInitialized { what: "framebuffer" })?;
        let gl = self.gl.as_ref();
        let _restore = RestoreBindings::capture(gl);
        gl.bind_framebuffer(Some(objects.framebuffer));
        let bottom_up = gl.read_pixels_rgba8(self.width, self.height);

        let mut image = image::RgbaImage::from_raw(self.width as u32, self.height as u32, bottom_up)
            .ok_or(GlError::InvalidSize {
                width: self.width,
                height: self.height,
            })?;
        image::imageops::flip_vertical_in_place(&mut image);
        Ok(image)
    }

    /// Writes the color attachment to a PNG file.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let image = self
            .read_pixels()
            .context("failed to read framebuffer pixels")?;
        image
            .save(path)
            .with_context(|| format!("failed to save png to {}", path.display()))
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.finalize();
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("objects", &self.objects)
            .field("scratch_texture", &self.scratch_texture)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
struct SavedState {
    framebuffer: Option<FramebufferId>,
    viewport: [i32; 4],
    blend: BlendSnapshot,
}

/// A bound [`Framebuffer`]. Restores the captured state when dropped.
pub struct FramebufferBinding<'a> {
    framebuffer: &'a mut Framebuffer,
    saved: SavedState,
}

impl FramebufferBinding<'_> {
    pub fn framebuffer(&self) -> &Framebuffer {
        self.framebuffer
    }

    /// Framebuffer that was bound when this binding was created.
    pub fn previous_framebuffer(&self) -> Option<FramebufferId> {
        self.saved.framebuffer
    }

    pub fn clear(&self) {
        self.framebuffer.clear();
    }

    /// Runs `program` over this framebuffer's current contents and writes the
    /// result back into the color attachment.
    ///
    /// The attachment is first copied into the framebuffer's cached texture,
    /// so the draw never samples its own render target. `set_uniforms` runs
    /// after the program is activated and before it draws.
    pub fn update_texture(
        &mut self,
        program: &Program,
        set_uniforms: impl FnOnce(&Program),
    ) -> GlResult<()> {
        let source = self.framebuffer.ensure_scratch_texture()?;
        let gl = self.framebuffer.gl.as_ref();
        let (width, height) = (self.framebuffer.width, self.framebuffer.height);

        gl.bind_texture(Some(source));
        gl.copy_tex_sub_image_2d(width, height);
        gl.bind_texture(None);

        self.framebuffer.clear();
        program.use_program();
        set_uniforms(program);
        program.render(source);
        Ok(())
    }

    /// Restores the state captured by [`Framebuffer::bind`].
    pub fn unbind(self) {}
}

impl Drop for FramebufferBinding<'_> {
    fn drop(&mut self) {
        let gl = self.framebuffer.gl.as_ref();
        gl.bind_framebuffer(self.saved.framebuffer);
        let [x, y, width, height] = self.saved.viewport;
        gl.viewport(x, y, width, height);
        self.saved.blend.restore(gl);
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::gpu::{BlendFactor, RecordingGl};

    fn setup(width: i32, height: i32) -> (Rc<RecordingGl>, Framebuffer) {
        let gl = Rc::new(RecordingGl::new());
        let framebuffer = Framebuffer::new(gl.clone(), width, height);
        (gl, framebuffer)
    }

    #[test]
    fn init_allocates_attachments_and_restores_bindings() {
        let (gl, mut framebuffer) = setup(8, 4);
        let outer_fb = gl.create_framebuffer().unwrap();
        let outer_rb = gl.create_renderbuffer().unwrap();
        gl.bind_framebuffer(Some(outer_fb));
        gl.bind_renderbuffer(Some(outer_rb));

        framebuffer.init().unwrap();

        let texture = framebuffer.texture().unwrap();
        assert_eq!(gl.texture_size(texture), Some((8, 4)));
        assert_eq!(
            gl.framebuffer_attachments(framebuffer.id().unwrap()),
            Some((Some(texture), framebuffer.renderbuffer()))
        );
        assert_eq!(gl.bound_framebuffer(), Some(outer_fb));
        assert_eq!(gl.bound_renderbuffer(), Some(outer_rb));
        assert_eq!(gl.current_unpack_alignment(), 4);
        assert_eq!(gl.viewport_rect(), [0, 0, 0, 0]);
    }

    #[test]
    fn incomplete_framebuffer_leaves_no_handles() {
        let (gl, mut framebuffer) = setup(8, 4);
        gl.fail_framebuffer_completeness(true);

        let err = framebuffer.init().unwrap_err();
        assert_eq!(err, GlError::IncompleteFramebuffer { width: 8, height: 4 });
        assert!(!framebuffer.is_initialized());
        assert_eq!(framebuffer.texture(), None);
        assert_eq!(framebuffer.id(), None);
        assert_eq!(gl.live_count(ObjectKind::Framebuffer), 0);
        assert_eq!(gl.live_count(ObjectKind::Renderbuffer), 0);
        assert_eq!(gl.live_count(ObjectKind::Texture), 0);
        assert_eq!(gl.bound_framebuffer(), None);

        gl.fail_framebuffer_completeness(false);
        framebuffer.init().unwrap();
        assert!(framebuffer.is_initialized());
    }

    #[test]
    fn renderbuffer_creation_failure_releases_texture_and_framebuffer() {
        let (gl, mut framebuffer) = setup(2, 2);
        gl.fail_object_creation(Some(ObjectKind::Renderbuffer));
        let err = framebuffer.init().unwrap_err();
        assert_eq!(err, GlError::ObjectCreation { kind: ObjectKind::Renderbuffer });
        assert_eq!(gl.live_count(ObjectKind::Framebuffer), 0);
        assert_eq!(gl.live_count(ObjectKind::Texture), 0);
    }

    #[test]
    fn zero_sized_target_is_rejected_before_allocation() {
        let (gl, mut framebuffer) = setup(0, 4);
        let err = framebuffer.init().unwrap_err();
        assert_eq!(err, GlError::InvalidSize { width: 0, height: 4 });
        assert_eq!(gl.total_live(), 0);
    }

    #[test]
    fn bind_saves_and_unbind_restores_state() {
        let (gl, mut framebuffer) = setup(8, 4);
        framebuffer.init().unwrap();
        let own = framebuffer.id();

        let outer = gl.create_framebuffer().unwrap();
        let custom = BlendFunc::uniform(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
        gl.bind_framebuffer(Some(outer));
        gl.set_blend_enabled(true);
        gl.set_blend_func(custom);
        gl.viewport(1, 2, 300, 200);

        let binding = framebuffer.bind().unwrap();
        assert_eq!(gl.bound_framebuffer(), own);
        assert_eq!(gl.blend_func(), BlendFunc::PREMULTIPLIED_ALPHA);
        assert_eq!(gl.viewport_rect(), [0, 0, 8, 4]);
        assert_eq!(binding.previous_framebuffer(), Some(outer));
        binding.unbind();

        assert_eq!(gl.bound_framebuffer(), Some(outer));
        assert!(gl.blend_enabled());
        assert_eq!(gl.blend_func(), custom);
        assert_eq!(gl.viewport_rect(), [1, 2, 300, 200]);
    }

    #[test]
    fn bind_enables_blending_only_for_its_duration() {
        let (gl, mut framebuffer) = setup(8, 4);
        framebuffer.init().unwrap();
        gl.set_blend_enabled(false);
        {
            let _binding = framebuffer.bind().unwrap();
            assert!(gl.blend_enabled());
        }
        assert!(!gl.blend_enabled());
    }

    #[test]
    fn bind_requires_init() {
        let (_gl, mut framebuffer) = setup(8, 4);
        assert!(matches!(
            framebuffer.bind(),
            Err(GlError::NotInitialized { .. })
        ));
    }

    #[test]
    fn render_overwrites_the_bound_target_and_restores_blend() {
        let (gl, mut framebuffer) = setup(8, 4);
        framebuffer.init().unwrap();
        gl.set_blend_enabled(false);

        framebuffer.render().unwrap();

        let draws = gl.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].texture, framebuffer.texture());
        assert_eq!(draws[0].framebuffer, None);
        assert_eq!(draws[0].blend_func, BlendFunc::REPLACE);
        assert!(!gl.blend_enabled());
    }

    #[test]
    fn update_texture_samples_a_copy_of_the_attachment() {
        let (gl, mut framebuffer) = setup(8, 4);
        framebuffer.init().unwrap();
        let mut program = Program::new(gl.clone());
        program
            .init(
                PASS_THROUGH_VERTEX_SHADER,
                &pass_through_fragment_shader(ShaderDialect::Desktop),
            )
            .unwrap();

        let own = framebuffer.id();
        let attachment = framebuffer.texture();
        let mut binding = framebuffer.bind().unwrap();
        let mut called = false;
        binding
            .update_texture(&program, |_| called = true)
            .unwrap();
        binding.unbind();
        assert!(called);

        let copies = gl.copies();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].0, own);
        let scratch = copies[0].1.unwrap();
        assert_ne!(Some(scratch), attachment);

        let draws = gl.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].texture, Some(scratch));
        assert_eq!(draws[0].framebuffer, own);

        // The cached copy is reused on later passes.
        let mut binding = framebuffer.bind().unwrap();
        binding.update_texture(&program, |_| {}).unwrap();
        drop(binding);
        assert_eq!(gl.copies()[1].1, Some(scratch));
    }

    #[test]
    fn finalize_and_drop_release_everything() {
        let (gl, mut framebuffer) = setup(8, 4);
        framebuffer.init().unwrap();
        framebuffer.finalize();
        assert_eq!(gl.live_count(ObjectKind::Framebuffer), 0);
        assert_eq!(gl.live_count(ObjectKind::Texture), 0);
        drop(framebuffer);
        assert_eq!(gl.total_live(), 0);
    }

    #[test]
    fn read_pixels_returns_the_cleared_target() {
        let (_gl, mut framebuffer) = setup(3, 2);
        framebuffer.init().unwrap();
        let image = framebuffer.read_pixels().unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn read_pixels_puts_the_top_row_first() {
        let (gl, mut framebuffer) = setup(2, 2);
        framebuffer.init().unwrap();
        let red = [255, 0, 0, 255];
        let blue = [0, 0, 255, 255];
        // GL row 0 is the bottom of the target.
        let bottom_up = [red, red, blue, blue].concat();
        assert!(gl.write_texture(framebuffer.texture().unwrap(), &bottom_up));

        let image = framebuffer.read_pixels().unwrap();
        assert_eq!(image.get_pixel(0, 0).0, blue);
        assert_eq!(image.get_pixel(1, 0).0, blue);
        assert_eq!(image.get_pixel(0, 1).0, red);
        assert_eq!(image.get_pixel(1, 1).0, red);
    }
}
