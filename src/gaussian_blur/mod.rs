//! Separable Gaussian blur.
//!
//! [`GaussianBlur`] generates its shaders from the current radius, sigma and
//! device pixel ratio, then draws two passes through one intermediate
//! framebuffer: horizontal from the input, vertical from the framebuffer's
//! own contents. The result is composited into the caller's target.

use tracing::trace;

use crate::{
    config::GaussianBlurConfig,
    error::GlResult,
    filter::{Filter, FilterStage, apply_single_pass},
    framebuffer::Framebuffer,
    gpu::TextureId,
    program::Program,
    shaders::ShaderDialect,
};

pub mod kernel;
pub mod reference;
pub mod shaders;

pub use kernel::{GaussianKernel, MAX_VARYING_OFFSETS, MergedSample, scaled_radius};

/// A [`Filter`] running the Gaussian blur stage.
pub type GaussianBlurFilter = Filter<GaussianBlur>;

#[derive(Debug, Clone, PartialEq)]
pub struct GaussianBlur {
    /// Radius in points.
    blur_radius: f32,
    /// Standard deviation in points.
    sigma: f32,
    /// Spacing between taps in texels. Values above 1 widen the blur at the
    /// cost of artifacts.
    texel_spacing_multiplier: f32,
    texel_width_offset: f32,
    texel_height_offset: f32,
    device_pixel_ratio: f32,
    dialect: ShaderDialect,
    shaders_dirty: bool,
}

/// Bitwise comparison, so re-applying NaN counts as no change.
fn differs(new: f32, current: f32) -> bool {
    new.to_bits() != current.to_bits()
}

impl Default for GaussianBlur {
    fn default() -> Self {
        Self::from_config(&GaussianBlurConfig::default())
    }
}

impl GaussianBlur {
    pub fn from_config(config: &GaussianBlurConfig) -> Self {
        Self {
            blur_radius: config.blur_radius,
            sigma: config.sigma,
            texel_spacing_multiplier: config.texel_spacing_multiplier,
            texel_width_offset: 0.0,
            texel_height_offset: 0.0,
            device_pixel_ratio: 1.0,
            dialect: ShaderDialect::default(),
            shaders_dirty: false,
        }
    }

    pub fn with_dialect(mut self, dialect: ShaderDialect) -> Self {
        self.set_dialect(dialect);
        self
    }

    pub fn blur_radius(&self) -> f32 {
        self.blur_radius
    }

    pub fn set_blur_radius(&mut self, blur_radius: f32) {
        if differs(blur_radius, self.blur_radius) {
            self.blur_radius = blur_radius;
            self.shaders_dirty = true;
        }
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    pub fn set_sigma(&mut self, sigma: f32) {
        if differs(sigma, self.sigma) {
            self.sigma = sigma;
            self.shaders_dirty = true;
        }
    }

    pub fn texel_spacing_multiplier(&self) -> f32 {
        self.texel_spacing_multiplier
    }

    pub fn set_texel_spacing_multiplier(&mut self, multiplier: f32) {
        if differs(multiplier, self.texel_spacing_multiplier) {
            self.texel_spacing_multiplier = multiplier;
            self.shaders_dirty = true;
        }
    }

    pub fn set_dialect(&mut self, dialect: ShaderDialect) {
        if dialect != self.dialect {
            self.dialect = dialect;
            self.shaders_dirty = true;
        }
    }

    /// Applies every field of `config` through the setters.
    pub fn apply_config(&mut self, config: &GaussianBlurConfig) {
        self.set_blur_radius(config.blur_radius);
        self.set_sigma(config.sigma);
        self.set_texel_spacing_multiplier(config.texel_spacing_multiplier);
    }

    pub fn config(&self) -> GaussianBlurConfig {
        GaussianBlurConfig {
            blur_radius: self.blur_radius,
            sigma: self.sigma,
            texel_spacing_multiplier: self.texel_spacing_multiplier,
        }
    }

    /// `(texelWidthOffset, texelHeightOffset)` as last pushed.
    pub fn texel_offsets(&self) -> (f32, f32) {
        (self.texel_width_offset, self.texel_height_offset)
    }

    /// Kernel at the current device pixel ratio, `None` when the scaled
    /// radius is zero or less or sigma is not a positive number.
    pub fn kernel(&self) -> Option<GaussianKernel> {
        GaussianKernel::for_device(self.blur_radius, self.sigma, self.device_pixel_ratio)
    }
}

impl FilterStage for GaussianBlur {
    fn vertex_shader(&self) -> String {
        shaders::vertex_shader(self.kernel().as_ref())
    }

    fn fragment_shader(&self) -> String {
        shaders::fragment_shader(self.kernel().as_ref(), self.dialect)
    }

    fn set_uniforms(&self, program: &Program) {
        program.set_uniform_f32(shaders::TEXEL_WIDTH_OFFSET_UNIFORM, self.texel_width_offset);
        program.set_uniform_f32(shaders::TEXEL_HEIGHT_OFFSET_UNIFORM, self.texel_height_offset);
    }

    fn should_update_shaders(&self) -> bool {
        self.shaders_dirty
    }

    fn shaders_updated(&mut self) {
        self.shaders_dirty = false;
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    fn set_device_pixel_ratio(&mut self, ratio: f32) {
        if differs(ratio, self.device_pixel_ratio) {
            self.device_pixel_ratio = ratio;
            self.shaders_dirty = true;
        }
    }

    fn dialect(&self) -> ShaderDialect {
        self.dialect
    }

    fn apply_filter_to_framebuffer(
        &mut self,
        input_texture: TextureId,
        program: &Program,
        framebuffer: &mut Framebuffer,
    ) -> GlResult<()> {
        if self.kernel().is_none() {
            // `program` holds the pass-through pair; copy the input as is.
            apply_single_pass(self, input_texture, program);
            return Ok(());
        }

        let width = framebuffer.width() as f32;
        let height = framebuffer.height() as f32;
        {
            let mut binding = framebuffer.bind()?;
            binding.clear();

            self.texel_width_offset = self.texel_spacing_multiplier / width;
            self.texel_height_offset = 0.0;
            trace!(offset = self.texel_width_offset, "horizontal blur pass");
            program.use_program();
            self.set_uniforms(program);
            program.render(input_texture);

            self.texel_width_offset = 0.0;
            self.texel_height_offset = self.texel_spacing_multiplier / height;
            trace!(offset = self.texel_height_offset, "vertical blur pass");
            let stage = &*self;
            binding.update_texture(program, |program| stage.set_uniforms(program))?;
            binding.unbind();
        }
        framebuffer.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let blur = GaussianBlur::default();
        assert_eq!(blur.blur_radius(), 2.0);
        assert_eq!(blur.sigma(), 2.0);
        assert_eq!(blur.texel_spacing_multiplier(), 1.0);
        assert_eq!(blur.device_pixel_ratio(), 1.0);
        assert!(!blur.should_update_shaders());
    }

    #[test]
    fn setters_only_dirty_on_change() {
        let mut blur = GaussianBlur::default();
        blur.set_blur_radius(2.0);
        blur.set_sigma(2.0);
        blur.set_texel_spacing_multiplier(1.0);
        blur.set_device_pixel_ratio(1.0);
        assert!(!blur.should_update_shaders());

        blur.set_sigma(3.0);
        assert!(blur.should_update_shaders());
        blur.shaders_updated();
        assert!(!blur.should_update_shaders());

        blur.set_device_pixel_ratio(2.0);
        assert!(blur.should_update_shaders());
    }

    #[test]
    fn apply_config_goes_through_the_setters() {
        let mut blur = GaussianBlur::default();
        blur.apply_config(&GaussianBlurConfig::default());
        assert!(!blur.should_update_shaders());

        let config = GaussianBlurConfig {
            blur_radius: 12.0,
            ..GaussianBlurConfig::default()
        };
        blur.apply_config(&config);
        assert!(blur.should_update_shaders());
        assert_eq!(blur.config(), config);
    }

    #[test]
    fn device_pixel_ratio_scales_the_kernel() {
        let mut blur = GaussianBlur::default();
        blur.set_device_pixel_ratio(2.0);
        let kernel = blur.kernel().unwrap();
        assert_eq!(kernel.radius(), 4);
        assert_eq!(kernel.sigma(), 4.0);
    }

    #[test]
    fn zero_radius_generates_nothing() {
        let mut blur = GaussianBlur::default();
        blur.set_blur_radius(0.0);
        assert_eq!(blur.vertex_shader(), "");
        assert_eq!(blur.fragment_shader(), "");

        // Rounds to zero at 1x but not at 3x.
        blur.set_blur_radius(0.3);
        assert_eq!(blur.vertex_shader(), "");
        blur.set_device_pixel_ratio(3.0);
        assert!(!blur.vertex_shader().is_empty());
    }

    #[test]
    fn reapplying_nan_does_not_dirty() {
        let mut blur = GaussianBlur::default();
        blur.set_sigma(f32::NAN);
        blur.set_blur_radius(f32::NAN);
        blur.set_texel_spacing_multiplier(f32::NAN);
        blur.set_device_pixel_ratio(f32::NAN);
        assert!(blur.should_update_shaders());
        blur.shaders_updated();

        blur.set_sigma(f32::NAN);
        blur.set_blur_radius(f32::NAN);
        blur.set_texel_spacing_multiplier(f32::NAN);
        blur.set_device_pixel_ratio(f32::NAN);
        assert!(!blur.should_update_shaders());
    }

    #[test]
    fn generation_is_deterministic() {
        let blur = GaussianBlur::default();
        assert_eq!(blur.vertex_shader(), blur.clone().vertex_shader());
        assert_eq!(blur.fragment_shader(), blur.fragment_shader());
    }
}
