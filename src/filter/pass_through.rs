use crate::shaders::{PASS_THROUGH_VERTEX_SHADER, ShaderDialect, pass_through_fragment_shader};

use super::FilterStage;

/// The identity filter: copies its input into the bound target.
#[derive(Debug, Clone, PartialEq)]
pub struct PassThrough {
    device_pixel_ratio: f32,
    dialect: ShaderDialect,
}

impl PassThrough {
    pub fn new(dialect: ShaderDialect) -> Self {
        Self {
            device_pixel_ratio: 1.0,
            dialect,
        }
    }
}

impl Default for PassThrough {
    fn default() -> Self {
        Self::new(ShaderDialect::default())
    }
}

impl FilterStage for PassThrough {
    fn vertex_shader(&self) -> String {
        PASS_THROUGH_VERTEX_SHADER.to_string()
    }

    fn fragment_shader(&self) -> String {
        pass_through_fragment_shader(self.dialect)
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    fn set_device_pixel_ratio(&mut self, ratio: f32) {
        self.device_pixel_ratio = ratio;
    }

    fn dialect(&self) -> ShaderDialect {
        self.dialect
    }
}
