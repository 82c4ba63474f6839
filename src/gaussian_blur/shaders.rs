//! GLSL synthesis for the separable blur.
//!
//! The vertex stage precomputes `blurCoordinates[0]` (the texel itself) and a
//! `+/-` pair per varying sample. The fragment stage sums the fetches at
//! those coordinates and reads any overflow samples relative to
//! `blurCoordinates[0]`.

use crate::shaders::{ShaderDialect, glsl_float};

use super::kernel::GaussianKernel;

pub const TEXEL_WIDTH_OFFSET_UNIFORM: &str = "texelWidthOffset";
pub const TEXEL_HEIGHT_OFFSET_UNIFORM: &str = "texelHeightOffset";

/// Vertex stage for `kernel`, or an empty string when there is no kernel.
pub fn vertex_shader(kernel: Option<&GaussianKernel>) -> String {
    let Some(kernel) = kernel else {
        return String::new();
    };

    let mut source = format!(
        r#"attribute vec4 position;
attribute vec2 inputTextureCoordinate;

uniform float {TEXEL_WIDTH_OFFSET_UNIFORM};
uniform float {TEXEL_HEIGHT_OFFSET_UNIFORM};

varying vec2 blurCoordinates[{count}];

void main() {{
  gl_Position = position;

  vec2 singleStepOffset = vec2({TEXEL_WIDTH_OFFSET_UNIFORM}, {TEXEL_HEIGHT_OFFSET_UNIFORM});
  blurCoordinates[0] = inputTextureCoordinate.xy;"#,
        count = kernel.blur_coordinate_count(),
    );

    for (k, sample) in kernel.varying_samples().enumerate() {
        let offset = glsl_float(sample.offset);
        source.push_str(&format!(
            r#"
  blurCoordinates[{plus}] = inputTextureCoordinate.xy + singleStepOffset * {offset};
  blurCoordinates[{minus}] = inputTextureCoordinate.xy - singleStepOffset * {offset};"#,
            plus = 2 * k + 1,
            minus = 2 * k + 2,
        ));
    }

    source.push_str("\n}");
    source
}

/// Fragment stage for `kernel`, or an empty string when there is no kernel.
pub fn fragment_shader(kernel: Option<&GaussianKernel>, dialect: ShaderDialect) -> String {
    let Some(kernel) = kernel else {
        return String::new();
    };
    let highp = dialect.highp();

    let mut source = format!(
        r#"{preamble}uniform sampler2D inputImageTexture;
uniform {highp}float {TEXEL_WIDTH_OFFSET_UNIFORM};
uniform {highp}float {TEXEL_HEIGHT_OFFSET_UNIFORM};

varying {highp}vec2 blurCoordinates[{count}];

void main() {{
  {lowp}vec4 sum = vec4(0.0);
  sum += texture2D(inputImageTexture, blurCoordinates[0]) * {center};"#,
        preamble = dialect.fragment_preamble(),
        lowp = dialect.lowp(),
        count = kernel.blur_coordinate_count(),
        center = glsl_float(kernel.center_weight()),
    );

    for (k, sample) in kernel.varying_samples().enumerate() {
        let weight = glsl_float(sample.weight);
        source.push_str(&format!(
            r#"
  sum += texture2D(inputImageTexture, blurCoordinates[{plus}]) * {weight};
  sum += texture2D(inputImageTexture, blurCoordinates[{minus}]) * {weight};"#,
            plus = 2 * k + 1,
            minus = 2 * k + 2,
        ));
    }

    if kernel.has_overflow() {
        source.push_str(&format!(
            "\n  {highp}vec2 singleStepOffset = vec2({TEXEL_WIDTH_OFFSET_UNIFORM}, {TEXEL_HEIGHT_OFFSET_UNIFORM});"
        ));
        for sample in kernel.overflow_samples() {
            let offset = glsl_float(sample.offset);
            let weight = glsl_float(sample.weight);
            source.push_str(&format!(
                r#"
  sum += texture2D(inputImageTexture, blurCoordinates[0] + singleStepOffset * {offset}) * {weight};
  sum += texture2D(inputImageTexture, blurCoordinates[0] - singleStepOffset * {offset}) * {weight};"#
            ));
        }
    }

    source.push_str("\n  gl_FragColor = sum;\n}");
    source
}
