//! Fixed shader sources and GLSL formatting helpers.
//!
//! Every shader pair handed to [`Program::init`](crate::program::Program::init)
//! declares the same interface:
//! - vertex: `attribute vec4 position`, `attribute vec2 inputTextureCoordinate`
//! - fragment: `uniform sampler2D inputImageTexture`

use serde::{Deserialize, Serialize};

pub const POSITION_ATTRIBUTE: &str = "position";
pub const TEXTURE_COORDINATE_ATTRIBUTE: &str = "inputTextureCoordinate";
pub const INPUT_TEXTURE_UNIFORM: &str = "inputImageTexture";

/// GLSL flavor to emit.
///
/// `Es2` adds the precision qualifiers GLSL ES 1.00 requires; `Desktop`
/// leaves them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShaderDialect {
    #[default]
    Desktop,
    Es2,
}

impl ShaderDialect {
    /// `"highp "` on ES, empty on desktop.
    pub fn highp(self) -> &'static str {
        match self {
            ShaderDialect::Desktop => "",
            ShaderDialect::Es2 => "highp ",
        }
    }

    /// `"lowp "` on ES, empty on desktop.
    pub fn lowp(self) -> &'static str {
        match self {
            ShaderDialect::Desktop => "",
            ShaderDialect::Es2 => "lowp ",
        }
    }

    /// Default float precision line for fragment shaders.
    pub fn fragment_preamble(self) -> &'static str {
        match self {
            ShaderDialect::Desktop => "",
            ShaderDialect::Es2 => "precision mediump float;\n",
        }
    }
}

/// Vertex stage of the pass-through pair.
pub const PASS_THROUGH_VERTEX_SHADER: &str = r#"attribute vec4 position;
attribute vec2 inputTextureCoordinate;

varying vec2 textureCoordinate;

void main() {
  textureCoordinate = inputTextureCoordinate;
  gl_Position = position;
}"#;

/// Fragment stage of the pass-through pair, for `dialect`.
pub fn pass_through_fragment_shader(dialect: ShaderDialect) -> String {
    format!(
        r#"{preamble}uniform sampler2D inputImageTexture;
varying {highp}vec2 textureCoordinate;

void main() {{
  gl_FragColor = texture2D(inputImageTexture, textureCoordinate);
}}"#,
        preamble = dialect.fragment_preamble(),
        highp = dialect.highp(),
    )
}

/// Format `v` as a GLSL float literal.
///
/// Uses the shortest representation that parses back to the same `f32`,
/// always with a decimal point and never in exponent form.
pub fn glsl_float(v: f32) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    if v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glsl_float_is_a_valid_literal() {
        assert_eq!(glsl_float(1.0), "1.0");
        assert_eq!(glsl_float(0.0), "0.0");
        assert_eq!(glsl_float(-2.0), "-2.0");
        assert_eq!(glsl_float(0.25), "0.25");
        assert_eq!(glsl_float(f32::NAN), "0.0");
        assert!(!glsl_float(1.0e-12).contains('e'));
    }

    #[test]
    fn glsl_float_round_trips() {
        for v in [0.2513791_f32, 1.4117647, 0.000123456, 3.3333333] {
            let parsed: f32 = glsl_float(v).parse().unwrap();
            assert_eq!(parsed, v);
        }
    }

    #[test]
    fn pass_through_pair_declares_the_program_interface() {
        assert!(PASS_THROUGH_VERTEX_SHADER.contains("attribute vec4 position;"));
        assert!(PASS_THROUGH_VERTEX_SHADER.contains("attribute vec2 inputTextureCoordinate;"));
        for dialect in [ShaderDialect::Desktop, ShaderDialect::Es2] {
            let fragment = pass_through_fragment_shader(dialect);
            assert!(fragment.contains("uniform sampler2D inputImageTexture;"));
        }
        assert!(pass_through_fragment_shader(ShaderDialect::Es2).starts_with("precision mediump"));
    }
}
