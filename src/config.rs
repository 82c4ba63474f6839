//! JSON filter descriptions.
//!
//! ```json
//! { "type": "gaussianBlur", "blurRadius": 4, "sigma": 3 }
//! ```
//!
//! Omitted blur fields take their defaults (`blurRadius` 2, `sigma` 2,
//! `texelSpacingMultiplier` 1).

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::{
    filter::{FilterStage, PassThrough},
    gaussian_blur::GaussianBlur,
    shaders::ShaderDialect,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GaussianBlurConfig {
    /// Radius in points. Zero or less disables the blur.
    pub blur_radius: f32,
    pub sigma: f32,
    pub texel_spacing_multiplier: f32,
}

impl Default for GaussianBlurConfig {
    fn default() -> Self {
        Self {
            blur_radius: 2.0,
            sigma: 2.0,
            texel_spacing_multiplier: 1.0,
        }
    }
}

impl GaussianBlurConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.blur_radius.is_finite() {
            bail!("blurRadius must be finite, got {}", self.blur_radius);
        }
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            bail!("sigma must be a positive number, got {}", self.sigma);
        }
        if !self.texel_spacing_multiplier.is_finite() || self.texel_spacing_multiplier < 0.0 {
            bail!(
                "texelSpacingMultiplier must be zero or more, got {}",
                self.texel_spacing_multiplier
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FilterKind {
    GaussianBlur(GaussianBlurConfig),
    PassThrough,
}

/// A filter and the GLSL dialect to generate it in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    #[serde(flatten)]
    pub kind: FilterKind,
    #[serde(default)]
    pub dialect: ShaderDialect,
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        match &self.kind {
            FilterKind::GaussianBlur(config) => config.validate(),
            FilterKind::PassThrough => Ok(()),
        }
    }

    /// The stage this config describes.
    pub fn build_stage(&self) -> Box<dyn FilterStage> {
        match &self.kind {
            FilterKind::GaussianBlur(config) => {
                Box::new(GaussianBlur::from_config(config).with_dialect(self.dialect))
            }
            FilterKind::PassThrough => Box::new(PassThrough::new(self.dialect)),
        }
    }
}

pub fn parse_filter_config(text: &str) -> Result<FilterConfig> {
    let config: FilterConfig =
        serde_json::from_str(text).context("failed to parse filter config json")?;
    config.validate().context("invalid filter config")?;
    Ok(config)
}

pub fn load_filter_config_from_path(path: impl AsRef<Path>) -> Result<FilterConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read filter config at {}", path.display()))?;
    parse_filter_config(&text).with_context(|| format!("in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_fields_default_when_omitted() {
        let config = parse_filter_config(r#"{ "type": "gaussianBlur", "sigma": 3 }"#).unwrap();
        assert_eq!(
            config.kind,
            FilterKind::GaussianBlur(GaussianBlurConfig {
                blur_radius: 2.0,
                sigma: 3.0,
                texel_spacing_multiplier: 1.0,
            })
        );
        assert_eq!(config.dialect, ShaderDialect::Desktop);
    }

    #[test]
    fn pass_through_with_dialect() {
        let config = parse_filter_config(r#"{ "type": "passThrough", "dialect": "es2" }"#).unwrap();
        assert_eq!(config.kind, FilterKind::PassThrough);
        assert_eq!(config.dialect, ShaderDialect::Es2);
        assert!(config.build_stage().fragment_shader().starts_with("precision mediump float;"));
    }

    #[test]
    fn rejects_invalid_values() {
        for text in [
            r#"{ "type": "gaussianBlur", "sigma": 0 }"#,
            r#"{ "type": "gaussianBlur", "sigma": -1 }"#,
            r#"{ "type": "gaussianBlur", "texelSpacingMultiplier": -0.5 }"#,
            r#"{ "type": "sharpen" }"#,
            r#"{ "blurRadius": 2 }"#,
        ] {
            assert!(parse_filter_config(text).is_err(), "accepted {text}");
        }
    }

    #[test]
    fn zero_radius_is_valid() {
        let config = parse_filter_config(r#"{ "type": "gaussianBlur", "blurRadius": 0 }"#).unwrap();
        assert_eq!(config.build_stage().vertex_shader(), "");
    }

    #[test]
    fn serializes_with_the_type_tag() {
        let config = FilterConfig {
            kind: FilterKind::GaussianBlur(GaussianBlurConfig::default()),
            dialect: ShaderDialect::Es2,
        };
        let value = serde_json::to_value(config).unwrap();
        assert_eq!(value["type"], "gaussianBlur");
        assert_eq!(value["blurRadius"], 2.0);
        assert_eq!(value["dialect"], "es2");
        let back: FilterConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }
}
