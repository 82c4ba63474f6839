use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use gl_filter_chain::{
    FilterKind, FilterStage, GaussianKernel, config, gaussian_blur::reference, logging,
};
use tracing::info;

#[derive(Debug, Clone)]
struct Cli {
    config: Option<PathBuf>,
    input: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    device_pixel_ratio: f32,
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: None,
            input: None,
            output_dir: None,
            device_pixel_ratio: 1.0,
        }
    }
}

const USAGE: &str = "supported: --config <filter.json>, --input <image.png>, --outputdir <dir>, --dpr <ratio>";

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        let value = || {
            args.get(i + 1)
                .ok_or_else(|| anyhow!("missing value for {}", args[i]))
        };
        match args[i].as_str() {
            "--config" => cli.config = Some(PathBuf::from(value()?)),
            "--input" => cli.input = Some(PathBuf::from(value()?)),
            "--outputdir" | "--output-dir" => cli.output_dir = Some(PathBuf::from(value()?)),
            "--dpr" => {
                let raw = value()?;
                cli.device_pixel_ratio = raw
                    .parse()
                    .with_context(|| format!("invalid --dpr value {raw:?}"))?;
            }
            other => return Err(anyhow!("unknown argument: {other} ({USAGE})")),
        }
        i += 2;
    }
    Ok(cli)
}

/// Writes the generated shader pair and, given an input image, a CPU
/// preview of the filter's output.
fn run_headless(config_path: &Path, cli: &Cli, output_dir: &Path) -> Result<()> {
    let filter_config = config::load_filter_config_from_path(config_path)?;
    let mut stage = filter_config.build_stage();
    stage.set_device_pixel_ratio(cli.device_pixel_ratio);

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    for (file_name, source) in [
        ("filter.vert", stage.vertex_shader()),
        ("filter.frag", stage.fragment_shader()),
    ] {
        let path = output_dir.join(file_name);
        if source.is_empty() {
            info!("{file_name}: no effect at this configuration, skipped");
            continue;
        }
        std::fs::write(&path, source)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("[headless] saved: {}", path.display());
    }

    let Some(input_path) = cli.input.as_deref() else {
        return Ok(());
    };
    let input = image::open(input_path)
        .with_context(|| format!("failed to open input image {}", input_path.display()))?
        .into_rgba8();
    let preview = match filter_config.kind {
        FilterKind::GaussianBlur(blur) => {
            match GaussianKernel::for_device(blur.blur_radius, blur.sigma, cli.device_pixel_ratio) {
                Some(kernel) => reference::blur(&input, &kernel, blur.texel_spacing_multiplier),
                None => input,
            }
        }
        FilterKind::PassThrough => input,
    };
    let out_path = output_dir.join("preview.png");
    preview
        .save(&out_path)
        .with_context(|| format!("failed to save {}", out_path.display()))?;
    println!("[headless] saved: {}", out_path.display());
    Ok(())
}

fn main() -> Result<()> {
    logging::init_tracing("warn");

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&argv)?;
    let config_path = cli
        .config
        .clone()
        .ok_or_else(|| anyhow!("--config is required ({USAGE})"))?;
    let output_dir = cli.output_dir.clone().unwrap_or_else(|| {
        config_path
            .parent()
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    run_headless(&config_path, &cli, &output_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_cli_config_input_outputdir_dpr() {
        let cli = parse_cli(&args(&[
            "--config",
            "blur.json",
            "--input",
            "photo.png",
            "--outputdir",
            "out",
            "--dpr",
            "2.5",
        ]))
        .unwrap();
        assert_eq!(cli.config.as_ref().unwrap(), &PathBuf::from("blur.json"));
        assert_eq!(cli.input.as_ref().unwrap(), &PathBuf::from("photo.png"));
        assert_eq!(cli.output_dir.as_ref().unwrap(), &PathBuf::from("out"));
        assert_eq!(cli.device_pixel_ratio, 2.5);
    }

    #[test]
    fn parse_cli_defaults_and_alias() {
        let cli = parse_cli(&args(&["--output-dir", "out"])).unwrap();
        assert_eq!(cli.output_dir.as_ref().unwrap(), &PathBuf::from("out"));
        assert!(cli.config.is_none());
        assert_eq!(cli.device_pixel_ratio, 1.0);
    }

    #[test]
    fn parse_cli_rejects_unknown_argument() {
        let err = parse_cli(&args(&["--headless"])).unwrap_err();
        assert!(err.to_string().contains("unknown argument: --headless"));
    }

    #[test]
    fn parse_cli_rejects_missing_value() {
        let err = parse_cli(&args(&["--config"])).unwrap_err();
        assert!(err.to_string().contains("missing value for --config"));
    }

    #[test]
    fn parse_cli_rejects_bad_dpr() {
        let err = parse_cli(&args(&["--dpr", "two"])).unwrap_err();
        assert!(err.to_string().contains("invalid --dpr value"));
    }
}
