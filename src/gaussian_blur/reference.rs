//! CPU rendition of the two blur passes.
//!
//! Samples exactly where the generated shaders do (center texel plus each
//! merged sample at `+/- offset * texel_spacing_multiplier` texels) with
//! bilinear filtering and clamp-to-edge addressing, so GPU output can be
//! checked against it and kernels can be checked against images.

use image::{DynamicImage, Rgba, Rgba32FImage, RgbaImage};

use super::kernel::GaussianKernel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

/// Blurs `image` horizontally then vertically with `kernel`.
pub fn blur(
    image: &RgbaImage,
    kernel: &GaussianKernel,
    texel_spacing_multiplier: f32,
) -> RgbaImage {
    let source = DynamicImage::ImageRgba8(image.clone()).into_rgba32f();
    let horizontal = blur_pass(&source, kernel, texel_spacing_multiplier, Axis::Horizontal);
    let vertical = blur_pass(&horizontal, kernel, texel_spacing_multiplier, Axis::Vertical);
    DynamicImage::ImageRgba32F(vertical).into_rgba8()
}

fn blur_pass(
    source: &Rgba32FImage,
    kernel: &GaussianKernel,
    texel_spacing_multiplier: f32,
    axis: Axis,
) -> Rgba32FImage {
    let (width, height) = source.dimensions();
    Rgba32FImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as f32, y as f32);
        let mut sum = scale(sample(source, x, y), kernel.center_weight());
        for merged in kernel.samples() {
            let step = merged.offset * texel_spacing_multiplier;
            let (dx, dy) = match axis {
                Axis::Horizontal => (step, 0.0),
                Axis::Vertical => (0.0, step),
            };
            sum = add(sum, scale(sample(source, x + dx, y + dy), merged.weight));
            sum = add(sum, scale(sample(source, x - dx, y - dy), merged.weight));
        }
        Rgba(sum)
    })
}

/// Bilinear fetch at texel-center coordinates `(x, y)`, clamped to the edge.
fn sample(image: &Rgba32FImage, x: f32, y: f32) -> [f32; 4] {
    let (width, height) = image.dimensions();
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(width - 1), (y0 + 1).min(height - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let texel = |x, y| image.get_pixel(x, y).0;
    let top = lerp(texel(x0, y0), texel(x1, y0), fx);
    let bottom = lerp(texel(x0, y1), texel(x1, y1), fx);
    lerp(top, bottom, fy)
}

fn lerp(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    std::array::from_fn(|i| a[i] + (b[i] - a[i]) * t)
}

fn scale(a: [f32; 4], s: f32) -> [f32; 4] {
    a.map(|c| c * s)
}

fn add(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    std::array::from_fn(|i| a[i] + b[i])
}
