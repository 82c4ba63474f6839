//! Discrete Gaussian weights and the bilinear-merged samples built from them.
//!
//! Weights `w[0..=radius]` come from the normal density at integer offsets
//! and are normalized so that `w[0] + 2 * (w[1] + ... + w[radius])` is 1.
//! Adjacent pairs `(w[2k+1], w[2k+2])` are then folded into a single sample
//! placed between the two texels, so one bilinear fetch stands in for two.

/// Merged samples that fit in vertex-shader varyings. Any beyond this many
/// are read in the fragment shader instead.
pub const MAX_VARYING_OFFSETS: usize = 7;

/// Blur radius in physical pixels.
pub fn scaled_radius(blur_radius: f32, device_pixel_ratio: f32) -> i32 {
    (blur_radius * device_pixel_ratio).round() as i32
}

/// One bilinear fetch standing in for two adjacent texels, mirrored on both
/// sides of the center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedSample {
    /// Distance from the center, in texels.
    pub offset: f32,
    /// Combined weight of the two texels.
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    radius: usize,
    sigma: f32,
    /// `radius + 2` entries; the last is a zero pad so odd radii can pair up.
    weights: Vec<f32>,
}

impl GaussianKernel {
    /// Builds the kernel for a physical `radius` and `sigma`.
    ///
    /// Returns `None` when there is nothing to blur: `radius <= 0`, or a
    /// `sigma` that is not a positive finite number.
    pub fn new(radius: i32, sigma: f32) -> Option<Self> {
        if radius <= 0 || !sigma.is_finite() || sigma <= 0.0 {
            return None;
        }
        let radius = radius as usize;
        let sigma_sq = f64::from(sigma).powi(2);
        let scale = 1.0 / (2.0 * std::f64::consts::PI * sigma_sq).sqrt();

        let raw: Vec<f64> = (0..=radius)
            .map(|i| scale * (-((i * i) as f64) / (2.0 * sigma_sq)).exp())
            .collect();
        let sum = raw[0] + 2.0 * raw[1..].iter().sum::<f64>();

        let mut weights: Vec<f32> = raw.iter().map(|w| (w / sum) as f32).collect();
        weights.push(0.0);

        Some(Self {
            radius,
            sigma,
            weights,
        })
    }

    /// Kernel for logical `blur_radius` and `sigma` at `device_pixel_ratio`.
    pub fn for_device(blur_radius: f32, sigma: f32, device_pixel_ratio: f32) -> Option<Self> {
        Self::new(
            scaled_radius(blur_radius, device_pixel_ratio),
            sigma * device_pixel_ratio,
        )
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    /// Normalized weights, center first, followed by the zero pad.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn center_weight(&self) -> f32 {
        self.weights[0]
    }

    /// Center weight once plus every other weight twice.
    pub fn normalization_sum(&self) -> f64 {
        self.weights
            .iter()
            .enumerate()
            .map(|(i, w)| if i == 0 { f64::from(*w) } else { 2.0 * f64::from(*w) })
            .sum()
    }

    /// Number of merged samples on each side of the center, `ceil(radius / 2)`.
    pub fn merged_sample_count(&self) -> usize {
        self.radius.div_ceil(2)
    }

    /// Merged samples carried as varyings.
    pub fn varying_sample_count(&self) -> usize {
        self.merged_sample_count().min(MAX_VARYING_OFFSETS)
    }

    /// Length of the `blurCoordinates` varying array.
    pub fn blur_coordinate_count(&self) -> usize {
        1 + 2 * self.varying_sample_count()
    }

    pub fn has_overflow(&self) -> bool {
        self.merged_sample_count() > MAX_VARYING_OFFSETS
    }

    /// The `k`th merged sample.
    ///
    /// Panics if `k >= merged_sample_count()`.
    pub fn merged_sample(&self, k: usize) -> MergedSample {
        let (first_index, second_index) = (2 * k + 1, 2 * k + 2);
        let first = self.weights[first_index];
        let second = self.weights[second_index];
        let weight = first + second;
        // Both texels underflowed; the fetch position is irrelevant.
        let offset = if weight == 0.0 {
            0.0
        } else {
            (first * first_index as f32 + second * second_index as f32) / weight
        };
        MergedSample { offset, weight }
    }

    /// Samples passed through varyings, nearest first.
    pub fn varying_samples(&self) -> impl Iterator<Item = MergedSample> + '_ {
        (0..self.varying_sample_count()).map(|k| self.merged_sample(k))
    }

    /// Samples read in the fragment shader, nearest first. Zero-weight
    /// samples are left out.
    pub fn overflow_samples(&self) -> impl Iterator<Item = MergedSample> + '_ {
        (self.varying_sample_count()..self.merged_sample_count())
            .map(|k| self.merged_sample(k))
            .filter(|sample| sample.weight != 0.0)
    }

    /// Every non-zero merged sample, nearest first.
    pub fn samples(&self) -> impl Iterator<Item = MergedSample> + '_ {
        self.varying_samples().chain(self.overflow_samples())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn non_positive_radius_or_sigma_has_no_kernel() {
        assert!(GaussianKernel::new(0, 2.0).is_none());
        assert!(GaussianKernel::new(-3, 2.0).is_none());
        assert!(GaussianKernel::new(4, 0.0).is_none());
        assert!(GaussianKernel::new(4, f32::NAN).is_none());
    }

    #[test]
    fn scaled_radius_rounds_half_away_from_zero() {
        assert_eq!(scaled_radius(2.0, 1.0), 2);
        assert_eq!(scaled_radius(2.0, 1.25), 3);
        assert_eq!(scaled_radius(0.4, 1.0), 0);
        assert_eq!(scaled_radius(1.5, 1.0), 2);
    }

    #[test]
    fn default_blur_kernel() {
        let kernel = GaussianKernel::for_device(2.0, 2.0, 1.0).unwrap();
        assert_eq!(kernel.radius(), 2);
        assert_eq!(kernel.weights().len(), 4);
        assert_eq!(kernel.weights()[3], 0.0);
        assert_eq!(kernel.merged_sample_count(), 1);
        assert_eq!(kernel.blur_coordinate_count(), 3);
        assert!(!kernel.has_overflow());

        let w = kernel.weights();
        assert!(w[0] > w[1] && w[1] > w[2]);
        let sample = kernel.merged_sample(0);
        assert!((sample.weight - (w[1] + w[2])).abs() < 1e-7);
        assert!(sample.offset > 1.0 && sample.offset < 2.0);
    }

    #[test]
    fn odd_radius_pairs_with_the_pad() {
        let kernel = GaussianKernel::new(3, 2.0).unwrap();
        assert_eq!(kernel.merged_sample_count(), 2);
        let last = kernel.merged_sample(1);
        assert_eq!(last.weight, kernel.weights()[3]);
        assert!((last.offset - 3.0).abs() < 1e-6);
    }

    #[test]
    fn large_radius_overflows_varyings() {
        let kernel = GaussianKernel::new(20, 8.0).unwrap();
        assert_eq!(kernel.merged_sample_count(), 10);
        assert_eq!(kernel.varying_sample_count(), MAX_VARYING_OFFSETS);
        assert_eq!(kernel.blur_coordinate_count(), 15);
        assert!(kernel.has_overflow());
        assert_eq!(kernel.overflow_samples().count(), 3);
    }

    #[test]
    fn underflowed_samples_are_skipped() {
        // exp(-i^2 / 2e-4) is zero in f64 for every i >= 1.
        let kernel = GaussianKernel::new(20, 0.01).unwrap();
        assert_eq!(kernel.center_weight(), 1.0);
        assert_eq!(kernel.overflow_samples().count(), 0);
        assert!(kernel.varying_samples().all(|s| s.offset == 0.0 && s.weight == 0.0));
    }

    proptest! {
        #[test]
        fn weights_are_normalized(radius in 1i32..64, sigma in 0.1f32..32.0) {
            let kernel = GaussianKernel::new(radius, sigma).unwrap();
            prop_assert!((kernel.normalization_sum() - 1.0).abs() < 1e-5);
        }

        #[test]
        fn merged_samples_preserve_total_weight(radius in 1i32..64, sigma in 0.5f32..32.0) {
            let kernel = GaussianKernel::new(radius, sigma).unwrap();
            let merged: f64 = kernel.samples().map(|s| 2.0 * f64::from(s.weight)).sum();
            let total = f64::from(kernel.center_weight()) + merged;
            prop_assert!((total - 1.0).abs() < 1e-5);
        }

        #[test]
        fn merged_offsets_lie_between_their_texels(radius in 1i32..64, sigma in 0.5f32..32.0) {
            let kernel = GaussianKernel::new(radius, sigma).unwrap();
            for k in 0..kernel.merged_sample_count() {
                let sample = kernel.merged_sample(k);
                if sample.weight > 0.0 {
                    prop_assert!(sample.offset >= (2 * k + 1) as f32 - 1e-4);
                    prop_assert!(sample.offset <= (2 * k + 2) as f32 + 1e-4);
                }
            }
        }

        #[test]
        fn varying_slots_are_capped(radius in 1i32..200) {
            let kernel = GaussianKernel::new(radius, 4.0).unwrap();
            let merged = (radius as usize).div_ceil(2);
            let expected = 1 + 2 * merged.min(MAX_VARYING_OFFSETS);
            prop_assert_eq!(kernel.blur_coordinate_count(), expected);
            prop_assert_eq!(kernel.has_overflow(), merged > MAX_VARYING_OFFSETS);
        }
    }
}
