use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use tracing::debug;

use crate::util::ensure_directory;

const DESKEW_SAMPLE_WIDTH: u32 = 800;
const DESKEW_MAX_DEGREES: f32 = 5.0;
const DESKEW_STEP_DEGREES: f32 = 0.5;
const DESKEW_MIN_CORRECTION_DEGREES: f32 = 0.25;
const INK_THRESHOLD: u8 = 128;
const STRETCH_LOW_PERCENTILE: f64 = 0.01;
const STRETCH_HIGH_PERCENTILE: f64 = 0.99;

pub trait ImagePreprocessor {
    /// Writes an enhanced variant of `image` and returns its path.
    fn preprocess(&self, image: &Path) -> Result<PathBuf>;
}

/// Deskew, contrast stretch and denoise, written next to the scratch files.
pub struct DocumentPreprocessor {
    scratch_dir: PathBuf,
}

impl DocumentPreprocessor {
    pub fn new(scratch_dir: &Path) -> Self {
        Self {
            scratch_dir: scratch_dir.to_path_buf(),
        }
    }
}

impl ImagePreprocessor for DocumentPreprocessor {
    fn preprocess(&self, image: &Path) -> Result<PathBuf> {
        let gray = image::open(image)
            .with_context(|| format!("failed to decode page image {}", image.display()))?
            .to_luma8();

        let angle = estimate_skew_degrees(&gray);
        let deskewed = if angle.abs() >= DESKEW_MIN_CORRECTION_DEGREES {
            debug!(path = %image.display(), angle, "deskewing page image");
            rotate_about_center(
                &gray,
                angle.to_radians(),
                Interpolation::Bilinear,
                Luma([255]),
            )
        } else {
            gray
        };

        let stretched = stretch_contrast(&deskewed);
        let denoised = median_filter(&stretched, 1, 1);

        ensure_directory(&self.scratch_dir)?;
        let stem = image
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("page");
        let output = self.scratch_dir.join(format!("{stem}_prep.png"));
        denoised
            .save(&output)
            .with_context(|| format!("failed to write preprocessed image {}", output.display()))?;

        Ok(output)
    }
}

/// Projection-profile skew estimate on a downscaled copy: the rotation that
/// makes text rows sharpest maximises the variance of per-row ink counts.
pub fn estimate_skew_degrees(image: &GrayImage) -> f32 {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }

    let sample = if width > DESKEW_SAMPLE_WIDTH {
        let scaled_height = ((height as f64) * (DESKEW_SAMPLE_WIDTH as f64) / (width as f64))
            .round()
            .max(1.0) as u32;
        imageops::resize(image, DESKEW_SAMPLE_WIDTH, scaled_height, FilterType::Triangle)
    } else {
        image.clone()
    };

    let steps = (DESKEW_MAX_DEGREES / DESKEW_STEP_DEGREES).round() as i32;
    let mut best_angle = 0.0_f32;
    let mut best_spread = row_profile_spread(&sample);

    for step in -steps..=steps {
        if step == 0 {
            continue;
        }
        let angle = step as f32 * DESKEW_STEP_DEGREES;
        let rotated = rotate_about_center(
            &sample,
            angle.to_radians(),
            Interpolation::Nearest,
            Luma([255]),
        );
        let spread = row_profile_spread(&rotated);
        if spread > best_spread {
            best_spread = spread;
            best_angle = angle;
        }
    }

    best_angle
}

fn row_profile_spread(image: &GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    if height == 0 {
        return 0.0;
    }

    let rows: Vec<f64> = (0..height)
        .map(|y| {
            (0..width)
                .filter(|&x| image.get_pixel(x, y)[0] < INK_THRESHOLD)
                .count() as f64
        })
        .collect();

    let mean = rows.iter().sum::<f64>() / rows.len() as f64;
    rows.iter().map(|count| (count - mean).powi(2)).sum::<f64>() / rows.len() as f64
}

/// Linear stretch between the 1st and 99th intensity percentiles.
pub fn stretch_contrast(image: &GrayImage) -> GrayImage {
    let mut histogram = [0_u64; 256];
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return image.clone();
    }

    let low = percentile(&histogram, total, STRETCH_LOW_PERCENTILE);
    let high = percentile(&histogram, total, STRETCH_HIGH_PERCENTILE);
    if high <= low {
        return image.clone();
    }

    let range = f32::from(high - low);
    let mut stretched = image.clone();
    for pixel in stretched.pixels_mut() {
        let value = pixel[0].clamp(low, high);
        pixel[0] = ((f32::from(value - low) / range) * 255.0).round() as u8;
    }
    stretched
}

fn percentile(histogram: &[u64; 256], total: u64, fraction: f64) -> u8 {
    let target = ((total as f64) * fraction).ceil().max(1.0) as u64;
    let mut seen = 0_u64;
    for (value, count) in histogram.iter().enumerate() {
        seen += count;
        if seen >= target {
            return value as u8;
        }
    }
    u8::MAX
}
