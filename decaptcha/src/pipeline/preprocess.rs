use image::imageops::FilterType;
use std::io::Cursor;

use image::{
    DynamicImage, GenericImageView, GrayImage, ImageFormat, ImageReader, Limits, Luma, Pixel,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};

/// Image transform parameters applied before recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingProfile {
    /// When false the encoded image goes to the engine untouched.
    pub preprocess: bool,
    /// Trim the uniform border before resizing.
    pub autocrop: bool,
    /// Scale factor, used only when `resize_height` is unset.
    pub scale: f32,
    /// Target height in pixels; width follows the aspect ratio.
    pub resize_height: Option<u32>,
    /// Gaussian blur sigma.
    pub blur: Option<f32>,
    pub invert: bool,
    /// Contrast level in `-1.0..=1.0`; 0 leaves the image unchanged.
    pub contrast: f32,
    /// Luma values at or above this become white.
    pub threshold_max: Option<u8>,
}

impl Default for PreprocessingProfile {
    fn default() -> Self {
        Self {
            preprocess: true,
            autocrop: false,
            scale: 1.0,
            resize_height: None,
            blur: None,
            invert: false,
            contrast: 0.0,
            threshold_max: None,
        }
    }
}

impl PreprocessingProfile {
    pub fn passthrough() -> Self {
        Self {
            preprocess: false,
            ..Self::default()
        }
    }
}

/// Size bounds for decoded and resized images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLimits {
    pub min_dimension: u32,
    pub max_dimension: u32,
    /// Pixel budget for any decoded image or resize target.
    pub max_pixels: u64,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            min_dimension: 8,
            max_dimension: 4096,
            max_pixels: 8 * 1024 * 1024,
        }
    }
}

impl ImageLimits {
    /// Reject an image whose dimensions fall outside the limits.
    pub fn check(&self, width: u32, height: u32) -> Result<()> {
        if width < self.min_dimension || height < self.min_dimension {
            return Err(SolverError::Preprocessing(format!(
                "Image too small: {}x{}, minimum {}x{}",
                width, height, self.min_dimension, self.min_dimension
            )));
        }
        self.check_upper(width, height)
    }

    fn check_upper(&self, width: u32, height: u32) -> Result<()> {
        if width > self.max_dimension || height > self.max_dimension {
            return Err(SolverError::Preprocessing(format!(
                "Image too large: {}x{}, maximum {}x{}",
                width, height, self.max_dimension, self.max_dimension
            )));
        }

        let pixels = width as u64 * height as u64;
        if pixels > self.max_pixels {
            return Err(SolverError::Preprocessing(format!(
                "Image has {pixels} pixels, budget is {}",
                self.max_pixels
            )));
        }
        Ok(())
    }

    /// Decoder limits, so oversized images fail before any pixel buffer is allocated.
    fn decoder_limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        // 16-bit RGBA is the widest pixel a decoder produces
        limits.max_alloc = Some(self.max_pixels.saturating_mul(8));
        limits
    }
}

fn reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| SolverError::Preprocessing(format!("Failed to read image: {e}")))
}

/// Decode any format the `image` crate can sniff, within `limits`.
pub fn decode_image(bytes: &[u8], limits: &ImageLimits) -> Result<DynamicImage> {
    let mut reader = reader(bytes)?;
    reader.limits(limits.decoder_limits());

    let img = reader
        .decode()
        .map_err(|e| SolverError::Preprocessing(format!("Failed to decode image: {e}")))?;

    limits.check(img.width(), img.height())?;
    Ok(img)
}

pub fn encode_png(img: &GrayImage) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut output), ImageFormat::Png)
        .map_err(|e| SolverError::Preprocessing(format!("Failed to encode image: {e}")))?;
    Ok(output)
}

/// Run the profile over an encoded image and return the encoded result.
///
/// Without preprocessing the bytes are passed on as-is, unless their header
/// already shows an image outside `limits`.
pub fn apply_profile(
    bytes: &[u8],
    profile: &PreprocessingProfile,
    limits: &ImageLimits,
) -> Result<Vec<u8>> {
    if !profile.preprocess {
        if let Ok((width, height)) = reader(bytes).and_then(|r| {
            r.into_dimensions()
                .map_err(|e| SolverError::Preprocessing(e.to_string()))
        }) {
            limits.check(width, height)?;
        }
        return Ok(bytes.to_vec());
    }

    let img = decode_image(bytes, limits)?;
    let gray = prepare(img, profile, limits)?;
    encode_png(&gray)
}

/// Apply the transform chain to a decoded image.
///
/// Order: autocrop, resize, greyscale, blur, invert, contrast, threshold.
pub fn prepare(
    img: DynamicImage,
    profile: &PreprocessingProfile,
    limits: &ImageLimits,
) -> Result<GrayImage> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(SolverError::Preprocessing(format!(
            "Image has no pixels: {width}x{height}"
        )));
    }

    let img = if profile.autocrop { autocrop(img) } else { img };
    let img = resize(img, profile, limits)?;

    let mut gray = img.to_luma8();

    if let Some(sigma) = profile.blur.filter(|s| *s > 0.0) {
        gray = image::imageops::blur(&gray, sigma);
    }

    if profile.invert {
        image::imageops::invert(&mut gray);
    }

    if profile.contrast.abs() > f32::EPSILON {
        adjust_contrast(&mut gray, profile.contrast);
    }

    if let Some(max) = profile.threshold_max {
        threshold_max(&mut gray, max);
    }

    Ok(gray)
}

fn resize(
    img: DynamicImage,
    profile: &PreprocessingProfile,
    limits: &ImageLimits,
) -> Result<DynamicImage> {
    let (width, height) = img.dimensions();

    let (new_width, new_height) = if let Some(target) = profile.resize_height {
        if target == 0 {
            return Err(SolverError::Preprocessing(
                "Resize height must be positive".to_string(),
            ));
        }
        let ratio = target as f32 / height as f32;
        (((width as f32 * ratio).round() as u32).max(1), target)
    } else if (profile.scale - 1.0).abs() > f32::EPSILON {
        if profile.scale <= 0.0 || !profile.scale.is_finite() {
            return Err(SolverError::Preprocessing(format!(
                "Invalid scale factor {}",
                profile.scale
            )));
        }
        (
            ((width as f32 * profile.scale).round() as u32).max(1),
            ((height as f32 * profile.scale).round() as u32).max(1),
        )
    } else {
        return Ok(img);
    };

    if (new_width, new_height) == (width, height) {
        return Ok(img);
    }
    limits.check_upper(new_width, new_height)?;

    Ok(img.resize_exact(new_width, new_height, FilterType::Lanczos3))
}

/// Remove the border that shares the top-left pixel's color.
///
/// A uniform image is returned unchanged.
pub fn autocrop(img: DynamicImage) -> DynamicImage {
    match content_bounds(&img) {
        Some((x, y, w, h)) if (w, h) != img.dimensions() => img.crop_imm(x, y, w, h),
        _ => img,
    }
}

pub fn autocrop_gray(gray: GrayImage) -> GrayImage {
    match content_bounds(&gray) {
        Some((x, y, w, h)) if (w, h) != gray.dimensions() => {
            image::imageops::crop_imm(&gray, x, y, w, h).to_image()
        }
        _ => gray,
    }
}

/// Bounding box `(x, y, width, height)` of pixels that differ from the border color.
fn content_bounds<I>(img: &I) -> Option<(u32, u32, u32, u32)>
where
    I: GenericImageView,
    I::Pixel: PartialEq,
{
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let border = img.get_pixel(0, 0);
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0;
    let mut max_y = 0;

    for (x, y, pixel) in img.pixels() {
        if pixel != border {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if min_x == u32::MAX {
        return None;
    }
    Some((min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

/// Push tones away from (level > 0) or toward (level < 0) mid grey.
///
/// Each tone's distance from its nearest extreme is raised to a power derived
/// from `level`; `1.0` is close to a hard binarization and `-1.0` flattens
/// everything to mid grey.
pub fn adjust_contrast(gray: &mut GrayImage, level: f32) {
    let level = level.clamp(-1.0, 1.0);
    let exponent = if level < 0.0 {
        1.0 + level
    } else if level >= 1.0 {
        127.0
    } else {
        1.0 / (1.0 - level)
    };

    let lut: Vec<u8> = (0..=255u8)
        .map(|value| {
            let bright = value > 127;
            let v = value as f32 / 255.0;
            let distance = (if bright { 1.0 - v } else { v }).max(0.0);
            let x = 0.5 * (2.0 * distance).powf(exponent);
            let out = if bright { 1.0 - x } else { x };
            (out * 255.0).round().clamp(0.0, 255.0) as u8
        })
        .collect();

    for pixel in gray.pixels_mut() {
        let value = pixel.channels()[0];
        *pixel = Luma([lut[value as usize]]);
    }
}

/// Force every pixel at or above `max` to white; darker pixels keep their value.
pub fn threshold_max(gray: &mut GrayImage, max: u8) {
    for pixel in gray.pixels_mut() {
        if pixel[0] >= max {
            pixel[0] = 255;
        }
    }
}

/// Surround the image with a white margin.
pub fn pad_white(gray: &GrayImage, margin: u32) -> GrayImage {
    let mut padded = GrayImage::from_pixel(
        gray.width() + 2 * margin,
        gray.height() + 2 * margin,
        Luma([255]),
    );
    image::imageops::replace(&mut padded, gray, margin as i64, margin as i64);
    padded
}
