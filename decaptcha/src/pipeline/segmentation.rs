//! Column-projection glyph segmentation.
//!
//! When whole-image recognition is unreliable, the binarized image is split
//! into vertical bands of ink, each band is recognized as a single character,
//! and the per-glyph results are filtered and stitched back together.

use image::{DynamicImage, GrayImage};
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::ocr::{EngineProvider, PageSegMode};

use super::candidate::{median, sanitize, Candidate};
use super::preprocess::{
    autocrop_gray, encode_png, pad_white, prepare, ImageLimits, PreprocessingProfile,
};
use super::selector::{NOISE_LEADING_CHAR, NOISE_LEADING_MAX_CONFIDENCE};

/// Luma below this counts as ink.
pub const INK_LEVEL: u8 = 128;
pub const DEFAULT_TARGET_HEIGHT: u32 = 150;
pub const DEFAULT_THRESHOLD: u8 = 180;

/// Glyph-count prior: CAPTCHAs in this domain are 4-5 characters.
pub const MIN_GLYPHS: usize = 4;
pub const MAX_GLYPHS: usize = 5;

/// Segments are merged only when more than this many were found.
const MERGE_ABOVE: usize = 6;
const MERGE_MAX_GAP: u32 = 3;
const MIN_GLYPH_CONFIDENCE: f32 = 8.0;
const MIN_WIDTH_RATIO: f32 = 0.6;
/// White margin added around each glyph crop before recognition.
const GLYPH_PADDING: u32 = 8;

/// A contiguous band of ink columns. `end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub start: u32,
    pub end: u32,
    pub width: u32,
}

impl Segment {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end,
            width: end - start + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub ch: char,
    pub confidence: f32,
    pub width: u32,
}

/// Fill in the fixed parts of the segmentation preprocessing.
pub fn segmentation_profile(profile: &PreprocessingProfile) -> PreprocessingProfile {
    PreprocessingProfile {
        preprocess: true,
        autocrop: true,
        resize_height: Some(profile.resize_height.unwrap_or(DEFAULT_TARGET_HEIGHT)),
        threshold_max: Some(profile.threshold_max.unwrap_or(DEFAULT_THRESHOLD)),
        ..profile.clone()
    }
}

/// Number of ink pixels in each column.
pub fn ink_projection(img: &GrayImage) -> Vec<u32> {
    let mut counts = vec![0u32; img.width() as usize];
    for (x, _, pixel) in img.enumerate_pixels() {
        if pixel[0] < INK_LEVEL {
            counts[x as usize] += 1;
        }
    }
    counts
}

/// Locate glyph-sized ink bands, left to right.
pub fn find_segments(img: &GrayImage) -> Vec<Segment> {
    let (width, height) = img.dimensions();
    let projection = ink_projection(img);

    let activity = ((height as f32 * 0.02).floor() as u32).max(1);
    let min_width = ((width as f32 * 0.02).floor() as u32).max(6);

    let mut segments = Vec::new();
    let mut run_start: Option<u32> = None;
    for (x, count) in projection.iter().enumerate() {
        let x = x as u32;
        match (run_start, *count > activity) {
            (None, true) => run_start = Some(x),
            (Some(start), false) => {
                segments.push(Segment::new(start, x - 1));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        segments.push(Segment::new(start, width - 1));
    }

    segments.retain(|s| s.width >= min_width);

    if segments.len() > MERGE_ABOVE {
        segments = merge_close(segments);
    }

    segments.sort_by_key(|s| s.start);
    segments
}

/// Join neighbours separated by at most [`MERGE_MAX_GAP`] blank columns.
fn merge_close(segments: Vec<Segment>) -> Vec<Segment> {
    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match merged.last_mut() {
            Some(last) if segment.start.saturating_sub(last.end + 1) <= MERGE_MAX_GAP => {
                *last = Segment::new(last.start, segment.end.max(last.end));
            }
            _ => merged.push(segment),
        }
    }
    merged
}

/// Keep the leftmost segments up to the glyph-count prior.
pub fn choose_glyph_segments(mut segments: Vec<Segment>) -> Vec<Segment> {
    segments.sort_by_key(|s| s.start);
    segments.truncate(MAX_GLYPHS);
    segments
}

/// Drop noise glyphs and trim the list toward [`MIN_GLYPHS`].
pub fn filter_glyphs(mut glyphs: Vec<Glyph>) -> Vec<Glyph> {
    let widths: Vec<f32> = glyphs.iter().map(|g| g.width as f32).collect();
    let median_width = median(&widths);

    if glyphs.len() >= MAX_GLYPHS
        && glyphs[0].ch == NOISE_LEADING_CHAR
        && glyphs[0].confidence < NOISE_LEADING_MAX_CONFIDENCE
    {
        glyphs.remove(0);
    }

    while glyphs.len() > MIN_GLYPHS {
        let weakest = glyphs
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.confidence.total_cmp(&b.confidence))
            .map(|(i, _)| i);
        match weakest {
            Some(i) => {
                glyphs.remove(i);
            }
            None => break,
        }
    }

    glyphs.retain(|g| {
        g.confidence >= MIN_GLYPH_CONFIDENCE
            && (median_width <= 0.0 || g.width as f32 >= MIN_WIDTH_RATIO * median_width)
    });
    glyphs
}

/// Concatenate glyphs; confidence is their rounded mean.
pub fn assemble(glyphs: &[Glyph]) -> Candidate {
    if glyphs.is_empty() {
        return Candidate::new("", 0.0);
    }
    let text: String = glyphs.iter().map(|g| g.ch).collect();
    let mean = glyphs.iter().map(|g| g.confidence).sum::<f32>() / glyphs.len() as f32;
    Candidate::new(&text, mean.round())
}

/// Per-glyph recognition path.
pub struct SegmentationEngine<'a> {
    engines: &'a EngineProvider,
    whitelist: &'a str,
    limits: ImageLimits,
}

impl<'a> SegmentationEngine<'a> {
    pub fn new(engines: &'a EngineProvider, whitelist: &'a str) -> Self {
        Self {
            engines,
            whitelist,
            limits: ImageLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ImageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Segment and recognize a decoded image.
    ///
    /// An empty, non-failed candidate means no glyph survived filtering.
    pub fn recognize(&self, img: DynamicImage, profile: &PreprocessingProfile) -> Result<Candidate> {
        let prepared = prepare(img, &segmentation_profile(profile), &self.limits)?;

        let segments = find_segments(&prepared);
        let chosen = choose_glyph_segments(segments.clone());
        debug!(
            found = segments.len(),
            chosen = chosen.len(),
            "Segmented image into glyph columns"
        );

        // one engine for every crop of this attempt
        let mut lease = self.engines.acquire()?;
        let mut glyphs = Vec::with_capacity(chosen.len());
        for segment in &chosen {
            let crop = crop_columns(&prepared, segment);
            let png = encode_png(&pad_white(&crop, GLYPH_PADDING))?;
            let result = lease.recognize(&png, self.whitelist, PageSegMode::SingleChar)?;

            if let Some(ch) = sanitize(&result.text).chars().next() {
                glyphs.push(Glyph {
                    ch,
                    confidence: result.confidence,
                    width: segment.width,
                });
            }
        }

        let glyphs = filter_glyphs(glyphs);
        Ok(assemble(&glyphs))
    }
}

fn crop_columns(img: &GrayImage, segment: &Segment) -> GrayImage {
    let crop = image::imageops::crop_imm(img, segment.start, 0, segment.width, img.height())
        .to_image();
    autocrop_gray(crop)
}
