// Common test utilities for integration tests
#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use base64::Engine as _;
use image::{GrayImage, ImageFormat, Luma};

use decaptcha::error::{Result, SolverError};
use decaptcha::ocr::{EngineFactory, PageSegMode, RecognitionEngine, RecognitionResult};

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

pub const GLYPH_HEIGHT: u32 = 150;
pub const GLYPH_GAP: u32 = 20;
pub const MARGIN: u32 = 10;

/// Bar widths the [`GlyphWidthFactory`] engine reads as `A`, `T`, `L`, `K`.
pub const ATLK_WIDTHS: [u32; 4] = [20, 26, 32, 38];
const WIDTH_LETTERS: [(u32, char); 4] = [(20, 'A'), (26, 'T'), (32, 'L'), (38, 'K')];

/// White PNG with one full-height black bar per width, separated by
/// [`GLYPH_GAP`] columns and surrounded by a [`MARGIN`] border.
pub fn glyph_png(widths: &[u32]) -> Vec<u8> {
    let content: u32 = widths.iter().sum::<u32>() + GLYPH_GAP * widths.len().saturating_sub(1) as u32;
    let mut img = GrayImage::from_pixel(content + 2 * MARGIN, GLYPH_HEIGHT + 2 * MARGIN, Luma([255]));

    let mut x = MARGIN;
    for width in widths {
        for dx in 0..*width {
            for y in MARGIN..MARGIN + GLYPH_HEIGHT {
                img.put_pixel(x + dx, y, Luma([0]));
            }
        }
        x += width + GLYPH_GAP;
    }

    encode(&img)
}

pub fn encode(img: &GrayImage) -> Vec<u8> {
    let mut output = Vec::new();
    img.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
        .expect("Failed to encode test PNG");
    output
}

pub fn to_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Number of columns holding at least one ink pixel.
pub fn ink_columns(png: &[u8]) -> u32 {
    let img = image::load_from_memory(png)
        .expect("engine received an undecodable image")
        .to_luma8();
    (0..img.width())
        .filter(|x| (0..img.height()).any(|y| img.get_pixel(*x, y)[0] < 128))
        .count() as u32
}

/// Shared call counters for fake engines.
#[derive(Default)]
pub struct Calls {
    pub created: AtomicUsize,
    pub whole: AtomicUsize,
    pub glyph: AtomicUsize,
}

impl Calls {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn whole(&self) -> usize {
        self.whole.load(Ordering::SeqCst)
    }

    pub fn glyph(&self) -> usize {
        self.glyph.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.whole() + self.glyph()
    }
}

/// Whole-image calls return a fixed low-quality reading; single-character
/// calls read the glyph from its ink width.
pub struct GlyphWidthEngine {
    calls: Arc<Calls>,
    whole_text: String,
    whole_confidence: f32,
    glyph_confidence: f32,
}

impl RecognitionEngine for GlyphWidthEngine {
    fn recognize(&mut self, image: &[u8], _whitelist: &str, mode: PageSegMode) -> Result<RecognitionResult> {
        if mode != PageSegMode::SingleChar {
            self.calls.whole.fetch_add(1, Ordering::SeqCst);
            return Ok(RecognitionResult {
                text: self.whole_text.clone(),
                confidence: self.whole_confidence,
                ..Default::default()
            });
        }

        self.calls.glyph.fetch_add(1, Ordering::SeqCst);
        let width = ink_columns(image);
        let letter = WIDTH_LETTERS
            .iter()
            .find(|(w, _)| w.abs_diff(width) <= 2)
            .map(|(_, ch)| *ch);

        Ok(match letter {
            Some(ch) => RecognitionResult {
                text: ch.to_string(),
                confidence: self.glyph_confidence,
                ..Default::default()
            },
            None => RecognitionResult::default(),
        })
    }
}

pub struct GlyphWidthFactory {
    pub calls: Arc<Calls>,
    pub whole_text: String,
    pub whole_confidence: f32,
    pub glyph_confidence: f32,
}

impl GlyphWidthFactory {
    /// Whole-image reads give `"AT"` at 35; glyph reads are confident.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Calls::default()),
            whole_text: "AT".to_string(),
            whole_confidence: 35.0,
            glyph_confidence: 90.0,
        }
    }

    pub fn with_whole(mut self, text: &str, confidence: f32) -> Self {
        self.whole_text = text.to_string();
        self.whole_confidence = confidence;
        self
    }

    pub fn with_glyph_confidence(mut self, confidence: f32) -> Self {
        self.glyph_confidence = confidence;
        self
    }
}

impl EngineFactory for GlyphWidthFactory {
    fn create(&self) -> Result<Box<dyn RecognitionEngine>> {
        self.calls.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(GlyphWidthEngine {
            calls: self.calls.clone(),
            whole_text: self.whole_text.clone(),
            whole_confidence: self.whole_confidence,
            glyph_confidence: self.glyph_confidence,
        }))
    }

    fn name(&self) -> &str {
        "glyph-width"
    }
}

/// What a [`ScriptedEngine`] does on each call.
#[derive(Clone)]
pub enum Step {
    Read(&'static str, f32),
    Fail,
    Panic,
    Sleep(Duration, &'static str, f32),
}

/// Replays one [`Step`] on every call. The first `broken_engines` engines
/// created fail every call instead.
pub struct ScriptedFactory {
    pub calls: Arc<Calls>,
    pub step: Step,
    pub broken_engines: usize,
}

impl ScriptedFactory {
    pub fn new(step: Step) -> Self {
        Self {
            calls: Arc::new(Calls::default()),
            step,
            broken_engines: 0,
        }
    }

    pub fn with_broken_engines(mut self, count: usize) -> Self {
        self.broken_engines = count;
        self
    }
}

pub struct ScriptedEngine {
    calls: Arc<Calls>,
    step: Step,
    broken: bool,
}

impl RecognitionEngine for ScriptedEngine {
    fn recognize(&mut self, _image: &[u8], _whitelist: &str, _mode: PageSegMode) -> Result<RecognitionResult> {
        self.calls.whole.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(SolverError::Recognition("engine state corrupted".to_string()));
        }

        let (text, confidence) = match &self.step {
            Step::Read(text, confidence) => (*text, *confidence),
            Step::Fail => return Err(SolverError::Recognition("scripted failure".to_string())),
            Step::Panic => panic!("scripted engine panic"),
            Step::Sleep(duration, text, confidence) => {
                std::thread::sleep(*duration);
                (*text, *confidence)
            }
        };

        Ok(RecognitionResult {
            text: text.to_string(),
            confidence,
            ..Default::default()
        })
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(&self) -> Result<Box<dyn RecognitionEngine>> {
        let index = self.calls.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedEngine {
            calls: self.calls.clone(),
            step: self.step.clone(),
            broken: index < self.broken_engines,
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
