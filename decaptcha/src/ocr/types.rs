use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Characters the engine is allowed to emit for CAPTCHA text.
pub const UPPERCASE_WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Tesseract page segmentation modes used by the strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSegMode {
    SingleBlock,
    SingleLine,
    SingleWord,
    SingleChar,
    SparseText,
    RawLine,
}

impl PageSegMode {
    /// Numeric value of `tessedit_pageseg_mode`.
    pub fn as_tesseract_value(&self) -> u8 {
        match self {
            PageSegMode::SingleBlock => 6,
            PageSegMode::SingleLine => 7,
            PageSegMode::SingleWord => 8,
            PageSegMode::SingleChar => 10,
            PageSegMode::SparseText => 11,
            PageSegMode::RawLine => 13,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BoundingBox {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn left(&self) -> u32 {
        self.x0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WordCandidate {
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolCandidate {
    pub text: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Normalized output of a single engine invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecognitionResult {
    pub text: String,
    pub confidence: f32,
    pub words: Vec<WordCandidate>,
    pub symbols: Vec<SymbolCandidate>,
}

/// A text recognition engine instance.
///
/// Dropping the instance releases whatever native resources it holds.
pub trait RecognitionEngine: Send {
    fn recognize(
        &mut self,
        image: &[u8],
        whitelist: &str,
        mode: PageSegMode,
    ) -> Result<RecognitionResult>;
}

/// Creates fresh engine instances on demand.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn RecognitionEngine>>;

    /// Short label used in logs and the health endpoint.
    fn name(&self) -> &str;
}
