//! Text recognition adapter
//!
//! Wraps the external text-recognition engine behind a small interface so the
//! pipeline never touches Tesseract directly.
//!
//! # Architecture
//!
//! - [`RecognitionEngine`] recognizes one encoded image with a character
//!   whitelist and a page segmentation mode
//! - [`EngineFactory`] creates engines; [`TesseractFactory`] builds local
//!   Tesseract engines via leptess
//! - [`EngineProvider`] hands out [`EngineLease`]s, either one fresh engine per
//!   attempt or a single shared engine that is torn down after a failed call
//!
//! # Usage
//!
//! ```rust,ignore
//! let provider = EngineProvider::new(Arc::new(TesseractFactory::new(&config.ocr)), false);
//! let mut lease = provider.acquire()?;
//! let result = lease.recognize(&png, UPPERCASE_WHITELIST, PageSegMode::SingleLine)?;
//! ```

mod provider;
mod tesseract;
mod types;

pub use provider::{EngineLease, EngineProvider};
pub use tesseract::{TesseractEngine, TesseractFactory};
pub use types::{
    BoundingBox, EngineFactory, PageSegMode, RecognitionEngine, RecognitionResult,
    SymbolCandidate, WordCandidate, UPPERCASE_WHITELIST,
};
