//! Multi-strategy recognition pipeline
//!
//! An ordered [`StrategyTable`] of preprocessing profiles and recognition
//! modes is evaluated by the [`StrategyRunner`] until one [`Candidate`]
//! passes the [`ValidityPolicy`]. Whole-image strategies go through the
//! recognition adapter and the candidate selector; segmented strategies split
//! the image into glyph columns and recognize each one on its own.

mod candidate;
mod normalizer;
mod preprocess;
mod runner;
mod segmentation;
mod selector;
mod strategy;

pub use candidate::{length_bonus, median, sanitize, Candidate, MAX_CANDIDATE_LEN};
pub use normalizer::TextNormalizer;
pub use preprocess::{
    apply_profile, autocrop, autocrop_gray, decode_image, encode_png, prepare, ImageLimits,
    PreprocessingProfile,
};
pub use runner::{AttemptRecord, Outcome, RunReport, StrategyRunner};
pub use segmentation::{
    assemble, choose_glyph_segments, filter_glyphs, find_segments, ink_projection,
    segmentation_profile, Glyph, Segment, SegmentationEngine,
};
pub use selector::{select_candidate, symbol_reading};
pub use strategy::{
    Strategy, StrategyMode, StrategyTable, ValidityPolicy, BUILTIN_TABLE_VERSION,
};
