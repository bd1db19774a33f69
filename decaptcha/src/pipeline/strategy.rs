use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};
use crate::ocr::PageSegMode;

use super::candidate::Candidate;
use super::preprocess::PreprocessingProfile;

pub const BUILTIN_TABLE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyMode {
    WholeImage { page_mode: PageSegMode },
    Segmented,
}

/// One slot in the ordered ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    #[serde(default)]
    pub profile: PreprocessingProfile,
    pub mode: StrategyMode,
}

impl Strategy {
    fn whole(name: &str, page_mode: PageSegMode, profile: PreprocessingProfile) -> Self {
        Self {
            name: name.to_string(),
            profile,
            mode: StrategyMode::WholeImage { page_mode },
        }
    }

    fn segmented(name: &str, profile: PreprocessingProfile) -> Self {
        Self {
            name: name.to_string(),
            profile,
            mode: StrategyMode::Segmented,
        }
    }
}

/// Ordered strategies, cheapest and most reliable first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyTable {
    pub version: u32,
    pub strategies: Vec<Strategy>,
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl StrategyTable {
    pub fn builtin() -> Self {
        let base = PreprocessingProfile {
            resize_height: Some(150),
            ..PreprocessingProfile::default()
        };

        Self {
            version: BUILTIN_TABLE_VERSION,
            strategies: vec![
                Strategy::whole(
                    "raw-line",
                    PageSegMode::SingleLine,
                    PreprocessingProfile::passthrough(),
                ),
                Strategy::whole(
                    "grey-line",
                    PageSegMode::SingleLine,
                    PreprocessingProfile {
                        contrast: 0.3,
                        ..base.clone()
                    },
                ),
                Strategy::whole(
                    "threshold-word",
                    PageSegMode::SingleWord,
                    PreprocessingProfile {
                        contrast: 0.5,
                        threshold_max: Some(180),
                        ..base.clone()
                    },
                ),
                Strategy::whole(
                    "scaled-sparse",
                    PageSegMode::SparseText,
                    PreprocessingProfile {
                        scale: 2.0,
                        contrast: 0.4,
                        threshold_max: Some(200),
                        ..PreprocessingProfile::default()
                    },
                ),
                Strategy::whole(
                    "blurred-line",
                    PageSegMode::SingleLine,
                    PreprocessingProfile {
                        blur: Some(1.0),
                        contrast: 0.6,
                        threshold_max: Some(170),
                        ..base.clone()
                    },
                ),
                Strategy::whole(
                    "inverted-line",
                    PageSegMode::SingleLine,
                    PreprocessingProfile {
                        invert: true,
                        contrast: 0.5,
                        threshold_max: Some(160),
                        ..base.clone()
                    },
                ),
                Strategy::segmented(
                    "segmented",
                    PreprocessingProfile {
                        autocrop: true,
                        contrast: 0.5,
                        threshold_max: Some(180),
                        ..base.clone()
                    },
                ),
                Strategy::segmented(
                    "segmented-inverted",
                    PreprocessingProfile {
                        autocrop: true,
                        invert: true,
                        contrast: 0.5,
                        threshold_max: Some(180),
                        ..base
                    },
                ),
            ],
        }
    }

    /// Load a JSON strategy table from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SolverError::Config(format!("Cannot read strategy table {}: {e}", path.display()))
        })?;
        let table: StrategyTable = serde_json::from_str(&raw).map_err(|e| {
            SolverError::Config(format!("Invalid strategy table {}: {e}", path.display()))
        })?;
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<()> {
        if self.strategies.is_empty() {
            return Err(SolverError::Config(
                "Strategy table has no strategies".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for strategy in &self.strategies {
            if strategy.name.trim().is_empty() {
                return Err(SolverError::Config("Strategy with empty name".to_string()));
            }
            if !seen.insert(strategy.name.as_str()) {
                return Err(SolverError::Config(format!(
                    "Duplicate strategy name '{}'",
                    strategy.name
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Decides when a candidate is trustworthy enough to stop the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidityPolicy {
    pub min_length: usize,
    pub max_length: usize,
    /// Confidence a candidate must exceed to be accepted outright.
    pub accept_confidence: f32,
    /// Length accepted regardless of confidence.
    pub preferred_length: usize,
    /// Confidence the best-effort fallback must exceed.
    pub fallback_confidence: f32,
}

impl Default for ValidityPolicy {
    fn default() -> Self {
        Self {
            min_length: 3,
            max_length: 10,
            accept_confidence: 40.0,
            preferred_length: 4,
            fallback_confidence: 30.0,
        }
    }
}

impl ValidityPolicy {
    pub fn is_valid(&self, candidate: &Candidate) -> bool {
        let len = candidate.len();
        !candidate.failed
            && !candidate.is_empty()
            && (self.min_length..=self.max_length).contains(&len)
            && (candidate.confidence > self.accept_confidence || len == self.preferred_length)
    }

    pub fn accepts_fallback(&self, candidate: &Candidate) -> bool {
        !candidate.failed
            && !candidate.is_empty()
            && candidate.confidence > self.fallback_confidence
    }
}
