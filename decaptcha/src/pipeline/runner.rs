use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::ocr::EngineProvider;

use super::candidate::Candidate;
use super::normalizer::TextNormalizer;
use super::preprocess::{apply_profile, decode_image, ImageLimits};
use super::segmentation::SegmentationEngine;
use super::selector::select_candidate;
use super::strategy::{Strategy, StrategyMode, StrategyTable, ValidityPolicy};

/// Terminal state of one run. All three are successful answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Accepted { text: String, strategy: String },
    BestEffort { text: String, strategy: String },
    Empty,
}

impl Outcome {
    pub fn solution(&self) -> &str {
        match self {
            Outcome::Accepted { text, .. } | Outcome::BestEffort { text, .. } => text,
            Outcome::Empty => "",
        }
    }

    pub fn strategy(&self) -> Option<&str> {
        match self {
            Outcome::Accepted { strategy, .. } | Outcome::BestEffort { strategy, .. } => {
                Some(strategy)
            }
            Outcome::Empty => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub strategy: String,
    pub candidate: Candidate,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: Outcome,
    pub attempts: Vec<AttemptRecord>,
}

impl RunReport {
    pub fn solution(&self) -> &str {
        self.outcome.solution()
    }
}

/// Evaluates the strategy table in order against one image.
#[derive(Clone)]
pub struct StrategyRunner {
    table: StrategyTable,
    policy: ValidityPolicy,
    normalizer: TextNormalizer,
    engines: EngineProvider,
    whitelist: String,
    limits: ImageLimits,
}

impl StrategyRunner {
    pub fn new(
        table: StrategyTable,
        policy: ValidityPolicy,
        normalizer: TextNormalizer,
        engines: EngineProvider,
    ) -> Self {
        Self {
            table,
            policy,
            normalizer,
            engines,
            whitelist: crate::ocr::UPPERCASE_WHITELIST.to_string(),
            limits: ImageLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ImageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn table(&self) -> &StrategyTable {
        &self.table
    }

    pub fn policy(&self) -> &ValidityPolicy {
        &self.policy
    }

    pub fn engines(&self) -> &EngineProvider {
        &self.engines
    }

    /// Run strategies until one is valid, the table is exhausted or the
    /// deadline passes. Blocking; call from a blocking thread.
    pub fn run(&self, image: &[u8], deadline: Option<Instant>) -> RunReport {
        let mut attempts = Vec::with_capacity(self.table.len());
        let mut best: Option<(String, Candidate)> = None;

        for strategy in &self.table.strategies {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(
                    strategy = %strategy.name,
                    attempted = attempts.len(),
                    "Deadline reached, skipping remaining strategies"
                );
                break;
            }

            let started = Instant::now();
            let candidate = self.attempt(strategy, image).unwrap_or_else(|e| {
                warn!(strategy = %strategy.name, error = %e, "Strategy failed");
                Candidate::failed()
            });
            let elapsed = started.elapsed();

            debug!(
                strategy = %strategy.name,
                text = %candidate.text,
                confidence = candidate.confidence,
                failed = candidate.failed,
                elapsed_ms = elapsed.as_millis() as u64,
                "Strategy attempt finished"
            );

            let valid = self.policy.is_valid(&candidate);
            let improves = !candidate.failed
                && !candidate.is_empty()
                && best
                    .as_ref()
                    .map_or(true, |(_, b)| candidate.confidence > b.confidence);
            if improves {
                best = Some((strategy.name.clone(), candidate.clone()));
            }

            attempts.push(AttemptRecord {
                strategy: strategy.name.clone(),
                candidate: candidate.clone(),
                elapsed,
            });

            if valid {
                let text = self.normalizer.normalize(&candidate.text);
                info!(strategy = %strategy.name, solution = %text, "Candidate accepted");
                return RunReport {
                    outcome: Outcome::Accepted {
                        text,
                        strategy: strategy.name.clone(),
                    },
                    attempts,
                };
            }
        }

        let outcome = match best {
            Some((strategy, candidate)) if self.policy.accepts_fallback(&candidate) => {
                let text = self.normalizer.normalize(&candidate.text);
                info!(
                    strategy = %strategy,
                    solution = %text,
                    confidence = candidate.confidence,
                    "Returning best-effort candidate"
                );
                Outcome::BestEffort { text, strategy }
            }
            _ => {
                info!(attempted = attempts.len(), "No usable candidate");
                Outcome::Empty
            }
        };

        RunReport { outcome, attempts }
    }

    fn attempt(&self, strategy: &Strategy, image: &[u8]) -> Result<Candidate> {
        match &strategy.mode {
            StrategyMode::WholeImage { page_mode } => {
                let prepared = apply_profile(image, &strategy.profile, &self.limits)?;
                let result = {
                    let mut lease = self.engines.acquire()?;
                    lease.recognize(&prepared, &self.whitelist, *page_mode)?
                };
                Ok(select_candidate(&result))
            }
            StrategyMode::Segmented => {
                let img = decode_image(image, &self.limits)?;
                SegmentationEngine::new(&self.engines, &self.whitelist)
                    .with_limits(self.limits)
                    .recognize(img, &strategy.profile)
            }
        }
    }
}
