use serde::Deserialize;
use std::env;

use crate::pipeline::{ImageLimits, ValidityPolicy};

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse `SOLVER_CORRECTIONS`.
/// Format: comma-separated `BAD:GOOD` pairs, e.g. `CATLKE:ATLK,XQQZ:XQZ`
fn parse_corrections() -> Vec<(String, String)> {
    match env::var("SOLVER_CORRECTIONS") {
        Ok(val) if !val.trim().is_empty() => parse_correction_pairs(&val),
        _ => Vec::new(),
    }
}

pub fn parse_correction_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (bad, good) = pair.split_once(':')?;
            let bad = bad.trim().to_ascii_uppercase();
            let good = good.trim().to_ascii_uppercase();
            if bad.is_empty() {
                tracing::warn!(
                    "Invalid correction pair '{}' in SOLVER_CORRECTIONS, skipping",
                    pair
                );
                None
            } else {
                Some((bad, good))
            }
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub ocr: OcrConfig,
    pub solver: SolverConfig,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    pub languages: String,
    pub data_path: Option<String>,
    /// Keep one long-lived engine handle instead of one per attempt.
    pub reuse_engine: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolverConfig {
    pub timeout_secs: u64,
    pub strategies_path: Option<String>,
    pub corrections: Vec<(String, String)>,
    pub policy: ValidityPolicy,
    pub image_limits: ImageLimits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: "eng".to_string(),
            data_path: None,
            reuse_engine: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let defaults = ValidityPolicy::default();
        let limits = ImageLimits::default();

        Self {
            server: ServerConfig {
                host: env::var("DECAPTCHA_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or("DECAPTCHA_PORT", 3000),
                max_body_bytes: parse_env_or("DECAPTCHA_MAX_BODY_BYTES", 2 * 1024 * 1024),
            },
            ocr: OcrConfig {
                languages: env::var("OCR_LANGUAGES").unwrap_or_else(|_| "eng".to_string()),
                data_path: env::var("OCR_DATA_PATH").ok(),
                reuse_engine: parse_env_or("OCR_REUSE_ENGINE", false),
            },
            solver: SolverConfig {
                timeout_secs: parse_env_or("SOLVER_TIMEOUT_SECS", 20),
                strategies_path: env::var("SOLVER_STRATEGIES_PATH").ok(),
                corrections: parse_corrections(),
                policy: ValidityPolicy {
                    min_length: parse_env_or("SOLVER_MIN_LENGTH", defaults.min_length),
                    max_length: parse_env_or("SOLVER_MAX_LENGTH", defaults.max_length),
                    accept_confidence: parse_env_or(
                        "SOLVER_ACCEPT_CONFIDENCE",
                        defaults.accept_confidence,
                    ),
                    preferred_length: parse_env_or(
                        "SOLVER_PREFERRED_LENGTH",
                        defaults.preferred_length,
                    ),
                    fallback_confidence: parse_env_or(
                        "SOLVER_FALLBACK_CONFIDENCE",
                        defaults.fallback_confidence,
                    ),
                },
                image_limits: ImageLimits {
                    min_dimension: parse_env_or("IMAGE_MIN_DIMENSION", limits.min_dimension),
                    max_dimension: parse_env_or("IMAGE_MAX_DIMENSION", limits.max_dimension),
                    max_pixels: parse_env_or("IMAGE_MAX_PIXELS", limits.max_pixels),
                },
            },
            log_format: parse_env_or("LOG_FORMAT", LogFormat::Text),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}
