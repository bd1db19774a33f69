use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::config::SolverConfig;
use crate::error::{Result, SolverError};
use crate::ocr::EngineProvider;
use crate::pipeline::{RunReport, StrategyRunner, StrategyTable, TextNormalizer, ValidityPolicy};

/// Extra time the blocking task gets past the runner's own deadline check.
const TIMEOUT_GRACE: Duration = Duration::from_secs(2);

/// Turns a base64 CAPTCHA into an answer, never failing the caller.
#[derive(Clone)]
pub struct SolverService {
    runner: Arc<StrategyRunner>,
    timeout: Option<Duration>,
}

impl SolverService {
    pub fn new(runner: StrategyRunner, timeout: Option<Duration>) -> Self {
        Self {
            runner: Arc::new(runner),
            timeout,
        }
    }

    pub fn from_config(config: &SolverConfig, engines: EngineProvider) -> Result<Self> {
        let table = match &config.strategies_path {
            Some(path) => {
                let table = StrategyTable::load(path)?;
                info!(
                    path = %path,
                    version = table.version,
                    strategies = table.len(),
                    "Loaded strategy table"
                );
                table
            }
            None => StrategyTable::builtin(),
        };

        let normalizer = TextNormalizer::new(config.corrections.clone());
        if !normalizer.corrections().is_empty() {
            info!(
                corrections = normalizer.corrections().len(),
                "Text corrections enabled"
            );
        }

        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        let runner = StrategyRunner::new(table, config.policy.clone(), normalizer, engines)
            .with_limits(config.image_limits);
        Ok(Self::new(runner, timeout))
    }

    pub fn table(&self) -> &StrategyTable {
        self.runner.table()
    }

    pub fn policy(&self) -> &ValidityPolicy {
        self.runner.policy()
    }

    pub fn engine_available(&self) -> bool {
        self.runner.engines().is_available()
    }

    pub fn engine_name(&self) -> &str {
        self.runner.engines().engine_name()
    }

    /// Solve a base64 (optionally data-URI) CAPTCHA.
    ///
    /// Every failure, including panics inside the pipeline, becomes `""`.
    pub async fn solve(&self, captcha: &str) -> String {
        let request_id = Uuid::new_v4();
        let span = info_span!("solve", request_id = %request_id);

        async move {
            let started = Instant::now();
            let result = match decode_captcha(captcha) {
                Ok(image) => self.run(image).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(report) => {
                    info!(
                        solution = %report.solution(),
                        attempts = report.attempts.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Solved captcha"
                    );
                    report.solution().to_string()
                }
                Err(e) if e.is_input_error() => {
                    warn!(error = %e, "Rejected captcha input");
                    String::new()
                }
                Err(e) => {
                    error!(error = %e, "Captcha solving failed");
                    String::new()
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run the strategy table on a decoded image off the async runtime.
    pub async fn run(&self, image: Vec<u8>) -> Result<RunReport> {
        let runner = Arc::clone(&self.runner);
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let span = Span::current();

        debug!(bytes = image.len(), "Running strategy table");
        let task = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            runner.run(&image, deadline)
        });

        let joined = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout + TIMEOUT_GRACE, task)
                .await
                .map_err(|_| {
                    SolverError::Internal(format!(
                        "Solver timed out after {} seconds",
                        timeout.as_secs()
                    ))
                })?,
            None => task.await,
        };

        joined.map_err(|e| SolverError::Internal(format!("Solver task failed: {e}")))
    }
}

/// Strip an optional `data:...;base64,` header and decode the payload.
pub fn decode_captcha(captcha: &str) -> Result<Vec<u8>> {
    let payload = match captcha.trim().strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| SolverError::Input("Data URI without payload".to_string()))?,
        None => captcha,
    };

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(SolverError::Input("Empty captcha".to_string()));
    }

    let bytes = base64::engine::general_purpose::STANDARD.decode(compact.as_bytes())?;
    if bytes.is_empty() {
        return Err(SolverError::Input("Captcha decoded to no bytes".to_string()));
    }
    Ok(bytes)
}
