use serde::{Deserialize, Serialize};

/// Body of `POST /` and `POST /solve`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SolveRequest {
    /// Base64 image, optionally prefixed with a `data:` URI header.
    #[serde(default)]
    pub captcha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResponse {
    pub solution: String,
}

impl SolveResponse {
    pub fn new(solution: impl Into<String>) -> Self {
        Self {
            solution: solution.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new(String::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub engine: String,
    pub strategies: usize,
    pub table_version: u32,
}
