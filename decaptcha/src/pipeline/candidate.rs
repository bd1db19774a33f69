use serde::Serialize;

/// Candidates at or above this length are treated as unreadable noise.
pub const MAX_CANDIDATE_LEN: usize = 12;

/// One attempt's proposed answer.
///
/// `text` only ever holds `A-Z` and is shorter than [`MAX_CANDIDATE_LEN`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub text: String,
    pub confidence: f32,
    pub failed: bool,
}

impl Candidate {
    pub fn new(text: &str, confidence: f32) -> Self {
        let mut text = sanitize(text);
        if text.len() >= MAX_CANDIDATE_LEN {
            text.clear();
        }

        Self {
            text,
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 100.0)
            } else {
                0.0
            },
            failed: false,
        }
    }

    /// Marker for an attempt whose preprocessing or recognition errored.
    pub fn failed() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            failed: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }
}

/// Keep only `A-Z`.
pub fn sanitize(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_uppercase()).collect()
}

/// Median of the values; 0 for an empty slice.
pub fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Rewards the lengths CAPTCHAs in this domain usually have.
pub fn length_bonus(len: usize) -> f32 {
    match len {
        4 => 10.0,
        5 => 6.0,
        6 => 4.0,
        3 => 2.0,
        _ => 0.0,
    }
}
