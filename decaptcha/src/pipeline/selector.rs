use tracing::trace;

use crate::ocr::{RecognitionResult, SymbolCandidate};

use super::candidate::{length_bonus, median, Candidate};

/// Readings outside this length window are never preferred over the full text.
pub const PLAUSIBLE_LENGTH: std::ops::RangeInclusive<usize> = 3..=10;

/// Symbols below this confidence are discarded.
pub const MIN_SYMBOL_CONFIDENCE: f32 = 10.0;

/// Symbols shorter than this fraction of the median glyph height are discarded.
pub const MIN_HEIGHT_RATIO: f32 = 0.6;

/// A leading glyph that is frequently hallucinated from background noise.
pub const NOISE_LEADING_CHAR: char = 'C';
pub const NOISE_LEADING_MAX_CONFIDENCE: f32 = 12.0;

/// Length that earns the baseline a bonus when compared with symbol readings.
const BASELINE_BONUS_LENGTH: usize = 4;
const BASELINE_BONUS: f32 = 10.0;

/// Pick the most trustworthy reading out of one recognition result.
///
/// The full text is the baseline. The best plausible word replaces it when at
/// least as confident, and the reading assembled from individual symbols
/// replaces that when its length-weighted score is at least as high.
pub fn select_candidate(result: &RecognitionResult) -> Candidate {
    let mut best = Candidate::new(&result.text, result.confidence);

    if let Some(word) = best_word(result) {
        if word.confidence >= best.confidence {
            trace!(word = %word.text, confidence = word.confidence, "Word reading preferred");
            best = word;
        }
    }

    if let Some(symbols) = symbol_reading(&result.symbols) {
        let baseline_score = best.confidence
            + if best.len() == BASELINE_BONUS_LENGTH {
                BASELINE_BONUS
            } else {
                0.0
            };
        let score = symbols.confidence + length_bonus(symbols.len());

        if PLAUSIBLE_LENGTH.contains(&symbols.len()) && score >= baseline_score {
            trace!(
                symbols = %symbols.text,
                score,
                baseline_score,
                "Symbol reading preferred"
            );
            best = symbols;
        }
    }

    best
}

fn best_word(result: &RecognitionResult) -> Option<Candidate> {
    result
        .words
        .iter()
        .map(|w| Candidate::new(&w.text, w.confidence))
        .filter(|c| PLAUSIBLE_LENGTH.contains(&c.len()))
        .fold(None, |best: Option<Candidate>, c| match best {
            Some(b) if b.confidence >= c.confidence => Some(b),
            _ => Some(c),
        })
}

/// Assemble a left-to-right reading from per-character results.
pub fn symbol_reading(symbols: &[SymbolCandidate]) -> Option<Candidate> {
    let letters: Vec<(char, &SymbolCandidate)> = symbols
        .iter()
        .filter_map(|s| single_letter(&s.text).map(|ch| (ch, s)))
        .collect();
    if letters.is_empty() {
        return None;
    }

    let heights: Vec<f32> = letters.iter().map(|(_, s)| s.bbox.height() as f32).collect();
    let median_height = median(&heights);

    let mut kept: Vec<(char, &SymbolCandidate)> = letters
        .into_iter()
        .filter(|(_, s)| s.confidence >= MIN_SYMBOL_CONFIDENCE)
        .filter(|(_, s)| {
            median_height <= 0.0 || s.bbox.height() as f32 >= MIN_HEIGHT_RATIO * median_height
        })
        .collect();
    kept.sort_by_key(|(_, s)| s.bbox.left());

    let noisy_lead = kept.first().is_some_and(|(ch, s)| {
        *ch == NOISE_LEADING_CHAR && s.confidence < NOISE_LEADING_MAX_CONFIDENCE
    });
    if noisy_lead && kept.len() > 2 {
        kept.remove(0);
    }

    if kept.is_empty() {
        return None;
    }

    let text: String = kept.iter().map(|(ch, _)| *ch).collect();
    let average = kept.iter().map(|(_, s)| s.confidence).sum::<f32>() / kept.len() as f32;
    Some(Candidate::new(&text, average))
}

fn single_letter(text: &str) -> Option<char> {
    let mut chars = text.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) if ch.is_ascii_uppercase() => Some(ch),
        _ => None,
    }
}
