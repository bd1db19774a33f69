use super::candidate::sanitize;

/// Post-hoc corrections applied to the runner's chosen text.
///
/// The substring table patches specific, repeatedly observed misreads. It is
/// empty unless configured (`SOLVER_CORRECTIONS`) so it cannot hide
/// regressions in candidate selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextNormalizer {
    corrections: Vec<(String, String)>,
}

impl TextNormalizer {
    pub fn new(corrections: Vec<(String, String)>) -> Self {
        let corrections = corrections
            .into_iter()
            .map(|(bad, good)| (sanitize(&bad), sanitize(&good)))
            .filter(|(bad, _)| !bad.is_empty())
            .collect();
        Self { corrections }
    }

    pub fn corrections(&self) -> &[(String, String)] {
        &self.corrections
    }

    pub fn normalize(&self, text: &str) -> String {
        let mut text = sanitize(text);

        for (bad, good) in &self.corrections {
            if text.contains(bad.as_str()) {
                text = text.replace(bad.as_str(), good);
            }
        }

        trim_framing_noise(&text).unwrap_or(text)
    }
}

/// `C????E` is usually a four-letter answer with a noise glyph in front.
fn trim_framing_noise(text: &str) -> Option<String> {
    if text.len() > 4 && text.starts_with('C') && text.ends_with('E') {
        let rest = &text[1..];
        if rest.len() == 4 {
            return Some(rest.to_string());
        }
    }
    None
}
