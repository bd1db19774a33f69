use leptess::{LepTess, Variable};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::config::OcrConfig;
use crate::error::{Result, SolverError};

use super::types::{
    BoundingBox, EngineFactory, PageSegMode, RecognitionEngine, RecognitionResult,
    SymbolCandidate, WordCandidate,
};

/// Local Tesseract engine backed by leptess.
pub struct TesseractEngine {
    lt: LepTess,
}

impl TesseractEngine {
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let lt = LepTess::new(config.data_path.as_deref(), &config.languages)
            .map_err(|e| SolverError::EngineUnavailable(format!("Tesseract not available: {e}")))?;
        Ok(Self { lt })
    }

    fn configure(&mut self, whitelist: &str, mode: PageSegMode) -> Result<()> {
        self.lt
            .set_variable(Variable::TesseditCharWhitelist, whitelist)
            .map_err(|e| SolverError::Recognition(format!("Failed to set whitelist: {e}")))?;
        self.lt
            .set_variable(
                Variable::TesseditPagesegMode,
                &mode.as_tesseract_value().to_string(),
            )
            .map_err(|e| SolverError::Recognition(format!("Failed to set page mode: {e}")))?;
        self.lt
            .set_variable(Variable::HocrCharBoxes, "1")
            .map_err(|e| SolverError::Recognition(format!("Failed to enable char boxes: {e}")))?;
        Ok(())
    }
}

impl RecognitionEngine for TesseractEngine {
    fn recognize(
        &mut self,
        image: &[u8],
        whitelist: &str,
        mode: PageSegMode,
    ) -> Result<RecognitionResult> {
        self.configure(whitelist, mode)?;

        self.lt
            .set_image_from_mem(image)
            .map_err(|e| SolverError::Recognition(format!("Failed to set image: {e}")))?;

        let hocr = self
            .lt
            .get_hocr_text(0)
            .map_err(|e| SolverError::Recognition(format!("Failed to extract hOCR: {e}")))?;
        let text = self
            .lt
            .get_utf8_text()
            .map_err(|e| SolverError::Recognition(format!("Failed to extract text: {e}")))?;
        let confidence = self.lt.mean_text_conf().clamp(0, 100) as f32;

        let (words, symbols) = parse_hocr(&hocr)?;
        debug!(
            text = %text.trim(),
            confidence,
            words = words.len(),
            symbols = symbols.len(),
            "Tesseract recognition finished"
        );

        Ok(RecognitionResult {
            text: text.trim().to_string(),
            confidence,
            words,
            symbols,
        })
    }
}

/// Builds a fresh [`TesseractEngine`] for every lease.
pub struct TesseractFactory {
    config: OcrConfig,
}

impl TesseractFactory {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl EngineFactory for TesseractFactory {
    fn create(&self) -> Result<Box<dyn RecognitionEngine>> {
        Ok(Box::new(TesseractEngine::new(&self.config)?))
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| SolverError::Internal(format!("Bad selector {css}: {e}")))
}

/// Extract word and character candidates from Tesseract hOCR output.
///
/// Character boxes (`ocrx_cinfo`) only appear when `hocr_char_boxes` is set.
pub(crate) fn parse_hocr(hocr: &str) -> Result<(Vec<WordCandidate>, Vec<SymbolCandidate>)> {
    let document = Html::parse_fragment(hocr);
    let word_selector = selector("span.ocrx_word")?;
    let char_selector = selector("span.ocrx_cinfo")?;

    let mut words = Vec::new();
    let mut symbols = Vec::new();

    for word in document.select(&word_selector) {
        let title = word.value().attr("title").unwrap_or_default();
        let confidence = title_number(title, "x_wconf").unwrap_or(0.0);
        words.push(WordCandidate {
            text: element_text(&word),
            confidence,
        });

        for ch in word.select(&char_selector) {
            let title = ch.value().attr("title").unwrap_or_default();
            let Some(bbox) = title_bbox(title, "x_bboxes") else {
                continue;
            };
            symbols.push(SymbolCandidate {
                text: element_text(&ch),
                confidence: title_number(title, "x_conf").unwrap_or(0.0),
                bbox,
            });
        }
    }

    Ok((words, symbols))
}

fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::chars)
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Values of one `key v1 v2 ...` property inside an hOCR title attribute.
fn title_property<'a>(title: &'a str, key: &str) -> Option<Vec<&'a str>> {
    title.split(';').map(str::trim).find_map(|prop| {
        let mut parts = prop.split_whitespace();
        (parts.next()? == key).then(|| parts.collect())
    })
}

fn title_number(title: &str, key: &str) -> Option<f32> {
    title_property(title, key)?.first()?.parse().ok()
}

fn title_bbox(title: &str, key: &str) -> Option<BoundingBox> {
    let values = title_property(title, key)?;
    let coords: Vec<u32> = values.iter().filter_map(|v| v.parse().ok()).collect();
    match coords.as_slice() {
        [x0, y0, x1, y1, ..] => Some(BoundingBox::new(*x0, *y0, *x1, *y1)),
        _ => None,
    }
}
