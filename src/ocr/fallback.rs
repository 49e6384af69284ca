use std::path::Path;

use tracing::{debug, warn};

use super::engine::{OcrEngine, PageSegMode};
use super::preprocess::ImagePreprocessor;
use super::score::{ConfidenceScorer, FAST_PATH_THRESHOLD};

/// Layout modes tried on both the original and the preprocessed image once
/// the default pass scores too low.
const FALLBACK_MODES: [PageSegMode; 2] = [PageSegMode::SingleBlock, PageSegMode::SingleColumn];

pub struct OcrController<'a> {
    engine: &'a dyn OcrEngine,
    preprocessor: &'a dyn ImagePreprocessor,
    scorer: &'a ConfidenceScorer,
}

impl<'a> OcrController<'a> {
    pub fn new(
        engine: &'a dyn OcrEngine,
        preprocessor: &'a dyn ImagePreprocessor,
        scorer: &'a ConfidenceScorer,
    ) -> Self {
        Self {
            engine,
            preprocessor,
            scorer,
        }
    }

    pub fn score(&self, text: &str) -> u32 {
        self.scorer.score(text)
    }

    /// Default pass first; unless it reaches the fast-path threshold (or
    /// `force_full` is set) four more passes run and the best-scoring text
    /// wins, earliest first on ties. Engine failures count as empty text.
    pub fn ocr_with_fallback(&self, image: &Path, force_full: bool) -> String {
        let first = self.recognize_or_empty(image, PageSegMode::Auto);
        let first_score = self.scorer.score(&first);

        if first_score >= FAST_PATH_THRESHOLD && !force_full {
            debug!(score = first_score, "OCR fast path accepted");
            return first;
        }

        let mut candidates = vec![first];
        for mode in FALLBACK_MODES {
            candidates.push(self.recognize_or_empty(image, mode));
        }

        match self.preprocessor.preprocess(image) {
            Ok(prepared) => {
                for mode in FALLBACK_MODES {
                    candidates.push(self.recognize_or_empty(&prepared, mode));
                }
            }
            Err(err) => {
                warn!(path = %image.display(), error = %err, "image preprocessing failed");
                candidates.extend(FALLBACK_MODES.iter().map(|_| String::new()));
            }
        }

        let mut best_index = 0;
        let mut best_score = first_score;
        for (index, candidate) in candidates.iter().enumerate().skip(1) {
            let score = self.scorer.score(candidate);
            if score > best_score {
                best_index = index;
                best_score = score;
            }
        }

        debug!(
            first_score,
            best_score,
            best_pass = best_index,
            force_full,
            signals = ?self.scorer.matched_signals(&candidates[best_index]),
            "OCR fallback finished"
        );
        candidates.swap_remove(best_index)
    }

    fn recognize_or_empty(&self, image: &Path, mode: PageSegMode) -> String {
        match self.engine.recognize(image, mode) {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    path = %image.display(),
                    psm = mode.as_arg(),
                    error = %err,
                    "OCR pass failed, treating as empty text"
                );
                String::new()
            }
        }
    }
}
