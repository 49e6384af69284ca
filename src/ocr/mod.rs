//! OCR passes over rendered page images, with a cheap default pass and a
//! score-driven fallback.

mod engine;
mod fallback;
mod preprocess;
mod rasterize;
mod score;


pub use engine::{OcrEngine, PageSegMode, TesseractCli};
pub use fallback::OcrController;
pub use preprocess::{DocumentPreprocessor, ImagePreprocessor};
pub use rasterize::{PageRasterizer, PopplerTools};
pub use score::{ConfidenceScorer, FAST_PATH_THRESHOLD};
