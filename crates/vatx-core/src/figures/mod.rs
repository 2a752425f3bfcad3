//! VAT figure extraction from extracted content.

pub mod ai;
pub mod amounts;
pub mod heuristic;
pub mod patterns;

pub use ai::{AiBackend, AiFigureExtractor, AiRequest, AiResult};
#[cfg(feature = "ai")]
pub use ai::OllamaBackend;
pub use heuristic::{HeuristicFigureExtractor, HeuristicResult};
