//! Field extraction strategies bound per-field in a rule's
//! `ExtractionMap`: regex, text/regex anchor, and OCR-box table
//! clustering, plus the confidence-synthesis formulas shared by those
//! strategies and by LLM-schema field results. [`consistency`] holds the
//! structural-similarity scoring used by the orchestrator's OCR-vs-LLM
//! consistency-check stage.

mod anchor_strategy;
mod confidence;
mod engine;
pub mod consistency;
mod regex_strategy;
mod table_strategy;
mod value;

pub use confidence::{calculate_llm_confidence, calculate_match_confidence, fuzzy_match_in_text};
pub use engine::{run, EngineResult};
pub use value::ExtractedValue;
