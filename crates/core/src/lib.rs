//! Turn resolution engine for a spoken spelling drill.
//!
//! A turn flows through intent classification, multi-source transcript
//! fusion, deterministic phonetic letter parsing (with a generative-model
//! fallback), dual-path grading, and the session state machine. Everything
//! external — the chat model, speech-to-text, the durable store — sits
//! behind a trait so the engine itself stays synchronous, deterministic,
//! and testable.

pub mod assistant;
pub mod extract;
pub mod grade;
pub mod intent;
pub mod letters;
pub mod lexicon;
pub mod session;
pub mod store;
pub mod turn;
