//! Concept ↔ notebook matching for the qpattern pipeline
//!
//! - `knowledge_base`: enriched concept → pattern mappings and consolidation
//! - `embeddings`: the `Embedder` seam (token-hash offline, Ollama online)
//! - `dedup`: near-duplicate concept removal by summary similarity
//! - `matching`: the name/summary similarity engine writing the match CSV

pub mod dedup;
pub mod embeddings;
pub mod knowledge_base;
pub mod matching;

pub use dedup::*;
pub use embeddings::*;
pub use knowledge_base::*;
pub use matching::*;
