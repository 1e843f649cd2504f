//! partsage-agent
//!
//! The question-answering core: intent classification with a rule fallback,
//! per-intent retrieval with a single semantic fallback, context fusion and
//! grounded answer synthesis. Stores and the model are reached only through
//! the `partsage_core::traits` boundary.
pub mod assistant;
pub mod classifier;
pub mod fusion;
pub mod guard;
pub mod router;
pub mod rules;
pub mod synthesizer;

pub use assistant::Assistant;
pub use classifier::IntentClassifier;
pub use fusion::fuse;
pub use router::{RetrievalRouter, RouteOutcome};
pub use synthesizer::AnswerSynthesizer;
