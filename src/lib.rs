//! Query understanding and preference-learning engine for shopping
//! recommendations.
//!
//! Pipeline: raw query → [`query::QueryParser`] → `ParsedQuery` →
//! [`preferences::PreferenceTracker::learn`] and [`filter::filter`] →
//! [`synthesizer::RecommendationSynthesizer`] → ranked, explained
//! recommendations. When the external reasoning service is unavailable or
//! answers with malformed output, a deterministic fallback scorer produces
//! the ranking instead.

pub mod engine;
pub mod filter;
pub mod preferences;
pub mod query;
pub mod reasoning;
pub mod settings;
pub mod store;
pub mod synthesizer;
pub mod types;

pub use engine::{Engine, QueryOutcome};
pub use query::{Budget, BudgetOp, ParsedQuery, QueryParser, SpecValue};
pub use types::{
    FallbackCause, Product, Recommendation, RecommendationResult, ResultSource,
};
