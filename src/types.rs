use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scraped product. Supplied by the page-extraction collaborator and
/// treated as read-only input everywhere in the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub title: String,
    /// Display price as scraped, e.g. `"₹1,199"`. Parsed lazily where needed.
    pub price: String,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub specs: BTreeMap<String, String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub url: String,
}

impl Product {
    /// Whether the extractor assigned a real category ("other" is its
    /// catch-all for unrecognized titles).
    pub fn is_categorized(&self) -> bool {
        !self.category.is_empty() && self.category != "other"
    }

    /// Numeric rating, if the display rating parses as one.
    pub fn numeric_rating(&self) -> Option<f64> {
        self.rating.as_ref().and_then(|r| r.trim().parse().ok())
    }
}

/// Lightweight exposure record kept in the session context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowsedProduct {
    pub title: String,
    pub price: String,
}

impl From<&Product> for BrowsedProduct {
    fn from(product: &Product) -> Self {
        Self {
            title: product.title.clone(),
            price: product.price.clone(),
        }
    }
}

/// One ranked recommendation, from either the reasoning service or the
/// deterministic fallback scorer.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub product: Product,
    /// Match score in `[0, 100]`.
    pub score: f64,
    pub reason: String,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_alignment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preference_deviation: Option<String>,
}

/// Why the synthesizer fell back to deterministic scoring. Callers use this
/// to decide between prompting for setup and plain retry messaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackCause {
    /// No credential configured; the message names the API key so a UI can
    /// prompt for setup instead of retrying.
    MissingApiKey,
    /// Network error, timeout, or non-success HTTP status.
    Transport(String),
    /// The service answered but the body had no usable JSON analysis.
    MalformedResponse(String),
}

impl fmt::Display for FallbackCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackCause::MissingApiKey => {
                write!(f, "API key not configured for the reasoning service")
            }
            FallbackCause::Transport(msg) => write!(f, "reasoning service unavailable: {msg}"),
            FallbackCause::MalformedResponse(msg) => {
                write!(f, "reasoning response unusable: {msg}")
            }
        }
    }
}

/// Which path produced a `RecommendationResult`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSource {
    /// The external reasoning service produced the ranking.
    Reasoning,
    /// The deterministic scorer ran; the cause is inspectable for UI copy.
    Fallback(FallbackCause),
    /// Filtering left no candidates; an explicit empty result, not an error.
    NoCandidates,
}

/// Final output of the synthesizer. Always populated: the fallback path is
/// the terminal recovery and never raises.
#[derive(Debug, Clone)]
pub struct RecommendationResult {
    pub recommendations: Vec<Recommendation>,
    pub summary: String,
    pub build_suggestion: String,
    pub alternatives: String,
    pub source: ResultSource,
}

impl RecommendationResult {
    pub fn no_candidates() -> Self {
        Self {
            recommendations: Vec::new(),
            summary: "No products matched your criteria.".to_string(),
            build_suggestion: String::new(),
            alternatives: String::new(),
            source: ResultSource::NoCandidates,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ResultSource::Fallback(_))
    }
}
