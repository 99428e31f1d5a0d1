//! Engine assembly and per-query orchestration.
//!
//! All sub-components are supplied at construction, so a missing collaborator
//! fails at assembly time rather than at first use. The engine owns the only
//! shared mutable state (through the tracker) and never mutates it after the
//! reasoning await point, which keeps stale in-flight results harmless.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use tracing::{info, instrument};

use crate::filter;
use crate::preferences::PreferenceTracker;
use crate::query::{ParsedQuery, QueryParser};
use crate::synthesizer::RecommendationSynthesizer;
use crate::types::{Product, RecommendationResult};

pub struct Engine {
    parser: QueryParser,
    tracker: PreferenceTracker,
    synthesizer: RecommendationSynthesizer,
    generation: AtomicU64,
}

/// Result of one `handle_query` call, stamped with its generation so a
/// presentation layer can apply last-query-wins and discard stale outcomes.
#[derive(Debug)]
pub struct QueryOutcome {
    pub generation: u64,
    pub parsed: ParsedQuery,
    pub total_products: usize,
    pub matched_products: usize,
    pub insights: String,
    pub result: RecommendationResult,
}

impl Engine {
    pub fn new(
        parser: QueryParser,
        tracker: PreferenceTracker,
        synthesizer: RecommendationSynthesizer,
    ) -> Self {
        Self {
            parser,
            tracker,
            synthesizer,
            generation: AtomicU64::new(0),
        }
    }

    /// Generation of the most recently started query.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether no newer query has started since this outcome's call began.
    pub fn is_current(&self, outcome: &QueryOutcome) -> bool {
        outcome.generation == self.current_generation()
    }

    /// Access the tracker for browsing events, page context, and reset.
    pub fn tracker(&self) -> &PreferenceTracker {
        &self.tracker
    }

    /// Run one query end to end: parse, learn, filter, synthesize. All
    /// tracker mutation happens before the reasoning call suspends.
    #[instrument(skip(self, products), fields(products = products.len()))]
    pub async fn handle_query(
        &self,
        raw_query: &str,
        products: &[Product],
    ) -> Result<QueryOutcome> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let parsed = self.parser.parse(raw_query);
        self.tracker.learn(raw_query, &parsed)?;

        let matched = filter::filter(products, &parsed);
        let insights = self.tracker.insights();
        info!(
            generation,
            matched = matched.len(),
            "query parsed and candidates filtered"
        );

        let result = if matched.is_empty() {
            RecommendationResult::no_candidates()
        } else {
            let insight_arg = if self.tracker.profile().is_empty() {
                None
            } else {
                Some(insights.as_str())
            };
            self.synthesizer
                .recommend(raw_query, &parsed, &matched, insight_arg)
                .await
        };

        Ok(QueryOutcome {
            generation,
            parsed,
            total_products: products.len(),
            matched_products: matched.len(),
            insights,
            result,
        })
    }
}
