//! Recommendation synthesis.
//!
//! Builds the reasoning request, validates and repairs the response, and
//! falls back to a deterministic scorer whenever the service cannot be used.
//! `recommend` always resolves with a usable ranking.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::filter::numeric_price;
use crate::query::{BudgetOp, ParsedQuery};
use crate::reasoning::{ReasoningError, ReasoningService};
use crate::types::{
    FallbackCause, Product, Recommendation, RecommendationResult, ResultSource,
};

/// Candidate cap before building the reasoning request, bounding its size.
const MAX_CANDIDATES: usize = 20;
/// How many products the fallback path returns.
const FALLBACK_LIMIT: usize = 5;

const FALLBACK_REASON: &str = "Recommended based on rating and price analysis";
const FALLBACK_CON: &str = "Limited analysis without AI";
const FALLBACK_COMPATIBILITY: &str = "Please verify compatibility manually";
const FALLBACK_BUILD_SUGGESTION: &str =
    "Please consult with hardware experts for complete build suggestions.";
const FALLBACK_ALTERNATIVES: &str =
    "Consider checking user reviews and specifications manually.";

pub struct RecommendationSynthesizer {
    service: Arc<dyn ReasoningService>,
    call_timeout: Duration,
}

impl RecommendationSynthesizer {
    pub fn new(service: Arc<dyn ReasoningService>, call_timeout: Duration) -> Self {
        Self {
            service,
            call_timeout,
        }
    }

    /// Rank the filtered candidates. Never fails: any reasoning-side problem
    /// demotes to the deterministic fallback with an inspectable cause.
    #[instrument(skip_all, fields(candidates = products.len()))]
    pub async fn recommend(
        &self,
        raw_query: &str,
        parsed: &ParsedQuery,
        products: &[Product],
        insights: Option<&str>,
    ) -> RecommendationResult {
        let candidates = &products[..products.len().min(MAX_CANDIDATES)];
        let prompt = build_prompt(raw_query, parsed, candidates, insights);

        let response = match timeout(self.call_timeout, self.service.complete(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!(error = %err, "reasoning call failed; using fallback scorer");
                return fallback(candidates, parsed, cause_of(err));
            }
            Err(_) => {
                warn!(timeout = ?self.call_timeout, "reasoning call timed out; using fallback scorer");
                return fallback(
                    candidates,
                    parsed,
                    FallbackCause::Transport(format!(
                        "timed out after {:?}",
                        self.call_timeout
                    )),
                );
            }
        };

        match parse_response(&response, candidates) {
            Ok(result) => {
                info!(
                    recommendations = result.recommendations.len(),
                    "reasoning response accepted"
                );
                result
            }
            Err(reason) => {
                warn!(%reason, "reasoning response unusable; using fallback scorer");
                fallback(candidates, parsed, FallbackCause::MalformedResponse(reason))
            }
        }
    }
}

fn cause_of(err: ReasoningError) -> FallbackCause {
    match err {
        ReasoningError::MissingApiKey => FallbackCause::MissingApiKey,
        ReasoningError::InvalidResponse(msg) => FallbackCause::MalformedResponse(msg),
        other => FallbackCause::Transport(other.to_string()),
    }
}

#[derive(Debug, Serialize)]
struct CandidateSummary<'a> {
    id: usize,
    title: &'a str,
    price: &'a str,
    category: &'a str,
    specs: &'a std::collections::BTreeMap<String, String>,
    rating: Option<&'a str>,
    site: &'a str,
}

fn build_prompt(
    raw_query: &str,
    parsed: &ParsedQuery,
    candidates: &[Product],
    insights: Option<&str>,
) -> String {
    let summaries: Vec<CandidateSummary<'_>> = candidates
        .iter()
        .enumerate()
        .map(|(id, p)| CandidateSummary {
            id,
            title: &p.title,
            price: &p.price,
            category: &p.category,
            specs: &p.specs,
            rating: p.rating.as_deref(),
            site: &p.site,
        })
        .collect();

    let budget = match parsed.budget {
        Some(b) => format!(
            "{} ({})",
            b.amount,
            match b.operator {
                BudgetOp::Under => "under",
                BudgetOp::Around => "around",
            }
        ),
        None => "Not specified".to_string(),
    };
    let join = |set: &std::collections::BTreeSet<String>| {
        if set.is_empty() {
            "Not specified".to_string()
        } else {
            set.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    };

    let mut prompt = format!(
        r#"You are an expert PC hardware salesman assistant. Analyze the user's query and recommend the best products from the available options.

User Query: "{raw_query}"

Parsed Requirements:
- Budget: {budget}
- Categories: {categories}
- Purpose: {purpose}
- Brands: {brands}
- Specs: {specs}

Available Products:
{products}
"#,
        categories = join(&parsed.categories),
        purpose = parsed.purpose.as_deref().unwrap_or("Not specified"),
        brands = join(&parsed.brands),
        specs = serde_json::to_string(&parsed.specs).unwrap_or_default(),
        products = serde_json::to_string_pretty(&summaries).unwrap_or_default(),
    );

    if let Some(insights) = insights {
        prompt.push_str(&format!("\nLearned User Preferences:\n{insights}\n"));
    }

    prompt.push_str(
        r#"
Instructions:
1. Analyze each product against the user's requirements
2. Consider price, specifications, brand preferences, and purpose
3. Score each product from 0-100 based on how well it matches the requirements
4. Provide recommendations in order of relevance
5. Explain why each product is recommended
6. If building a complete PC, suggest compatible components
7. Warn about any potential compatibility issues
8. Consider price-to-performance ratio

Respond in JSON format:
{
  "recommendations": [
    {
      "productId": 0,
      "score": 95,
      "reason": "Detailed explanation of why this product is recommended",
      "pros": ["List of advantages"],
      "cons": ["List of disadvantages or limitations"],
      "compatibility": "Notes about compatibility with other components"
    }
  ],
  "summary": "Overall recommendation summary and advice",
  "buildSuggestion": "If applicable, suggest a complete build with total cost",
  "alternatives": "Suggest alternatives if budget allows or if certain products are unavailable"
}"#,
    );
    prompt
}

#[derive(Debug, Deserialize)]
struct Analysis {
    recommendations: Vec<AnalysisEntry>,
    #[serde(default)]
    summary: String,
    #[serde(default, rename = "buildSuggestion")]
    build_suggestion: String,
    #[serde(default)]
    alternatives: String,
}

#[derive(Debug, Deserialize)]
struct AnalysisEntry {
    #[serde(rename = "productId")]
    product_id: i64,
    score: f64,
    reason: String,
    #[serde(default)]
    pros: Vec<String>,
    #[serde(default)]
    cons: Vec<String>,
    #[serde(default)]
    compatibility: Option<String>,
    #[serde(default, rename = "contextAlignment")]
    context_alignment: Option<String>,
    #[serde(default, rename = "preferenceDeviation")]
    preference_deviation: Option<String>,
}

/// Validate and repair a reasoning response. Entries with ids outside the
/// candidate list are dropped individually; only a body with no usable JSON
/// analysis fails the whole batch.
fn parse_response(body: &str, candidates: &[Product]) -> Result<RecommendationResult, String> {
    let span = first_json_object(body).ok_or_else(|| "no JSON object in response".to_string())?;
    let analysis: Analysis =
        serde_json::from_str(span).map_err(|e| format!("JSON parse error: {e}"))?;

    let mut recommendations = Vec::with_capacity(analysis.recommendations.len());
    for entry in analysis.recommendations {
        let product = usize::try_from(entry.product_id)
            .ok()
            .and_then(|id| candidates.get(id));
        match product {
            Some(product) => recommendations.push(Recommendation {
                product: product.clone(),
                score: entry.score.clamp(0.0, 100.0),
                reason: entry.reason,
                pros: entry.pros,
                cons: entry.cons,
                compatibility: entry.compatibility,
                context_alignment: entry.context_alignment,
                preference_deviation: entry.preference_deviation,
            }),
            None => {
                warn!(product_id = entry.product_id, "dropping recommendation with invalid id");
            }
        }
    }

    Ok(RecommendationResult {
        recommendations,
        summary: analysis.summary,
        build_suggestion: analysis.build_suggestion,
        alternatives: analysis.alternatives,
        source: ResultSource::Reasoning,
    })
}

/// First balanced `{...}` span in free-form text. String- and escape-aware:
/// the response is natural-language-adjacent and not guaranteed to be pure
/// JSON.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Deterministic, network-free scorer: the terminal recovery path.
fn fallback(
    candidates: &[Product],
    parsed: &ParsedQuery,
    cause: FallbackCause,
) -> RecommendationResult {
    let mut scored: Vec<(f64, &Product)> = candidates
        .iter()
        .filter(|p| !p.title.is_empty() && !p.price.is_empty())
        .map(|p| (fallback_score(p, parsed), p))
        .collect();
    // Stable sort keeps input order among equal scores.
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(FALLBACK_LIMIT);

    let recommendations = scored
        .into_iter()
        .map(|(score, product)| Recommendation {
            product: product.clone(),
            score,
            reason: FALLBACK_REASON.to_string(),
            pros: fallback_pros(product),
            cons: vec![FALLBACK_CON.to_string()],
            compatibility: Some(FALLBACK_COMPATIBILITY.to_string()),
            context_alignment: None,
            preference_deviation: None,
        })
        .collect();

    RecommendationResult {
        recommendations,
        summary: format!(
            "AI analysis unavailable ({cause}). Showing products sorted by rating and price."
        ),
        build_suggestion: FALLBACK_BUILD_SUGGESTION.to_string(),
        alternatives: FALLBACK_ALTERNATIVES.to_string(),
        source: ResultSource::Fallback(cause),
    }
}

fn fallback_score(product: &Product, parsed: &ParsedQuery) -> f64 {
    let mut score = 50.0;

    if let Some(rating) = product.numeric_rating() {
        score += rating * 8.0;
    }
    if parsed.categories.contains(&product.category) {
        score += 20.0;
    }
    let title = product.title.to_lowercase();
    if parsed.brands.iter().any(|b| title.contains(b.as_str())) {
        score += 15.0;
    }
    if let (Some(budget), Some(price)) = (parsed.budget, numeric_price(&product.price)) {
        let ratio = price as f64 / budget.amount as f64;
        if (0.7..=1.0).contains(&ratio) {
            score += 10.0;
        }
    }

    score.min(100.0)
}

fn fallback_pros(product: &Product) -> Vec<String> {
    let mut pros = Vec::new();
    if product.numeric_rating().is_some_and(|r| r >= 4.0) {
        pros.push("High rating".to_string());
    }
    if !product.specs.is_empty() {
        pros.push("Detailed specifications available".to_string());
    }
    if product.is_categorized() {
        pros.push("Properly categorized".to_string());
    }
    if pros.is_empty() {
        pros.push(format!("Available on {}", product.site));
    }
    pros
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryParser;

    fn product(title: &str, price: &str) -> Product {
        Product {
            title: title.to_string(),
            price: price.to_string(),
            rating: None,
            specs: Default::default(),
            category: String::new(),
            site: "walmart".to_string(),
            url: String::new(),
        }
    }

    fn parse(query: &str) -> ParsedQuery {
        QueryParser::default().parse(query)
    }

    #[test]
    fn extracts_first_balanced_object_despite_prose() {
        let body = r#"Sure! Here you go: {"recommendations":[{"productId":0,"score":90,"reason":"x"}]} Hope that helps."#;
        let span = first_json_object(body).unwrap();
        assert!(span.starts_with('{') && span.ends_with('}'));
        assert!(serde_json::from_str::<serde_json::Value>(span).is_ok());
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_extraction() {
        let body = r#"note {"reason":"good {value} for money","recommendations":[]} tail"#;
        let span = first_json_object(body).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(span).is_ok());
    }

    #[test]
    fn prose_wrapped_response_maps_to_candidates() {
        let body = r#"Sure! {"recommendations":[{"productId":0,"score":90,"reason":"x"}]}"#;
        let candidates = vec![product("a", "100"), product("b", "200")];
        let result = parse_response(body, &candidates).unwrap();
        assert_eq!(result.recommendations.len(), 1);
        assert_eq!(result.recommendations[0].product.title, "a");
        assert_eq!(result.recommendations[0].score, 90.0);
        assert_eq!(result.source, ResultSource::Reasoning);
    }

    #[test]
    fn out_of_range_id_drops_only_that_entry() {
        let body = r#"{"recommendations":[
            {"productId":99,"score":95,"reason":"bogus"},
            {"productId":1,"score":80,"reason":"fine"},
            {"productId":-1,"score":70,"reason":"negative"}
        ],"summary":"s"}"#;
        let candidates = vec![product("a", "100"), product("b", "200"), product("c", "300")];
        let result = parse_response(body, &candidates).unwrap();
        assert_eq!(result.recommendations.len(), 1);
        assert_eq!(result.recommendations[0].product.title, "b");
        assert_eq!(result.summary, "s");
    }

    #[test]
    fn missing_recommendations_array_is_malformed() {
        assert!(parse_response(r#"{"summary":"no recs"}"#, &[]).is_err());
        assert!(parse_response("no json at all", &[]).is_err());
    }

    #[test]
    fn bare_product_yields_base_score_and_site_pro() {
        let parsed = parse("graphics card under 30000");
        let bare = product("unknown widget", "₹99,999");
        assert_eq!(fallback_score(&bare, &parsed), 50.0);
        assert_eq!(fallback_pros(&bare), vec!["Available on walmart".to_string()]);
    }

    #[test]
    fn fallback_score_accumulates_and_clamps() {
        let parsed = parse("asus graphics card under 30000");
        let mut p = product("asus rog card", "₹25,000");
        p.rating = Some("4.8".to_string());
        p.category = "graphics_card".to_string();
        // 50 + 4.8*8 + 20 + 15 + 10 = 133.4, clamped.
        assert_eq!(fallback_score(&p, &parsed), 100.0);
    }

    #[test]
    fn budget_ratio_bonus_is_a_narrow_band() {
        let parsed = parse("ssd under 10000");
        let sweet = product("plain ssd drive", "₹8,000");
        let cheap = product("plain ssd drive", "₹2,000");
        assert_eq!(fallback_score(&sweet, &parsed), 60.0);
        assert_eq!(fallback_score(&cheap, &parsed), 50.0);
    }

    #[test]
    fn fallback_sorts_descending_and_takes_top_five() {
        let parsed = parse("anything");
        let mut candidates = Vec::new();
        for i in 0..7 {
            let mut p = product(&format!("item {i}"), "1000");
            p.rating = Some(format!("{}", i as f64 / 2.0));
            candidates.push(p);
        }
        let result = fallback(&candidates, &parsed, FallbackCause::MissingApiKey);
        assert_eq!(result.recommendations.len(), FALLBACK_LIMIT);
        let scores: Vec<f64> = result.recommendations.iter().map(|r| r.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(result.recommendations[0].product.title, "item 6");
        assert!(result.summary.contains("API key"));
    }
}
