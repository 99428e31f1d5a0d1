use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use salesbot_engine::engine::Engine;
use salesbot_engine::preferences::PreferenceTracker;
use salesbot_engine::query::QueryParser;
use salesbot_engine::reasoning::GeminiClient;
use salesbot_engine::settings::{Args, Settings};
use salesbot_engine::store::SledStore;
use salesbot_engine::synthesizer::RecommendationSynthesizer;
use salesbot_engine::types::Product;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default_values().context("failed to build default settings")?,
    };

    let mut reasoning = settings.reasoning.clone();
    if reasoning.api_key.is_none() {
        reasoning.api_key = std::env::var("GEMINI_API_KEY").ok();
    }

    let raw = fs::read_to_string(&args.products)
        .with_context(|| format!("failed to read products from {}", args.products.display()))?;
    let products: Vec<Product> =
        serde_json::from_str(&raw).context("failed to parse products JSON")?;

    let store = SledStore::open(&settings.store.path)
        .with_context(|| format!("failed to open store at {}", settings.store.path.display()))?;
    let tracker = PreferenceTracker::new(Box::new(store))?;

    let client = GeminiClient::new(&reasoning)?;
    if !client.has_api_key() {
        println!("No API key configured; recommendations will use deterministic fallback scoring.");
    }
    let synthesizer = RecommendationSynthesizer::new(
        Arc::new(client),
        Duration::from_secs(reasoning.timeout_secs),
    );

    let engine = Engine::new(QueryParser::default(), tracker, synthesizer);

    for query in &args.queries {
        let outcome = engine.handle_query(query, &products).await?;
        print_outcome(query, &outcome);
    }

    Ok(())
}

fn print_outcome(query: &str, outcome: &salesbot_engine::QueryOutcome) {
    println!("\nQuery: {query}");
    println!(
        "Matched {} of {} products",
        outcome.matched_products, outcome.total_products
    );
    if !outcome.result.summary.is_empty() {
        println!("Summary: {}", outcome.result.summary);
    }
    for (rank, rec) in outcome.result.recommendations.iter().enumerate() {
        println!(
            "{}. {} - {} (match {:.0}%)",
            rank + 1,
            rec.product.title,
            rec.product.price,
            rec.score
        );
        println!("   {}", rec.reason);
        if !rec.pros.is_empty() {
            println!("   + {}", rec.pros.join(", "));
        }
        if !rec.cons.is_empty() {
            println!("   - {}", rec.cons.join(", "));
        }
    }
    if !outcome.result.build_suggestion.is_empty() {
        println!("Build suggestion: {}", outcome.result.build_suggestion);
    }
    if !outcome.result.alternatives.is_empty() {
        println!("Alternatives: {}", outcome.result.alternatives);
    }
    println!("Learned preferences:\n{}", outcome.insights);
}
