//! Confidence-weighted preference learning.
//!
//! The profile records *what was learned* across queries; the session context
//! records *what happened*. They are updated together but queryable
//! independently, and only an explicit `clear` empties either.

use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::query::ParsedQuery;
use crate::store::{ProfileStore, PROFILE_KEY, SESSION_KEY};
use crate::types::{BrowsedProduct, Product};

/// Fixed confidence increment per observation. Diminishing returns come from
/// the saturating cap alone.
const CONFIDENCE_STEP: u8 = 15;
const MAX_CONFIDENCE: u8 = 100;

/// How many entries per histogram feed the insight string.
const TOP_CATEGORIES: usize = 3;
const TOP_BRANDS: usize = 3;
const TOP_SPECS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub count: u32,
    /// In `[0, 100]`, monotone non-decreasing per key within a session.
    pub confidence: u8,
}

/// One weighted histogram: discrete keys with observation counts and
/// confidence, insertion order preserved for deterministic tie-breaks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    entries: Vec<(String, Signal)>,
}

impl Histogram {
    fn observe(&mut self, key: &str) {
        if let Some((_, signal)) = self.entries.iter_mut().find(|(k, _)| k == key) {
            signal.count += 1;
            signal.confidence = signal
                .confidence
                .saturating_add(CONFIDENCE_STEP)
                .min(MAX_CONFIDENCE);
        } else {
            self.entries.push((
                key.to_string(),
                Signal {
                    count: 1,
                    confidence: CONFIDENCE_STEP,
                },
            ));
        }
    }

    pub fn get(&self, key: &str) -> Option<Signal> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, s)| *s)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Top-`n` entries by confidence. The stable sort keeps insertion order
    /// for ties.
    pub fn top(&self, n: usize) -> Vec<(&str, Signal)> {
        let mut ranked: Vec<(&str, Signal)> = self
            .entries
            .iter()
            .map(|(k, s)| (k.as_str(), *s))
            .collect();
        ranked.sort_by(|a, b| b.1.confidence.cmp(&a.1.confidence));
        ranked.truncate(n);
        ranked
    }
}

/// The four independent histograms learned from queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferenceProfile {
    pub budget_ranges: Histogram,
    pub categories: Histogram,
    pub brands: Histogram,
    pub specs: Histogram,
}

impl PreferenceProfile {
    pub fn is_empty(&self) -> bool {
        self.budget_ranges.is_empty()
            && self.categories.is_empty()
            && self.brands.is_empty()
            && self.specs.is_empty()
    }
}

/// Named bucket for a budget amount, used as the histogram key.
pub fn budget_bucket(amount: u64) -> &'static str {
    match amount {
        0..=9_999 => "under 10k",
        10_000..=24_999 => "10k-25k",
        25_000..=49_999 => "25k-50k",
        50_000..=99_999 => "50k-100k",
        _ => "above 100k",
    }
}

/// Session-lifetime activity log, distinct from the learned profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub current_page: String,
    pub product_count: usize,
    pub last_query: Option<String>,
    /// Append-only; presentation layers may truncate a view, the engine
    /// never does.
    pub session_queries: Vec<String>,
    pub browsed_products: Vec<BrowsedProduct>,
    pub started_at: DateTime<Utc>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            current_page: "unknown".to_string(),
            product_count: 0,
            last_query: None,
            session_queries: Vec::new(),
            browsed_products: Vec::new(),
            started_at: Utc::now(),
        }
    }
}

#[derive(Default)]
struct Inner {
    profile: PreferenceProfile,
    session: SessionContext,
}

/// Stateful learner. Owns the profile and session context; every mutating
/// call is a single indivisible update under one lock, persisted through the
/// injected store before the lock is released.
pub struct PreferenceTracker {
    store: Box<dyn ProfileStore>,
    inner: Mutex<Inner>,
}

impl PreferenceTracker {
    /// Create a tracker, restoring any profile and session the store holds.
    pub fn new(store: Box<dyn ProfileStore>) -> Result<Self> {
        let profile = match store.get(PROFILE_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => PreferenceProfile::default(),
        };
        let session = match store.get(SESSION_KEY)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => SessionContext::default(),
        };
        info!(
            restored_profile = !profile.is_empty(),
            "preference tracker initialized"
        );
        Ok(Self {
            store,
            inner: Mutex::new(Inner { profile, session }),
        })
    }

    /// Learn from one parsed query, updating all four histograms and the
    /// session log together.
    pub fn learn(&self, raw_query: &str, parsed: &ParsedQuery) -> Result<()> {
        let mut inner = self.lock()?;

        inner.session.last_query = Some(raw_query.to_string());
        inner.session.session_queries.push(raw_query.to_string());

        if let Some(budget) = parsed.budget {
            inner.profile.budget_ranges.observe(budget_bucket(budget.amount));
        }
        for category in &parsed.categories {
            inner.profile.categories.observe(category);
        }
        for brand in &parsed.brands {
            inner.profile.brands.observe(brand);
        }
        for spec in parsed.specs.keys() {
            inner.profile.specs.observe(spec);
        }

        debug!(
            categories = inner.profile.categories.len(),
            brands = inner.profile.brands.len(),
            "profile updated"
        );
        self.persist(&inner)
    }

    /// Record exposure to a product the user browsed.
    pub fn observe_browsed_product(&self, product: &Product) -> Result<()> {
        let mut inner = self.lock()?;
        inner.session.browsed_products.push(BrowsedProduct::from(product));
        self.persist(&inner)
    }

    /// Record the current site/category view and its visible product count.
    pub fn update_page_context(&self, site: &str, product_count: usize) -> Result<()> {
        let mut inner = self.lock()?;
        inner.session.current_page = site.to_string();
        inner.session.product_count = product_count;
        self.persist(&inner)
    }

    /// Reset all four histograms and the session context to empty.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.lock()?;
        *inner = Inner::default();
        info!("preferences and session context cleared");
        self.persist(&inner)
    }

    /// Snapshot of the learned profile.
    pub fn profile(&self) -> PreferenceProfile {
        self.inner
            .lock()
            .map(|inner| inner.profile.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the session context.
    pub fn session(&self) -> SessionContext {
        self.inner
            .lock()
            .map(|inner| inner.session.clone())
            .unwrap_or_default()
    }

    /// Deterministic synthesis of the top-confidence entries, reproducible
    /// from the profile alone. Feeds straight into the reasoning request.
    pub fn insights(&self) -> String {
        let profile = self.profile();

        let mut lines = Vec::with_capacity(4);
        lines.push(match profile.budget_ranges.top(1).first() {
            Some((range, signal)) => format!(
                "Budget: usually shops {} ({}x, {}% confidence)",
                range, signal.count, signal.confidence
            ),
            None => "Budget: no data".to_string(),
        });
        lines.push(describe("Categories", &profile.categories, TOP_CATEGORIES));
        lines.push(describe("Brands", &profile.brands, TOP_BRANDS));
        lines.push(describe("Specs", &profile.specs, TOP_SPECS));
        lines.join("\n")
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("preference state lock poisoned"))
    }

    fn persist(&self, inner: &Inner) -> Result<()> {
        self.store
            .set(PROFILE_KEY, &serde_json::to_vec(&inner.profile)?)?;
        self.store
            .set(SESSION_KEY, &serde_json::to_vec(&inner.session)?)?;
        Ok(())
    }
}

fn describe(label: &str, histogram: &Histogram, n: usize) -> String {
    if histogram.is_empty() {
        return format!("{label}: no data");
    }
    let entries: Vec<String> = histogram
        .top(n)
        .into_iter()
        .map(|(key, signal)| format!("{} ({}% confidence)", key, signal.confidence))
        .collect();
    format!("{label}: {}", entries.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryParser;
    use crate::store::MemoryStore;

    fn tracker() -> PreferenceTracker {
        PreferenceTracker::new(Box::new(MemoryStore::new())).unwrap()
    }

    fn parse(query: &str) -> ParsedQuery {
        QueryParser::default().parse(query)
    }

    #[test]
    fn confidence_is_monotone_and_saturates() {
        let tracker = tracker();
        let parsed = parse("gaming laptop under 60000");

        let mut last = 0;
        for _ in 0..10 {
            tracker.learn("gaming laptop under 60000", &parsed).unwrap();
            let signal = tracker.profile().categories.get("laptop").unwrap();
            assert!(signal.confidence >= last);
            assert!(signal.confidence <= 100);
            last = signal.confidence;
        }
        assert_eq!(last, 100);
        assert_eq!(tracker.profile().categories.get("laptop").unwrap().count, 10);
    }

    #[test]
    fn untouched_keys_never_change() {
        let tracker = tracker();
        tracker.learn("asus laptop", &parse("asus laptop")).unwrap();
        let before = tracker.profile().brands.get("asus").unwrap();

        tracker.learn("msi monitor", &parse("msi monitor")).unwrap();
        assert_eq!(tracker.profile().brands.get("asus").unwrap(), before);
    }

    #[test]
    fn budget_amounts_are_bucketed() {
        let tracker = tracker();
        tracker
            .learn("laptop under 60000", &parse("laptop under 60000"))
            .unwrap();
        tracker
            .learn("ssd under 4500", &parse("ssd under 4500"))
            .unwrap();

        let profile = tracker.profile();
        assert!(profile.budget_ranges.get("50k-100k").is_some());
        assert!(profile.budget_ranges.get("under 10k").is_some());
    }

    #[test]
    fn clear_resets_everything_and_insights_report_no_data() {
        let tracker = tracker();
        tracker
            .learn("asus gaming laptop under 60000 16gb ram", &parse("asus gaming laptop under 60000 16gb ram"))
            .unwrap();
        tracker.update_page_context("amazon", 12).unwrap();
        assert!(!tracker.profile().is_empty());

        tracker.clear().unwrap();
        assert!(tracker.profile().is_empty());
        assert!(tracker.session().session_queries.is_empty());
        assert_eq!(tracker.session().current_page, "unknown");

        let insights = tracker.insights();
        for label in ["Budget", "Categories", "Brands", "Specs"] {
            assert!(insights.contains(&format!("{label}: no data")), "{insights}");
        }
    }

    #[test]
    fn insights_rank_by_confidence_with_insertion_order_ties() {
        let tracker = tracker();
        // "ram" observed twice, "laptop" and "monitor" once each in that order.
        tracker.learn("16gb ram", &parse("16gb ram kit")).unwrap();
        tracker.learn("ram", &parse("ddr4 ram stick")).unwrap();
        tracker.learn("laptop", &parse("thin laptop")).unwrap();
        tracker.learn("monitor", &parse("4k monitor")).unwrap();

        let insights = tracker.insights();
        let categories_line = insights
            .lines()
            .find(|l| l.starts_with("Categories:"))
            .unwrap()
            .to_string();
        let ram = categories_line.find("ram").unwrap();
        let laptop = categories_line.find("laptop").unwrap();
        let monitor = categories_line.find("monitor").unwrap();
        assert!(ram < laptop && laptop < monitor, "{categories_line}");

        // Reproducible from the profile alone.
        assert_eq!(insights, tracker.insights());
    }

    #[test]
    fn session_logs_are_append_only_in_order() {
        let tracker = tracker();
        tracker.learn("first", &parse("first")).unwrap();
        tracker.learn("second", &parse("second")).unwrap();
        let session = tracker.session();
        assert_eq!(session.session_queries, vec!["first", "second"]);
        assert_eq!(session.last_query.as_deref(), Some("second"));
    }

    #[test]
    fn browsed_products_keep_append_order_and_persist() {
        let product = |title: &str, price: &str| Product {
            title: title.to_string(),
            price: price.to_string(),
            rating: None,
            specs: Default::default(),
            category: String::new(),
            site: "amazon".to_string(),
            url: String::new(),
        };

        let store = MemoryStore::new();
        {
            let tracker = PreferenceTracker::new(Box::new(store.clone())).unwrap();
            tracker
                .observe_browsed_product(&product("asus tuf gaming", "₹58,999"))
                .unwrap();
            tracker
                .observe_browsed_product(&product("msi thin 15", "₹54,490"))
                .unwrap();

            let browsed = tracker.session().browsed_products;
            assert_eq!(browsed.len(), 2);
            assert_eq!(browsed[0].title, "asus tuf gaming");
            assert_eq!(browsed[1].title, "msi thin 15");
        }

        let restored = PreferenceTracker::new(Box::new(store)).unwrap();
        let browsed = restored.session().browsed_products;
        assert_eq!(browsed[0].title, "asus tuf gaming");
        assert_eq!(browsed[1].price, "₹54,490");
    }

    #[test]
    fn profile_round_trips_through_the_store() {
        let store = MemoryStore::new();
        {
            let tracker = PreferenceTracker::new(Box::new(store.clone())).unwrap();
            tracker
                .learn("asus laptop under 60000", &parse("asus laptop under 60000"))
                .unwrap();
        }
        let restored = PreferenceTracker::new(Box::new(store)).unwrap();
        assert!(restored.profile().brands.get("asus").is_some());
        assert_eq!(
            restored.session().session_queries,
            vec!["asus laptop under 60000"]
        );
    }
}
