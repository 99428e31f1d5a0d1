//! Candidate filtering.
//!
//! Pure and order-preserving. A criterion with no extracted requirement never
//! excludes, and a product whose price or specs cannot be parsed is never
//! excluded on that basis.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::query::{extract_ram, BudgetOp, ParsedQuery, SpecValue};
use crate::types::Product;

/// Around-budget tolerance: 20% above the stated amount, no lower bound.
const AROUND_TOLERANCE: f64 = 1.2;

static PRICE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*").expect("price pattern"));

/// First numeric run of a display price, grouping separators stripped.
pub fn numeric_price(display: &str) -> Option<u64> {
    let run = PRICE_RUN.find(display)?;
    let digits: String = run.as_str().chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Filter candidates against the parsed intent. All criteria are independent
/// and combined with logical AND; order is preserved, nothing is duplicated.
pub fn filter(products: &[Product], parsed: &ParsedQuery) -> Vec<Product> {
    let matched: Vec<Product> = products
        .iter()
        .filter(|p| matches(p, parsed))
        .cloned()
        .collect();
    debug!(total = products.len(), matched = matched.len(), "filtered candidates");
    matched
}

fn matches(product: &Product, parsed: &ParsedQuery) -> bool {
    let title = product.title.to_lowercase();

    if let (Some(budget), Some(price)) = (parsed.budget, numeric_price(&product.price)) {
        let limit = match budget.operator {
            BudgetOp::Under => budget.amount as f64,
            BudgetOp::Around => budget.amount as f64 * AROUND_TOLERANCE,
        };
        if price as f64 > limit {
            return false;
        }
    }

    if !parsed.categories.is_empty() {
        let category_hit = parsed.categories.contains(&product.category)
            || parsed
                .categories
                .iter()
                .any(|c| title.contains(&c.replace('_', " ")));
        if !category_hit {
            return false;
        }
    }

    if !parsed.brands.is_empty() && !parsed.brands.iter().any(|b| title.contains(b.as_str())) {
        return false;
    }

    if let Some(SpecValue::Number(wanted)) = parsed.specs.get("ram") {
        if let Some(have) = extract_ram(&title) {
            if have > 0 && have < *wanted {
                return false;
            }
        }
    }

    true
}
