//! Natural-language query parsing.
//!
//! Every extraction here is independent and additive: a union of heuristics
//! rather than a grammar. Shopping queries are short and informal, and only
//! need enough structure to drive filtering.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetOp {
    Under,
    Around,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    /// Positive amount in currency-minor-unit-free form, separators stripped.
    pub amount: u64,
    pub operator: BudgetOp,
}

/// A single spec requirement; numeric where a unit-bearing number was found,
/// text otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpecValue {
    Number(u64),
    Text(String),
}

/// Structured intent extracted from one raw query string. Immutable once
/// produced; parsing never fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub budget: Option<Budget>,
    pub categories: BTreeSet<String>,
    pub brands: BTreeSet<String>,
    pub specs: BTreeMap<String, SpecValue>,
    pub purpose: Option<String>,
    /// Tokens longer than 2 chars, insertion order preserved. Last-resort
    /// matcher only.
    pub keywords: Vec<String>,
}

/// Category taxonomy: tag plus trigger substrings matched against the raw
/// lowercase query.
const TAXONOMY: &[(&str, &[&str])] = &[
    (
        "processor",
        &["processor", "cpu", "ryzen", "core i3", "core i5", "core i7", "core i9"],
    ),
    (
        "graphics_card",
        &["graphics card", "gpu", "geforce", "radeon", "rtx", "gtx"],
    ),
    ("motherboard", &["motherboard", "mobo", "mainboard"]),
    ("ram", &["ram", "memory", "ddr4", "ddr5"]),
    ("storage", &["ssd", "hdd", "hard drive", "nvme", "storage"]),
    ("power_supply", &["power supply", "psu", "smps"]),
    ("case", &["cabinet", "tower", "pc case"]),
    ("cooling", &["cooler", "liquid cooling", "aio", "cooling"]),
    ("monitor", &["monitor", "display"]),
    ("keyboard", &["keyboard", "mechanical"]),
    ("mouse", &["mouse"]),
    ("laptop", &["laptop", "notebook"]),
    ("desktop", &["desktop", "prebuilt"]),
];

/// Keyword-to-purpose table; first matching trigger wins.
const PURPOSES: &[(&str, &str)] = &[
    ("gaming", "gaming"),
    ("game", "gaming"),
    ("streaming", "streaming"),
    ("editing", "content_creation"),
    ("rendering", "content_creation"),
    ("programming", "programming"),
    ("coding", "programming"),
    ("office", "office"),
    ("work", "office"),
    ("student", "student"),
    ("school", "student"),
];

const DEFAULT_BRANDS: &[&str] = &[
    "intel", "amd", "nvidia", "asus", "msi", "gigabyte", "asrock", "corsair", "gskill",
    "kingston", "crucial", "samsung", "wd", "seagate", "evga", "zotac", "cooler", "nzxt",
    "logitech", "razer", "hp", "dell", "lenovo", "acer",
];

// The currency symbol is an optional literal; queries arrive with `₹`, `rs`,
// `$`, or nothing at all depending on the storefront.
static BUDGET_UNDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:under|below|budget of|upto|maximum|less than)\s*(?:₹|rs\.?|\$)?\s*(\d{1,3}(?:,\d{2,3})+|\d{4,7})",
    )
    .expect("budget pattern")
});

static BUDGET_AROUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:around|about|near)\s*(?:₹|rs\.?|\$)?\s*(\d{1,3}(?:,\d{2,3})+|\d{4,7})")
        .expect("budget pattern")
});

static RAM_SPEC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*gb\s*(?:ram|memory|ddr)").expect("ram pattern"));

static STORAGE_SPEC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*(gb|tb)\s*(ssd|hdd|storage)").expect("storage pattern"));

/// Extract a RAM size in GB from free text, if one is stated.
pub(crate) fn extract_ram(text: &str) -> Option<u64> {
    RAM_SPEC
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

/// The query parser. Brands are configurable; everything else is fixed
/// taxonomy.
#[derive(Debug, Clone)]
pub struct QueryParser {
    brands: BTreeSet<String>,
}

impl Default for QueryParser {
    fn default() -> Self {
        Self {
            brands: DEFAULT_BRANDS.iter().map(|b| (*b).to_string()).collect(),
        }
    }
}

impl QueryParser {
    pub fn with_brands<I, S>(brands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            brands: brands.into_iter().map(|b| b.into().to_lowercase()).collect(),
        }
    }

    /// Parse one query. Total: with no signal found, all optional fields are
    /// absent and `keywords` may be empty.
    pub fn parse(&self, query: &str) -> ParsedQuery {
        let query = query.to_lowercase();

        let tokens: Vec<&str> = query
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let keywords = tokens
            .iter()
            .filter(|t| t.len() > 2)
            .map(|t| (*t).to_string())
            .collect();

        let brands = tokens
            .iter()
            .copied()
            .filter(|t| self.brands.contains(*t))
            .map(str::to_string)
            .collect();

        let categories = TAXONOMY
            .iter()
            .filter(|(_, triggers)| triggers.iter().any(|t| query.contains(t)))
            .map(|(tag, _)| (*tag).to_string())
            .collect();

        let mut specs = BTreeMap::new();
        if let Some(ram) = extract_ram(&query) {
            specs.insert("ram".to_string(), SpecValue::Number(ram));
        }
        if let Some(caps) = STORAGE_SPEC.captures(&query) {
            specs.insert(
                "storage".to_string(),
                SpecValue::Text(format!(
                    "{}{} {}",
                    &caps[1],
                    caps[2].to_uppercase(),
                    caps[3].to_uppercase()
                )),
            );
        }

        let purpose = PURPOSES
            .iter()
            .find(|(trigger, _)| query.contains(trigger))
            .map(|(_, tag)| (*tag).to_string());

        ParsedQuery {
            budget: extract_budget(&query),
            categories,
            brands,
            specs,
            purpose,
            keywords,
        }
    }
}

/// Only the earliest budget phrase in the string is honored; a tie cannot
/// occur since the two patterns share no trigger words.
fn extract_budget(query: &str) -> Option<Budget> {
    let under = BUDGET_UNDER.captures(query);
    let around = BUDGET_AROUND.captures(query);

    let (caps, operator) = match (under, around) {
        (Some(u), Some(a)) => {
            let (u_start, a_start) = (
                u.get(0).map_or(usize::MAX, |m| m.start()),
                a.get(0).map_or(usize::MAX, |m| m.start()),
            );
            if u_start <= a_start {
                (u, BudgetOp::Under)
            } else {
                (a, BudgetOp::Around)
            }
        }
        (Some(u), None) => (u, BudgetOp::Under),
        (None, Some(a)) => (a, BudgetOp::Around),
        (None, None) => return None,
    };

    let digits: String = caps[1].chars().filter(char::is_ascii_digit).collect();
    // 4-7 significant digits, same bound whether or not separators appeared.
    if !(4..=7).contains(&digits.len()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    if amount == 0 {
        return None;
    }
    Some(Budget { amount, operator })
}
