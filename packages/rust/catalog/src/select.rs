//! Product selection: filter rules, ordering and the product cap.

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDateTime;
use tracing::{debug, info, instrument};

use feedbuilder_shared::{
    FilterConfig, ProductRecord, Result, parse_decimal, read_optional_list,
};

/// Timestamp layout of the vendor `date_upd` field.
const DATE_UPD_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Days counted per month by the recency rule.
const DAYS_PER_MONTH: i64 = 30;

/// Allow/deny lists loaded from the rules directory. Empty lists allow everything.
#[derive(Debug, Clone, Default)]
pub struct SelectionRules {
    pub allow_categories: HashSet<String>,
    /// Lowercased.
    pub deny_keywords: Vec<String>,
    pub allow_brands: HashSet<String>,
}

impl SelectionRules {
    /// Load `allow_categories.txt`, `deny_keywords.txt` and `allow_brands.txt`
    /// from `dir`. Missing files are treated as empty lists.
    pub fn load(dir: &Path) -> Result<Self> {
        let rules = Self {
            allow_categories: read_optional_list(&dir.join("allow_categories.txt"))?
                .into_iter()
                .collect(),
            deny_keywords: read_optional_list(&dir.join("deny_keywords.txt"))?
                .into_iter()
                .map(|w| w.to_lowercase())
                .collect(),
            allow_brands: read_optional_list(&dir.join("allow_brands.txt"))?
                .into_iter()
                .collect(),
        };

        debug!(
            categories = rules.allow_categories.len(),
            deny_keywords = rules.deny_keywords.len(),
            brands = rules.allow_brands.len(),
            "selection rules loaded"
        );

        Ok(rules)
    }
}

/// Outcome of [`select`].
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Kept records, ordered and capped.
    pub records: Vec<ProductRecord>,
    /// Records rejected by a rule.
    pub rejected: usize,
    /// Records cut by the product cap.
    pub truncated: usize,
}

/// Applies [`FilterConfig`] and [`SelectionRules`] to single records.
#[derive(Debug, Clone)]
pub struct Selector<'a> {
    filters: &'a FilterConfig,
    rules: &'a SelectionRules,
    now: NaiveDateTime,
}

impl<'a> Selector<'a> {
    /// `now` anchors the recency rule.
    pub fn new(filters: &'a FilterConfig, rules: &'a SelectionRules, now: NaiveDateTime) -> Self {
        Self {
            filters,
            rules,
            now,
        }
    }

    /// Whether `record` passes every rule.
    pub fn keep(&self, record: &ProductRecord) -> bool {
        let f = self.filters;

        if !self.has_allowed_category(record.get("category")) {
            return false;
        }
        if record.stock() < f.min_stock {
            return false;
        }

        let price = record.price();
        if !(f.min_price <= price && price <= f.max_price) {
            return false;
        }

        if f.require_ean && !record.has("ean13") {
            return false;
        }
        if f.require_image && !record.has("image1") {
            return false;
        }

        let weight = parse_decimal(record.get("weight"));
        if weight != 0.0 && weight > f.max_weight {
            return false;
        }

        if record.has("date_upd") && !self.is_recent(record.get("date_upd")) {
            return false;
        }

        if !self.rules.allow_brands.is_empty()
            && !self.rules.allow_brands.contains(record.get("brand"))
        {
            return false;
        }

        !self.has_denied_keyword(record.name(), record.get("description"))
    }

    /// Updated within `recent_months` months. Blank or unparseable dates count as recent.
    pub fn is_recent(&self, raw: &str) -> bool {
        let raw = raw.trim();
        if raw.is_empty() {
            return true;
        }
        match NaiveDateTime::parse_from_str(raw, DATE_UPD_FORMAT) {
            Ok(updated) => {
                (self.now - updated).num_days() <= self.filters.recent_months * DAYS_PER_MONTH
            }
            Err(_) => true,
        }
    }

    /// The category field may hold several comma-separated ids; one match suffices.
    fn has_allowed_category(&self, field: &str) -> bool {
        if self.rules.allow_categories.is_empty() {
            return true;
        }
        field
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .any(|c| self.rules.allow_categories.contains(c))
    }

    fn has_denied_keyword(&self, name: &str, description: &str) -> bool {
        if self.rules.deny_keywords.is_empty() {
            return false;
        }
        let haystack = format!("{name} {description}").to_lowercase();
        self.rules
            .deny_keywords
            .iter()
            .any(|word| haystack.contains(word.as_str()))
    }
}

/// Filter, order (stock descending, then price ascending) and cap `records`.
///
/// With filtering disabled the records are returned untouched, in source order.
#[instrument(skip_all, fields(input = records.len(), enabled = filters.enabled))]
pub fn select(
    records: Vec<ProductRecord>,
    filters: &FilterConfig,
    rules: &SelectionRules,
    now: NaiveDateTime,
) -> Selection {
    if !filters.enabled {
        return Selection {
            records,
            rejected: 0,
            truncated: 0,
        };
    }

    let selector = Selector::new(filters, rules, now);
    let input = records.len();
    let mut kept: Vec<ProductRecord> = records.into_iter().filter(|r| selector.keep(r)).collect();
    let rejected = input - kept.len();

    kept.sort_by(|a, b| {
        b.stock()
            .cmp(&a.stock())
            .then_with(|| a.price().total_cmp(&b.price()))
    });

    let mut truncated = 0;
    if filters.max_products > 0 && kept.len() > filters.max_products {
        truncated = kept.len() - filters.max_products;
        kept.truncate(filters.max_products);
    }

    info!(kept = kept.len(), rejected, truncated, "selection complete");

    Selection {
        records: kept,
        rejected,
        truncated,
    }
}
