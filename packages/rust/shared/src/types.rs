//! Core domain types for FeedBuilder runs.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

// ---------------------------------------------------------------------------
// ProductRecord
// ---------------------------------------------------------------------------

/// One product parsed from a vendor XML item node.
///
/// Values are the trimmed source text, keyed by field name. Which fields exist
/// depends on the vendor schema; an absent field reads as the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductRecord {
    fields: BTreeMap<String, String>,
}

impl ProductRecord {
    /// Build a record from `(field, value)` pairs.
    pub fn from_fields<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Raw value of `field`, or `""` when the source had none.
    pub fn get(&self, field: &str) -> &str {
        self.fields.get(field).map(String::as_str).unwrap_or("")
    }

    /// Whether `field` carries a non-blank value.
    pub fn has(&self, field: &str) -> bool {
        !self.get(field).trim().is_empty()
    }

    pub fn id(&self) -> &str {
        self.get("id")
    }

    pub fn name(&self) -> &str {
        self.get("name")
    }

    /// Advised retail price incl. VAT (`price`), 0 when unparseable.
    pub fn price(&self) -> f64 {
        parse_decimal(self.get("price"))
    }

    /// Dropship purchase price excl. VAT (`pvd`), 0 when unparseable.
    pub fn purchase_price(&self) -> f64 {
        parse_decimal(self.get("pvd"))
    }

    /// Units in stock, 0 when unparseable.
    pub fn stock(&self) -> i64 {
        parse_int(self.get("stock"))
    }
}

/// Parse a vendor decimal, accepting `,` as the decimal separator. Returns 0 on failure.
pub fn parse_decimal(raw: &str) -> f64 {
    raw.trim().replace(',', ".").parse::<f64>().unwrap_or(0.0)
}

/// Parse a vendor integer; decimal input is truncated. Returns 0 on failure.
pub fn parse_int(raw: &str) -> i64 {
    let trimmed = raw.trim();
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Outcome of one run, as recorded in `last_run.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success { files: usize, products: usize },
    Failure { reason: String },
}

/// Timestamped run outcome. Overwritten on every run; no history is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatus {
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
}

impl RunStatus {
    pub fn success(finished_at: DateTime<Utc>, files: usize, products: usize) -> Self {
        Self {
            finished_at,
            outcome: RunOutcome::Success { files, products },
        }
    }

    /// A failed run. The reason is flattened to a single line.
    pub fn failure(finished_at: DateTime<Utc>, reason: impl fmt::Display) -> Self {
        let reason = reason
            .to_string()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            finished_at,
            outcome: RunOutcome::Failure { reason },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Success { .. })
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = self.finished_at.to_rfc3339_opts(SecondsFormat::Secs, true);
        match &self.outcome {
            RunOutcome::Success { files, products } => {
                write!(f, "{ts} ok files={files} products={products}")
            }
            RunOutcome::Failure { reason } => write!(f, "{ts} failed: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap()
    }

    #[test]
    fn record_missing_field_reads_empty() {
        let record = ProductRecord::from_fields([("id", "123"), ("name", "Widget")]);
        assert_eq!(record.id(), "123");
        assert_eq!(record.get("brand"), "");
        assert!(!record.has("brand"));
        assert!(record.has("name"));
    }

    #[test]
    fn numeric_accessors_are_lenient() {
        let record = ProductRecord::from_fields([
            ("price", "12,50"),
            ("pvd", "oops"),
            ("stock", "7.9"),
        ]);
        assert!((record.price() - 12.5).abs() < f64::EPSILON);
        assert_eq!(record.purchase_price(), 0.0);
        assert_eq!(record.stock(), 7);
    }

    #[test]
    fn status_line_success() {
        let status = RunStatus::success(ts(), 2, 340);
        assert!(status.is_success());
        assert_eq!(status.to_string(), "2026-03-01T06:00:00Z ok files=2 products=340");
    }

    #[test]
    fn status_line_failure_is_single_line() {
        let status = RunStatus::failure(ts(), "connection error:\n  host unreachable\n");
        assert!(!status.is_success());
        assert_eq!(
            status.to_string(),
            "2026-03-01T06:00:00Z failed: connection error: host unreachable"
        );
    }
}
