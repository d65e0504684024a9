use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Severity of a problem found while parsing a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::Info => "INFO",
            IssueSeverity::Warning => "WARNING",
            IssueSeverity::Error => "ERROR",
        }
    }
}

/// One recoverable problem recorded during parsing. Issues never abort the
/// document; the fatal cases are modeled as `ParseFailure` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsingIssue {
    pub severity: IssueSeverity,
    /// Source field or element the issue refers to.
    pub element: String,
    pub message: String,
    /// Producing system, when attributable.
    pub generator: Option<String>,
    /// Raw offending value, for diagnostics.
    pub value: Option<String>,
}

/// One product/service row of a parsed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_name: String,
    pub quantity: BigDecimal,
    pub unit: String,
    pub unit_price: BigDecimal,
    pub amount_before_tax: BigDecimal,
    /// Tax rate in percent.
    pub tax_rate: BigDecimal,
    pub tax_amount: BigDecimal,
    pub amount_with_tax: BigDecimal,
}

/// Canonical representation of one ingested source document.
///
/// Totals are always sums over the accepted line items; grand totals present
/// in the source are never trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub document_number: String,
    pub document_date: NaiveDate,
    pub supplier_name: Option<String>,
    pub supplier_tax_id: Option<String>,
    pub total_amount: BigDecimal,
    pub total_tax: BigDecimal,
    pub total_with_tax: BigDecimal,
    /// Producing system, "Unknown" when not detected.
    pub generator: String,
    pub format_version: Option<String>,
    pub items: Vec<LineItem>,
    pub issues: Vec<ParsingIssue>,
}

/// Document lifecycle status.
///
/// NEW -> DISTRIBUTED -> DISTRIBUTED (redistribution) -> ARCHIVED;
/// NEW -> DUPLICATE. DUPLICATE and ARCHIVED accept no further allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentStatus {
    New,
    Distributed,
    Duplicate,
    Archived,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::New => "NEW",
            DocumentStatus::Distributed => "DISTRIBUTED",
            DocumentStatus::Duplicate => "DUPLICATE",
            DocumentStatus::Archived => "ARCHIVED",
        }
    }

    pub fn parse(s: &str) -> Option<DocumentStatus> {
        match s {
            "NEW" => Some(DocumentStatus::New),
            "DISTRIBUTED" => Some(DocumentStatus::Distributed),
            "DUPLICATE" => Some(DocumentStatus::Duplicate),
            "ARCHIVED" => Some(DocumentStatus::Archived),
            _ => None,
        }
    }

    /// True while the manual "mark as duplicate of X" action is allowed:
    /// any time before the document is distributed. A DUPLICATE may be
    /// relinked to a different original.
    pub fn allows_duplicate_marking(&self) -> bool {
        matches!(self, DocumentStatus::New | DocumentStatus::Duplicate)
    }
}

/// Identity predicate behind duplicate detection: same document number,
/// dates within ± `window_days`, tax ids equal when both sides carry one
/// (a missing tax id never disqualifies a match).
pub fn shares_identity(
    a_number: &str,
    a_date: NaiveDate,
    a_tax_id: Option<&str>,
    b_number: &str,
    b_date: NaiveDate,
    b_tax_id: Option<&str>,
    window_days: i64,
) -> bool {
    if a_number != b_number {
        return false;
    }
    if (a_date - b_date).num_days().abs() > window_days {
        return false;
    }
    match (a_tax_id, b_tax_id) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Persisted document header row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DocumentRow {
    pub id: i64,
    pub document_number: String,
    pub document_date: NaiveDate,
    pub supplier_name: Option<String>,
    pub supplier_tax_id: Option<String>,
    pub total_amount: BigDecimal,
    pub total_tax: BigDecimal,
    pub total_with_tax: BigDecimal,
    pub generator: String,
    pub format_version: Option<String>,
    pub status: String,
    pub duplicate_of: Option<i64>,
}

impl DocumentRow {
    /// See [`shares_identity`].
    pub fn shares_identity(&self, other: &DocumentRow, window_days: i64) -> bool {
        shares_identity(
            &self.document_number,
            self.document_date,
            self.supplier_tax_id.as_deref(),
            &other.document_number,
            other.document_date,
            other.supplier_tax_id.as_deref(),
            window_days,
        )
    }
}

/// Persisted line item row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LineItemRow {
    pub id: i64,
    pub document_id: i64,
    pub line_no: i32,
    pub product_name: String,
    pub quantity: BigDecimal,
    pub unit: String,
    pub unit_price: BigDecimal,
    pub amount_before_tax: BigDecimal,
    pub tax_rate: BigDecimal,
    pub tax_amount: BigDecimal,
    pub amount_with_tax: BigDecimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn same_number_within_window_and_tax_id_is_a_duplicate() {
        // Number "123", dates three days apart, same supplier tax id.
        assert!(shares_identity(
            "123",
            date(2025, 3, 10),
            Some("7701234567"),
            "123",
            date(2025, 3, 13),
            Some("7701234567"),
            3
        ));
    }

    #[test]
    fn date_outside_the_window_is_not_a_duplicate() {
        assert!(!shares_identity(
            "123",
            date(2025, 3, 10),
            None,
            "123",
            date(2025, 3, 14),
            None,
            3
        ));
        // Symmetric on the other side of the window.
        assert!(!shares_identity(
            "123",
            date(2025, 3, 14),
            None,
            "123",
            date(2025, 3, 10),
            None,
            3
        ));
    }

    #[test]
    fn different_number_or_tax_id_is_not_a_duplicate() {
        assert!(!shares_identity(
            "123",
            date(2025, 3, 10),
            None,
            "124",
            date(2025, 3, 10),
            None,
            3
        ));
        assert!(!shares_identity(
            "123",
            date(2025, 3, 10),
            Some("7701234567"),
            "123",
            date(2025, 3, 10),
            Some("7809876543"),
            3
        ));
    }

    #[test]
    fn missing_tax_id_on_either_side_still_matches() {
        assert!(shares_identity(
            "123",
            date(2025, 3, 10),
            Some("7701234567"),
            "123",
            date(2025, 3, 10),
            None,
            3
        ));
        assert!(shares_identity(
            "123",
            date(2025, 3, 10),
            None,
            "123",
            date(2025, 3, 10),
            Some("7701234567"),
            3
        ));
    }

    #[test]
    fn duplicate_marking_is_allowed_until_distribution() {
        assert!(DocumentStatus::New.allows_duplicate_marking());
        assert!(DocumentStatus::Duplicate.allows_duplicate_marking());
        assert!(!DocumentStatus::Distributed.allows_duplicate_marking());
        assert!(!DocumentStatus::Archived.allows_duplicate_marking());
    }
}
