use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A learned mapping from a supplier's free-text product name to a canonical
/// internal name, scoped per supplier tax id (NULL scope = global alias).
///
/// Aliases are permanent: the system has no deletion or expiry path. A wrong
/// alias is corrected by a new manual confirmation, which overwrites the
/// canonical name in place.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProductAlias {
    pub id: i64,
    pub supplier_name_text: String,
    pub supplier_tax_id: Option<String>,
    pub canonical_name: String,
    pub estimate_line_id: Option<i64>,
    /// 0..=100; 100 is reserved for human-confirmed mappings, automatic
    /// learning writes 80.
    pub confidence: i16,
    pub use_count: i64,
}

/// Where a match came from, in resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// Exact alias scoped to the supplier tax id.
    SupplierAlias,
    /// Exact alias with no supplier scope.
    GlobalAlias,
    /// Fuzzy similarity against the candidate set.
    Fuzzy,
}

/// Result of `MappingService::find_best_match`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasMatch {
    pub canonical_name: String,
    pub estimate_line_id: Option<i64>,
    pub confidence: u8,
    pub source: MatchSource,
}

/// One candidate name from the target scope (an estimate's lines).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EstimateLineCandidate {
    pub id: i64,
    pub name: String,
}
