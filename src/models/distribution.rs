use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use super::document::LineItemRow;

/// Over-allocation tolerance for quantities (0.001 units).
pub fn quantity_tolerance() -> BigDecimal {
    BigDecimal::new(BigInt::from(1), 3)
}

/// Over-allocation tolerance for amounts (1 minor currency unit).
pub fn amount_tolerance() -> BigDecimal {
    BigDecimal::new(BigInt::from(1), 2)
}

/// One requested allocation of a line item to a target. Exactly one of
/// `purchase_request_id` / `cost_object_id` must be set; a purchase request
/// resolves to its owning cost object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationInput {
    pub line_item_id: i64,
    pub purchase_request_id: Option<i64>,
    pub cost_object_id: Option<i64>,
    pub quantity: BigDecimal,
    pub amount: BigDecimal,
}

/// Persisted distribution record. Batches are replaced wholesale on
/// redistribution, never partially mutated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DistributionRow {
    pub id: i64,
    pub document_id: i64,
    pub line_item_id: i64,
    pub purchase_request_id: Option<i64>,
    pub cost_object_id: Option<i64>,
    pub allocated_quantity: BigDecimal,
    pub allocated_amount: BigDecimal,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

/// Structured snapshot of one allocation batch, stored in history records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSnapshot {
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub line_item_id: i64,
    pub purchase_request_id: Option<i64>,
    pub cost_object_id: Option<i64>,
    pub quantity: BigDecimal,
    pub amount: BigDecimal,
}

impl DistributionSnapshot {
    pub fn from_rows(rows: &[DistributionRow]) -> Self {
        Self {
            entries: rows
                .iter()
                .map(|r| SnapshotEntry {
                    line_item_id: r.line_item_id,
                    purchase_request_id: r.purchase_request_id,
                    cost_object_id: r.cost_object_id,
                    quantity: r.allocated_quantity.clone(),
                    amount: r.allocated_amount.clone(),
                })
                .collect(),
        }
    }

    pub fn from_inputs(allocations: &[AllocationInput]) -> Self {
        Self {
            entries: allocations
                .iter()
                .map(|a| SnapshotEntry {
                    line_item_id: a.line_item_id,
                    purchase_request_id: a.purchase_request_id,
                    cost_object_id: a.cost_object_id,
                    quantity: a.quantity.clone(),
                    amount: a.amount.clone(),
                })
                .collect(),
        }
    }
}

/// Derived financial entry per allocation with a resolved cost object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    pub document_id: i64,
    pub line_item_id: i64,
    pub cost_object_id: i64,
    pub quantity: BigDecimal,
    pub amount: BigDecimal,
}

/// Audit trail action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HistoryAction {
    Create,
    Update,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Create => "CREATE",
            HistoryAction::Update => "UPDATE",
        }
    }
}

/// Append-only audit record; one per successful distribute/redistribute.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DistributionHistoryRow {
    pub id: i64,
    pub document_id: i64,
    pub user_id: i64,
    pub action: String,
    pub old_distribution: Option<serde_json::Value>,
    pub new_distribution: serde_json::Value,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Rejection reasons for distribute/redistribute. Unlike parsing issues,
/// these always fail the whole batch; nothing partial is persisted.
#[derive(Debug)]
pub enum DistributionError {
    DocumentNotFound(i64),
    WrongStatus { document_id: i64, status: String },
    EmptyBatch { document_id: i64 },
    LineItemNotFound(i64),
    NoTarget { line_item_id: i64 },
    BothTargets { line_item_id: i64 },
    UnknownCostObject(i64),
    UnknownPurchaseRequest(i64),
    QuantityExceeded { line_item_id: i64, limit: BigDecimal, requested: BigDecimal },
    AmountExceeded { line_item_id: i64, limit: BigDecimal, requested: BigDecimal },
    Snapshot(serde_json::Error),
    Db(sqlx::Error),
}

impl fmt::Display for DistributionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionError::DocumentNotFound(id) => write!(f, "document {} not found", id),
            DistributionError::WrongStatus { document_id, status } => {
                write!(f, "document {} has status {}, operation not allowed", document_id, status)
            }
            DistributionError::EmptyBatch { document_id } => {
                write!(f, "document {}: allocation batch is empty", document_id)
            }
            DistributionError::LineItemNotFound(id) => {
                write!(f, "line item {} does not belong to the document", id)
            }
            DistributionError::NoTarget { line_item_id } => {
                write!(f, "allocation for line item {} names neither a purchase request nor a cost object", line_item_id)
            }
            DistributionError::BothTargets { line_item_id } => {
                write!(f, "allocation for line item {} names both a purchase request and a cost object", line_item_id)
            }
            DistributionError::UnknownCostObject(id) => write!(f, "cost object {} not found", id),
            DistributionError::UnknownPurchaseRequest(id) => {
                write!(f, "purchase request {} not found", id)
            }
            DistributionError::QuantityExceeded { line_item_id, limit, requested } => write!(
                f,
                "line item {}: allocated quantity {} exceeds item quantity {} (over by {})",
                line_item_id,
                requested,
                limit,
                requested - limit
            ),
            DistributionError::AmountExceeded { line_item_id, limit, requested } => write!(
                f,
                "line item {}: allocated amount {} exceeds item gross amount {} (over by {})",
                line_item_id,
                requested,
                limit,
                requested - limit
            ),
            DistributionError::Snapshot(e) => {
                write!(f, "failed to encode distribution snapshot: {}", e)
            }
            DistributionError::Db(e) => write!(f, "database error: {}", e),
        }
    }
}

impl Error for DistributionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DistributionError::Db(e) => Some(e),
            DistributionError::Snapshot(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for DistributionError {
    fn from(e: sqlx::Error) -> Self {
        DistributionError::Db(e)
    }
}

impl From<serde_json::Error> for DistributionError {
    fn from(e: serde_json::Error) -> Self {
        DistributionError::Snapshot(e)
    }
}

impl DistributionError {
    /// True for batch-validation rejections (caller mistakes), false for
    /// infrastructure failures.
    pub fn is_validation(&self) -> bool {
        !matches!(self, DistributionError::Db(_) | DistributionError::Snapshot(_))
    }
}

/// Validates an allocation batch against the document's line items.
///
/// Per line item, the sums across the batch must stay within the item's
/// quantity and gross amount ceilings (plus tolerance). Target existence is
/// checked separately against the registries; here only target shape is
/// enforced. Any failure rejects the whole batch.
pub fn validate_allocations(
    items: &[LineItemRow],
    allocations: &[AllocationInput],
) -> Result<(), DistributionError> {
    let by_id: HashMap<i64, &LineItemRow> = items.iter().map(|it| (it.id, it)).collect();

    let mut qty_sums: HashMap<i64, BigDecimal> = HashMap::new();
    let mut amount_sums: HashMap<i64, BigDecimal> = HashMap::new();

    for alloc in allocations {
        match (alloc.purchase_request_id, alloc.cost_object_id) {
            (None, None) => {
                return Err(DistributionError::NoTarget { line_item_id: alloc.line_item_id })
            }
            (Some(_), Some(_)) => {
                return Err(DistributionError::BothTargets { line_item_id: alloc.line_item_id })
            }
            _ => {}
        }

        if !by_id.contains_key(&alloc.line_item_id) {
            return Err(DistributionError::LineItemNotFound(alloc.line_item_id));
        }

        let q = qty_sums.entry(alloc.line_item_id).or_insert_with(BigDecimal::zero);
        *q = &*q + &alloc.quantity;
        let a = amount_sums.entry(alloc.line_item_id).or_insert_with(BigDecimal::zero);
        *a = &*a + &alloc.amount;
    }

    for (item_id, total_qty) in &qty_sums {
        let item = by_id[item_id];
        if total_qty > &(&item.quantity + quantity_tolerance()) {
            return Err(DistributionError::QuantityExceeded {
                line_item_id: *item_id,
                limit: item.quantity.clone(),
                requested: total_qty.clone(),
            });
        }
        let total_amount = &amount_sums[item_id];
        if total_amount > &(&item.amount_with_tax + amount_tolerance()) {
            return Err(DistributionError::AmountExceeded {
                line_item_id: *item_id,
                limit: item.amount_with_tax.clone(),
                requested: total_amount.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    fn item(id: i64, quantity: &str, gross: &str) -> LineItemRow {
        LineItemRow {
            id,
            document_id: 1,
            line_no: 1,
            product_name: format!("item {}", id),
            quantity: dec(quantity),
            unit: "pcs".into(),
            unit_price: dec("0"),
            amount_before_tax: dec(gross),
            tax_rate: dec("0"),
            tax_amount: dec("0"),
            amount_with_tax: dec(gross),
        }
    }

    fn alloc(line_item_id: i64, cost_object_id: i64, quantity: &str, amount: &str) -> AllocationInput {
        AllocationInput {
            line_item_id,
            purchase_request_id: None,
            cost_object_id: Some(cost_object_id),
            quantity: dec(quantity),
            amount: dec(amount),
        }
    }

    #[test]
    fn full_allocation_to_two_targets_passes() {
        let items = vec![item(1, "10", "1000")];
        let allocs = vec![alloc(1, 100, "4", "400"), alloc(1, 200, "6", "600")];
        assert!(validate_allocations(&items, &allocs).is_ok());
    }

    #[test]
    fn over_allocated_amount_rejects_whole_batch() {
        // 600 + 500 against a gross of 1000: over by 100.
        let items = vec![item(1, "10", "1000")];
        let allocs = vec![alloc(1, 100, "5", "600"), alloc(1, 200, "5", "500")];
        match validate_allocations(&items, &allocs) {
            Err(DistributionError::AmountExceeded { line_item_id, limit, requested }) => {
                assert_eq!(line_item_id, 1);
                assert_eq!(limit, dec("1000"));
                assert_eq!(requested, dec("1100"));
            }
            other => panic!("expected AmountExceeded, got {:?}", other),
        }
    }

    #[test]
    fn over_allocated_quantity_is_rejected() {
        let items = vec![item(1, "3", "1000")];
        let allocs = vec![alloc(1, 100, "2", "300"), alloc(1, 200, "1.5", "300")];
        assert!(matches!(
            validate_allocations(&items, &allocs),
            Err(DistributionError::QuantityExceeded { line_item_id: 1, .. })
        ));
    }

    #[test]
    fn excess_within_tolerance_is_accepted() {
        let items = vec![item(1, "10", "1000")];
        // 0.0005 quantity and half a minor unit over the ceilings.
        let allocs = vec![alloc(1, 100, "10.0005", "1000.005")];
        assert!(validate_allocations(&items, &allocs).is_ok());
    }

    #[test]
    fn allocation_must_name_exactly_one_target() {
        let items = vec![item(1, "10", "1000")];

        let none = AllocationInput {
            line_item_id: 1,
            purchase_request_id: None,
            cost_object_id: None,
            quantity: dec("1"),
            amount: dec("100"),
        };
        assert!(matches!(
            validate_allocations(&items, &[none]),
            Err(DistributionError::NoTarget { line_item_id: 1 })
        ));

        let both = AllocationInput {
            line_item_id: 1,
            purchase_request_id: Some(7),
            cost_object_id: Some(8),
            quantity: dec("1"),
            amount: dec("100"),
        };
        assert!(matches!(
            validate_allocations(&items, &[both]),
            Err(DistributionError::BothTargets { line_item_id: 1 })
        ));
    }

    #[test]
    fn foreign_line_item_is_rejected() {
        let items = vec![item(1, "10", "1000")];
        let allocs = vec![alloc(99, 100, "1", "100")];
        assert!(matches!(
            validate_allocations(&items, &allocs),
            Err(DistributionError::LineItemNotFound(99))
        ));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let snap = DistributionSnapshot::from_inputs(&[alloc(1, 100, "2", "250.50")]);
        let value = serde_json::to_value(&snap).unwrap();
        let back: DistributionSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snap);
    }
}
