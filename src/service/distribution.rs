use sqlx::{PgConnection, PgPool};

use crate::db::{queries, queries_distribution};
use crate::models::{
    validate_allocations, AllocationInput, CostEntry, DistributionError, DistributionHistoryRow,
    DistributionSnapshot, DocumentStatus, HistoryAction,
};

/// Distribution ledger: drives the NEW -> DISTRIBUTED state machine, writes
/// allocation batches with their derived cost entries and keeps the
/// append-only history.
///
/// Every operation runs in one transaction holding a row lock on the
/// document, so concurrent transitions serialize; the loser observes the
/// committed status and is rejected instead of double-allocating.
pub struct DistributionService {
    pool: PgPool,
}

impl DistributionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initial allocation, NEW documents only. The whole batch is validated
    /// and applied atomically; any failure leaves no partial trace.
    pub async fn distribute(
        &self,
        document_id: i64,
        allocations: &[AllocationInput],
        user_id: i64,
    ) -> Result<(), DistributionError> {
        let mut tx = self.pool.begin().await?;

        let doc = queries::lock_document(&mut *tx, document_id)
            .await?
            .ok_or(DistributionError::DocumentNotFound(document_id))?;
        if DocumentStatus::parse(&doc.status) != Some(DocumentStatus::New) {
            return Err(DistributionError::WrongStatus { document_id, status: doc.status });
        }

        let snapshot = self.apply_batch(&mut *tx, document_id, allocations, user_id).await?;

        queries_distribution::insert_history(
            &mut *tx,
            document_id,
            user_id,
            HistoryAction::Create,
            None,
            serde_json::to_value(&snapshot)?,
            "initial distribution",
        )
        .await?;
        queries::set_status(&mut *tx, document_id, DocumentStatus::Distributed).await?;
        tx.commit().await?;

        tracing::info!(
            "Document {} distributed: {} allocations by user {}",
            document_id,
            allocations.len(),
            user_id
        );
        Ok(())
    }

    /// Replaces the current allocation batch wholesale. Allowed from
    /// DISTRIBUTED only; ARCHIVED and DUPLICATE documents are frozen.
    pub async fn redistribute(
        &self,
        document_id: i64,
        allocations: &[AllocationInput],
        user_id: i64,
    ) -> Result<(), DistributionError> {
        let mut tx = self.pool.begin().await?;

        let doc = queries::lock_document(&mut *tx, document_id)
            .await?
            .ok_or(DistributionError::DocumentNotFound(document_id))?;
        if DocumentStatus::parse(&doc.status) != Some(DocumentStatus::Distributed) {
            return Err(DistributionError::WrongStatus { document_id, status: doc.status });
        }

        let prior_rows = queries_distribution::list_distributions(&mut *tx, document_id).await?;
        let prior = DistributionSnapshot::from_rows(&prior_rows);

        queries_distribution::delete_distributions(&mut *tx, document_id).await?;
        queries_distribution::delete_cost_entries(&mut *tx, document_id).await?;

        let snapshot = self.apply_batch(&mut *tx, document_id, allocations, user_id).await?;

        queries_distribution::insert_history(
            &mut *tx,
            document_id,
            user_id,
            HistoryAction::Update,
            Some(serde_json::to_value(&prior)?),
            serde_json::to_value(&snapshot)?,
            "redistribution",
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            "Document {} redistributed: {} -> {} allocations by user {}",
            document_id,
            prior_rows.len(),
            allocations.len(),
            user_id
        );
        Ok(())
    }

    /// Shared tail of distribute/redistribute: validates the batch, resolves
    /// targets against the registries, writes the distribution rows and the
    /// derived per-cost-object entries. Runs inside the caller's transaction.
    async fn apply_batch(
        &self,
        tx: &mut PgConnection,
        document_id: i64,
        allocations: &[AllocationInput],
        user_id: i64,
    ) -> Result<DistributionSnapshot, DistributionError> {
        if allocations.is_empty() {
            return Err(DistributionError::EmptyBatch { document_id });
        }

        let items = queries::list_line_items(tx, document_id).await?;
        validate_allocations(&items, allocations)?;

        // Target existence; a purchase request resolves to its owning cost
        // object, which receives the derived ledger entry.
        let mut cost_entries = Vec::with_capacity(allocations.len());
        for alloc in allocations {
            let cost_object_id = match (alloc.purchase_request_id, alloc.cost_object_id) {
                (Some(pr_id), None) => queries_distribution::purchase_request_cost_object(tx, pr_id)
                    .await?
                    .ok_or(DistributionError::UnknownPurchaseRequest(pr_id))?,
                (None, Some(co_id)) => {
                    if !queries_distribution::cost_object_exists(tx, co_id).await? {
                        return Err(DistributionError::UnknownCostObject(co_id));
                    }
                    co_id
                }
                // Shape already rejected by the planner.
                _ => {
                    return Err(DistributionError::NoTarget {
                        line_item_id: alloc.line_item_id,
                    })
                }
            };
            cost_entries.push(CostEntry {
                document_id,
                line_item_id: alloc.line_item_id,
                cost_object_id,
                quantity: alloc.quantity.clone(),
                amount: alloc.amount.clone(),
            });
        }

        queries_distribution::insert_distributions(tx, document_id, allocations, user_id).await?;
        queries_distribution::insert_cost_entries(tx, &cost_entries).await?;

        Ok(DistributionSnapshot::from_inputs(allocations))
    }

    /// Audit trail for a document, oldest first.
    pub async fn history(
        &self,
        document_id: i64,
    ) -> Result<Vec<DistributionHistoryRow>, DistributionError> {
        Ok(queries_distribution::list_history(&self.pool, document_id).await?)
    }
}
