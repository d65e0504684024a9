use chrono::Utc;
use sqlx::{PgConnection, PgPool};

use crate::models::{AllocationInput, CostEntry, DistributionHistoryRow, DistributionRow, HistoryAction};

pub async fn list_distributions(
    conn: &mut PgConnection,
    document_id: i64,
) -> Result<Vec<DistributionRow>, sqlx::Error> {
    sqlx::query_as::<_, DistributionRow>(
        r#"
        SELECT id, document_id, line_item_id, purchase_request_id, cost_object_id,
               allocated_quantity, allocated_amount, created_by, created_at
        FROM distributions
        WHERE document_id = $1
        ORDER BY id
        "#,
    )
    .bind(document_id)
    .fetch_all(&mut *conn)
    .await
}

/// Inserts one allocation batch. Redistribution always deletes the prior
/// batch first; records are never mutated in place.
pub async fn insert_distributions(
    conn: &mut PgConnection,
    document_id: i64,
    allocations: &[AllocationInput],
    user_id: i64,
) -> Result<(), sqlx::Error> {
    if allocations.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let mut query_builder = sqlx::QueryBuilder::new(
        "INSERT INTO distributions (
            document_id, line_item_id, purchase_request_id, cost_object_id,
            allocated_quantity, allocated_amount, created_by, created_at
        ) ",
    );
    query_builder.push_values(allocations, |mut b, alloc| {
        b.push_bind(document_id)
            .push_bind(alloc.line_item_id)
            .push_bind(alloc.purchase_request_id)
            .push_bind(alloc.cost_object_id)
            .push_bind(alloc.quantity.clone())
            .push_bind(alloc.amount.clone())
            .push_bind(user_id)
            .push_bind(now);
    });
    query_builder.build().execute(&mut *conn).await?;
    Ok(())
}

pub async fn delete_distributions(
    conn: &mut PgConnection,
    document_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM distributions WHERE document_id = $1")
        .bind(document_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn insert_cost_entries(
    conn: &mut PgConnection,
    entries: &[CostEntry],
) -> Result<(), sqlx::Error> {
    if entries.is_empty() {
        return Ok(());
    }

    let mut query_builder = sqlx::QueryBuilder::new(
        "INSERT INTO cost_entries (document_id, line_item_id, cost_object_id, quantity, amount) ",
    );
    query_builder.push_values(entries, |mut b, entry| {
        b.push_bind(entry.document_id)
            .push_bind(entry.line_item_id)
            .push_bind(entry.cost_object_id)
            .push_bind(entry.quantity.clone())
            .push_bind(entry.amount.clone());
    });
    query_builder.build().execute(&mut *conn).await?;
    Ok(())
}

pub async fn delete_cost_entries(
    conn: &mut PgConnection,
    document_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cost_entries WHERE document_id = $1")
        .bind(document_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Appends one audit record. There is no update or delete path for history.
pub async fn insert_history(
    conn: &mut PgConnection,
    document_id: i64,
    user_id: i64,
    action: HistoryAction,
    old_distribution: Option<serde_json::Value>,
    new_distribution: serde_json::Value,
    description: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO distribution_history (
            document_id, user_id, action, old_distribution, new_distribution,
            description, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(document_id)
    .bind(user_id)
    .bind(action.as_str())
    .bind(old_distribution)
    .bind(new_distribution)
    .bind(description)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn cost_object_exists(conn: &mut PgConnection, id: i64) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM cost_objects WHERE id = $1)")
        .bind(id)
        .fetch_one(&mut *conn)
        .await
}

/// Resolves a purchase request to its owning cost object.
pub async fn purchase_request_cost_object(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT cost_object_id FROM purchase_requests WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

/// Full audit trail for a document, oldest first.
pub async fn list_history(
    pool: &PgPool,
    document_id: i64,
) -> Result<Vec<DistributionHistoryRow>, sqlx::Error> {
    sqlx::query_as::<_, DistributionHistoryRow>(
        r#"
        SELECT id, document_id, user_id, action, old_distribution, new_distribution,
               description, created_at
        FROM distribution_history
        WHERE document_id = $1
        ORDER BY id
        "#,
    )
    .bind(document_id)
    .fetch_all(pool)
    .await
}
