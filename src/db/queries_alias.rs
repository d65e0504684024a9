use sqlx::PgPool;

use crate::models::{EstimateLineCandidate, ProductAlias};

/// Fetches both the supplier-scoped and the global alias rows for a product
/// name in one query; precedence is decided by the caller.
pub async fn find_aliases(
    pool: &PgPool,
    product_name: &str,
    supplier_tax_id: Option<&str>,
) -> Result<Vec<ProductAlias>, sqlx::Error> {
    sqlx::query_as::<_, ProductAlias>(
        r#"
        SELECT id, supplier_name_text, supplier_tax_id, canonical_name,
               estimate_line_id, confidence, use_count
        FROM product_aliases
        WHERE supplier_name_text = $1
          AND (supplier_tax_id = $2 OR supplier_tax_id IS NULL)
        "#,
    )
    .bind(product_name)
    .bind(supplier_tax_id)
    .fetch_all(pool)
    .await
}

pub async fn touch_alias(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE product_aliases SET use_count = use_count + 1 WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Atomic upsert keyed by (supplier_name_text, supplier_tax_id); the unique
/// index treats NULLs as equal so the global scope upserts too. A manual
/// confirmation always wins; automatic learning never demotes a
/// human-confirmed (100) row.
pub async fn upsert_alias(
    pool: &PgPool,
    product_name: &str,
    supplier_tax_id: Option<&str>,
    canonical_name: &str,
    estimate_line_id: Option<i64>,
    confidence: i16,
    is_manual: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO product_aliases (
            supplier_name_text, supplier_tax_id, canonical_name, estimate_line_id,
            confidence, use_count
        )
        VALUES ($1, $2, $3, $4, $5, 1)
        ON CONFLICT (supplier_name_text, supplier_tax_id) DO UPDATE SET
            canonical_name = CASE
                WHEN $6 OR product_aliases.confidence < 100 THEN EXCLUDED.canonical_name
                ELSE product_aliases.canonical_name END,
            estimate_line_id = CASE
                WHEN $6 OR product_aliases.confidence < 100 THEN EXCLUDED.estimate_line_id
                ELSE product_aliases.estimate_line_id END,
            confidence = CASE
                WHEN $6 THEN 100
                WHEN product_aliases.confidence < 100
                    THEN GREATEST(product_aliases.confidence, EXCLUDED.confidence)
                ELSE product_aliases.confidence END,
            use_count = product_aliases.use_count + 1
        "#,
    )
    .bind(product_name)
    .bind(supplier_tax_id)
    .bind(canonical_name)
    .bind(estimate_line_id)
    .bind(confidence)
    .bind(is_manual)
    .execute(pool)
    .await?;
    Ok(())
}

/// Candidate names for fuzzy matching, scoped to one estimate.
pub async fn list_estimate_lines(
    pool: &PgPool,
    estimate_id: i64,
) -> Result<Vec<EstimateLineCandidate>, sqlx::Error> {
    sqlx::query_as::<_, EstimateLineCandidate>(
        "SELECT id, name FROM estimate_lines WHERE estimate_id = $1 ORDER BY id",
    )
    .bind(estimate_id)
    .fetch_all(pool)
    .await
}
