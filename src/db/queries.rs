use chrono::Duration;
use sqlx::{PgConnection, PgPool};

use crate::models::{DocumentRow, DocumentStatus, LineItemRow, ParsedDocument};

const DOCUMENT_COLUMNS: &str = "id, document_number, document_date, supplier_name, \
     supplier_tax_id, total_amount, total_tax, total_with_tax, generator, format_version, \
     status, duplicate_of";

/// Inserts the document header, returning the new id.
pub async fn insert_document(
    conn: &mut PgConnection,
    doc: &ParsedDocument,
    status: DocumentStatus,
    duplicate_of: Option<i64>,
) -> Result<i64, sqlx::Error> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO documents (
            document_number, document_date, supplier_name, supplier_tax_id,
            total_amount, total_tax, total_with_tax, generator, format_version,
            status, duplicate_of
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id
        "#,
    )
    .bind(&doc.document_number)
    .bind(doc.document_date)
    .bind(&doc.supplier_name)
    .bind(&doc.supplier_tax_id)
    .bind(&doc.total_amount)
    .bind(&doc.total_tax)
    .bind(&doc.total_with_tax)
    .bind(&doc.generator)
    .bind(&doc.format_version)
    .bind(status.as_str())
    .bind(duplicate_of)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

/// Batch-inserts line items in document order.
pub async fn insert_line_items(
    conn: &mut PgConnection,
    document_id: i64,
    doc: &ParsedDocument,
) -> Result<(), sqlx::Error> {
    if doc.items.is_empty() {
        return Ok(());
    }

    let mut query_builder = sqlx::QueryBuilder::new(
        "INSERT INTO line_items (
            document_id, line_no, product_name, quantity, unit, unit_price,
            amount_before_tax, tax_rate, tax_amount, amount_with_tax
        ) ",
    );
    query_builder.push_values(doc.items.iter().enumerate(), |mut b, (idx, item)| {
        b.push_bind(document_id)
            .push_bind((idx + 1) as i32)
            .push_bind(&item.product_name)
            .push_bind(item.quantity.clone())
            .push_bind(&item.unit)
            .push_bind(item.unit_price.clone())
            .push_bind(item.amount_before_tax.clone())
            .push_bind(item.tax_rate.clone())
            .push_bind(item.tax_amount.clone())
            .push_bind(item.amount_with_tax.clone());
    });
    query_builder.build().execute(&mut *conn).await?;
    Ok(())
}

/// Batch-inserts the parsing issues recorded for a document.
pub async fn insert_parsing_issues(
    conn: &mut PgConnection,
    document_id: i64,
    doc: &ParsedDocument,
) -> Result<(), sqlx::Error> {
    if doc.issues.is_empty() {
        return Ok(());
    }

    let mut query_builder = sqlx::QueryBuilder::new(
        "INSERT INTO parsing_issues (document_id, severity, element, message, generator, raw_value) ",
    );
    query_builder.push_values(&doc.issues, |mut b, issue| {
        b.push_bind(document_id)
            .push_bind(issue.severity.as_str())
            .push_bind(&issue.element)
            .push_bind(&issue.message)
            .push_bind(&issue.generator)
            .push_bind(&issue.value);
    });
    query_builder.build().execute(&mut *conn).await?;
    Ok(())
}

/// Finds a previously accepted non-duplicate document with the same identity
/// fields; dates match within the window tolerance, tax id is compared only
/// when both sides carry one. The earliest such document is the original.
pub async fn find_exact_duplicate(
    conn: &mut PgConnection,
    doc: &ParsedDocument,
    window_days: i64,
) -> Result<Option<i64>, sqlx::Error> {
    let window = Duration::days(window_days);
    sqlx::query_scalar(
        r#"
        SELECT id FROM documents
        WHERE document_number = $1
          AND document_date BETWEEN $2 AND $3
          AND status <> 'DUPLICATE'
          AND ($4::text IS NULL OR supplier_tax_id IS NULL OR supplier_tax_id = $4)
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(&doc.document_number)
    .bind(doc.document_date - window)
    .bind(doc.document_date + window)
    .bind(&doc.supplier_tax_id)
    .fetch_optional(&mut *conn)
    .await
}

/// Near-duplicate suggestions: same number within the date window, closest
/// date first. Never flips status by itself.
pub async fn find_window_duplicates(
    pool: &PgPool,
    doc: &DocumentRow,
    window_days: i64,
) -> Result<Vec<DocumentRow>, sqlx::Error> {
    let window = Duration::days(window_days);
    sqlx::query_as::<_, DocumentRow>(&format!(
        r#"
        SELECT {DOCUMENT_COLUMNS} FROM documents
        WHERE document_number = $1
          AND id <> $2
          AND status <> 'DUPLICATE'
          AND document_date BETWEEN $3 AND $4
          AND ($5::text IS NULL OR supplier_tax_id IS NULL OR supplier_tax_id = $5)
        ORDER BY abs(document_date - $6), id
        "#
    ))
    .bind(&doc.document_number)
    .bind(doc.id)
    .bind(doc.document_date - window)
    .bind(doc.document_date + window)
    .bind(&doc.supplier_tax_id)
    .bind(doc.document_date)
    .fetch_all(pool)
    .await
}

pub async fn get_document(pool: &PgPool, id: i64) -> Result<Option<DocumentRow>, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Loads the document row under a row-level lock so concurrent status
/// transitions serialize; the loser observes the committed status.
pub async fn lock_document(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<DocumentRow>, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

pub async fn set_status(
    conn: &mut PgConnection,
    id: i64,
    status: DocumentStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE documents SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn set_duplicate(
    conn: &mut PgConnection,
    id: i64,
    original_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE documents SET status = 'DUPLICATE', duplicate_of = $2 WHERE id = $1")
        .bind(id)
        .bind(original_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn list_line_items(
    conn: &mut PgConnection,
    document_id: i64,
) -> Result<Vec<LineItemRow>, sqlx::Error> {
    sqlx::query_as::<_, LineItemRow>(
        r#"
        SELECT id, document_id, line_no, product_name, quantity, unit, unit_price,
               amount_before_tax, tax_rate, tax_amount, amount_with_tax
        FROM line_items
        WHERE document_id = $1
        ORDER BY line_no
        "#,
    )
    .bind(document_id)
    .fetch_all(&mut *conn)
    .await
}
