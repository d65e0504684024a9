use indexmap::IndexSet;
use sqlx::PgPool;
use std::error::Error;
use std::fmt;

use crate::db::queries;
use crate::models::{DocumentRow, DocumentStatus, ParsedDocument};
use crate::parser::{DocumentParser, ParseFailure};

/// Failures of ingestion and duplicate handling. Parse failures reject the
/// document outright; nothing is persisted for them.
#[derive(Debug)]
pub enum IngestError {
    Parse(ParseFailure),
    DocumentNotFound(i64),
    OriginalNotFound(i64),
    /// Marking a document as a duplicate of itself or of another duplicate.
    InvalidOriginal(i64),
    WrongStatus { document_id: i64, status: String },
    Db(sqlx::Error),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Parse(e) => write!(f, "parse failure: {}", e),
            IngestError::DocumentNotFound(id) => write!(f, "document {} not found", id),
            IngestError::OriginalNotFound(id) => {
                write!(f, "original document {} not found", id)
            }
            IngestError::InvalidOriginal(id) => {
                write!(f, "document {} cannot serve as a duplicate original", id)
            }
            IngestError::WrongStatus { document_id, status } => {
                write!(f, "document {} has status {}, operation not allowed", document_id, status)
            }
            IngestError::Db(e) => write!(f, "database error: {}", e),
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IngestError::Parse(e) => Some(e),
            IngestError::Db(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseFailure> for IngestError {
    fn from(e: ParseFailure) -> Self {
        IngestError::Parse(e)
    }
}

impl From<sqlx::Error> for IngestError {
    fn from(e: sqlx::Error) -> Self {
        IngestError::Db(e)
    }
}

/// Result of a successful ingestion. A duplicate is not an error; it is a
/// routing decision surfaced to the caller.
#[derive(Debug)]
pub struct IngestOutcome {
    pub document_id: i64,
    pub status: DocumentStatus,
    pub duplicate_of: Option<i64>,
    pub document: ParsedDocument,
}

/// Ingestion service: parses raw document bytes, flags exact duplicates at
/// the door and persists the document with its line items and issue list.
pub struct IngestService {
    pool: PgPool,
    parser: DocumentParser,
    duplicate_window_days: i64,
}

impl IngestService {
    pub fn new(pool: PgPool, parser: DocumentParser, duplicate_window_days: i64) -> Self {
        Self { pool, parser, duplicate_window_days }
    }

    /// Parses and persists one source document. An existing non-duplicate
    /// document with the same identity fields flags the incoming one
    /// DUPLICATE automatically, with a reference to the original.
    pub async fn ingest(&self, raw: &[u8]) -> Result<IngestOutcome, IngestError> {
        let document = self.parser.parse(raw)?;

        let mut tx = self.pool.begin().await?;
        let original =
            queries::find_exact_duplicate(&mut *tx, &document, self.duplicate_window_days).await?;
        let status = match original {
            Some(_) => DocumentStatus::Duplicate,
            None => DocumentStatus::New,
        };
        let document_id = queries::insert_document(&mut *tx, &document, status, original).await?;
        queries::insert_line_items(&mut *tx, document_id, &document).await?;
        queries::insert_parsing_issues(&mut *tx, document_id, &document).await?;
        tx.commit().await?;

        match original {
            Some(original_id) => tracing::warn!(
                "Document {} ({} of {}) flagged DUPLICATE of {}",
                document_id,
                document.document_number,
                document.document_date,
                original_id
            ),
            None => tracing::info!(
                "Document {} ingested: {} items, {} issues, generator {}",
                document_id,
                document.items.len(),
                document.issues.len(),
                document.generator
            ),
        }

        Ok(IngestOutcome { document_id, status, duplicate_of: original, document })
    }

    /// Near-duplicate suggestions for one document: same number within the
    /// configured date window, matching tax id when both sides carry one.
    /// A human-facing list; never flips status.
    pub async fn find_duplicates(&self, document_id: i64) -> Result<Vec<DocumentRow>, IngestError> {
        let doc = queries::get_document(&self.pool, document_id)
            .await?
            .ok_or(IngestError::DocumentNotFound(document_id))?;

        let candidates =
            queries::find_window_duplicates(&self.pool, &doc, self.duplicate_window_days).await?;

        // The indexed query narrows by number and date range; the shared
        // identity predicate makes the final call. Order-preserving dedup
        // by id keeps the closest-date-first ordering.
        let mut seen: IndexSet<i64> = IndexSet::new();
        let deduped: Vec<DocumentRow> = candidates
            .into_iter()
            .filter(|c| doc.shares_identity(c, self.duplicate_window_days) && seen.insert(c.id))
            .collect();

        tracing::info!(
            "Document {}: {} near-duplicate candidates within {} days",
            document_id,
            deduped.len(),
            self.duplicate_window_days
        );
        Ok(deduped)
    }

    /// Manual "mark as duplicate of X". Allowed any time before the document
    /// is distributed; a DUPLICATE may be relinked to a different original.
    /// The original must exist and must not itself be a duplicate.
    pub async fn mark_duplicate(
        &self,
        document_id: i64,
        original_id: i64,
    ) -> Result<(), IngestError> {
        if document_id == original_id {
            return Err(IngestError::InvalidOriginal(original_id));
        }

        let mut tx = self.pool.begin().await?;

        let doc = queries::lock_document(&mut *tx, document_id)
            .await?
            .ok_or(IngestError::DocumentNotFound(document_id))?;
        let allowed = DocumentStatus::parse(&doc.status)
            .map_or(false, |s| s.allows_duplicate_marking());
        if !allowed {
            return Err(IngestError::WrongStatus {
                document_id,
                status: doc.status,
            });
        }

        let original = queries::get_document(&self.pool, original_id)
            .await?
            .ok_or(IngestError::OriginalNotFound(original_id))?;
        if DocumentStatus::parse(&original.status) == Some(DocumentStatus::Duplicate) {
            return Err(IngestError::InvalidOriginal(original_id));
        }

        queries::set_duplicate(&mut *tx, document_id, original_id).await?;
        tx.commit().await?;

        tracing::info!("Document {} manually marked duplicate of {}", document_id, original_id);
        Ok(())
    }
}
