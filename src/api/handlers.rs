use crate::models::{
    AliasMatch, AllocationInput, DistributionHistoryRow, DocumentRow, DocumentStatus, ParsingIssue,
};
use crate::service::{DistributionService, IngestError, IngestService, MappingService};
use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Generic failure envelope.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { success: false, message })).into_response()
}

/// Health check.
pub async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub document_id: i64,
    pub status: DocumentStatus,
    pub duplicate_of: Option<i64>,
    pub issues: Vec<ParsingIssue>,
}

/// Ingests one raw source document (request body = document bytes).
pub async fn ingest_document(
    State(service): State<Arc<IngestService>>,
    body: Bytes,
) -> Response {
    match service.ingest(&body).await {
        Ok(outcome) => {
            let response = IngestResponse {
                success: true,
                document_id: outcome.document_id,
                status: outcome.status,
                duplicate_of: outcome.duplicate_of,
                issues: outcome.document.issues,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(IngestError::Parse(e)) => {
            error_response(StatusCode::BAD_REQUEST, format!("Parse failure: {}", e))
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

#[derive(Debug, Serialize)]
pub struct DuplicatesResponse {
    pub success: bool,
    pub candidates: Vec<DocumentRow>,
}

/// Near-duplicate suggestions for one document.
pub async fn find_duplicates(
    State(service): State<Arc<IngestService>>,
    Path(document_id): Path<i64>,
) -> Response {
    match service.find_duplicates(document_id).await {
        Ok(candidates) => {
            (StatusCode::OK, Json(DuplicatesResponse { success: true, candidates }))
                .into_response()
        }
        Err(IngestError::DocumentNotFound(id)) => {
            error_response(StatusCode::NOT_FOUND, format!("Document {} not found", id))
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct MarkDuplicateRequest {
    pub original_id: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// Manual "mark as duplicate of X".
pub async fn mark_duplicate(
    State(service): State<Arc<IngestService>>,
    Path(document_id): Path<i64>,
    Json(req): Json<MarkDuplicateRequest>,
) -> Response {
    match service.mark_duplicate(document_id, req.original_id).await {
        Ok(()) => {
            let response = MessageResponse {
                success: true,
                message: format!("Document {} marked duplicate of {}", document_id, req.original_id),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e @ IngestError::DocumentNotFound(_)) | Err(e @ IngestError::OriginalNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, format!("Error: {}", e))
        }
        Err(e @ IngestError::WrongStatus { .. }) | Err(e @ IngestError::InvalidOriginal(_)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, format!("Error: {}", e))
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct DistributeRequest {
    pub user_id: i64,
    pub allocations: Vec<AllocationInput>,
}

/// Initial allocation of a NEW document.
pub async fn distribute(
    State(service): State<Arc<DistributionService>>,
    Path(document_id): Path<i64>,
    Json(req): Json<DistributeRequest>,
) -> Response {
    match service.distribute(document_id, &req.allocations, req.user_id).await {
        Ok(()) => {
            let response = MessageResponse {
                success: true,
                message: format!(
                    "Document {} distributed with {} allocations",
                    document_id,
                    req.allocations.len()
                ),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) if e.is_validation() => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, format!("Rejected: {}", e))
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

/// Wholesale replacement of a DISTRIBUTED document's allocation batch.
pub async fn redistribute(
    State(service): State<Arc<DistributionService>>,
    Path(document_id): Path<i64>,
    Json(req): Json<DistributeRequest>,
) -> Response {
    match service.redistribute(document_id, &req.allocations, req.user_id).await {
        Ok(()) => {
            let response = MessageResponse {
                success: true,
                message: format!(
                    "Document {} redistributed with {} allocations",
                    document_id,
                    req.allocations.len()
                ),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) if e.is_validation() => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, format!("Rejected: {}", e))
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub history: Vec<DistributionHistoryRow>,
}

/// Allocation audit trail for a document, oldest first.
pub async fn distribution_history(
    State(service): State<Arc<DistributionService>>,
    Path(document_id): Path<i64>,
) -> Response {
    match service.history(document_id).await {
        Ok(history) => {
            (StatusCode::OK, Json(HistoryResponse { success: true, history })).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    pub product_name: String,
    pub supplier_tax_id: Option<String>,
    pub estimate_id: Option<i64>,
    pub min_confidence: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct SuggestResponse {
    pub success: bool,
    pub found: Option<AliasMatch>,
}

/// Alias/fuzzy mapping suggestion for a supplier product name.
pub async fn suggest_mapping(
    State(service): State<Arc<MappingService>>,
    Json(req): Json<SuggestRequest>,
) -> Response {
    match service
        .find_best_match(
            &req.product_name,
            req.supplier_tax_id.as_deref(),
            req.estimate_id,
            req.min_confidence,
        )
        .await
    {
        Ok(found) => (StatusCode::OK, Json(SuggestResponse { success: true, found }))
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct LearnRequest {
    pub product_name: String,
    pub canonical_name: String,
    pub estimate_line_id: Option<i64>,
    pub supplier_tax_id: Option<String>,
    pub is_manual: bool,
}

/// Records a user-confirmed (or automatic) mapping.
pub async fn learn_mapping(
    State(service): State<Arc<MappingService>>,
    Json(req): Json<LearnRequest>,
) -> Response {
    match service
        .learn_mapping(
            &req.product_name,
            &req.canonical_name,
            req.estimate_line_id,
            req.supplier_tax_id.as_deref(),
            req.is_manual,
        )
        .await
    {
        Ok(()) => {
            let response = MessageResponse {
                success: true,
                message: format!("Mapping learned for '{}'", req.product_name),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)),
    }
}
