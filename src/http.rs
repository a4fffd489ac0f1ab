//! HTTP surface of the service.
//!
//! One write endpoint drives the whole payment flow: a multipart POST
//! carrying either a receipt document or a bare payment reference. Success
//! responses mirror the shape the registration frontend expects:
//! `{success, receiptId, verified, message}` on acceptance and
//! `{success: false, error}` otherwise.

use crate::error::CompletionError;
use crate::model::{RegistrationDraft, RegistrationId};
use crate::payment::{PaymentEngine, PaymentProof};
use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

const RECEIPT_FIELD: &str = "receiptFile";
const REFERENCE_FIELD: &str = "paymentReference";

pub fn router(engine: Arc<PaymentEngine>) -> Router {
    Router::new()
        .route("/api/registrations", post(create_registration))
        .route("/api/registrations/{id}", get(get_registration))
        .route("/api/registrations/{id}/complete", post(complete_registration))
        .route("/health", get(health))
        .with_state(engine)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionResponse {
    success: bool,
    receipt_id: u64,
    verified: bool,
    message: String,
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<CompletionError> for ApiError {
    fn from(error: CompletionError) -> Self {
        if !error.is_client_error() {
            tracing::error!(%error, "completion attempt failed on the server side");
        }
        let status = match &error {
            CompletionError::RegistrationNotFound => StatusCode::NOT_FOUND,
            CompletionError::FileStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "success": false, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

async fn create_registration(
    State(engine): State<Arc<PaymentEngine>>,
    Json(draft): Json<RegistrationDraft>,
) -> Result<Response, ApiError> {
    let registration = engine.store().insert(draft);
    debug!(registration_id = %registration.id, "registration created");
    Ok((StatusCode::CREATED, Json(registration)).into_response())
}

async fn get_registration(
    State(engine): State<Arc<PaymentEngine>>,
    Path(id): Path<u64>,
) -> Result<Response, ApiError> {
    let id = RegistrationId(id);
    let registration = engine
        .store()
        .get(id)
        .ok_or(CompletionError::RegistrationNotFound)?;
    let receipt = engine.store().receipt_for(id);
    Ok(Json(json!({ "registration": registration, "receipt": receipt })).into_response())
}

async fn complete_registration(
    State(engine): State<Arc<PaymentEngine>>,
    Path(id): Path<u64>,
    multipart: Multipart,
) -> Result<Json<CompletionResponse>, ApiError> {
    let proof = read_proof(multipart).await?;
    let receipt = engine.complete(RegistrationId(id), proof).await?;

    let message = if receipt.verified {
        "Registration completed successfully".to_string()
    } else {
        "Receipt received; verification pending manual review".to_string()
    };

    Ok(Json(CompletionResponse {
        success: true,
        receipt_id: receipt.id.0,
        verified: receipt.verified,
        message,
    }))
}

/// Pulls the payment proof out of the multipart body. A file field wins over
/// a reference field when both are present.
async fn read_proof(mut multipart: Multipart) -> Result<Option<PaymentProof>, ApiError> {
    let mut document: Option<PaymentProof> = None;
    let mut reference: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some(RECEIPT_FIELD) => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::bad_request("receipt field has no file name"))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read upload: {e}")))?;
                document = Some(PaymentProof::Document {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            Some(REFERENCE_FIELD) => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read field: {e}")))?;
                if !value.trim().is_empty() {
                    reference = Some(value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    Ok(document.or(reference.map(PaymentProof::Reference)))
}
