use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    models::return_record::{ReturnRecord, ReturnStatus},
    services::returns::{StatusLookup, SubmitReturnCommand},
    ApiResponse, ApiResult, AppState,
};

/// What a customer sees of a return request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReturnSummary {
    pub id: Uuid,
    pub order_id: String,
    pub status: ReturnStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ReturnRecord> for ReturnSummary {
    fn from(record: ReturnRecord) -> Self {
        Self {
            id: record.id,
            order_id: record.order_id,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Submission body as received. A field that is missing, `null` or not a
/// string reads as empty, so validation reports it by name.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitReturnBody {
    #[serde(default, deserialize_with = "string_or_empty")]
    pub order_id: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub email: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pub reason: String,
}

impl From<SubmitReturnBody> for SubmitReturnCommand {
    fn from(body: SubmitReturnBody) -> Self {
        SubmitReturnCommand::new(body.order_id, body.email, body.reason)
    }
}

fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        _ => String::new(),
    })
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReturnStatusQuery {
    /// Order the return request was submitted for
    pub order_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/returns",
    summary = "Submit a return request",
    request_body = SubmitReturnCommand,
    responses(
        (status = 201, description = "Return request accepted", body = ApiResponse<ReturnSummary>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid or missing fields", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already has an open return request", body = crate::errors::ErrorResponse),
        (status = 503, description = "Storage unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Returns"
)]
pub async fn create_return(
    State(state): State<AppState>,
    payload: Result<Json<SubmitReturnBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<ReturnSummary>>), ServiceError> {
    let Json(body) = payload.map_err(|e| ServiceError::InvalidInput(e.body_text()))?;

    let record = state.return_service().submit_return(body.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(ReturnSummary::from(record))),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/returns/status",
    summary = "Look up the status of an order's return request",
    params(ReturnStatusQuery),
    responses(
        (status = 200, description = "Latest return request status", body = ApiResponse<StatusLookup>),
        (status = 400, description = "Missing order id", body = crate::errors::ErrorResponse),
        (status = 404, description = "No return request for this order", body = crate::errors::ErrorResponse)
    ),
    tag = "Returns"
)]
pub async fn get_return_status(
    State(state): State<AppState>,
    query: Result<Query<ReturnStatusQuery>, QueryRejection>,
) -> ApiResult<StatusLookup> {
    let Query(query) = query.map_err(|e| ServiceError::InvalidInput(e.body_text()))?;
    let order_id = query.order_id.unwrap_or_default();

    let lookup = state.return_service().lookup_status(&order_id).await?;
    Ok(Json(ApiResponse::success(lookup)))
}
