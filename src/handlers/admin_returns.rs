use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::Json,
    Extension,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    models::return_record::{ReturnRecord, ReturnStatus, StatusChange},
    services::returns::{ListReturnsQuery, StatusTransition},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AdminReturnListQuery {
    /// Optional status filter (case-insensitive)
    pub status: Option<String>,
    /// Page size (defaults to the configured page size, clamped to the maximum)
    pub limit: Option<u64>,
    /// Number of records to skip
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateReturnStatusRequest {
    /// Target status: Approved, Rejected or Completed
    #[schema(example = "Approved")]
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

fn parse_status(raw: &str) -> Result<ReturnStatus, ServiceError> {
    ReturnStatus::from_str(raw.trim())
        .map_err(|_| ServiceError::InvalidInput(format!("Unknown return status '{}'", raw)))
}

fn path_id(id: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ServiceError> {
    id.map(|Path(id)| id)
        .map_err(|e| ServiceError::InvalidInput(e.body_text()))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/returns",
    summary = "List return requests",
    description = "Return requests in creation order, optionally filtered by status",
    params(AdminReturnListQuery),
    responses(
        (status = 200, description = "Page of return requests", body = ApiResponse<PaginatedResponse<ReturnRecord>>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_returns(
    State(state): State<AppState>,
    query: Result<Query<AdminReturnListQuery>, QueryRejection>,
) -> ApiResult<PaginatedResponse<ReturnRecord>> {
    let Query(query) = query.map_err(|e| ServiceError::InvalidInput(e.body_text()))?;
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(parse_status)
        .transpose()?;

    let page = state
        .return_service()
        .list_returns(ListReturnsQuery {
            status,
            limit: query.limit,
            offset: query.offset,
        })
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::from(page))))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/returns/{id}",
    summary = "Get a return request",
    params(("id" = Uuid, Path, description = "Return request id")),
    responses(
        (status = 200, description = "Return request", body = ApiResponse<ReturnRecord>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn get_return(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ReturnRecord> {
    let id = path_id(id)?;
    let record = state.return_service().get_return(id).await?;
    Ok(Json(ApiResponse::success(record)))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/returns/{id}/history",
    summary = "Status history of a return request",
    params(("id" = Uuid, Path, description = "Return request id")),
    responses(
        (status = 200, description = "Status changes in the order they were applied", body = ApiResponse<Vec<StatusChange>>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn get_return_history(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Vec<StatusChange>> {
    let id = path_id(id)?;
    let history = state.return_service().status_history(id).await?;
    Ok(Json(ApiResponse::success(history)))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/returns/{id}/status",
    summary = "Move a return request to another status",
    description = "Pending -> Approved | Rejected, Approved -> Completed. Rejected and Completed are final.",
    params(("id" = Uuid, Path, description = "Return request id")),
    request_body = UpdateReturnStatusRequest,
    responses(
        (status = 200, description = "Updated return request", body = ApiResponse<ReturnRecord>),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed from the current status", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_return_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateReturnStatusRequest>, JsonRejection>,
) -> ApiResult<ReturnRecord> {
    let id = path_id(id)?;
    let Json(payload) = payload.map_err(|e| ServiceError::InvalidInput(e.body_text()))?;
    let status = parse_status(&payload.status)?;

    let record = state
        .return_service()
        .transition_status(
            id,
            StatusTransition {
                status,
                actor: Some(user.user_id),
                note: payload.note,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(record)))
}
