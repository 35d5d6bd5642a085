use axum::response::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Returns API",
        description = r#"
Return request intake, status lookup and admin review.

Customers submit a return request for an order and look up its status by order id.
Administrators list requests and move them through the review workflow:

```
Pending -> Approved -> Completed
Pending -> Rejected
```

Admin endpoints require a bearer token from the identity provider carrying the admin role:

```
Authorization: Bearer <your-jwt-token>
```

Errors share one body shape:

```json
{
  "error": "Conflict",
  "code": "invalid_transition",
  "message": "Invalid status transition from Approved to Pending",
  "details": {"current_status": "Approved", "requested_status": "Pending"},
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#
    ),
    tags(
        (name = "Returns", description = "Customer-facing return requests"),
        (name = "Admin", description = "Return review endpoints"),
        (name = "health", description = "Liveness and readiness")
    ),
    paths(
        crate::handlers::returns::create_return,
        crate::handlers::returns::get_return_status,
        crate::handlers::admin_returns::list_returns,
        crate::handlers::admin_returns::get_return,
        crate::handlers::admin_returns::get_return_history,
        crate::handlers::admin_returns::update_return_status,
        crate::health::health_check,
        crate::health::readiness_check,
    ),
    components(
        schemas(
            crate::models::return_record::ReturnStatus,
            crate::models::return_record::ReturnRecord,
            crate::models::return_record::StatusChange,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Serves the generated OpenAPI document.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDocV1::openapi())
}
