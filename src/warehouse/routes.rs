//! Warehouse HTTP handlers, each behind its own permission.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use serde_json::{Value, json};
use tracing::info;

use super::model::{CustomerPatch, ItemPatch, NewCustomer, NewItem, NewOrder};
use super::store::{StoreError, WarehouseStore};
use crate::auth::{Authorizer, VerifiedClaims, protect};

/// Shared handler state
pub type SharedStore = Arc<WarehouseStore>;

/// Handler failure rendered as a JSON error body
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Store rejected the operation
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Body was not valid JSON for the endpoint
    #[error("invalid request body: {0}")]
    Body(#[from] JsonRejection),

    /// Path id was not a number
    #[error("invalid path: {0}")]
    Path(#[from] PathRejection),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Invalid(_)) | Self::Body(_) | Self::Path(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Store(StoreError::Unprocessable(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Store(StoreError::NotFound { .. }) => "not_found",
            Self::Store(StoreError::Invalid(_)) | Self::Body(_) | Self::Path(_) => "bad_request",
            Self::Store(StoreError::Unprocessable(_)) => "unprocessable",
            Self::Store(StoreError::Conflict(_)) => "conflict",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "success": false,
            "error": status.as_u16(),
            "code": self.code(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

/// Warehouse routes with their permission guards applied.
pub fn routes(auth: &Arc<Authorizer>) -> Router<SharedStore> {
    Router::new()
        .route(
            "/customers",
            protect(auth, "get:customers", get(list_customers))
                .merge(protect(auth, "post:customer", post(create_customer))),
        )
        .route(
            "/customers/{id}",
            protect(auth, "patch:customer", patch(update_customer))
                .merge(protect(auth, "delete:customer", delete(delete_customer))),
        )
        .route(
            "/items",
            protect(auth, "get:items", get(list_items))
                .merge(protect(auth, "post:item", post(create_item))),
        )
        .route(
            "/items/{id}",
            protect(auth, "patch:item", patch(update_item))
                .merge(protect(auth, "delete:item", delete(delete_item))),
        )
        .route(
            "/orders",
            protect(auth, "get:orders", get(list_orders))
                .merge(protect(auth, "post:order", post(submit_order))),
        )
        .route(
            "/orders/{id}",
            protect(auth, "delete:order", delete(delete_order)),
        )
}

async fn list_customers(State(store): State<SharedStore>) -> ApiResult {
    Ok(Json(json!({ "success": true, "customers": store.customers() })))
}

async fn create_customer(
    State(store): State<SharedStore>,
    body: Result<Json<NewCustomer>, JsonRejection>,
) -> ApiResult {
    let Json(new) = body?;
    let customer = store.create_customer(new)?;
    info!(customer_id = customer.id, "Customer created");
    Ok(Json(json!({ "success": true, "customer": customer })))
}

async fn update_customer(
    State(store): State<SharedStore>,
    id: Result<Path<u64>, PathRejection>,
    body: Result<Json<CustomerPatch>, JsonRejection>,
) -> ApiResult {
    let Path(id) = id?;
    let Json(patch) = body?;
    let customer = store.update_customer(id, patch)?;
    Ok(Json(json!({ "success": true, "customer": customer })))
}

async fn delete_customer(
    State(store): State<SharedStore>,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult {
    let Path(id) = id?;
    let deleted = store.delete_customer(id)?;
    info!(customer_id = deleted, "Customer deleted");
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

async fn list_items(State(store): State<SharedStore>) -> ApiResult {
    Ok(Json(json!({ "success": true, "items": store.items() })))
}

async fn create_item(
    State(store): State<SharedStore>,
    body: Result<Json<NewItem>, JsonRejection>,
) -> ApiResult {
    let Json(new) = body?;
    let item = store.create_item(new)?;
    info!(item_id = item.id, name = %item.name, "Item created");
    Ok(Json(json!({ "success": true, "item": item })))
}

async fn update_item(
    State(store): State<SharedStore>,
    id: Result<Path<u64>, PathRejection>,
    body: Result<Json<ItemPatch>, JsonRejection>,
) -> ApiResult {
    let Path(id) = id?;
    let Json(patch) = body?;
    let item = store.update_item(id, patch)?;
    Ok(Json(json!({ "success": true, "item": item })))
}

async fn delete_item(
    State(store): State<SharedStore>,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult {
    let Path(id) = id?;
    let deleted = store.delete_item(id)?;
    info!(item_id = deleted, "Item deleted");
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

async fn list_orders(State(store): State<SharedStore>) -> ApiResult {
    Ok(Json(json!({ "success": true, "orders": store.orders() })))
}

async fn submit_order(
    State(store): State<SharedStore>,
    Extension(claims): Extension<VerifiedClaims>,
    body: Result<Json<NewOrder>, JsonRejection>,
) -> ApiResult {
    let Json(new) = body?;
    let order = store.submit_order(new)?;
    info!(order_id = order.id, submitted_by = %claims.subject, "Order submitted");
    Ok(Json(json!({ "success": true, "order_id": order.id, "order": order })))
}

async fn delete_order(
    State(store): State<SharedStore>,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult {
    let Path(id) = id?;
    let deletion = store.delete_order(id)?;
    Ok(Json(json!({
        "success": true,
        "deleted_order_id": deletion.deleted_id,
        "previous_orders": deletion.previous_orders,
        "current_orders": deletion.current_orders,
    })))
}
