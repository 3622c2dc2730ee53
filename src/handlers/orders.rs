use crate::{
    auth::{ActorContext, ActorRole},
    entities::order::OrderStatus,
    errors::ServiceError,
    handlers::{common::PaginationParams, AppState},
    services::external::DocumentHandle,
    services::order_status::TransitionRequest,
    services::orders::{CreateOrderInput, ListOrdersFilter, OrderDetail, OrderResponse},
    ApiResponse, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

/// Query parameters for listing orders
#[derive(Debug, Deserialize, IntoParams)]
pub struct OrdersListQuery {
    /// Filter by order status (e.g. "pending", "shipped")
    pub status: Option<String>,
}

fn map_status_str(status: &str) -> Result<OrderStatus, ServiceError> {
    match status.to_ascii_lowercase().as_str() {
        "pending" => Ok(OrderStatus::Pending),
        "confirmed" => Ok(OrderStatus::Confirmed),
        "processing" => Ok(OrderStatus::Processing),
        "shipped" => Ok(OrderStatus::Shipped),
        "out_for_delivery" => Ok(OrderStatus::OutForDelivery),
        "delivered" => Ok(OrderStatus::Delivered),
        "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
        "returned" => Ok(OrderStatus::Returned),
        other => Err(ServiceError::ValidationError(format!(
            "Unknown order status: {other}"
        ))),
    }
}

/// Convert the caller's cart into an order
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderInput,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderDetail>),
        (status = 400, description = "Empty cart or rejected coupon", body = crate::errors::ErrorResponse),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Product unavailable or out of stock", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order creation failed, retry", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    actor: ActorContext,
    Json(request): Json<CreateOrderInput>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetail>>), ServiceError> {
    actor.require_role(ActorRole::Customer)?;

    let detail = state
        .services
        .orders
        .create_order(actor.actor_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(detail))))
}

/// List orders visible to the caller, role-scoped
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(PaginationParams, OrdersListQuery),
    responses(
        (status = 200, description = "Orders page", body = ApiResponse<PaginatedResponse<OrderResponse>>)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    actor: ActorContext,
    Query(pagination): Query<PaginationParams>,
    Query(query): Query<OrdersListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderResponse>>>, ServiceError> {
    let status = match query.status.as_deref() {
        Some(value) => Some(map_status_str(value)?),
        None => None,
    };

    let per_page = pagination.per_page.clamp(1, 100);
    let filter = ListOrdersFilter {
        status,
        page: pagination.page,
        per_page,
    };

    let (orders, total) = state.services.orders.list_orders(&actor, filter).await?;

    let response = PaginatedResponse {
        items: orders,
        total,
        page: pagination.page,
        limit: per_page,
        total_pages: (total + per_page - 1) / per_page,
    };

    Ok(Json(ApiResponse::success(response)))
}

/// Fetch a single order with its lines
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order detail", body = ApiResponse<OrderDetail>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderDetail>>, ServiceError> {
    let detail = state.services.orders.get_order(&actor, order_id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

/// Request a status transition on an order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Illegal transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn transition_order_status(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(order_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .order_status
        .transition(&actor, order_id, request)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Produce an invoice document for a delivered order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/invoice",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Invoice handle", body = ApiResponse<DocumentHandle>),
        (status = 400, description = "Order not delivered", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn generate_invoice(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<DocumentHandle>>, ServiceError> {
    let handle = state
        .services
        .orders
        .generate_invoice(&actor, order_id)
        .await?;
    Ok(Json(ApiResponse::success(handle)))
}

/// Order routes
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", post(transition_order_status))
        .route("/:id/invoice", post(generate_invoice))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_map_to_enum() {
        assert_eq!(map_status_str("pending").unwrap(), OrderStatus::Pending);
        assert_eq!(
            map_status_str("OUT_FOR_DELIVERY").unwrap(),
            OrderStatus::OutForDelivery
        );
        assert_eq!(map_status_str("canceled").unwrap(), OrderStatus::Cancelled);
        assert!(map_status_str("unknown").is_err());
    }
}
