use crate::{
    auth::ActorContext,
    errors::ServiceError,
    handlers::AppState,
    services::payments::{PaymentResponse, ProcessPaymentInput},
    ApiResponse,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

/// Dispatch a payment for an order
#[utoipa::path(
    post,
    path = "/api/v1/payments",
    request_body = ProcessPaymentInput,
    responses(
        (status = 201, description = "Payment completed", body = ApiResponse<PaymentResponse>),
        (status = 400, description = "Validation failure or amount mismatch", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment declined", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn process_payment(
    State(state): State<AppState>,
    actor: ActorContext,
    Json(request): Json<ProcessPaymentInput>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentResponse>>), ServiceError> {
    let receipt = state
        .services
        .payments
        .process_payment(&actor, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(receipt))))
}

/// Fetch a payment record
#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment detail", body = ApiResponse<PaymentResponse>),
        (status = 404, description = "Payment not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ServiceError> {
    let payment = state
        .services
        .payments
        .get_payment(&actor, payment_id)
        .await?;
    Ok(Json(ApiResponse::success(payment)))
}

/// List every payment attempt for an order
#[utoipa::path(
    get,
    path = "/api/v1/payments/order/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Payments for order", body = ApiResponse<Vec<PaymentResponse>>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn list_order_payments(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<PaymentResponse>>>, ServiceError> {
    let payments = state
        .services
        .payments
        .list_order_payments(&actor, order_id)
        .await?;
    Ok(Json(ApiResponse::success(payments)))
}

/// Payment routes
pub fn payments_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(process_payment))
        .route("/:id", get(get_payment))
        .route("/order/:order_id", get(list_order_payments))
}
