use crate::{
    auth::{ActorContext, ActorRole},
    errors::ServiceError,
    handlers::AppState,
    services::cart::{AddToCartInput, CartView},
    ApiResponse,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Input for changing a cart line's quantity
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCartItemRequest {
    /// New quantity; 0 removes the line
    #[validate(range(min = 0))]
    pub quantity: i32,
}

/// Add a product to the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    request_body = AddToCartInput,
    responses(
        (status = 201, description = "Item added", body = ApiResponse<CartView>),
        (status = 404, description = "Product missing or inactive", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn add_cart_item(
    State(state): State<AppState>,
    actor: ActorContext,
    Json(request): Json<AddToCartInput>,
) -> Result<(StatusCode, Json<ApiResponse<CartView>>), ServiceError> {
    actor.require_role(ActorRole::Customer)?;
    request.validate()?;

    let cart = state.services.cart.add_item(actor.actor_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(cart))))
}

/// Update a cart line's quantity (0 removes it)
#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{id}",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Cart updated", body = ApiResponse<CartView>),
        (status = 404, description = "Cart item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(item_id): Path<Uuid>,
    Json(request): Json<UpdateCartItemRequest>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    actor.require_role(ActorRole::Customer)?;
    request.validate()?;

    let cart = state
        .services
        .cart
        .update_item(actor.actor_id, item_id, request.quantity)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Remove a cart line
#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{id}",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    responses(
        (status = 200, description = "Item removed", body = ApiResponse<CartView>),
        (status = 404, description = "Cart item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(item_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    actor.require_role(ActorRole::Customer)?;

    let cart = state
        .services
        .cart
        .remove_item(actor.actor_id, item_id)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Remove every line from the caller's cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    responses((status = 204, description = "Cart cleared")),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    actor: ActorContext,
) -> Result<StatusCode, ServiceError> {
    actor.require_role(ActorRole::Customer)?;

    state.services.cart.clear(actor.actor_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Fetch the caller's cart with summary
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses((status = 200, description = "Cart contents", body = ApiResponse<CartView>)),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    actor: ActorContext,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    actor.require_role(ActorRole::Customer)?;

    let cart = state.services.cart.get_cart(actor.actor_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Cart routes
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/", delete(clear_cart))
        .route("/items", post(add_cart_item))
        .route("/items/:id", put(update_cart_item))
        .route("/items/:id", delete(remove_cart_item))
}
