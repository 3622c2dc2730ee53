use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Marketplace API",
        version = "0.1.0",
        description = r#"
# Marketplace Order & Fulfillment API

Carts, atomic order creation, payment dispatch, and multi-actor fulfillment
tracking for an e-commerce marketplace.

## Actor context

Every endpoint resolves the caller from the trusted `x-actor-id` and
`x-actor-role` headers set by the upstream gateway. Roles: `customer`,
`seller`, `delivery`, `admin`.

## Error handling

Errors use a consistent envelope with appropriate HTTP status codes:

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock: Trail Runner Shoes",
  "timestamp": "2025-07-14T10:30:00Z"
}
```
        "#,
    ),
    servers(
        (url = "http://localhost:8080/api/v1", description = "Local development")
    ),
    tags(
        (name = "Cart", description = "Shopping cart endpoints"),
        (name = "Orders", description = "Order creation, reads, and status transitions"),
        (name = "Payments", description = "Payment dispatch and records")
    ),
    paths(
        crate::handlers::carts::add_cart_item,
        crate::handlers::carts::update_cart_item,
        crate::handlers::carts::remove_cart_item,
        crate::handlers::carts::clear_cart,
        crate::handlers::carts::get_cart,
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::transition_order_status,
        crate::handlers::orders::generate_invoice,
        crate::handlers::payments::process_payment,
        crate::handlers::payments::get_payment,
        crate::handlers::payments::list_order_payments,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::entities::order::OrderStatus,
        crate::entities::order::PaymentState,
        crate::entities::order::PaymentMethod,
        crate::entities::payment::PaymentOutcome,
        crate::entities::coupon::CouponType,
        crate::services::cart::AddToCartInput,
        crate::services::cart::CartLine,
        crate::services::cart::CartSummary,
        crate::services::cart::CartView,
        crate::services::orders::CouponMode,
        crate::services::orders::CreateOrderInput,
        crate::services::orders::OrderResponse,
        crate::services::orders::OrderItemResponse,
        crate::services::orders::OrderDetail,
        crate::services::order_status::TransitionRequest,
        crate::services::gateway::PaymentInstrument,
        crate::services::payments::ProcessPaymentInput,
        crate::services::payments::PaymentResponse,
        crate::services::external::DocumentHandle,
        crate::handlers::carts::UpdateCartItemRequest,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_doc_builds() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_string(&doc).expect("openapi doc serializes");
        assert!(json.contains("/api/v1/orders"));
        assert!(json.contains("/api/v1/payments"));
        assert!(json.contains("/api/v1/cart"));
    }
}
