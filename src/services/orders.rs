use crate::{
    auth::{ActorContext, ActorRole},
    entities::{
        address, cart_item, order,
        order::{OrderStatus, PaymentMethod, PaymentState},
        order_item, product, Address, CartItem, Order, OrderItem, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        catalog::CatalogService,
        coupons::{CouponOutcome, CouponService},
        external::{
            DocumentHandle, InvoiceGenerator, OrderSnapshot, SnapshotAddress, SnapshotLine,
        },
        pricing::{self, PricedLine, PricingConfig},
    },
};
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// How an inapplicable coupon is handled at checkout.
///
/// `Permissive` mirrors storefront UX: the order proceeds at full price.
/// `Strict` rejects the request so the caller can surface the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CouponMode {
    #[default]
    Permissive,
    Strict,
}

/// Input for converting the caller's cart into an order
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderInput {
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub coupon_mode: CouponMode,
}

/// Order as returned to callers
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub total_amount: Decimal,
    pub shipping_fee: Decimal,
    pub discount: Decimal,
    pub final_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentState,
    pub order_status: OrderStatus,
    pub coupon_code: Option<String>,
    pub delivery_partner_id: Option<Uuid>,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order line as returned to callers
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub total: Decimal,
}

/// Order plus its lines
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetail {
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
}

/// Filter for listing orders
#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersFilter {
    pub status: Option<OrderStatus>,
    pub page: u64,
    pub per_page: u64,
}

/// Orchestrates cart-to-order conversion and role-scoped order reads.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<CatalogService>,
    coupons: Arc<CouponService>,
    event_sender: Arc<EventSender>,
    pricing: PricingConfig,
    invoices: Arc<dyn InvoiceGenerator>,
}

struct SnapshotRow {
    item: cart_item::Model,
    product: product::Model,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<CatalogService>,
        coupons: Arc<CouponService>,
        event_sender: Arc<EventSender>,
        pricing: PricingConfig,
        invoices: Arc<dyn InvoiceGenerator>,
    ) -> Self {
        Self {
            db,
            catalog,
            coupons,
            event_sender,
            pricing,
            invoices,
        }
    }

    /// Converts the user's cart into a priced, stock-consistent order.
    ///
    /// Everything — validation, pricing, order + item inserts, conditional
    /// stock decrements, guarded coupon redemption, cart clearing — commits as
    /// one transaction; any failure rolls the whole thing back. A collision on
    /// the generated order number is retried once with a fresh number before
    /// surfacing `OrderCreationFailed`.
    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn create_order(
        &self,
        user_id: Uuid,
        input: CreateOrderInput,
    ) -> Result<OrderDetail, ServiceError> {
        for attempt in 0..2 {
            match self.create_order_once(user_id, &input).await {
                Err(err) if err.is_unique_violation() => {
                    if attempt == 0 {
                        warn!(user_id = %user_id, "Order number collision, regenerating");
                        continue;
                    }
                    return Err(ServiceError::OrderCreationFailed);
                }
                Ok(detail) => {
                    self.event_sender
                        .send_or_log(Event::OrderCreated(detail.order.id))
                        .await;
                    if let Some(code) = &detail.order.coupon_code {
                        self.event_sender
                            .send_or_log(Event::CouponRedeemed {
                                order_id: detail.order.id,
                                code: code.clone(),
                            })
                            .await;
                    }
                    info!(
                        order_id = %detail.order.id,
                        order_number = %detail.order.order_number,
                        final_amount = %detail.order.final_amount,
                        "Order created"
                    );
                    return Ok(detail);
                }
                Err(err) => return Err(err),
            }
        }
        Err(ServiceError::OrderCreationFailed)
    }

    async fn create_order_once(
        &self,
        user_id: Uuid,
        input: &CreateOrderInput,
    ) -> Result<OrderDetail, ServiceError> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        // Address must exist and belong to the ordering user.
        let ship_to = Address::find_by_id(input.address_id)
            .one(&txn)
            .await?
            .filter(|a| a.user_id == user_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Address {} not found", input.address_id))
            })?;

        // Snapshot cart lines with current product price and stock.
        let rows = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .find_also_related(Product)
            .all(&txn)
            .await?;
        if rows.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let mut snapshot = Vec::with_capacity(rows.len());
        for (item, maybe_product) in rows {
            let product = maybe_product.ok_or_else(|| {
                ServiceError::ProductUnavailable(format!("product {}", item.product_id))
            })?;
            if !product.is_active {
                return Err(ServiceError::ProductUnavailable(product.name));
            }
            if product.stock < item.quantity {
                return Err(ServiceError::InsufficientStock(product.name));
            }
            snapshot.push(SnapshotRow { item, product });
        }

        let priced: Vec<PricedLine> = snapshot
            .iter()
            .map(|row| PricedLine {
                price: row.product.price,
                quantity: row.item.quantity,
            })
            .collect();
        let subtotal: Decimal = priced
            .iter()
            .map(|l| l.price * Decimal::from(l.quantity))
            .sum();

        // Coupon: evaluated and redeemed inside the transaction so the usage
        // counter moves together with the order insert and stock decrements.
        let mut applied_coupon = None;
        let mut discount = Decimal::ZERO;
        if let Some(code) = &input.coupon_code {
            match self.coupons.evaluate_on(&txn, code, subtotal, now).await? {
                CouponOutcome::Applied { code, discount: d } => {
                    if self.coupons.redeem(&txn, &code).await? {
                        discount = d;
                        applied_coupon = Some(code);
                    } else if input.coupon_mode == CouponMode::Strict {
                        return Err(ServiceError::CouponRejected(format!(
                            "{} usage limit reached",
                            code
                        )));
                    }
                }
                CouponOutcome::NotApplicable { code, reason } => {
                    if input.coupon_mode == CouponMode::Strict {
                        return Err(ServiceError::CouponRejected(format!("{} {}", code, reason)));
                    }
                }
            }
        }

        let totals = pricing::price_order(&priced, discount, &self.pricing);

        let order_id = Uuid::new_v4();
        let order_row = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number(now)),
            user_id: Set(user_id),
            address_id: Set(ship_to.id),
            total_amount: Set(totals.total_amount),
            shipping_fee: Set(totals.shipping_fee),
            discount: Set(totals.discount),
            final_amount: Set(totals.final_amount),
            payment_method: Set(input.payment_method),
            payment_status: Set(PaymentState::Pending),
            order_status: Set(OrderStatus::Pending),
            coupon_code: Set(applied_coupon),
            delivery_partner_id: Set(None),
            tracking_number: Set(None),
            estimated_delivery: Set(None),
            delivered_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let order_model = order_row.insert(&txn).await?;

        let mut item_models = Vec::with_capacity(snapshot.len());
        for row in &snapshot {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(row.product.id),
                product_name: Set(row.product.name.clone()),
                quantity: Set(row.item.quantity),
                price: Set(row.product.price),
                total: Set(row.product.price * Decimal::from(row.item.quantity)),
                created_at: Set(now),
            };
            item_models.push(item.insert(&txn).await?);
        }

        // Reserve stock with conditional decrements; a lost race aborts the
        // whole transaction and surfaces as InsufficientStock.
        for row in &snapshot {
            match self
                .catalog
                .adjust_stock(&txn, row.product.id, -row.item.quantity)
                .await
            {
                Err(ServiceError::InsufficientStock(_)) => {
                    return Err(ServiceError::InsufficientStock(row.product.name.clone()));
                }
                other => other?,
            }
        }

        // The cart is consumed by the order.
        CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        Ok(OrderDetail {
            order: model_to_response(order_model),
            items: item_models.into_iter().map(item_to_response).collect(),
        })
    }

    /// Fetches an order with its lines, scoped to what the actor may see.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        actor: &ActorContext,
        order_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let order_model = self.find_scoped(actor, order_id).await?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_model.id))
            .all(&*self.db)
            .await?;

        Ok(OrderDetail {
            order: model_to_response(order_model),
            items: items.into_iter().map(item_to_response).collect(),
        })
    }

    /// Lists orders visible to the actor: customers see their own, sellers
    /// see orders containing their products, delivery partners see orders
    /// assigned to them, admins see everything.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        actor: &ActorContext,
        filter: ListOrdersFilter,
    ) -> Result<(Vec<OrderResponse>, u64), ServiceError> {
        let per_page = filter.per_page.clamp(1, 100);

        let mut query = match actor.role {
            ActorRole::Customer => {
                Order::find().filter(order::Column::UserId.eq(actor.actor_id))
            }
            ActorRole::Delivery => {
                Order::find().filter(order::Column::DeliveryPartnerId.eq(Some(actor.actor_id)))
            }
            ActorRole::Seller => Order::find()
                .join(JoinType::InnerJoin, order::Relation::OrderItems.def())
                .join(JoinType::InnerJoin, order_item::Relation::Product.def())
                .filter(product::Column::SellerId.eq(actor.actor_id))
                .distinct(),
            ActorRole::Admin => Order::find(),
        };

        if let Some(status) = filter.status {
            query = query.filter(order::Column::OrderStatus.eq(status));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator
            .fetch_page(filter.page.saturating_sub(1))
            .await?;

        Ok((orders.into_iter().map(model_to_response).collect(), total))
    }

    /// Produces an invoice document for a delivered order.
    #[instrument(skip(self))]
    pub async fn generate_invoice(
        &self,
        actor: &ActorContext,
        order_id: Uuid,
    ) -> Result<DocumentHandle, ServiceError> {
        let order_model = self.find_scoped(actor, order_id).await?;

        if order_model.order_status != OrderStatus::Delivered {
            return Err(ServiceError::InvalidOperation(format!(
                "Invoices are only available for delivered orders (order is {})",
                order_model.order_status
            )));
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_model.id))
            .all(&*self.db)
            .await?;
        let ship_to = Address::find_by_id(order_model.address_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Address {} not found", order_model.address_id))
            })?;

        let snapshot = build_snapshot(&order_model, &items, &ship_to);
        let handle = self.invoices.generate(&snapshot).await?;

        self.event_sender
            .send_or_log(Event::InvoiceGenerated {
                order_id: order_model.id,
                document_id: handle.document_id.clone(),
            })
            .await;

        Ok(handle)
    }

    /// Resolves an order the actor is allowed to see; anything else reads as
    /// not found so existence is not leaked across tenants.
    pub(crate) async fn find_scoped(
        &self,
        actor: &ActorContext,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let not_found = || ServiceError::NotFound(format!("Order {} not found", order_id));

        let order_model = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(not_found)?;

        let visible = match actor.role {
            ActorRole::Admin => true,
            ActorRole::Customer => order_model.user_id == actor.actor_id,
            ActorRole::Delivery => order_model.delivery_partner_id == Some(actor.actor_id),
            ActorRole::Seller => {
                seller_has_items(&*self.db, order_id, actor.actor_id).await?
            }
        };

        if !visible {
            return Err(not_found());
        }
        Ok(order_model)
    }
}

/// True when at least one line of the order belongs to the seller.
pub(crate) async fn seller_has_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    seller_id: Uuid,
) -> Result<bool, ServiceError> {
    let count = OrderItem::find()
        .join(JoinType::InnerJoin, order_item::Relation::Product.def())
        .filter(order_item::Column::OrderId.eq(order_id))
        .filter(product::Column::SellerId.eq(seller_id))
        .count(conn)
        .await?;
    Ok(count > 0)
}

/// Generates a human-readable order number: fixed prefix, order date, and a
/// random suffix. Uniqueness is probabilistic; the unique index plus a single
/// retry covers collisions.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}

fn build_snapshot(
    order_model: &order::Model,
    items: &[order_item::Model],
    ship_to: &address::Model,
) -> OrderSnapshot {
    OrderSnapshot {
        order_id: order_model.id,
        order_number: order_model.order_number.clone(),
        delivered_at: order_model.delivered_at,
        lines: items
            .iter()
            .map(|i| SnapshotLine {
                product_name: i.product_name.clone(),
                quantity: i.quantity,
                price: i.price,
                total: i.total,
            })
            .collect(),
        ship_to: SnapshotAddress {
            name: ship_to.name.clone(),
            line1: ship_to.line1.clone(),
            line2: ship_to.line2.clone(),
            city: ship_to.city.clone(),
            state: ship_to.state.clone(),
            postal_code: ship_to.postal_code.clone(),
            country_code: ship_to.country_code.clone(),
        },
        total_amount: order_model.total_amount,
        shipping_fee: order_model.shipping_fee,
        discount: order_model.discount,
        final_amount: order_model.final_amount,
    }
}

pub(crate) fn model_to_response(model: order::Model) -> OrderResponse {
    OrderResponse {
        id: model.id,
        order_number: model.order_number,
        user_id: model.user_id,
        address_id: model.address_id,
        total_amount: model.total_amount,
        shipping_fee: model.shipping_fee,
        discount: model.discount,
        final_amount: model.final_amount,
        payment_method: model.payment_method,
        payment_status: model.payment_status,
        order_status: model.order_status,
        coupon_code: model.coupon_code,
        delivery_partner_id: model.delivery_partner_id,
        tracking_number: model.tracking_number,
        estimated_delivery: model.estimated_delivery,
        delivered_at: model.delivered_at,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

pub(crate) fn item_to_response(model: order_item::Model) -> OrderItemResponse {
    OrderItemResponse {
        id: model.id,
        product_id: model.product_id,
        product_name: model.product_name,
        quantity: model.quantity,
        price: model.price,
        total: model.total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_number_has_prefix_date_and_suffix() {
        let now = Utc::now();
        let number = generate_order_number(now);
        let parts: Vec<&str> = number.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1], now.format("%Y%m%d").to_string());
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn order_numbers_are_unlikely_to_collide() {
        let now = Utc::now();
        let a = generate_order_number(now);
        let b = generate_order_number(now);
        // 36^6 suffixes; two draws colliding would be a broken generator.
        assert_ne!(a, b);
    }

    #[test]
    fn coupon_mode_defaults_to_permissive() {
        let input: CreateOrderInput = serde_json::from_value(serde_json::json!({
            "address_id": Uuid::new_v4(),
            "payment_method": "cod"
        }))
        .expect("deserialization should succeed");
        assert_eq!(input.coupon_mode, CouponMode::Permissive);
        assert!(input.coupon_code.is_none());
    }
}
