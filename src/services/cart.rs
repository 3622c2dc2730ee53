use crate::{
    entities::{cart_item, CartItem, Product},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Shopping cart service.
///
/// The cart is advisory: it never touches `product.stock`. Stock is reserved
/// only when the cart is converted into an order.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// Input for adding an item to the cart
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

/// One line of a cart as returned to callers
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub price: Decimal,
    pub mrp: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

/// Price summary across all cart lines, rounded to 2 decimal places
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartSummary {
    pub subtotal: Decimal,
    pub total_mrp: Decimal,
    pub savings: Decimal,
    pub item_count: i32,
}

/// Cart contents plus summary
#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub summary: CartSummary,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Adds a product to the user's cart, merging with an existing line.
    ///
    /// Fails with `NotFound` when the product is missing or inactive, and with
    /// `InsufficientStock` when available stock cannot cover the combined
    /// quantity. Stock itself is not mutated here.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddToCartInput,
    ) -> Result<CartView, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        let existing = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .one(&txn)
            .await?;

        let requested_total = existing.as_ref().map(|i| i.quantity).unwrap_or(0) + input.quantity;
        if product.stock < requested_total {
            return Err(ServiceError::InsufficientStock(product.name));
        }

        match existing {
            Some(item) => {
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(requested_total);
                item.updated_at = Set(Utc::now());
                item.update(&txn).await?;
            }
            None => {
                let item = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    product_id: Set(input.product_id),
                    quantity: Set(input.quantity),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                };
                item.insert(&txn).await?;
            }
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                user_id,
                product_id: input.product_id,
            })
            .await;

        info!(
            user_id = %user_id,
            product_id = %input.product_id,
            quantity = input.quantity,
            "Added item to cart"
        );
        self.get_cart(user_id).await
    }

    /// Updates a cart line's quantity; a quantity of 0 or less removes it.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity <= 0 {
            return self.remove_item(user_id, item_id).await;
        }

        let txn = self.db.begin().await?;

        let item = CartItem::find_by_id(item_id)
            .one(&txn)
            .await?
            .filter(|i| i.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        let product = Product::find_by_id(item.product_id)
            .one(&txn)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", item.product_id))
            })?;

        if product.stock < quantity {
            return Err(ServiceError::InsufficientStock(product.name));
        }

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(quantity);
        item.updated_at = Set(Utc::now());
        item.update(&txn).await?;

        txn.commit().await?;

        self.get_cart(user_id).await
    }

    /// Removes a single cart line.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let item = CartItem::find_by_id(item_id)
            .one(&*self.db)
            .await?
            .filter(|i| i.user_id == user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        CartItem::delete_by_id(item.id).exec(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { user_id, item_id })
            .await;

        self.get_cart(user_id).await
    }

    /// Deletes every cart line for the user.
    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        self.event_sender
            .send_or_log(Event::CartCleared(user_id))
            .await;

        info!(user_id = %user_id, "Cleared cart");
        Ok(())
    }

    /// Returns the user's cart lines with live product data and a summary.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let rows = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .find_also_related(Product)
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for (item, product) in rows {
            let Some(product) = product else {
                warn!(item_id = %item.id, "Cart line references a missing product, skipping");
                continue;
            };
            items.push(CartLine {
                id: item.id,
                product_id: product.id,
                product_name: product.name.clone(),
                price: product.price,
                mrp: product.mrp,
                quantity: item.quantity,
                line_total: product.price * Decimal::from(item.quantity),
            });
        }

        let summary = summarize(&items);
        Ok(CartView { items, summary })
    }
}

/// Computes the cart summary from priced lines, rounded to 2 decimal places.
pub fn summarize(items: &[CartLine]) -> CartSummary {
    let subtotal: Decimal = items.iter().map(|i| i.line_total).sum();
    let total_mrp: Decimal = items
        .iter()
        .map(|i| i.mrp * Decimal::from(i.quantity))
        .sum();
    let savings = total_mrp - subtotal;
    let item_count = items.iter().map(|i| i.quantity).sum();

    CartSummary {
        subtotal: subtotal.round_dp(2),
        total_mrp: total_mrp.round_dp(2),
        savings: savings.round_dp(2),
        item_count,
    }
}
