use crate::{
    auth::{ActorContext, ActorRole},
    entities::{
        order::{self, OrderStatus},
        order_item, Order, OrderItem,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::catalog::CatalogService,
    services::orders::{self, seller_has_items, OrderResponse},
};
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Days between shipping an order and its estimated delivery.
const ESTIMATED_TRANSIT_DAYS: i64 = 5;

/// A requested status change
#[derive(Debug, Deserialize, ToSchema)]
pub struct TransitionRequest {
    pub target: OrderStatus,
    /// Required when a seller ships the order.
    pub delivery_partner_id: Option<Uuid>,
}

/// Enforces the role-scoped order status machine.
///
/// All legality decisions go through the single `transition_allowed` table;
/// handlers never branch on roles themselves.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<CatalogService>,
    event_sender: Arc<EventSender>,
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<CatalogService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            catalog,
            event_sender,
        }
    }

    /// Applies a status transition on behalf of an actor.
    ///
    /// Cancellation restores each line's stock inside the same transaction and
    /// is idempotent: cancelling an already-cancelled order is a no-op, never
    /// a second restock.
    #[instrument(skip(self, request), fields(order_id = %order_id, target = %request.target))]
    pub async fn transition(
        &self,
        actor: &ActorContext,
        order_id: Uuid,
        request: TransitionRequest,
    ) -> Result<OrderResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let not_found = || ServiceError::NotFound(format!("Order {} not found", order_id));
        let order_model = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(not_found)?;

        // Role scoping: actors only ever see orders they participate in.
        let visible = match actor.role {
            ActorRole::Admin => true,
            ActorRole::Customer => order_model.user_id == actor.actor_id,
            ActorRole::Delivery => order_model.delivery_partner_id == Some(actor.actor_id),
            ActorRole::Seller => seller_has_items(&txn, order_id, actor.actor_id).await?,
        };
        if !visible {
            return Err(not_found());
        }

        let current = order_model.order_status;
        let target = request.target;

        // Idempotent cancellation: retrying a cancel is a no-op.
        if current == OrderStatus::Cancelled && target == OrderStatus::Cancelled {
            info!(order_id = %order_id, "Order already cancelled, no-op");
            return Ok(orders::model_to_response(order_model));
        }

        if !transition_allowed(actor.role, current, target) {
            return Err(ServiceError::IllegalTransition {
                from: current.to_string(),
                to: target.to_string(),
            });
        }

        let now = Utc::now();
        let mut update: order::ActiveModel = order_model.clone().into();
        update.order_status = Set(target);
        update.updated_at = Set(now);

        match target {
            OrderStatus::Shipped => {
                let partner = request
                    .delivery_partner_id
                    .or(order_model.delivery_partner_id)
                    .ok_or_else(|| {
                        ServiceError::ValidationError(
                            "A delivery partner must be assigned to ship an order".to_string(),
                        )
                    })?;
                update.delivery_partner_id = Set(Some(partner));
                update.tracking_number = Set(Some(generate_tracking_number()));
                update.estimated_delivery =
                    Set(Some(now + Duration::days(ESTIMATED_TRANSIT_DAYS)));
            }
            OrderStatus::Delivered => {
                update.delivered_at = Set(Some(now));
            }
            OrderStatus::Cancelled => {
                // Compensating action for the stock reserved at creation.
                let items = OrderItem::find()
                    .filter(order_item::Column::OrderId.eq(order_id))
                    .all(&txn)
                    .await?;
                for item in &items {
                    self.catalog
                        .adjust_stock(&txn, item.product_id, item.quantity)
                        .await?;
                }
                info!(
                    order_id = %order_id,
                    lines = items.len(),
                    "Restored stock for cancelled order"
                );
            }
            _ => {}
        }

        let updated = update.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: current.to_string(),
                new_status: target.to_string(),
            })
            .await;
        match target {
            OrderStatus::Cancelled => {
                self.event_sender
                    .send_or_log(Event::OrderCancelled(order_id))
                    .await;
            }
            OrderStatus::Delivered => {
                self.event_sender
                    .send_or_log(Event::OrderDelivered(order_id))
                    .await;
            }
            _ => {}
        }

        info!(
            order_id = %order_id,
            from = %current,
            to = %target,
            actor_role = %actor.role,
            "Order status updated"
        );

        Ok(orders::model_to_response(updated))
    }
}

/// The single legality table for role-scoped transitions.
///
/// Admin is the support escape hatch and may request any transition;
/// idempotent-cancel short-circuits before this table is consulted.
pub fn transition_allowed(role: ActorRole, from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    match role {
        ActorRole::Admin => true,
        ActorRole::Customer => matches!((from, to), (Pending | Confirmed, Cancelled)),
        ActorRole::Seller => matches!(
            (from, to),
            (Pending, Confirmed)
                | (Confirmed, Processing)
                | (Processing, Shipped)
                | (Pending | Confirmed, Cancelled)
        ),
        ActorRole::Delivery => matches!(
            (from, to),
            (Shipped, OutForDelivery) | (OutForDelivery, Delivered)
        ),
    }
}

fn generate_tracking_number() -> String {
    let token: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect::<String>()
        .to_uppercase();
    format!("TRK-{}", token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use OrderStatus::*;

    #[test_case(Pending, Cancelled => true)]
    #[test_case(Confirmed, Cancelled => true)]
    #[test_case(Processing, Cancelled => false)]
    #[test_case(Shipped, Cancelled => false)]
    #[test_case(Delivered, Cancelled => false)]
    #[test_case(Pending, Confirmed => false)]
    #[test_case(Pending, Delivered => false)]
    fn customer_transitions(from: OrderStatus, to: OrderStatus) -> bool {
        transition_allowed(ActorRole::Customer, from, to)
    }

    #[test_case(Pending, Confirmed => true)]
    #[test_case(Confirmed, Processing => true)]
    #[test_case(Processing, Shipped => true)]
    #[test_case(Pending, Cancelled => true)]
    #[test_case(Confirmed, Cancelled => true)]
    #[test_case(Pending, Shipped => false)]
    #[test_case(Confirmed, Shipped => false)]
    #[test_case(Shipped, Delivered => false)]
    #[test_case(Processing, Cancelled => false)]
    #[test_case(Delivered, Returned => false)]
    fn seller_transitions(from: OrderStatus, to: OrderStatus) -> bool {
        transition_allowed(ActorRole::Seller, from, to)
    }

    #[test_case(Shipped, OutForDelivery => true)]
    #[test_case(OutForDelivery, Delivered => true)]
    #[test_case(Shipped, Delivered => false)]
    #[test_case(Pending, OutForDelivery => false)]
    #[test_case(Delivered, OutForDelivery => false)]
    #[test_case(OutForDelivery, Cancelled => false)]
    fn delivery_transitions(from: OrderStatus, to: OrderStatus) -> bool {
        transition_allowed(ActorRole::Delivery, from, to)
    }

    #[test]
    fn admin_may_request_any_transition() {
        let all = [
            Pending,
            Confirmed,
            Processing,
            Shipped,
            OutForDelivery,
            Delivered,
            Cancelled,
            Returned,
        ];
        for from in all {
            for to in all {
                assert!(transition_allowed(ActorRole::Admin, from, to));
            }
        }
    }

    #[test]
    fn terminal_states_admit_no_non_admin_transitions() {
        let all = [
            Pending,
            Confirmed,
            Processing,
            Shipped,
            OutForDelivery,
            Delivered,
            Cancelled,
            Returned,
        ];
        for from in [Delivered, Cancelled, Returned] {
            for to in all {
                for role in [ActorRole::Customer, ActorRole::Seller, ActorRole::Delivery] {
                    assert!(
                        !transition_allowed(role, from, to),
                        "{:?} should not move {:?} -> {:?}",
                        role,
                        from,
                        to
                    );
                }
            }
        }
    }

    #[test]
    fn tracking_number_shape() {
        let trk = generate_tracking_number();
        assert!(trk.starts_with("TRK-"));
        assert_eq!(trk.len(), 4 + 12);
    }
}
