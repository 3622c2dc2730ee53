use crate::{
    auth::{ActorContext, ActorRole},
    entities::{
        order::{self, OrderStatus, PaymentMethod, PaymentState},
        payment::{self, PaymentOutcome},
        Order, Payment,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::gateway::{
        self, ChargeOutcome, GatewayResponse, PaymentGateway, PaymentInstrument,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Input for dispatching a payment
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProcessPaymentInput {
    pub order_id: Uuid,
    pub amount: Decimal,
    pub instrument: PaymentInstrument,
}

/// Payment record as returned to callers
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub status: PaymentOutcome,
    pub transaction_id: Option<String>,
    #[schema(value_type = Object)]
    pub gateway_response: Option<serde_json::Value>,
    pub created_at: chrono::DateTime<Utc>,
}

/// Routes payment requests to method-specific processors and records the
/// outcome.
///
/// Stock is never held here: by the time payment is dispatched the order's
/// stock has been committed, and a failed payment does not release it
/// (cancellation is the only path that does).
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    payment_timeout: Duration,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        payment_timeout: Duration,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            payment_timeout,
        }
    }

    /// Dispatches a payment for an order.
    ///
    /// Malformed payloads are rejected before any mutation. Every attempt that
    /// reaches a processor is recorded as a payment row, completed or failed;
    /// failures are never retried automatically and leave the order safe to
    /// resubmit.
    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn process_payment(
        &self,
        actor: &ActorContext,
        input: ProcessPaymentInput,
    ) -> Result<PaymentResponse, ServiceError> {
        let order = Order::find_by_id(input.order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", input.order_id)))?;

        self.authorize_payer(actor, &order)?;

        if order.order_status.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "Order is {} and can no longer be paid",
                order.order_status
            )));
        }
        if order.payment_status == PaymentState::Completed {
            return Err(ServiceError::InvalidOperation(
                "Order is already paid".to_string(),
            ));
        }
        if input.amount != order.final_amount {
            return Err(ServiceError::AmountMismatch {
                expected: order.final_amount.to_string(),
                actual: input.amount.to_string(),
            });
        }

        // Rejected synchronously, before any gateway call or database write.
        gateway::validate_instrument(&input.instrument, Utc::now())?;

        let outcome = self.dispatch(&input.instrument, input.amount).await?;

        let (status, transaction_id, response, failure_reason) = match outcome {
            ChargeOutcome::Approved {
                transaction_id,
                response,
            } => (
                PaymentOutcome::Completed,
                Some(transaction_id),
                Some(response),
                None,
            ),
            ChargeOutcome::Declined { reason, response } => {
                (PaymentOutcome::Failed, None, Some(response), Some(reason))
            }
        };

        let record = self
            .record_attempt(&order, &input, status, transaction_id, response)
            .await?;

        match failure_reason {
            None => {
                self.event_sender
                    .send_or_log(Event::PaymentCompleted {
                        order_id: order.id,
                        payment_id: record.id,
                    })
                    .await;
                info!(order_id = %order.id, payment_id = %record.id, "Payment completed");
                Ok(record)
            }
            Some(reason) => {
                self.event_sender
                    .send_or_log(Event::PaymentFailed {
                        order_id: order.id,
                        payment_id: record.id,
                    })
                    .await;
                warn!(order_id = %order.id, payment_id = %record.id, reason = %reason, "Payment failed");
                Err(ServiceError::PaymentDeclined(reason))
            }
        }
    }

    /// Fetches a single payment record.
    #[instrument(skip(self))]
    pub async fn get_payment(
        &self,
        actor: &ActorContext,
        payment_id: Uuid,
    ) -> Result<PaymentResponse, ServiceError> {
        let payment = Payment::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))?;

        let order = Order::find_by_id(payment.order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", payment.order_id))
            })?;
        self.authorize_payer(actor, &order)?;

        Ok(model_to_response(payment))
    }

    /// Lists every payment attempt recorded for an order, newest first.
    #[instrument(skip(self))]
    pub async fn list_order_payments(
        &self,
        actor: &ActorContext,
        order_id: Uuid,
    ) -> Result<Vec<PaymentResponse>, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        self.authorize_payer(actor, &order)?;

        let payments = Payment::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .order_by_desc(payment::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(payments.into_iter().map(model_to_response).collect())
    }

    fn authorize_payer(
        &self,
        actor: &ActorContext,
        order: &order::Model,
    ) -> Result<(), ServiceError> {
        match actor.role {
            ActorRole::Admin => Ok(()),
            ActorRole::Customer if order.user_id == actor.actor_id => Ok(()),
            ActorRole::Customer => Err(ServiceError::NotFound(format!(
                "Order {} not found",
                order.id
            ))),
            _ => Err(ServiceError::Forbidden(
                "Only the ordering customer can manage payments".to_string(),
            )),
        }
    }

    /// Runs the method-specific processor with a bounded timeout. COD
    /// short-circuits without any gateway call; an elapsed timeout counts as
    /// a decline, never as a tacit success.
    async fn dispatch(
        &self,
        instrument_payload: &PaymentInstrument,
        amount: Decimal,
    ) -> Result<ChargeOutcome, ServiceError> {
        if matches!(instrument_payload, PaymentInstrument::Cod) {
            return Ok(gateway::cod_outcome());
        }

        match tokio::time::timeout(
            self.payment_timeout,
            self.gateway.charge(instrument_payload, amount),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!("Gateway call exceeded {:?}", self.payment_timeout);
                Ok(ChargeOutcome::Declined {
                    reason: "payment gateway timed out".to_string(),
                    response: GatewayResponse::Cod {
                        note: "timeout".to_string(),
                    },
                })
            }
        }
    }

    /// Persists the attempt and advances the order's payment/order status in
    /// one transaction. No gateway call happens inside it.
    async fn record_attempt(
        &self,
        order: &order::Model,
        input: &ProcessPaymentInput,
        status: PaymentOutcome,
        transaction_id: Option<String>,
        response: Option<GatewayResponse>,
    ) -> Result<PaymentResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let gateway_response = response
            .as_ref()
            .and_then(|r| serde_json::to_value(r).ok());

        let record = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            amount: Set(input.amount),
            method: Set(input.instrument.method()),
            status: Set(status),
            transaction_id: Set(transaction_id),
            gateway_response: Set(gateway_response),
            created_at: Set(Utc::now()),
        };
        let record = record.insert(&txn).await?;

        let mut order_update: order::ActiveModel = order.clone().into();
        order_update.payment_method = Set(input.instrument.method());
        match status {
            PaymentOutcome::Completed => {
                order_update.payment_status = Set(PaymentState::Completed);
                if order.order_status == OrderStatus::Pending {
                    order_update.order_status = Set(OrderStatus::Confirmed);
                }
            }
            PaymentOutcome::Failed => {
                order_update.payment_status = Set(PaymentState::Failed);
            }
        }
        order_update.updated_at = Set(Utc::now());
        order_update.update(&txn).await?;

        txn.commit().await?;

        Ok(model_to_response(record))
    }
}

fn model_to_response(model: payment::Model) -> PaymentResponse {
    PaymentResponse {
        id: model.id,
        order_id: model.order_id,
        amount: model.amount,
        method: model.method,
        status: model.status,
        transaction_id: model.transaction_id,
        gateway_response: model.gateway_response,
        created_at: model.created_at,
    }
}
