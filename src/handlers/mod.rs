pub mod carts;
pub mod common;
pub mod orders;
pub mod payments;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        cart::CartService,
        catalog::CatalogService,
        coupons::CouponService,
        external::InvoiceGenerator,
        gateway::PaymentGateway,
        order_status::OrderStatusService,
        orders::OrderService,
        payments::PaymentService,
        pricing::PricingConfig,
    },
};
use std::sync::Arc;
use std::time::Duration;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
///
/// Collaborators (payment gateway, invoice generator) are injected here
/// rather than reached through shared globals.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub coupons: Arc<CouponService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub order_status: Arc<OrderStatusService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        invoices: Arc<dyn InvoiceGenerator>,
    ) -> Self {
        let catalog = Arc::new(CatalogService::new(db.clone()));
        let cart = Arc::new(CartService::new(db.clone(), event_sender.clone()));
        let coupons = Arc::new(CouponService::new(db.clone()));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            catalog.clone(),
            coupons.clone(),
            event_sender.clone(),
            PricingConfig::from_app_config(config),
            invoices,
        ));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            gateway,
            event_sender.clone(),
            Duration::from_secs(config.payment_timeout_secs),
        ));
        let order_status = Arc::new(OrderStatusService::new(db, catalog.clone(), event_sender));

        Self {
            catalog,
            cart,
            coupons,
            orders,
            payments,
            order_status,
        }
    }
}
