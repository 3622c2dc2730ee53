//! Shared harness for service-level integration tests.
//!
//! Runs against an in-memory SQLite database with a single pooled connection
//! so every test is hermetic. The schema is created from the entity
//! definitions, matching what `auto_create_schema` does in development.

#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, Utc};
use marketplace_api::{
    auth::{ActorContext, ActorRole},
    config::AppConfig,
    db,
    entities::{address, coupon, coupon::CouponType, product},
    events::{process_events, EventSender},
    handlers::AppServices,
    services::{
        external::LoggingInvoiceGenerator,
        gateway::{PaymentGateway, SimulatedGateway},
    },
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct TestCtx {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub event_sender: Arc<EventSender>,
}

/// Harness with an always-approving gateway.
pub async fn setup() -> TestCtx {
    setup_with_gateway(1.0).await
}

/// Harness with a configurable gateway approval rate.
pub async fn setup_with_gateway(success_rate: f64) -> TestCtx {
    let mut options = ConnectOptions::new("sqlite::memory:".to_string());
    // A single connection keeps every handle on the same in-memory database.
    options.max_connections(1).min_connections(1);
    let conn = Database::connect(options).await.expect("db connect");
    db::create_schema(&conn).await.expect("schema create");

    let db = Arc::new(conn);
    let (tx, rx) = mpsc::channel(256);
    let event_sender = Arc::new(EventSender::new(tx));
    tokio::spawn(process_events(rx));

    let config = AppConfig::default();
    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(SimulatedGateway::new(success_rate, Duration::ZERO));

    let services = AppServices::new(
        db.clone(),
        event_sender.clone(),
        &config,
        gateway,
        Arc::new(LoggingInvoiceGenerator),
    );

    TestCtx {
        db,
        services,
        event_sender,
    }
}

pub fn customer(id: Uuid) -> ActorContext {
    ActorContext::new(id, ActorRole::Customer)
}

pub fn seller(id: Uuid) -> ActorContext {
    ActorContext::new(id, ActorRole::Seller)
}

pub fn delivery(id: Uuid) -> ActorContext {
    ActorContext::new(id, ActorRole::Delivery)
}

pub fn admin() -> ActorContext {
    ActorContext::new(Uuid::new_v4(), ActorRole::Admin)
}

impl TestCtx {
    /// Inserts an active product owned by a fresh seller.
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> product::Model {
        self.seed_product_for_seller(Uuid::new_v4(), name, price, stock)
            .await
    }

    pub async fn seed_product_for_seller(
        &self,
        seller_id: Uuid,
        name: &str,
        price: Decimal,
        stock: i32,
    ) -> product::Model {
        let now = Utc::now();
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            seller_id: Set(seller_id),
            name: Set(name.to_string()),
            sku: Set(format!("SKU-{}", &id.simple().to_string()[..12])),
            price: Set(price),
            mrp: Set(price),
            stock: Set(stock),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    pub async fn deactivate_product(&self, product_id: Uuid) {
        use sea_orm::EntityTrait;
        let model = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .expect("find product")
            .expect("product exists");
        let mut active: product::ActiveModel = model.into();
        active.is_active = Set(false);
        active.update(&*self.db).await.expect("deactivate product");
    }

    pub async fn seed_address(&self, user_id: Uuid) -> address::Model {
        address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            name: Set("Asha Rao".to_string()),
            line1: Set("14 MG Road".to_string()),
            line2: Set(None),
            city: Set("Bengaluru".to_string()),
            state: Set("KA".to_string()),
            postal_code: Set("560001".to_string()),
            country_code: Set("IN".to_string()),
            phone: Set(Some("+91-9800000000".to_string())),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed address")
    }

    pub async fn seed_coupon(
        &self,
        code: &str,
        discount_type: CouponType,
        value: Decimal,
        min_amount: Option<Decimal>,
        usage_limit: Option<i32>,
    ) -> coupon::Model {
        let now = Utc::now();
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_type: Set(discount_type),
            value: Set(value),
            min_amount: Set(min_amount),
            max_discount: Set(None),
            valid_from: Set(now - ChronoDuration::days(1)),
            valid_until: Set(now + ChronoDuration::days(30)),
            usage_limit: Set(usage_limit),
            used_count: Set(0),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed coupon")
    }

    /// Current stock for a product.
    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        use sea_orm::EntityTrait;
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .expect("find product")
            .expect("product exists")
            .stock
    }

    /// Current used_count for a coupon.
    pub async fn coupon_used_count(&self, coupon_id: Uuid) -> i32 {
        use sea_orm::EntityTrait;
        coupon::Entity::find_by_id(coupon_id)
            .one(&*self.db)
            .await
            .expect("find coupon")
            .expect("coupon exists")
            .used_count
    }
}
