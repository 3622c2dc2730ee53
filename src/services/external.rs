use crate::errors::ServiceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

/// Snapshot of a delivered order handed to the invoice generator.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSnapshot {
    pub order_id: Uuid,
    pub order_number: String,
    pub delivered_at: Option<DateTime<Utc>>,
    pub lines: Vec<SnapshotLine>,
    pub ship_to: SnapshotAddress,
    pub total_amount: Decimal,
    pub shipping_fee: Decimal,
    pub discount: Decimal,
    pub final_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotLine {
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotAddress {
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country_code: String,
}

/// Handle to a rendered invoice document.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DocumentHandle {
    pub document_id: String,
    pub order_number: String,
}

/// Invoice rendering boundary. The renderer itself (PDF layout etc.) lives
/// outside this service; only delivered orders are ever handed to it.
#[async_trait]
pub trait InvoiceGenerator: Send + Sync {
    async fn generate(&self, snapshot: &OrderSnapshot) -> Result<DocumentHandle, ServiceError>;
}

/// Default generator used until a real renderer is wired in: allocates a
/// handle and logs the request.
pub struct LoggingInvoiceGenerator;

#[async_trait]
impl InvoiceGenerator for LoggingInvoiceGenerator {
    async fn generate(&self, snapshot: &OrderSnapshot) -> Result<DocumentHandle, ServiceError> {
        let handle = DocumentHandle {
            document_id: format!("INV-{}", snapshot.order_number),
            order_number: snapshot.order_number.clone(),
        };
        info!(
            order_id = %snapshot.order_id,
            document_id = %handle.document_id,
            lines = snapshot.lines.len(),
            "Invoice document requested"
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn logging_generator_derives_handle_from_order_number() {
        let snapshot = OrderSnapshot {
            order_id: Uuid::new_v4(),
            order_number: "ORD-20250101-AB12CD".to_string(),
            delivered_at: Some(Utc::now()),
            lines: vec![SnapshotLine {
                product_name: "widget".to_string(),
                quantity: 1,
                price: dec!(10),
                total: dec!(10),
            }],
            ship_to: SnapshotAddress {
                name: "A".to_string(),
                line1: "1 Main St".to_string(),
                line2: None,
                city: "Pune".to_string(),
                state: "MH".to_string(),
                postal_code: "411001".to_string(),
                country_code: "IN".to_string(),
            },
            total_amount: dec!(10),
            shipping_fee: dec!(50),
            discount: dec!(0),
            final_amount: dec!(60),
        };

        let handle = LoggingInvoiceGenerator
            .generate(&snapshot)
            .await
            .expect("generate should succeed");
        assert_eq!(handle.document_id, "INV-ORD-20250101-AB12CD");
    }
}
