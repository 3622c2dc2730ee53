use crate::{entities::product, errors::ServiceError};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Read-side accessor over the product catalog plus the one mutation the
/// engine owns: atomic, conditional stock adjustment.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Fetches a product by id.
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Adjusts a product's stock by `delta` in a single conditional UPDATE.
    ///
    /// The statement only matches when the resulting stock stays non-negative,
    /// so concurrent decrements can never drive stock below zero; losing the
    /// race surfaces as `InsufficientStock`. Accepts any connection so order
    /// creation and cancellation can run it inside their own transactions.
    pub async fn adjust_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        delta: i32,
    ) -> Result<(), ServiceError> {
        let mut update = product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(delta),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id));

        if delta < 0 {
            update = update.filter(product::Column::Stock.gte(-delta));
        }

        let result = update.exec(conn).await?;

        if result.rows_affected == 0 {
            if delta < 0 {
                return Err(ServiceError::InsufficientStock(format!(
                    "product {}",
                    product_id
                )));
            }
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                product_id
            )));
        }

        Ok(())
    }
}
