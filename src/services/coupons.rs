use crate::{
    entities::coupon::{self, CouponType},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Why a coupon did not apply. Callers in permissive mode drop the discount
/// silently; strict mode surfaces the reason to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CouponRejection {
    NotFound,
    Inactive,
    NotStarted,
    Expired,
    UsageLimitReached,
    MinAmountNotMet,
}

/// Result of evaluating a coupon against a candidate order total
#[derive(Debug, Clone)]
pub enum CouponOutcome {
    Applied { code: String, discount: Decimal },
    NotApplicable { code: String, reason: CouponRejection },
}

/// Stateless pricing-rule engine for coupons. Evaluation is read-only; the
/// usage counter moves only through `redeem`, inside the order transaction.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Evaluates a coupon code against a candidate total.
    #[instrument(skip(self))]
    pub async fn evaluate(
        &self,
        code: &str,
        candidate_total: Decimal,
        now: DateTime<Utc>,
    ) -> Result<CouponOutcome, ServiceError> {
        self.evaluate_on(&*self.db, code, candidate_total, now).await
    }

    /// Evaluates a coupon on an explicit connection, so order creation can
    /// read through its own transaction.
    pub async fn evaluate_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        candidate_total: Decimal,
        now: DateTime<Utc>,
    ) -> Result<CouponOutcome, ServiceError> {
        let Some(model) = coupon::Entity::find()
            .filter(coupon::Column::Code.eq(code))
            .one(conn)
            .await?
        else {
            return Ok(CouponOutcome::NotApplicable {
                code: code.to_string(),
                reason: CouponRejection::NotFound,
            });
        };

        if let Err(reason) = check_applicability(&model, candidate_total, now) {
            debug!(code = %code, reason = %reason, "Coupon not applicable");
            return Ok(CouponOutcome::NotApplicable {
                code: code.to_string(),
                reason,
            });
        }

        Ok(CouponOutcome::Applied {
            code: model.code.clone(),
            discount: compute_discount(&model, candidate_total),
        })
    }

    /// Atomically increments `used_count`, re-checking the usage limit in the
    /// same statement so concurrent redemptions can never exceed it. Returns
    /// false when the limit was reached by a concurrent order.
    pub async fn redeem<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
    ) -> Result<bool, ServiceError> {
        let result = coupon::Entity::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Code.eq(code))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(coupon::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(coupon::Column::UsedCount)
                            .lt(Expr::col(coupon::Column::UsageLimit)),
                    ),
            )
            .exec(conn)
            .await?;

        Ok(result.rows_affected == 1)
    }
}

/// Checks every applicability rule; all must hold for the coupon to apply.
pub fn check_applicability(
    model: &coupon::Model,
    candidate_total: Decimal,
    now: DateTime<Utc>,
) -> Result<(), CouponRejection> {
    if !model.is_active {
        return Err(CouponRejection::Inactive);
    }
    if now < model.valid_from {
        return Err(CouponRejection::NotStarted);
    }
    if now > model.valid_until {
        return Err(CouponRejection::Expired);
    }
    if let Some(limit) = model.usage_limit {
        if model.used_count >= limit {
            return Err(CouponRejection::UsageLimitReached);
        }
    }
    if let Some(min_amount) = model.min_amount {
        if candidate_total < min_amount {
            return Err(CouponRejection::MinAmountNotMet);
        }
    }
    Ok(())
}

/// Computes the discount for an applicable coupon.
///
/// Percentage discounts are capped at `max_discount` when set; every discount
/// is finally clamped to the candidate total so an order can never be priced
/// below zero.
pub fn compute_discount(model: &coupon::Model, candidate_total: Decimal) -> Decimal {
    let discount = match model.discount_type {
        CouponType::Percentage => {
            let raw = candidate_total * model.value / Decimal::from(100);
            match model.max_discount {
                Some(cap) => raw.min(cap),
                None => raw,
            }
        }
        CouponType::Fixed => model.value,
    };

    discount.min(candidate_total).max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn coupon(discount_type: CouponType, value: Decimal) -> coupon::Model {
        let now = Utc::now();
        coupon::Model {
            id: Uuid::new_v4(),
            code: "WELCOME10".to_string(),
            discount_type,
            value,
            min_amount: None,
            max_discount: None,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            usage_limit: None,
            used_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn percentage_discount() {
        let c = coupon(CouponType::Percentage, dec!(10));
        assert_eq!(compute_discount(&c, dec!(1200)), dec!(120));
    }

    #[test]
    fn percentage_discount_respects_cap() {
        let mut c = coupon(CouponType::Percentage, dec!(50));
        c.max_discount = Some(dec!(100));
        assert_eq!(compute_discount(&c, dec!(1000)), dec!(100));
    }

    #[test]
    fn fixed_discount_ignores_cap() {
        let mut c = coupon(CouponType::Fixed, dec!(150));
        c.max_discount = Some(dec!(50));
        assert_eq!(compute_discount(&c, dec!(1000)), dec!(150));
    }

    #[test]
    fn discount_never_exceeds_candidate_total() {
        let c = coupon(CouponType::Fixed, dec!(500));
        assert_eq!(compute_discount(&c, dec!(300)), dec!(300));
    }

    #[test]
    fn inactive_coupon_is_rejected() {
        let mut c = coupon(CouponType::Fixed, dec!(50));
        c.is_active = false;
        assert_eq!(
            check_applicability(&c, dec!(1000), Utc::now()),
            Err(CouponRejection::Inactive)
        );
    }

    #[test]
    fn validity_window_is_enforced() {
        let c = coupon(CouponType::Fixed, dec!(50));
        assert_eq!(
            check_applicability(&c, dec!(1000), c.valid_from - Duration::hours(1)),
            Err(CouponRejection::NotStarted)
        );
        assert_eq!(
            check_applicability(&c, dec!(1000), c.valid_until + Duration::hours(1)),
            Err(CouponRejection::Expired)
        );
        assert!(check_applicability(&c, dec!(1000), Utc::now()).is_ok());
    }

    #[test]
    fn usage_limit_is_enforced() {
        let mut c = coupon(CouponType::Fixed, dec!(50));
        c.usage_limit = Some(3);
        c.used_count = 3;
        assert_eq!(
            check_applicability(&c, dec!(1000), Utc::now()),
            Err(CouponRejection::UsageLimitReached)
        );

        c.used_count = 2;
        assert!(check_applicability(&c, dec!(1000), Utc::now()).is_ok());
    }

    #[test]
    fn min_amount_is_enforced() {
        let mut c = coupon(CouponType::Percentage, dec!(10));
        c.min_amount = Some(dec!(1000));
        assert_eq!(
            check_applicability(&c, dec!(999.99), Utc::now()),
            Err(CouponRejection::MinAmountNotMet)
        );
        assert!(check_applicability(&c, dec!(1000), Utc::now()).is_ok());
    }

    #[test]
    fn boundary_timestamps_are_inclusive() {
        let c = coupon(CouponType::Fixed, dec!(10));
        assert!(check_applicability(&c, dec!(100), c.valid_from).is_ok());
        assert!(check_applicability(&c, dec!(100), c.valid_until).is_ok());
    }
}
