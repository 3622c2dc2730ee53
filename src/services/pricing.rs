use crate::config::AppConfig;
use rust_decimal::Decimal;
use serde::Serialize;

/// Pricing tunables, lifted out of `AppConfig` so the calculator stays pure.
#[derive(Debug, Clone, Copy)]
pub struct PricingConfig {
    pub free_shipping_threshold: Decimal,
    pub flat_shipping_fee: Decimal,
}

impl PricingConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            free_shipping_threshold: Decimal::from(config.free_shipping_threshold),
            flat_shipping_fee: Decimal::from(config.flat_shipping_fee),
        }
    }
}

/// A line being priced: snapshot price and quantity.
#[derive(Debug, Clone, Copy)]
pub struct PricedLine {
    pub price: Decimal,
    pub quantity: i32,
}

/// Computed order amounts.
///
/// Holds the invariant `final_amount == total_amount - discount + shipping_fee`
/// with `final_amount >= 0` (the discount is pre-clamped by the coupon
/// evaluator).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OrderTotals {
    pub total_amount: Decimal,
    pub shipping_fee: Decimal,
    pub discount: Decimal,
    pub final_amount: Decimal,
}

/// Prices an order from snapshot lines and an already-clamped discount.
pub fn price_order(lines: &[PricedLine], discount: Decimal, config: &PricingConfig) -> OrderTotals {
    let total_amount: Decimal = lines
        .iter()
        .map(|line| line.price * Decimal::from(line.quantity))
        .sum();

    let shipping_fee = if total_amount >= config.free_shipping_threshold {
        Decimal::ZERO
    } else {
        config.flat_shipping_fee
    };

    let final_amount = (total_amount - discount + shipping_fee).max(Decimal::ZERO);

    OrderTotals {
        total_amount,
        shipping_fee,
        discount,
        final_amount,
    }
}
