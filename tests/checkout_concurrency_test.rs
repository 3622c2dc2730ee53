//! Stock-safety and coupon-bound tests under concurrent checkouts.
//!
//! The conditional decrements make correctness independent of interleaving:
//! whichever request commits second loses the guard, not the invariant.

mod common;

use marketplace_api::{
    entities::coupon::CouponType,
    entities::order::PaymentMethod,
    errors::ServiceError,
    services::cart::AddToCartInput,
    services::orders::{CouponMode, CreateOrderInput},
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn concurrent_checkouts_never_oversell() {
    let ctx = Arc::new(common::setup().await);
    let product = ctx.seed_product("Limited Drop", dec!(800.00), 5).await;

    // Two buyers race for 3 units each from a stock of 5.
    let mut buyers = Vec::new();
    for _ in 0..2 {
        let user = Uuid::new_v4();
        let address = ctx.seed_address(user).await;
        ctx.services
            .cart
            .add_item(
                user,
                AddToCartInput {
                    product_id: product.id,
                    quantity: 3,
                },
            )
            .await
            .expect("add to cart");
        buyers.push((user, address.id));
    }

    let mut tasks = Vec::new();
    for (user, address_id) in buyers {
        let ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            ctx.services
                .orders
                .create_order(
                    user,
                    CreateOrderInput {
                        address_id,
                        payment_method: PaymentMethod::Cod,
                        coupon_code: None,
                        coupon_mode: CouponMode::Permissive,
                    },
                )
                .await
        }));
    }

    let mut succeeded = 0;
    let mut insufficient = 0;
    for task in tasks {
        match task.await.expect("task join") {
            Ok(_) => succeeded += 1,
            Err(ServiceError::InsufficientStock(_)) => insufficient += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(succeeded, 1, "exactly one checkout wins the stock");
    assert_eq!(insufficient, 1, "the loser sees InsufficientStock");
    assert_eq!(ctx.stock_of(product.id).await, 2, "5 - 3, never negative");
}

#[tokio::test]
async fn coupon_usage_never_exceeds_limit() {
    let ctx = Arc::new(common::setup().await);
    let product = ctx.seed_product("Gift Box", dec!(1500.00), 50).await;
    let coupon = ctx
        .seed_coupon("LIMITED2", CouponType::Fixed, dec!(100), None, Some(2))
        .await;

    // Four buyers race to redeem a coupon that allows two uses.
    let mut buyers = Vec::new();
    for _ in 0..4 {
        let user = Uuid::new_v4();
        let address = ctx.seed_address(user).await;
        ctx.services
            .cart
            .add_item(
                user,
                AddToCartInput {
                    product_id: product.id,
                    quantity: 1,
                },
            )
            .await
            .expect("add to cart");
        buyers.push((user, address.id));
    }

    let mut tasks = Vec::new();
    for (user, address_id) in buyers {
        let ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            ctx.services
                .orders
                .create_order(
                    user,
                    CreateOrderInput {
                        address_id,
                        payment_method: PaymentMethod::Cod,
                        coupon_code: Some("LIMITED2".to_string()),
                        coupon_mode: CouponMode::Strict,
                    },
                )
                .await
        }));
    }

    let mut discounted = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.expect("task join") {
            Ok(detail) => {
                assert_eq!(detail.order.discount, dec!(100));
                discounted += 1;
            }
            Err(ServiceError::CouponRejected(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(discounted, 2, "exactly the usage limit succeeds");
    assert_eq!(rejected, 2);
    assert_eq!(ctx.coupon_used_count(coupon.id).await, 2);
}

#[tokio::test]
async fn permissive_mode_drops_discount_when_limit_is_hit() {
    let ctx = Arc::new(common::setup().await);
    let product = ctx.seed_product("Poster", dec!(600.00), 20).await;
    let coupon = ctx
        .seed_coupon("ONEUSE", CouponType::Fixed, dec!(50), None, Some(1))
        .await;

    for i in 0..2 {
        let user = Uuid::new_v4();
        let address = ctx.seed_address(user).await;
        ctx.services
            .cart
            .add_item(
                user,
                AddToCartInput {
                    product_id: product.id,
                    quantity: 1,
                },
            )
            .await
            .expect("add to cart");

        let detail = ctx
            .services
            .orders
            .create_order(
                user,
                CreateOrderInput {
                    address_id: address.id,
                    payment_method: PaymentMethod::Cod,
                    coupon_code: Some("ONEUSE".to_string()),
                    coupon_mode: CouponMode::Permissive,
                },
            )
            .await
            .expect("create order");

        if i == 0 {
            assert_eq!(detail.order.discount, dec!(50));
        } else {
            // Limit exhausted: permissive checkout proceeds at full price.
            assert_eq!(detail.order.discount, dec!(0));
            assert!(detail.order.coupon_code.is_none());
        }
    }

    assert_eq!(ctx.coupon_used_count(coupon.id).await, 1);
}
