//! Property-based tests for the canonical order hash.
//!
//! The fingerprint must be a pure function of the order's significant state:
//! the same snapshot always hashes to the same string, no matter how the item
//! list is ordered in memory or how the decimal amounts happen to be scaled.

use proptest::prelude::*;
use rust_decimal::Decimal;

use order_ledger::hash::OrderHashService;
use order_ledger::orders::{LineItem, OrderRecord};
use order_ledger::types::{Money, OrderStatus, OrderType, PaymentStatus, TimeStamp};

fn items_strategy() -> impl Strategy<Value = Vec<LineItem>> {
    // unique product ids per order, so sorting is unambiguous
    prop::collection::vec((1u32..10, 1i64..100_000), 1..6).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (quantity, unit))| {
                let unit_price = Money::from(unit);
                let line_total = Money::new(unit_price.amount() * Decimal::from(quantity));
                LineItem::new(&format!("prod_{i:03}"), quantity, unit_price, line_total)
            })
            .collect()
    })
}

fn order_strategy() -> impl Strategy<Value = OrderRecord> {
    (items_strategy(), 0i64..1_000_000, 0i64..10_000, any::<u32>()).prop_map(
        |(items, subtotal, shipping, serial)| {
            let subtotal = Money::from(subtotal);
            let shipping = Money::from(shipping);
            OrderRecord {
                tenant_id: "tnt_prop".to_string(),
                order_id: format!("ord_{serial}"),
                order_number: format!("ORD-{serial}"),
                customer_id: format!("cust_{serial}"),
                subtotal,
                discount: Money::ZERO,
                tax: Money::ZERO,
                shipping,
                grand_total: subtotal + shipping,
                currency: "NGN".to_string(),
                status: OrderStatus::Confirmed,
                payment_status: PaymentStatus::Paid,
                items,
                verification_hash: None,
                created_at: TimeStamp::new(),
            }
        },
    )
}

proptest! {
    /// Hashing the same snapshot twice always yields the same string.
    #[test]
    fn hash_is_deterministic(order in order_strategy()) {
        let a = OrderHashService::compute_hash(OrderType::SvmOrder, &order).unwrap();
        let b = OrderHashService::compute_hash(OrderType::SvmOrder, &order).unwrap();

        prop_assert_eq!(a, b);
    }

    /// Storage order of line items never affects the hash.
    #[test]
    fn hash_ignores_item_ordering(
        (order, shuffled_items) in order_strategy()
            .prop_flat_map(|order| {
                let items = order.items.clone();
                (Just(order), Just(items).prop_shuffle())
            })
    ) {
        let mut shuffled = order.clone();
        shuffled.items = shuffled_items;

        let a = OrderHashService::compute_hash(OrderType::SvmOrder, &order).unwrap();
        let b = OrderHashService::compute_hash(OrderType::SvmOrder, &shuffled).unwrap();

        prop_assert_eq!(a, b);
    }

    /// `5`, `5.0` and `5.00` are the same amount and must hash identically.
    #[test]
    fn hash_ignores_decimal_scale(order in order_strategy()) {
        let one_scaled = Decimal::new(100, 2); // 1.00
        let mut rescaled = order.clone();
        rescaled.subtotal = Money::new(rescaled.subtotal.amount() * one_scaled);
        rescaled.shipping = Money::new(rescaled.shipping.amount() * one_scaled);
        rescaled.grand_total = Money::new(rescaled.grand_total.amount() * one_scaled);

        let a = OrderHashService::compute_hash(OrderType::SvmOrder, &order).unwrap();
        let b = OrderHashService::compute_hash(OrderType::SvmOrder, &rescaled).unwrap();

        prop_assert_eq!(a, b);
    }

    /// Any change to a hashed monetary field changes the hash.
    #[test]
    fn hash_is_sensitive_to_amount_changes(order in order_strategy(), bump in 1i64..1_000) {
        let mut changed = order.clone();
        changed.grand_total = changed.grand_total + Money::from(bump);

        let a = OrderHashService::compute_hash(OrderType::SvmOrder, &order).unwrap();
        let b = OrderHashService::compute_hash(OrderType::SvmOrder, &changed).unwrap();

        prop_assert_ne!(a, b);
    }
}
