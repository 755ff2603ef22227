//! Deterministic order fingerprints.
//!
//! The hash is SHA-256 over a canonical pipe-delimited payload built from the
//! financially significant order fields. Two rules make it reproducible across
//! systems: monetary values are normalized to fixed 2-decimal-place strings,
//! and line items are sorted by product id before serialization so storage
//! order can never change the hash.

use std::sync::Arc;

use crate::error::{LedgerError, Result};
use crate::orders::{LineItem, OrderRecord, OrderStore};
use crate::types::OrderType;

/// Outcome of comparing a stored fingerprint against freshly computed state.
/// A mismatch is reported, never thrown; callers decide how to investigate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashVerification {
    pub valid: bool,
    pub stored_hash: Option<String>,
    pub computed_hash: String,
}

pub struct OrderHashService {
    orders: OrderStore,
}

impl OrderHashService {
    pub fn new(db: Arc<sled::Db>) -> Result<Self> {
        Ok(Self {
            orders: OrderStore::new(db)?,
        })
    }

    /// Pure hash of an order snapshot. Identical inputs always produce the
    /// identical hex string, regardless of item ordering in `order.items`.
    pub fn compute_hash(order_type: OrderType, order: &OrderRecord) -> Result<String> {
        Ok(sha256::digest(canonical_payload(order_type, order)?))
    }

    /// Recompute the fingerprint from the order's current state and persist it
    /// on the row. Must run after every mutation that touches hashed fields.
    pub fn compute_and_store(
        &self,
        tenant_id: &str,
        order_type: OrderType,
        order_id: &str,
    ) -> Result<String> {
        let mut order = self.orders.get(tenant_id, order_type, order_id)?;
        let hash = Self::compute_hash(order_type, &order)?;

        order.verification_hash = Some(hash.clone());
        self.orders.put(order_type, &order)?;

        tracing::debug!(order_id, hash = %hash, "stored verification hash");
        Ok(hash)
    }

    /// Recompute from current state and compare against the stored hash.
    /// Read-only; a mismatch means tampering, a missed `compute_and_store`
    /// on some mutation path, or a hashing bug upstream.
    pub fn verify(
        &self,
        tenant_id: &str,
        order_type: OrderType,
        order_id: &str,
    ) -> Result<HashVerification> {
        let order = self.orders.get(tenant_id, order_type, order_id)?;
        let computed_hash = Self::compute_hash(order_type, &order)?;
        let valid = order.verification_hash.as_deref() == Some(computed_hash.as_str());

        if !valid {
            tracing::info!(order_id, "verification hash mismatch");
        }
        Ok(HashVerification {
            valid,
            stored_hash: order.verification_hash,
            computed_hash,
        })
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() {
        return Err(LedgerError::InvalidState(format!(
            "{field} is empty at hash time"
        )));
    }
    Ok(value)
}

// Field order is fixed; changing it is a breaking change for every stored hash.
fn canonical_payload(order_type: OrderType, order: &OrderRecord) -> Result<String> {
    let order_number = required("order_number", &order.order_number)?;
    let tenant_id = required("tenant_id", &order.tenant_id)?;
    let customer_id = required("customer_id", &order.customer_id)?;
    let currency = required("currency", &order.currency)?;

    if order.items.is_empty() {
        return Err(LedgerError::InvalidState(
            "order has no line items at hash time".into(),
        ));
    }

    let mut items: Vec<&LineItem> = order.items.iter().collect();
    items.sort_by(|a, b| a.product_id.cmp(&b.product_id));

    let items = items
        .into_iter()
        .map(|item| {
            let product_id = required("product_id", &item.product_id)?;
            Ok(format!(
                "{product_id}:{}:{}:{}",
                item.quantity,
                item.unit_price.canonical(),
                item.line_total.canonical()
            ))
        })
        .collect::<Result<Vec<String>>>()?;

    Ok(format!(
        "{}|{order_number}|{tenant_id}|{customer_id}|{}|{}|{}|{}|{}|{currency}|{}|{}|{}",
        order_type.tag(),
        order.subtotal.canonical(),
        order.discount.canonical(),
        order.tax.canonical(),
        order.shipping.canonical(),
        order.grand_total.canonical(),
        order.status.as_str(),
        order.payment_status.as_str(),
        items.join(",")
    ))
}
