//! Order rows and the draft builder that gates what may be stored and hashed
use std::sync::Arc;

use chrono::Utc;
use sled::Tree;

use crate::error::{LedgerError, Result};
use crate::store;
use crate::types::{Money, OrderStatus, OrderType, PaymentStatus, TimeStamp};
use crate::utils;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    #[n(0)]
    pub product_id: String,
    #[n(1)]
    pub quantity: u32,
    #[n(2)]
    pub unit_price: Money,
    #[n(3)]
    pub line_total: Money,
}

impl LineItem {
    pub fn new(product_id: &str, quantity: u32, unit_price: Money, line_total: Money) -> Self {
        Self {
            product_id: product_id.to_string(),
            quantity,
            unit_price,
            line_total,
        }
    }
}

/// The order row itself. `verification_hash` is the stored fingerprint
/// maintained by the hash service; everything else is the canonical state the
/// fingerprint is computed from.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    #[n(0)]
    pub tenant_id: String,
    #[n(1)]
    pub order_id: String,
    #[n(2)]
    pub order_number: String,
    #[n(3)]
    pub customer_id: String,
    #[n(4)]
    pub subtotal: Money,
    #[n(5)]
    pub discount: Money,
    #[n(6)]
    pub tax: Money,
    #[n(7)]
    pub shipping: Money,
    #[n(8)]
    pub grand_total: Money,
    #[n(9)]
    pub currency: String,
    #[n(10)]
    pub status: OrderStatus,
    #[n(11)]
    pub payment_status: PaymentStatus,
    #[n(12)]
    pub items: Vec<LineItem>,
    #[n(13)]
    pub verification_hash: Option<String>,
    #[n(14)]
    pub created_at: TimeStamp<Utc>,
}

// Also used for constructing drafts before anything touches storage.
#[derive(Debug, Default)]
pub struct OrderDraft {
    tenant_id: Option<String>,
    order_id: Option<String>,
    order_number: Option<String>,
    customer_id: Option<String>,
    subtotal: Option<Money>,
    discount: Money,
    tax: Money,
    shipping: Money,
    grand_total: Option<Money>,
    currency: Option<String>,
    status: Option<OrderStatus>,
    payment_status: Option<PaymentStatus>,
    items: Vec<LineItem>,
}

impl OrderDraft {
    /// Construct a new builder object, this becomes the basis for a draft
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_tenant(mut self, tenant_id: &str) -> Self {
        self.tenant_id = Some(tenant_id.to_string());
        self
    }
    pub fn set_order_id(mut self, order_id: &str) -> Self {
        self.order_id = Some(order_id.to_string());
        self
    }
    pub fn set_order_number(mut self, order_number: &str) -> Self {
        self.order_number = Some(order_number.to_string());
        self
    }
    pub fn set_customer(mut self, customer_id: &str) -> Self {
        self.customer_id = Some(customer_id.to_string());
        self
    }
    pub fn set_subtotal(mut self, amount: Money) -> Self {
        self.subtotal = Some(amount);
        self
    }
    pub fn set_discount(mut self, amount: Money) -> Self {
        self.discount = amount;
        self
    }
    pub fn set_tax(mut self, amount: Money) -> Self {
        self.tax = amount;
        self
    }
    pub fn set_shipping(mut self, amount: Money) -> Self {
        self.shipping = amount;
        self
    }
    pub fn set_grand_total(mut self, amount: Money) -> Self {
        self.grand_total = Some(amount);
        self
    }
    pub fn set_currency(mut self, currency: &str) -> Self {
        self.currency = Some(currency.to_string());
        self
    }
    pub fn set_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }
    pub fn set_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }
    pub fn add_item(mut self, item: LineItem) -> Self {
        self.items.push(item);
        self
    }

    // Checks fields and performs validation. Returns the finished order row.
    // Missing required fields fail here so the hash never covers placeholders.
    pub fn validate_and_finalise(self) -> Result<OrderRecord> {
        let tenant_id = self
            .tenant_id
            .ok_or_else(|| LedgerError::InvalidState("tenant_id is not set".into()))?;
        let order_number = self
            .order_number
            .ok_or_else(|| LedgerError::InvalidState("order_number is not set".into()))?;
        let customer_id = self
            .customer_id
            .ok_or_else(|| LedgerError::InvalidState("customer_id is not set".into()))?;
        let subtotal = self
            .subtotal
            .ok_or_else(|| LedgerError::InvalidState("subtotal is not set".into()))?;
        let grand_total = self
            .grand_total
            .ok_or_else(|| LedgerError::InvalidState("grand_total is not set".into()))?;
        let currency = self
            .currency
            .ok_or_else(|| LedgerError::InvalidState("currency is not set".into()))?;
        if self.items.is_empty() {
            return Err(LedgerError::InvalidState("order has no line items".into()));
        }
        for item in &self.items {
            if item.product_id.is_empty() {
                return Err(LedgerError::InvalidState(
                    "line item has an empty product_id".into(),
                ));
            }
            if item.quantity == 0 {
                return Err(LedgerError::InvalidState(format!(
                    "line item {} has zero quantity",
                    item.product_id
                )));
            }
        }

        let order_id = match self.order_id {
            Some(id) => id,
            None => utils::new_uuid_to_bech32("ord_")?,
        };

        Ok(OrderRecord {
            tenant_id,
            order_id,
            order_number,
            customer_id,
            subtotal,
            discount: self.discount,
            tax: self.tax,
            shipping: self.shipping,
            grand_total,
            currency,
            status: self.status.unwrap_or(OrderStatus::Pending),
            payment_status: self.payment_status.unwrap_or(PaymentStatus::Unpaid),
            items: self.items,
            verification_hash: None,
            created_at: TimeStamp::new(),
        })
    }
}

/// Persistence for the order rows themselves. Callers apply mutations here
/// first; the hash and revision services read the row afterwards.
pub struct OrderStore {
    orders: Tree,
}

impl OrderStore {
    pub fn new(db: Arc<sled::Db>) -> Result<Self> {
        Ok(Self {
            orders: db.open_tree(store::ORDERS_TREE)?,
        })
    }

    pub(crate) fn key(tenant_id: &str, order_type: OrderType, order_id: &str) -> Vec<u8> {
        format!("{tenant_id}/{}/{order_id}", order_type.tag()).into_bytes()
    }

    pub fn put(&self, order_type: OrderType, order: &OrderRecord) -> Result<()> {
        let key = Self::key(&order.tenant_id, order_type, &order.order_id);
        store::put(&self.orders, &key, order)
    }

    pub fn try_get(
        &self,
        tenant_id: &str,
        order_type: OrderType,
        order_id: &str,
    ) -> Result<Option<OrderRecord>> {
        store::get(&self.orders, &Self::key(tenant_id, order_type, order_id))
    }

    pub fn get(
        &self,
        tenant_id: &str,
        order_type: OrderType,
        order_id: &str,
    ) -> Result<OrderRecord> {
        self.try_get(tenant_id, order_type, order_id)?
            .ok_or_else(|| LedgerError::NotFound("order", order_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> OrderDraft {
        OrderDraft::new()
            .set_tenant("tnt_1")
            .set_order_number("ORD-1001")
            .set_customer("cust_1")
            .set_subtotal(Money::from(100))
            .set_grand_total(Money::from(100))
            .set_currency("NGN")
            .add_item(LineItem::new(
                "prod_a",
                1,
                Money::from(100),
                Money::from(100),
            ))
    }

    #[test]
    fn draft_finalises_with_defaults() {
        let order = draft().validate_and_finalise().unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Unpaid);
        assert!(order.verification_hash.is_none());
        assert!(order.order_id.starts_with("ord_1"));
    }

    #[test]
    fn draft_rejects_missing_customer() {
        let result = OrderDraft::new()
            .set_tenant("tnt_1")
            .set_order_number("ORD-1001")
            .set_subtotal(Money::from(100))
            .set_grand_total(Money::from(100))
            .set_currency("NGN")
            .add_item(LineItem::new(
                "prod_a",
                1,
                Money::from(100),
                Money::from(100),
            ))
            .validate_and_finalise();

        assert!(matches!(result, Err(LedgerError::InvalidState(_))));
    }

    #[test]
    fn draft_rejects_empty_items() {
        let result = OrderDraft::new()
            .set_tenant("tnt_1")
            .set_order_number("ORD-1001")
            .set_customer("cust_1")
            .set_subtotal(Money::from(100))
            .set_grand_total(Money::from(100))
            .set_currency("NGN")
            .validate_and_finalise();

        assert!(matches!(result, Err(LedgerError::InvalidState(_))));
    }
}
