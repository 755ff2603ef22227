//! Append-only status and payment-status transition logs.
//!
//! A logging sink, not a state machine: the order row owns the current status,
//! and callers are trusted to report accurate transitions. Every call is one
//! insert; records are never read back for validation.

use std::sync::Arc;

use chrono::Utc;
use sled::Tree;

use crate::error::Result;
use crate::store;
use crate::types::{ChangeSource, Money, OrderStatus, OrderType, PaymentStatus, TimeStamp};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct StatusHistoryRecord {
    #[n(0)]
    pub tenant_id: String,
    #[n(1)]
    pub order_type: OrderType,
    #[n(2)]
    pub order_id: String,
    #[n(3)]
    pub old_status: Option<OrderStatus>,
    #[n(4)]
    pub new_status: OrderStatus,
    #[n(5)]
    pub source: ChangeSource,
    #[n(6)]
    pub changed_by: Option<String>,
    #[n(7)]
    pub metadata: Option<String>,
    #[n(8)]
    pub changed_at: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct PaymentHistoryRecord {
    #[n(0)]
    pub tenant_id: String,
    #[n(1)]
    pub order_type: OrderType,
    #[n(2)]
    pub order_id: String,
    #[n(3)]
    pub old_status: Option<PaymentStatus>,
    #[n(4)]
    pub new_status: PaymentStatus,
    #[n(5)]
    pub source: ChangeSource,
    #[n(6)]
    pub transaction_id: Option<String>,
    #[n(7)]
    pub payment_ref: Option<String>,
    #[n(8)]
    pub amount: Option<Money>,
    #[n(9)]
    pub currency: Option<String>,
    #[n(10)]
    pub metadata: Option<String>,
    #[n(11)]
    pub changed_at: TimeStamp<Utc>,
}

/// Input for a payment-status transition log entry.
#[derive(Debug)]
pub struct PaymentChange {
    pub tenant_id: String,
    pub order_type: OrderType,
    pub order_id: String,
    pub old_status: Option<PaymentStatus>,
    pub new_status: PaymentStatus,
    pub source: ChangeSource,
    pub transaction_id: Option<String>,
    pub payment_ref: Option<String>,
    pub amount: Option<Money>,
    pub currency: Option<String>,
    pub metadata: Option<String>,
}

pub struct HistoryLog {
    db: Arc<sled::Db>,
    status: Tree,
    payments: Tree,
}

impl HistoryLog {
    pub fn new(db: Arc<sled::Db>) -> Result<Self> {
        Ok(Self {
            status: db.open_tree(store::STATUS_HISTORY_TREE)?,
            payments: db.open_tree(store::PAYMENT_HISTORY_TREE)?,
            db,
        })
    }

    fn record_key(&self, tenant_id: &str, order_type: OrderType, order_id: &str) -> Result<Vec<u8>> {
        // db-wide monotonic sequence keeps scan order equal to insertion order
        let seq = self.db.generate_id()?;
        Ok(format!("{tenant_id}/{}/{order_id}/{seq:020}", order_type.tag()).into_bytes())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_status_change(
        &self,
        tenant_id: &str,
        order_type: OrderType,
        order_id: &str,
        old_status: Option<OrderStatus>,
        new_status: OrderStatus,
        source: ChangeSource,
        changed_by: Option<&str>,
        metadata: Option<&str>,
    ) -> Result<StatusHistoryRecord> {
        let record = StatusHistoryRecord {
            tenant_id: tenant_id.to_string(),
            order_type,
            order_id: order_id.to_string(),
            old_status,
            new_status,
            source,
            changed_by: changed_by.map(str::to_string),
            metadata: metadata.map(str::to_string),
            changed_at: TimeStamp::new(),
        };

        let key = self.record_key(tenant_id, order_type, order_id)?;
        store::put(&self.status, &key, &record)?;

        tracing::debug!(order_id, status = new_status.as_str(), "status logged");
        Ok(record)
    }

    pub fn log_payment_status_change(&self, change: PaymentChange) -> Result<PaymentHistoryRecord> {
        let record = PaymentHistoryRecord {
            tenant_id: change.tenant_id,
            order_type: change.order_type,
            order_id: change.order_id,
            old_status: change.old_status,
            new_status: change.new_status,
            source: change.source,
            transaction_id: change.transaction_id,
            payment_ref: change.payment_ref,
            amount: change.amount,
            currency: change.currency,
            metadata: change.metadata,
            changed_at: TimeStamp::new(),
        };

        let key = self.record_key(&record.tenant_id, record.order_type, &record.order_id)?;
        store::put(&self.payments, &key, &record)?;

        tracing::debug!(
            order_id = %record.order_id,
            status = record.new_status.as_str(),
            "payment status logged"
        );
        Ok(record)
    }

    /// Full status history in ascending `changed_at` order.
    pub fn status_history(
        &self,
        tenant_id: &str,
        order_type: OrderType,
        order_id: &str,
    ) -> Result<Vec<StatusHistoryRecord>> {
        let prefix = format!("{tenant_id}/{}/{order_id}/", order_type.tag());
        self.status
            .scan_prefix(prefix.as_bytes())
            .map(|entry| {
                let (_, value) = entry?;
                store::from_cbor(value.as_ref())
            })
            .collect()
    }

    /// Full payment-status history in ascending `changed_at` order.
    pub fn payment_history(
        &self,
        tenant_id: &str,
        order_type: OrderType,
        order_id: &str,
    ) -> Result<Vec<PaymentHistoryRecord>> {
        let prefix = format!("{tenant_id}/{}/{order_id}/", order_type.tag());
        self.payments
            .scan_prefix(prefix.as_bytes())
            .map(|entry| {
                let (_, value) = entry?;
                store::from_cbor(value.as_ref())
            })
            .collect()
    }
}
