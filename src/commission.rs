//! One-time commission calculation audit records.
//!
//! Captures the inputs and outputs of a commission calculation exactly once
//! per sub-order, for later dispute resolution. There is deliberately no
//! update path: a correction is a new compensating commission event with its
//! own audit record, mirroring the earnings ledger's reversal discipline.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sled::Tree;

use crate::error::{LedgerError, Result};
use crate::store;
use crate::types::{ChangeSource, Money, Percent, TimeStamp};
use crate::utils;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct CommissionAudit {
    #[n(0)]
    pub audit_id: String,
    #[n(1)]
    pub tenant_id: String,
    #[n(2)]
    pub sub_order_id: String,
    #[n(3)]
    pub vendor_id: String,
    #[n(4)]
    pub sale_amount: Money,
    #[n(5)]
    pub commission_rate_used: Percent,
    #[n(6)]
    pub commission_rate_source: String,
    #[n(7)]
    pub base_amount_for_calc: Money,
    #[n(8)]
    pub formula_version: String,
    #[n(9)]
    pub vat_applied: bool,
    #[n(10)]
    pub vat_rate: Percent,
    #[n(11)]
    pub commission_computed: Money,
    #[n(12)]
    pub vendor_payout_computed: Money,
    #[n(13)]
    pub calculated_by: ChangeSource,
    #[n(14)]
    pub calculated_at: TimeStamp<Utc>,
}

/// Everything the recorder captures, minus the id and timestamp it assigns.
#[derive(Debug, Clone)]
pub struct CommissionAuditParams {
    pub tenant_id: String,
    pub sub_order_id: String,
    pub vendor_id: String,
    pub sale_amount: Money,
    pub commission_rate_used: Percent,
    pub commission_rate_source: String,
    pub base_amount_for_calc: Money,
    pub formula_version: String,
    pub vat_applied: bool,
    pub vat_rate: Percent,
    pub commission_computed: Money,
    pub vendor_payout_computed: Money,
    pub calculated_by: ChangeSource,
}

/// Exact-decimal commission arithmetic for callers building audit params.
/// Commission is rate% of the sale, rounded to 2 decimal places; the vendor
/// payout is the remainder; VAT is charged on the commission when applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionBreakdown {
    pub commission: Money,
    pub vendor_payout: Money,
    pub vat_amount: Money,
}

impl CommissionBreakdown {
    pub fn compute(sale: Money, rate: Percent, vat_rate: Percent, vat_applied: bool) -> Self {
        let hundred = Decimal::from(100);
        let commission = (sale.amount() * rate.rate() / hundred).round_dp(2);
        let vat_amount = if vat_applied {
            (commission * vat_rate.rate() / hundred).round_dp(2)
        } else {
            Decimal::ZERO
        };

        Self {
            commission: Money::new(commission),
            vendor_payout: Money::new(sale.amount() - commission),
            vat_amount: Money::new(vat_amount),
        }
    }
}

pub struct CommissionRecorder {
    audits: Tree,
}

impl CommissionRecorder {
    pub fn new(db: Arc<sled::Db>) -> Result<Self> {
        Ok(Self {
            audits: db.open_tree(store::COMMISSION_AUDITS_TREE)?,
        })
    }

    /// Record the calculation for a sub-order, exactly once. A second call for
    /// the same `sub_order_id` is a no-op returning the existing audit id,
    /// whatever values it carries.
    pub fn record(&self, params: CommissionAuditParams) -> Result<String> {
        if let Some(existing) = self.try_get(&params.sub_order_id)? {
            tracing::debug!(
                sub_order_id = %params.sub_order_id,
                "commission already recorded"
            );
            return Ok(existing.audit_id);
        }

        let audit = CommissionAudit {
            audit_id: utils::new_uuid_to_bech32("caud_")?,
            tenant_id: params.tenant_id,
            sub_order_id: params.sub_order_id,
            vendor_id: params.vendor_id,
            sale_amount: params.sale_amount,
            commission_rate_used: params.commission_rate_used,
            commission_rate_source: params.commission_rate_source,
            base_amount_for_calc: params.base_amount_for_calc,
            formula_version: params.formula_version,
            vat_applied: params.vat_applied,
            vat_rate: params.vat_rate,
            commission_computed: params.commission_computed,
            vendor_payout_computed: params.vendor_payout_computed,
            calculated_by: params.calculated_by,
            calculated_at: TimeStamp::new(),
        };

        let key = audit.sub_order_id.as_bytes();
        if !store::insert_if_vacant(&self.audits, key, store::to_cbor(&audit)?)? {
            // lost a race with another recorder; the first write wins
            let existing = self.get(&audit.sub_order_id)?;
            return Ok(existing.audit_id);
        }

        tracing::info!(
            sub_order_id = %audit.sub_order_id,
            commission = %audit.commission_computed,
            "commission audit recorded"
        );
        Ok(audit.audit_id)
    }

    pub fn try_get(&self, sub_order_id: &str) -> Result<Option<CommissionAudit>> {
        store::get(&self.audits, sub_order_id.as_bytes())
    }

    pub fn get(&self, sub_order_id: &str) -> Result<CommissionAudit> {
        self.try_get(sub_order_id)?
            .ok_or_else(|| LedgerError::NotFound("commission audit", sub_order_id.to_string()))
    }
}
