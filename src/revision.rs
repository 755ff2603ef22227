//! Append-only, hash-chained revision history for orders.
//!
//! Each revision links to its predecessor via `previous_hash = prior new_hash`,
//! so the chain can be re-verified end to end long after the fact. Revisions
//! are immutable once written; the only write path is appending the next one.

use std::sync::Arc;

use chrono::Utc;
use sled::Tree;

use crate::error::{LedgerError, Result};
use crate::hash::OrderHashService;
use crate::orders::OrderRecord;
use crate::store;
use crate::types::{ChangeSource, OrderType, RevisionReason, TimeStamp};

/// One field-level difference carried in a revision's `changes` payload.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    #[n(0)]
    pub field: String,
    #[n(1)]
    pub from: String,
    #[n(2)]
    pub to: String,
}

impl FieldChange {
    pub fn new(field: &str, from: impl ToString, to: impl ToString) -> Self {
        Self {
            field: field.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Structural diff between two order snapshots, for the `changes` payload.
pub fn diff_orders(before: &OrderRecord, after: &OrderRecord) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    if before.status != after.status {
        changes.push(FieldChange::new(
            "status",
            before.status.as_str(),
            after.status.as_str(),
        ));
    }
    if before.payment_status != after.payment_status {
        changes.push(FieldChange::new(
            "payment_status",
            before.payment_status.as_str(),
            after.payment_status.as_str(),
        ));
    }
    if before.subtotal != after.subtotal {
        changes.push(FieldChange::new("subtotal", before.subtotal, after.subtotal));
    }
    if before.discount != after.discount {
        changes.push(FieldChange::new("discount", before.discount, after.discount));
    }
    if before.tax != after.tax {
        changes.push(FieldChange::new("tax", before.tax, after.tax));
    }
    if before.shipping != after.shipping {
        changes.push(FieldChange::new("shipping", before.shipping, after.shipping));
    }
    if before.grand_total != after.grand_total {
        changes.push(FieldChange::new(
            "grand_total",
            before.grand_total,
            after.grand_total,
        ));
    }
    if before.currency != after.currency {
        changes.push(FieldChange::new("currency", &before.currency, &after.currency));
    }
    if before.customer_id != after.customer_id {
        changes.push(FieldChange::new(
            "customer_id",
            &before.customer_id,
            &after.customer_id,
        ));
    }
    if before.items != after.items {
        changes.push(FieldChange::new(
            "items",
            format!("{} items", before.items.len()),
            format!("{} items", after.items.len()),
        ));
    }

    changes
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct OrderRevision {
    #[n(0)]
    pub tenant_id: String,
    #[n(1)]
    pub order_type: OrderType,
    #[n(2)]
    pub order_id: String,
    #[n(3)]
    pub revision_number: u32,
    #[n(4)]
    pub reason: RevisionReason,
    #[n(5)]
    pub reason_detail: Option<String>,
    #[n(6)]
    pub previous_hash: Option<String>,
    #[n(7)]
    pub new_hash: String,
    #[n(8)]
    pub changes: Vec<FieldChange>,
    #[n(9)]
    pub triggered_by: Option<String>,
    #[n(10)]
    pub triggered_by_type: ChangeSource,
    #[n(11)]
    pub transaction_ref: Option<String>,
    #[n(12)]
    pub webhook_ref: Option<String>,
    #[n(13)]
    pub created_at: TimeStamp<Utc>,
}

/// Request for the next revision of an order. The caller must have applied
/// the underlying mutation to the order row already; the new hash is computed
/// from whatever state the row holds when this is submitted.
#[derive(Debug)]
pub struct NewRevision {
    pub tenant_id: String,
    pub order_type: OrderType,
    pub order_id: String,
    pub reason: RevisionReason,
    pub reason_detail: Option<String>,
    pub changes: Vec<FieldChange>,
    pub triggered_by: Option<String>,
    pub triggered_by_type: ChangeSource,
    pub transaction_ref: Option<String>,
    pub webhook_ref: Option<String>,
}

impl NewRevision {
    pub fn new(
        tenant_id: &str,
        order_type: OrderType,
        order_id: &str,
        reason: RevisionReason,
        triggered_by_type: ChangeSource,
    ) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            order_type,
            order_id: order_id.to_string(),
            reason,
            reason_detail: None,
            changes: Vec::new(),
            triggered_by: None,
            triggered_by_type,
            transaction_ref: None,
            webhook_ref: None,
        }
    }
    pub fn with_detail(mut self, detail: &str) -> Self {
        self.reason_detail = Some(detail.to_string());
        self
    }
    pub fn with_changes(mut self, changes: Vec<FieldChange>) -> Self {
        self.changes = changes;
        self
    }
    pub fn with_triggered_by(mut self, actor: &str) -> Self {
        self.triggered_by = Some(actor.to_string());
        self
    }
    pub fn with_transaction_ref(mut self, reference: &str) -> Self {
        self.transaction_ref = Some(reference.to_string());
        self
    }
    pub fn with_webhook_ref(mut self, reference: &str) -> Self {
        self.webhook_ref = Some(reference.to_string());
        self
    }
}

/// Result of walking a revision chain. Always returned, never thrown: audit
/// tooling has to be able to display a broken chain rather than crash on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    pub valid: bool,
    pub broken_at: Option<u32>,
    pub checked: u32,
    pub message: String,
}

impl ChainVerification {
    fn intact(checked: u32) -> Self {
        Self {
            valid: true,
            broken_at: None,
            checked,
            message: format!("chain intact across {checked} revisions"),
        }
    }
    fn broken(at: u32, checked: u32, message: String) -> Self {
        Self {
            valid: false,
            broken_at: Some(at),
            checked,
            message,
        }
    }
}

pub struct RevisionService {
    revisions: Tree,
    hashes: OrderHashService,
}

impl RevisionService {
    pub fn new(db: Arc<sled::Db>) -> Result<Self> {
        Ok(Self {
            revisions: db.open_tree(store::REVISIONS_TREE)?,
            hashes: OrderHashService::new(db)?,
        })
    }

    fn chain_prefix(tenant_id: &str, order_type: OrderType, order_id: &str) -> String {
        format!("{tenant_id}/{}/{order_id}/", order_type.tag())
    }

    fn revision_key(prefix: &str, revision_number: u32) -> Vec<u8> {
        // zero-padded so byte order equals numeric order
        format!("{prefix}{revision_number:010}").into_bytes()
    }

    fn last_revision(&self, prefix: &str) -> Result<Option<OrderRevision>> {
        match self.revisions.scan_prefix(prefix.as_bytes()).next_back() {
            Some(entry) => {
                let (_, value) = entry?;
                Ok(Some(store::from_cbor(value.as_ref())?))
            }
            None => Ok(None),
        }
    }

    /// Append the next revision for an order. The order row must already hold
    /// the post-mutation state; its fresh hash becomes this revision's
    /// `new_hash` and the previous revision's hash becomes `previous_hash`.
    ///
    /// Two concurrent callers can race the read of the latest revision; the
    /// loser fails the vacant insert with [`LedgerError::ConflictRevisionNumber`]
    /// and should re-read and retry. The chain never silently accepts two
    /// revisions claiming the same predecessor.
    pub fn create_revision(&self, request: NewRevision) -> Result<OrderRevision> {
        let prefix = Self::chain_prefix(&request.tenant_id, request.order_type, &request.order_id);
        let last = self.last_revision(&prefix)?;

        let revision_number = last.as_ref().map(|r| r.revision_number).unwrap_or(0) + 1;
        let previous_hash = last.map(|r| r.new_hash);

        let new_hash = self.hashes.compute_and_store(
            &request.tenant_id,
            request.order_type,
            &request.order_id,
        )?;

        let revision = OrderRevision {
            tenant_id: request.tenant_id,
            order_type: request.order_type,
            order_id: request.order_id,
            revision_number,
            reason: request.reason,
            reason_detail: request.reason_detail,
            previous_hash,
            new_hash,
            changes: request.changes,
            triggered_by: request.triggered_by,
            triggered_by_type: request.triggered_by_type,
            transaction_ref: request.transaction_ref,
            webhook_ref: request.webhook_ref,
            created_at: TimeStamp::new(),
        };

        let key = Self::revision_key(&prefix, revision_number);
        if !store::insert_if_vacant(&self.revisions, &key, store::to_cbor(&revision)?)? {
            return Err(LedgerError::ConflictRevisionNumber {
                order_id: revision.order_id,
                revision: revision_number,
            });
        }

        tracing::debug!(
            order_id = %revision.order_id,
            revision = revision_number,
            "revision appended"
        );
        Ok(revision)
    }

    /// Full revision history, ascending by revision number.
    pub fn get_revisions(
        &self,
        tenant_id: &str,
        order_type: OrderType,
        order_id: &str,
    ) -> Result<Vec<OrderRevision>> {
        let prefix = Self::chain_prefix(tenant_id, order_type, order_id);

        self.revisions
            .scan_prefix(prefix.as_bytes())
            .map(|entry| {
                let (_, value) = entry?;
                store::from_cbor(value.as_ref())
            })
            .collect()
    }

    /// Walk the chain and check that revision 1 has no predecessor hash and
    /// every later revision links to its immediate predecessor. Broken or
    /// undecodable records are reported in the result, never raised.
    pub fn verify_chain(
        &self,
        tenant_id: &str,
        order_type: OrderType,
        order_id: &str,
    ) -> Result<ChainVerification> {
        let prefix = Self::chain_prefix(tenant_id, order_type, order_id);
        let mut prior: Option<OrderRevision> = None;
        let mut checked: u32 = 0;

        for entry in self.revisions.scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry?;
            let position = checked + 1;

            let revision: OrderRevision = match store::from_cbor(value.as_ref()) {
                Ok(revision) => revision,
                Err(_) => {
                    return Ok(ChainVerification::broken(
                        position,
                        checked,
                        format!("revision {position} is undecodable"),
                    ));
                }
            };

            match &prior {
                None => {
                    if revision.revision_number != 1 {
                        return Ok(ChainVerification::broken(
                            revision.revision_number,
                            checked,
                            format!("chain starts at revision {}", revision.revision_number),
                        ));
                    }
                    if revision.previous_hash.is_some() {
                        return Ok(ChainVerification::broken(
                            1,
                            checked,
                            "revision 1 carries a previous hash".into(),
                        ));
                    }
                }
                Some(prior) => {
                    if revision.revision_number != prior.revision_number + 1 {
                        return Ok(ChainVerification::broken(
                            revision.revision_number,
                            checked,
                            format!(
                                "gap: revision {} follows revision {}",
                                revision.revision_number, prior.revision_number
                            ),
                        ));
                    }
                    if revision.previous_hash.as_deref() != Some(prior.new_hash.as_str()) {
                        return Ok(ChainVerification::broken(
                            revision.revision_number,
                            checked,
                            format!(
                                "revision {} does not link to revision {}",
                                revision.revision_number, prior.revision_number
                            ),
                        ));
                    }
                }
            }

            checked += 1;
            prior = Some(revision);
        }

        if checked == 0 {
            return Ok(ChainVerification {
                valid: true,
                broken_at: None,
                checked: 0,
                message: "no revisions recorded".into(),
            });
        }
        Ok(ChainVerification::intact(checked))
    }
}
