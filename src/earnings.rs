//! Partner earnings ledger.
//!
//! Append-only financial entries with a one-way lifecycle:
//!
//! ```text
//! PENDING --clear--> CLEARED --approve--> APPROVED --pay--> PAID   [terminal]
//! PENDING --void--> VOIDED                                        [terminal]
//! CLEARED | APPROVED --dispute--> DISPUTED
//! any non-terminal --reverse--> original marked REVERSED + linked DEBIT entry
//! ```
//!
//! Amounts are never edited. The only way to reduce a partner's balance is a
//! compensating DEBIT entry referencing the original CREDIT; balances are
//! aggregated at query time, never cached in a mutable field.

use std::sync::Arc;

use chrono::Utc;
use sled::transaction::{TransactionError, Transactional};
use sled::{IVec, Tree};

use crate::error::{LedgerError, Result};
use crate::store;
use crate::types::{EarningStatus, EntryType, Money, TimeStamp};
use crate::utils;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct PartnerEarning {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub partner_id: String,
    #[n(2)]
    pub amount: Money,
    #[n(3)]
    pub currency: String,
    #[n(4)]
    pub commission_type: String,
    #[n(5)]
    pub status: EarningStatus,
    #[n(6)]
    pub entry_type: EntryType,
    #[n(7)]
    pub idempotency_key: String,
    #[n(8)]
    pub source_event_id: String,
    /// For DEBIT reversal entries: the id of the CREDIT entry being offset.
    #[n(9)]
    pub reverses: Option<String>,
    #[n(10)]
    pub clears_at: Option<TimeStamp<Utc>>,
    #[n(11)]
    pub cleared_at: Option<TimeStamp<Utc>>,
    #[n(12)]
    pub approved_at: Option<TimeStamp<Utc>>,
    #[n(13)]
    pub paid_at: Option<TimeStamp<Utc>>,
    #[n(14)]
    pub payout_batch_id: Option<String>,
    #[n(15)]
    pub created_at: TimeStamp<Utc>,
}

/// Input for recording a new CREDIT entry. The idempotency key must be derived
/// from the originating business event so a retried webhook or rerun job maps
/// onto the same entry.
#[derive(Debug, Clone)]
pub struct NewEarning {
    pub partner_id: String,
    pub amount: Money,
    pub currency: String,
    pub commission_type: String,
    pub idempotency_key: String,
    pub source_event_id: String,
}

/// Both sides of a completed reversal.
#[derive(Debug, Clone)]
pub struct Reversal {
    pub original: PartnerEarning,
    pub debit: PartnerEarning,
}

/// Aggregated view of a partner's entries, computed per call by scanning the
/// ledger. Reversed credits stay in the payable sum so that the debit offsetting
/// them nets to zero without the credit row ever changing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartnerBalance {
    pub pending: Money,
    pub payable: Money,
    pub disputed: Money,
    pub paid: Money,
}

#[derive(Debug, Clone, Copy)]
pub struct LedgerConfig {
    /// Days an entry stays PENDING before it may clear, covering the window in
    /// which the originating transaction could still be refunded.
    pub clearance_days: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { clearance_days: 30 }
    }
}

pub struct EarningsLedger {
    entries: Tree,
    idem: Tree,
    by_partner: Tree,
    config: LedgerConfig,
}

impl EarningsLedger {
    pub fn new(db: Arc<sled::Db>) -> Result<Self> {
        Self::with_config(db, LedgerConfig::default())
    }

    pub fn with_config(db: Arc<sled::Db>, config: LedgerConfig) -> Result<Self> {
        Ok(Self {
            entries: db.open_tree(store::EARNINGS_TREE)?,
            idem: db.open_tree(store::EARNINGS_IDEM_TREE)?,
            by_partner: db.open_tree(store::EARNINGS_BY_PARTNER_TREE)?,
            config,
        })
    }

    /// Record a CREDIT entry for a commission-generating event. Seeing a known
    /// idempotency key is not an error: the existing entry is returned as-is,
    /// so duplicate webhook deliveries and job reruns post nothing twice.
    pub fn record_earning(&self, request: NewEarning) -> Result<PartnerEarning> {
        if let Some(id) = self.idem.get(request.idempotency_key.as_bytes())? {
            let id = String::from_utf8_lossy(&id).into_owned();
            tracing::debug!(
                idempotency_key = %request.idempotency_key,
                "duplicate earning event, returning existing entry"
            );
            return self.get(&id);
        }

        let now = TimeStamp::new();
        let entry = PartnerEarning {
            id: utils::new_uuid_to_bech32("earn_")?,
            partner_id: request.partner_id,
            amount: request.amount,
            currency: request.currency,
            commission_type: request.commission_type,
            status: EarningStatus::Pending,
            entry_type: EntryType::Credit,
            idempotency_key: request.idempotency_key,
            source_event_id: request.source_event_id,
            reverses: None,
            clears_at: Some(now.plus_days(self.config.clearance_days)),
            cleared_at: None,
            approved_at: None,
            paid_at: None,
            payout_batch_id: None,
            created_at: now,
        };

        match self.commit_new_entry(&entry, None)? {
            // raced another writer on the same event; theirs won
            Some(existing_id) => self.get(&existing_id),
            None => {
                tracing::info!(
                    partner_id = %entry.partner_id,
                    amount = %entry.amount,
                    "earning recorded"
                );
                Ok(entry)
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<PartnerEarning> {
        store::get(&self.entries, id.as_bytes())?
            .ok_or_else(|| LedgerError::NotFound("earning", id.to_string()))
    }

    /// PENDING -> CLEARED once the clearance window has passed.
    pub fn clear(&self, id: &str) -> Result<PartnerEarning> {
        let mut entry = self.expect_status(id, &[EarningStatus::Pending], "clear")?;
        entry.status = EarningStatus::Cleared;
        entry.cleared_at = Some(TimeStamp::new());
        self.persist(&entry)?;
        Ok(entry)
    }

    /// CLEARED -> APPROVED, marking the entry eligible for a payout run.
    pub fn approve(&self, id: &str) -> Result<PartnerEarning> {
        let mut entry = self.expect_status(id, &[EarningStatus::Cleared], "approve")?;
        entry.status = EarningStatus::Approved;
        entry.approved_at = Some(TimeStamp::new());
        self.persist(&entry)?;
        Ok(entry)
    }

    /// APPROVED -> PAID (terminal), tagging the payout batch that settled it.
    pub fn mark_paid(&self, id: &str, payout_batch_id: &str) -> Result<PartnerEarning> {
        let mut entry = self.expect_status(id, &[EarningStatus::Approved], "pay")?;
        entry.status = EarningStatus::Paid;
        entry.paid_at = Some(TimeStamp::new());
        entry.payout_batch_id = Some(payout_batch_id.to_string());
        self.persist(&entry)?;
        Ok(entry)
    }

    /// PENDING -> VOIDED (terminal), for entries cancelled before clearing.
    pub fn void(&self, id: &str) -> Result<PartnerEarning> {
        let mut entry = self.expect_status(id, &[EarningStatus::Pending], "void")?;
        entry.status = EarningStatus::Voided;
        self.persist(&entry)?;
        Ok(entry)
    }

    /// CLEARED | APPROVED -> DISPUTED, flagging the entry for manual review.
    pub fn dispute(&self, id: &str) -> Result<PartnerEarning> {
        let mut entry = self.expect_status(
            id,
            &[EarningStatus::Cleared, EarningStatus::Approved],
            "dispute",
        )?;
        entry.status = EarningStatus::Disputed;
        self.persist(&entry)?;
        Ok(entry)
    }

    /// Reverse a non-terminal entry: a compensating DEBIT of the same amount is
    /// appended and the original is status-marked REVERSED. The original's
    /// amount is never touched. A second reversal attempt fails with
    /// [`LedgerError::AlreadyReversed`].
    pub fn reverse(&self, id: &str) -> Result<Reversal> {
        let mut original = self.get(id)?;

        if original.status == EarningStatus::Reversed {
            return Err(LedgerError::AlreadyReversed(original.id));
        }
        if original.status.is_terminal() {
            return Err(LedgerError::InvalidTransition {
                id: original.id,
                status: original.status,
                action: "reverse",
            });
        }

        let now = TimeStamp::new();
        let debit = PartnerEarning {
            id: utils::new_uuid_to_bech32("earn_")?,
            partner_id: original.partner_id.clone(),
            amount: original.amount,
            currency: original.currency.clone(),
            commission_type: original.commission_type.clone(),
            // effective immediately; there is no clearance window for a reversal
            status: EarningStatus::Cleared,
            entry_type: EntryType::Debit,
            idempotency_key: format!("{}::reversal", original.idempotency_key),
            source_event_id: original.source_event_id.clone(),
            reverses: Some(original.id.clone()),
            clears_at: None,
            cleared_at: Some(now.clone()),
            approved_at: None,
            paid_at: None,
            payout_batch_id: None,
            created_at: now,
        };

        original.status = EarningStatus::Reversed;

        // the reversal idempotency key doubles as the double-reversal guard
        if self.commit_new_entry(&debit, Some(&original))?.is_some() {
            return Err(LedgerError::AlreadyReversed(original.id));
        }

        tracing::info!(
            partner_id = %original.partner_id,
            original = %original.id,
            debit = %debit.id,
            "earning reversed"
        );
        Ok(Reversal { original, debit })
    }

    /// All of a partner's entries, ascending by creation time.
    pub fn entries_for_partner(&self, partner_id: &str) -> Result<Vec<PartnerEarning>> {
        let prefix = format!("{partner_id}/");
        let mut entries = Vec::new();

        for indexed in self.by_partner.scan_prefix(prefix.as_bytes()) {
            let (_, id) = indexed?;
            let id = String::from_utf8_lossy(&id).into_owned();
            entries.push(self.get(&id)?);
        }

        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(entries)
    }

    /// Aggregate a partner's balance by scanning the ledger. PENDING and
    /// DISPUTED amounts are reported separately as non-payable.
    pub fn balance(&self, partner_id: &str) -> Result<PartnerBalance> {
        let mut balance = PartnerBalance::default();

        for entry in self.entries_for_partner(partner_id)? {
            match (entry.entry_type, entry.status) {
                (EntryType::Debit, _) => balance.payable -= entry.amount,
                (EntryType::Credit, EarningStatus::Pending) => balance.pending += entry.amount,
                (
                    EntryType::Credit,
                    EarningStatus::Cleared | EarningStatus::Approved | EarningStatus::Reversed,
                ) => balance.payable += entry.amount,
                (EntryType::Credit, EarningStatus::Disputed) => balance.disputed += entry.amount,
                (EntryType::Credit, EarningStatus::Paid) => balance.paid += entry.amount,
                (EntryType::Credit, EarningStatus::Voided) => {}
            }
        }

        Ok(balance)
    }

    /// Clear every PENDING entry whose clearance window has passed. Triggered
    /// explicitly by callers; there is no background scheduler in this layer.
    pub fn sweep_cleared(
        &self,
        partner_id: &str,
        now: &TimeStamp<Utc>,
    ) -> Result<Vec<PartnerEarning>> {
        let mut cleared = Vec::new();

        for entry in self.entries_for_partner(partner_id)? {
            if entry.status != EarningStatus::Pending {
                continue;
            }
            let due = match &entry.clears_at {
                Some(clears_at) => clears_at <= now,
                None => false,
            };
            if due {
                cleared.push(self.clear(&entry.id)?);
            }
        }

        if !cleared.is_empty() {
            tracing::info!(partner_id, count = cleared.len(), "entries cleared");
        }
        Ok(cleared)
    }

    fn expect_status(
        &self,
        id: &str,
        allowed: &[EarningStatus],
        action: &'static str,
    ) -> Result<PartnerEarning> {
        let entry = self.get(id)?;
        if !allowed.contains(&entry.status) {
            return Err(LedgerError::InvalidTransition {
                id: entry.id,
                status: entry.status,
                action,
            });
        }
        Ok(entry)
    }

    /// Claim `entry`'s idempotency key and write the entry plus its partner
    /// index in one transaction across the three trees. `rewrite`, when given,
    /// is an existing entry updated in the same commit (the original of a
    /// reversal). Returns the already-claimed entry id instead of writing
    /// anything when the key is taken, so a key in the index always points at
    /// a stored entry, whatever crashes or races happen around the call.
    fn commit_new_entry(
        &self,
        entry: &PartnerEarning,
        rewrite: Option<&PartnerEarning>,
    ) -> Result<Option<String>> {
        let entry_bytes = store::to_cbor(entry)?;
        let rewrite = match rewrite {
            Some(other) => Some((other.id.clone(), store::to_cbor(other)?)),
            None => None,
        };
        let index_key = format!("{}/{}", entry.partner_id, entry.id);

        let outcome: std::result::Result<Option<IVec>, TransactionError<()>> =
            (&self.entries, &self.idem, &self.by_partner).transaction(
                |(entries, idem, by_partner)| {
                    if let Some(claimed) = idem.get(entry.idempotency_key.as_bytes())? {
                        return Ok(Some(claimed));
                    }
                    idem.insert(entry.idempotency_key.as_bytes(), entry.id.as_bytes())?;
                    entries.insert(entry.id.as_bytes(), entry_bytes.as_slice())?;
                    by_partner.insert(index_key.as_bytes(), entry.id.as_bytes())?;
                    if let Some((id, bytes)) = &rewrite {
                        entries.insert(id.as_bytes(), bytes.as_slice())?;
                    }
                    Ok(None)
                },
            );

        match outcome {
            Ok(existing) => Ok(existing.map(|id| String::from_utf8_lossy(&id).into_owned())),
            Err(TransactionError::Storage(err)) => Err(LedgerError::Store(err)),
            // nothing in the closure aborts
            Err(TransactionError::Abort(())) => Err(LedgerError::InvalidState(
                "earnings transaction aborted".into(),
            )),
        }
    }

    fn persist(&self, entry: &PartnerEarning) -> Result<()> {
        store::put(&self.entries, entry.id.as_bytes(), entry)
    }
}
