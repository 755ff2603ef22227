//! State-machine and idempotency tests for the partner earnings ledger.

use std::sync::Arc;

use sled::open;
use tempfile::tempdir;

use order_ledger::LedgerError;
use order_ledger::earnings::{EarningsLedger, LedgerConfig, NewEarning};
use order_ledger::types::{EarningStatus, Money, TimeStamp};
use order_ledger::utils;

fn ledger_in(dir: &tempfile::TempDir, name: &str) -> anyhow::Result<EarningsLedger> {
    let db = Arc::new(open(dir.path().join(name))?);
    Ok(EarningsLedger::with_config(
        db,
        LedgerConfig { clearance_days: 0 },
    )?)
}

fn earning_for(partner: &str, key: &str) -> NewEarning {
    NewEarning {
        partner_id: partner.to_string(),
        amount: Money::from(5_000),
        currency: "NGN".to_string(),
        commission_type: "subscription".to_string(),
        idempotency_key: key.to_string(),
        source_event_id: key.to_string(),
    }
}

#[test]
fn duplicate_idempotency_key_is_a_noop() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let ledger = ledger_in(&temp_dir, "idem.db")?;
    let partner = utils::new_uuid_to_bech32("ptn_")?;

    let first = ledger.record_earning(earning_for(&partner, "evt-1"))?;

    // Same event retried with a different amount still maps onto the first entry.
    let mut retry = earning_for(&partner, "evt-1");
    retry.amount = Money::from(9_999);
    let second = ledger.record_earning(retry)?;

    assert_eq!(first.id, second.id);
    assert_eq!(second.amount.canonical(), "5000.00");
    assert_eq!(ledger.entries_for_partner(&partner)?.len(), 1);

    Ok(())
}

/// Racing writers on one idempotency key must all come back with the same
/// stored entry. The entry and its key claim are committed together, so no
/// caller can ever observe a claimed key whose entry has not landed.
#[test]
fn racing_duplicate_events_post_exactly_one_entry() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let ledger = Arc::new(ledger_in(&temp_dir, "race_idem.db")?);
    let partner = utils::new_uuid_to_bech32("ptn_")?;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let ledger = ledger.clone();
        let partner = partner.clone();
        handles.push(std::thread::spawn(move || {
            ledger.record_earning(earning_for(&partner, "evt-dup"))
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.join().expect("writer thread panicked")?.id);
    }

    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(ledger.entries_for_partner(&partner)?.len(), 1);
    assert_eq!(ledger.balance(&partner)?.pending.canonical(), "5000.00");

    // A later retry of the same event still resolves to the stored entry.
    let retry = ledger.record_earning(earning_for(&partner, "evt-dup"))?;
    assert_eq!(retry.id, ids[0]);

    Ok(())
}

/// Racing reversals of one entry: exactly one wins, and a loser only sees
/// `AlreadyReversed` after the winner's debit and status flip are durable,
/// because both commit in the same transaction as the reversal key claim.
#[test]
fn racing_reversals_complete_exactly_once() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let ledger = Arc::new(ledger_in(&temp_dir, "race_reverse.db")?);
    let partner = utils::new_uuid_to_bech32("ptn_")?;

    let entry = ledger.record_earning(earning_for(&partner, "evt-1"))?;
    ledger.clear(&entry.id)?;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let ledger = ledger.clone();
        let id = entry.id.clone();
        handles.push(std::thread::spawn(move || ledger.reverse(&id)));
    }
    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("reversal thread panicked"))
        .collect();

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    for outcome in &outcomes {
        if let Err(err) = outcome {
            assert!(matches!(err, LedgerError::AlreadyReversed(_)));
        }
    }

    // One credit, one debit, original flipped, pair nets to zero.
    assert_eq!(ledger.entries_for_partner(&partner)?.len(), 2);
    assert_eq!(ledger.get(&entry.id)?.status, EarningStatus::Reversed);
    assert_eq!(ledger.balance(&partner)?.payable.canonical(), "0.00");

    Ok(())
}

#[test]
fn happy_path_runs_pending_to_paid() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let ledger = ledger_in(&temp_dir, "happy.db")?;
    let partner = utils::new_uuid_to_bech32("ptn_")?;

    let entry = ledger.record_earning(earning_for(&partner, "evt-1"))?;
    assert_eq!(entry.status, EarningStatus::Pending);
    assert_eq!(ledger.balance(&partner)?.pending.canonical(), "5000.00");

    let entry = ledger.clear(&entry.id)?;
    assert_eq!(entry.status, EarningStatus::Cleared);
    assert!(entry.cleared_at.is_some());

    let entry = ledger.approve(&entry.id)?;
    assert_eq!(entry.status, EarningStatus::Approved);
    assert_eq!(ledger.balance(&partner)?.payable.canonical(), "5000.00");

    let entry = ledger.mark_paid(&entry.id, "batch_2025_08")?;
    assert_eq!(entry.status, EarningStatus::Paid);
    assert_eq!(entry.payout_batch_id.as_deref(), Some("batch_2025_08"));
    assert!(entry.paid_at.is_some());

    let balance = ledger.balance(&partner)?;
    assert_eq!(balance.payable, Money::ZERO);
    assert_eq!(balance.paid.canonical(), "5000.00");

    Ok(())
}

#[test]
fn terminal_entries_reject_every_transition() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let ledger = ledger_in(&temp_dir, "terminal.db")?;
    let partner = utils::new_uuid_to_bech32("ptn_")?;

    let paid = ledger.record_earning(earning_for(&partner, "evt-paid"))?;
    ledger.clear(&paid.id)?;
    ledger.approve(&paid.id)?;
    ledger.mark_paid(&paid.id, "batch_1")?;

    assert!(matches!(
        ledger.clear(&paid.id),
        Err(LedgerError::InvalidTransition { .. })
    ));
    assert!(matches!(
        ledger.dispute(&paid.id),
        Err(LedgerError::InvalidTransition { .. })
    ));
    assert!(matches!(
        ledger.reverse(&paid.id),
        Err(LedgerError::InvalidTransition { .. })
    ));

    let voided = ledger.record_earning(earning_for(&partner, "evt-voided"))?;
    ledger.void(&voided.id)?;

    assert!(matches!(
        ledger.approve(&voided.id),
        Err(LedgerError::InvalidTransition { .. })
    ));
    assert!(matches!(
        ledger.reverse(&voided.id),
        Err(LedgerError::InvalidTransition { .. })
    ));

    Ok(())
}

#[test]
fn out_of_order_transitions_are_rejected() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let ledger = ledger_in(&temp_dir, "order.db")?;
    let partner = utils::new_uuid_to_bech32("ptn_")?;

    let entry = ledger.record_earning(earning_for(&partner, "evt-1"))?;

    // PENDING cannot be approved, paid or disputed directly.
    assert!(matches!(
        ledger.approve(&entry.id),
        Err(LedgerError::InvalidTransition { .. })
    ));
    assert!(matches!(
        ledger.mark_paid(&entry.id, "batch_1"),
        Err(LedgerError::InvalidTransition { .. })
    ));
    assert!(matches!(
        ledger.dispute(&entry.id),
        Err(LedgerError::InvalidTransition { .. })
    ));

    // Once cleared, void is no longer available.
    ledger.clear(&entry.id)?;
    assert!(matches!(
        ledger.void(&entry.id),
        Err(LedgerError::InvalidTransition { .. })
    ));

    Ok(())
}

#[test]
fn second_reversal_fails_with_already_reversed() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let ledger = ledger_in(&temp_dir, "double.db")?;
    let partner = utils::new_uuid_to_bech32("ptn_")?;

    let entry = ledger.record_earning(earning_for(&partner, "evt-1"))?;
    ledger.clear(&entry.id)?;

    ledger.reverse(&entry.id)?;
    assert!(matches!(
        ledger.reverse(&entry.id),
        Err(LedgerError::AlreadyReversed(_))
    ));

    Ok(())
}

#[test]
fn disputed_entries_sit_outside_the_payable_balance() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let ledger = ledger_in(&temp_dir, "dispute.db")?;
    let partner = utils::new_uuid_to_bech32("ptn_")?;

    let a = ledger.record_earning(earning_for(&partner, "evt-a"))?;
    let mut b = earning_for(&partner, "evt-b");
    b.amount = Money::from(3_000);
    let b = ledger.record_earning(b)?;

    ledger.clear(&a.id)?;
    ledger.clear(&b.id)?;
    ledger.dispute(&b.id)?;

    let balance = ledger.balance(&partner)?;
    assert_eq!(balance.payable.canonical(), "5000.00");
    assert_eq!(balance.disputed.canonical(), "3000.00");

    // A disputed entry can still be reversed by the resolution process.
    let reversal = ledger.reverse(&b.id)?;
    assert_eq!(reversal.original.status, EarningStatus::Reversed);

    let balance = ledger.balance(&partner)?;
    assert_eq!(balance.disputed, Money::ZERO);
    assert_eq!(balance.payable.canonical(), "5000.00");

    Ok(())
}

#[test]
fn sweep_clears_only_entries_past_their_window() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("sweep.db"))?);
    let partner = utils::new_uuid_to_bech32("ptn_")?;

    // Default 30-day window: nothing should clear today.
    let ledger = EarningsLedger::new(db.clone())?;
    let held = ledger.record_earning(earning_for(&partner, "evt-held"))?;
    assert!(ledger.sweep_cleared(&partner, &TimeStamp::new())?.is_empty());
    assert_eq!(ledger.get(&held.id)?.status, EarningStatus::Pending);

    // Zero-day window on the same database: the new entry clears immediately.
    let fast = EarningsLedger::with_config(db, LedgerConfig { clearance_days: 0 })?;
    let due = fast.record_earning(earning_for(&partner, "evt-due"))?;
    let cleared = fast.sweep_cleared(&partner, &TimeStamp::new())?;

    assert_eq!(cleared.len(), 1);
    assert_eq!(cleared[0].id, due.id);
    assert_eq!(fast.get(&held.id)?.status, EarningStatus::Pending);

    Ok(())
}

#[test]
fn missing_entry_is_not_found() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let ledger = ledger_in(&temp_dir, "missing.db")?;

    assert!(matches!(
        ledger.get("earn_does_not_exist"),
        Err(LedgerError::NotFound(_, _))
    ));

    Ok(())
}
