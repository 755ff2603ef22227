//! End-to-end walkthrough: order revisions, chain verification, a commission
//! audit and an earnings reversal, all against a local sled database.

use std::sync::Arc;

use order_ledger::commission::{CommissionAuditParams, CommissionBreakdown, CommissionRecorder};
use order_ledger::earnings::{EarningsLedger, LedgerConfig, NewEarning};
use order_ledger::orders::{LineItem, OrderDraft, OrderStore};
use order_ledger::revision::{NewRevision, RevisionService, diff_orders};
use order_ledger::types::{
    ChangeSource, Money, OrderStatus, OrderType, Percent, RevisionReason, TimeStamp,
};
use order_ledger::utils;

fn main() -> anyhow::Result<()> {
    let db = Arc::new(sled::open("ledger-demo")?);

    if !db.is_empty() {
        db.clear()?;
    }

    let orders = OrderStore::new(db.clone())?;
    let revisions = RevisionService::new(db.clone())?;

    // Create an order and open its revision chain.
    let tenant = "tnt_demo";
    let customer = utils::new_uuid_to_bech32("cust_")?;
    let order = OrderDraft::new()
        .set_tenant(tenant)
        .set_order_number("ORD-1001")
        .set_customer(&customer)
        .set_subtotal(Money::from(150_000))
        .set_shipping(Money::from(2_500))
        .set_grand_total(Money::from(152_500))
        .set_currency("NGN")
        .add_item(LineItem::new(
            "prod_keyboard",
            3,
            Money::from(50_000),
            Money::from(150_000),
        ))
        .validate_and_finalise()?;
    orders.put(OrderType::SvmOrder, &order)?;

    let first = revisions.create_revision(NewRevision::new(
        tenant,
        OrderType::SvmOrder,
        &order.order_id,
        RevisionReason::System,
        ChangeSource::System,
    ))?;
    println!("revision 1: {}", first.new_hash);

    // Cancel the order, then append the revision describing the change.
    let before = orders.get(tenant, OrderType::SvmOrder, &order.order_id)?;
    let mut cancelled = before.clone();
    cancelled.status = OrderStatus::Cancelled;
    orders.put(OrderType::SvmOrder, &cancelled)?;

    let second = revisions.create_revision(
        NewRevision::new(
            tenant,
            OrderType::SvmOrder,
            &order.order_id,
            RevisionReason::Cancellation,
            ChangeSource::Admin,
        )
        .with_detail("customer requested cancellation")
        .with_changes(diff_orders(&before, &cancelled)),
    )?;
    println!("revision 2: {} <- {:?}", second.new_hash, second.previous_hash);

    let check = revisions.verify_chain(tenant, OrderType::SvmOrder, &order.order_id)?;
    println!("chain: {}", check.message);

    // Commission audit for a marketplace sub-order.
    let recorder = CommissionRecorder::new(db.clone())?;
    let sale = Money::from(100_000);
    let rate = Percent::from(12);
    let vat = Percent::parse("7.5")?;
    let breakdown = CommissionBreakdown::compute(sale, rate, vat, true);

    let audit_id = recorder.record(CommissionAuditParams {
        tenant_id: tenant.to_string(),
        sub_order_id: "sub_ord_42".to_string(),
        vendor_id: utils::new_uuid_to_bech32("vnd_")?,
        sale_amount: sale,
        commission_rate_used: rate,
        commission_rate_source: "vendor-contract-v3".to_string(),
        base_amount_for_calc: sale,
        formula_version: "2025-01".to_string(),
        vat_applied: true,
        vat_rate: vat,
        commission_computed: breakdown.commission,
        vendor_payout_computed: breakdown.vendor_payout,
        calculated_by: ChangeSource::System,
    })?;
    println!(
        "commission audit {audit_id}: {} commission, {} payout",
        breakdown.commission, breakdown.vendor_payout
    );

    // Earnings: record, clear, then reverse after a chargeback.
    let ledger = EarningsLedger::with_config(db, LedgerConfig { clearance_days: 0 })?;
    let partner = utils::new_uuid_to_bech32("ptn_")?;

    let earning = ledger.record_earning(NewEarning {
        partner_id: partner.clone(),
        amount: Money::from(5_000),
        currency: "NGN".to_string(),
        commission_type: "subscription".to_string(),
        idempotency_key: "billing-cycle-77::ptn".to_string(),
        source_event_id: "evt-77".to_string(),
    })?;
    ledger.sweep_cleared(&partner, &TimeStamp::new())?;
    println!("payable before reversal: {}", ledger.balance(&partner)?.payable);

    let reversal = ledger.reverse(&earning.id)?;
    println!(
        "reversed {} with debit {}; payable now {}",
        reversal.original.id,
        reversal.debit.id,
        ledger.balance(&partner)?.payable
    );

    Ok(())
}
