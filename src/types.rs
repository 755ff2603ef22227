//! Shared domain types: order/earning enums, exact-decimal money and timestamps
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderType {
    #[n(0)]
    SvmOrder,
    #[n(1)]
    MvmParentOrder,
    #[n(2)]
    MvmSubOrder,
    #[n(3)]
    ParkTicket,
}

impl OrderType {
    /// Stable tag used in storage keys and the canonical hash payload.
    pub fn tag(&self) -> &'static str {
        match self {
            OrderType::SvmOrder => "SVM_ORDER",
            OrderType::MvmParentOrder => "MVM_PARENT_ORDER",
            OrderType::MvmSubOrder => "MVM_SUB_ORDER",
            OrderType::ParkTicket => "PARK_TICKET",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionReason {
    #[n(0)]
    System,
    #[n(1)]
    Admin,
    #[n(2)]
    Payment,
    #[n(3)]
    Recovery,
    #[n(4)]
    Refund,
    #[n(5)]
    Cancellation,
    #[n(6)]
    Fulfillment,
    #[n(7)]
    CustomerRequest,
}

/// Who or what triggered a mutation. Shared by revisions, history logs and audits.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    #[n(0)]
    System,
    #[n(1)]
    User,
    #[n(2)]
    Webhook,
    #[n(3)]
    Pos,
    #[n(4)]
    Admin,
    #[n(5)]
    Api,
    #[n(6)]
    Recovery,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Confirmed,
    #[n(2)]
    Processing,
    #[n(3)]
    Shipped,
    #[n(4)]
    Delivered,
    #[n(5)]
    Cancelled,
    #[n(6)]
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    #[n(0)]
    Unpaid,
    #[n(1)]
    Authorized,
    #[n(2)]
    Paid,
    #[n(3)]
    PartiallyRefunded,
    #[n(4)]
    Refunded,
    #[n(5)]
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

/// Lifecycle of a partner earning entry. `Paid` and `Voided` are terminal.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarningStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Cleared,
    #[n(2)]
    Approved,
    #[n(3)]
    Paid,
    #[n(4)]
    Voided,
    #[n(5)]
    Disputed,
    #[n(6)]
    Reversed,
}

impl EarningStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EarningStatus::Paid | EarningStatus::Voided)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    #[n(0)]
    Credit,
    #[n(1)]
    Debit,
}

/// Exact-decimal monetary amount. Never floating point: hash normalization and
/// balance arithmetic both require reproducible decimal semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }
    pub fn parse(s: &str) -> Result<Self, rust_decimal::Error> {
        Decimal::from_str(s).map(Self)
    }
    pub fn amount(&self) -> Decimal {
        self.0
    }
    /// Fixed 2-decimal-place form used in canonical hash payloads, so that
    /// `5`, `5.0` and `5.00` all normalize to the same bytes.
    pub fn canonical(&self) -> String {
        format!("{:.2}", self.0.round_dp(2))
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(Decimal::from(value))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl<C> minicbor::Encode<C> for Money {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0.to_string())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Money {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let s = d.str()?;
        Decimal::from_str(s)
            .map(Money)
            .map_err(|_| minicbor::decode::Error::message("invalid decimal amount"))
    }
}

/// A percentage rate, e.g. commission or VAT. Exact decimal like [`Money`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Percent(Decimal);

impl Percent {
    pub fn new(rate: Decimal) -> Self {
        Self(rate)
    }
    pub fn parse(s: &str) -> Result<Self, rust_decimal::Error> {
        Decimal::from_str(s).map(Self)
    }
    pub fn rate(&self) -> Decimal {
        self.0
    }
}

impl From<i64> for Percent {
    fn from(value: i64) -> Self {
        Self(Decimal::from(value))
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl<C> minicbor::Encode<C> for Percent {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0.to_string())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Percent {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let s = d.str()?;
        Decimal::from_str(s)
            .map(Percent)
            .map_err(|_| minicbor::decode::Error::message("invalid decimal rate"))
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// Ordering is written by hand, like the minicbor impls below: a derive would
// bound on `T: Ord`, which `Utc` does not implement, while the inner
// `DateTime` already orders by instant for any timezone.
impl<T: TimeZone + Eq> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl<T: TimeZone + Eq> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn plus_days(&self, days: i64) -> Self {
        Self(self.0 + chrono::Duration::days(days))
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}
