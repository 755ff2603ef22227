//! Sled tree layout and codec helpers shared by the ledger services.
//!
//! Every record is minicbor-encoded under a string key whose lexicographic
//! order matches the read order the services need (zero-padded sequence
//! segments keep numeric and byte order in agreement). Unique constraints are
//! expressed as insert-if-vacant via `compare_and_swap`, which turns a write
//! race into a detectable conflict instead of a silent overwrite.

use minicbor::{Decode, Encode};
use sled::Tree;

use crate::error::{LedgerError, Result};

pub const ORDERS_TREE: &str = "orders";
pub const REVISIONS_TREE: &str = "revisions";
pub const STATUS_HISTORY_TREE: &str = "status_history";
pub const PAYMENT_HISTORY_TREE: &str = "payment_history";
pub const COMMISSION_AUDITS_TREE: &str = "commission_audits";
pub const EARNINGS_TREE: &str = "earnings";
pub const EARNINGS_IDEM_TREE: &str = "earnings_idem";
pub const EARNINGS_BY_PARTNER_TREE: &str = "earnings_by_partner";

pub(crate) fn to_cbor<T: Encode<()>>(value: &T) -> Result<Vec<u8>> {
    minicbor::to_vec(value).map_err(|e| LedgerError::Encode(e.to_string()))
}

pub(crate) fn from_cbor<T: for<'b> Decode<'b, ()>>(bytes: &[u8]) -> Result<T> {
    minicbor::decode(bytes).map_err(|e| LedgerError::Decode(e.to_string()))
}

pub(crate) fn put<T: Encode<()>>(tree: &Tree, key: &[u8], value: &T) -> Result<()> {
    tree.insert(key, to_cbor(value)?)?;
    Ok(())
}

pub(crate) fn get<T: for<'b> Decode<'b, ()>>(tree: &Tree, key: &[u8]) -> Result<Option<T>> {
    match tree.get(key)? {
        Some(ivec) => Ok(Some(from_cbor(ivec.as_ref())?)),
        None => Ok(None),
    }
}

/// Insert only when the key is vacant. Returns false when another writer got
/// there first; the existing value is left untouched.
pub(crate) fn insert_if_vacant(tree: &Tree, key: &[u8], bytes: Vec<u8>) -> Result<bool> {
    match tree.compare_and_swap(key, None as Option<&[u8]>, Some(bytes))? {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}
