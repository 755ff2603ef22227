//! Identifier helpers

use bech32::Bech32m;
use uuid7::uuid7;

use crate::error::{LedgerError, Result};

/// Generate a fresh uuid7 and encode it as a bech32 string under the given
/// human-readable prefix, e.g. `ord_`, `earn_`, `ptn_`.
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| LedgerError::Encode(e.to_string()))?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| LedgerError::Encode(e.to_string()))?;
    Ok(encode)
}
