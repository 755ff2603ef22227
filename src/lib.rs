//! Order integrity and partner earnings ledger.
//!
//! Two coupled subsystems over one embedded store: a hash-chained, append-only
//! revision history for orders (with status/payment transition logs and
//! one-time commission audit snapshots), and a partner earnings ledger with a
//! one-way lifecycle, idempotent entry creation and reversal-based corrections.

pub mod commission;
pub mod earnings;
pub mod error;
pub mod hash;
pub mod history;
pub mod orders;
pub mod revision;
pub mod store;
pub mod types;
pub mod utils;

pub use error::{LedgerError, Result};
