use crate::types::EarningStatus;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error(
        "revision {revision} already exists for order {order_id}; re-read the chain and retry"
    )]
    ConflictRevisionNumber { order_id: String, revision: u32 },
    #[error("cannot {action} earning {id} while it is {status:?}")]
    InvalidTransition {
        id: String,
        status: EarningStatus,
        action: &'static str,
    },
    #[error("earning {0} already has an active reversal")]
    AlreadyReversed(String),
    #[error("storage error: {0}")]
    Store(#[from] sled::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
}
