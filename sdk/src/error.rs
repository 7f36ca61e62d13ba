use std::convert::Infallible;
use std::time::Duration;

use crate::types::{OutputRef, TransactionId};

/// Failures of the Plutus data codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),
    #[error("{0} trailing bytes after data item")]
    TrailingBytes(usize),
    #[error("unexpected CBOR major type {major} at byte {offset}")]
    UnexpectedMajor { major: u8, offset: usize },
    #[error("unsupported CBOR tag {0}")]
    UnsupportedTag(u64),
    #[error("nesting deeper than {0} levels")]
    DepthExceeded(usize),
    #[error("length {0} does not fit in memory")]
    LengthOverflow(u64),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("invalid JSON data: {0}")]
    InvalidJson(String),
    #[error("malformed CBOR: {0}")]
    Cbor(String),
}

impl From<minicbor::encode::Error<Infallible>> for CodecError {
    fn from(e: minicbor::encode::Error<Infallible>) -> Self {
        Self::Cbor(e.to_string())
    }
}

/// A hex identifier or address that does not parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {what}: {reason}")]
pub struct ParseError {
    pub what: &'static str,
    pub reason: String,
}

impl ParseError {
    pub fn new(what: &'static str, reason: impl Into<String>) -> Self {
        Self {
            what,
            reason: reason.into(),
        }
    }
}

/// Everything a lock or unlock can report besides success.
#[derive(Debug, thiserror::Error)]
pub enum EscrowError {
    #[error("artifact error: {0}")]
    Artifact(String),
    #[error("insufficient value: {amount} lovelace is below the minimum output of {minimum}")]
    InsufficientValue { amount: u64, minimum: u64 },
    #[error("insufficient funds: need {needed} lovelace, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("stale reference: {0} is not an unspent escrow output")]
    StaleReference(OutputRef),
    #[error("encoding error: {0}")]
    Encoding(#[from] CodecError),
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),
    #[error("timeout: {tx_id} not confirmed after {waited:?}")]
    Timeout { tx_id: TransactionId, waited: Duration },
    #[error("ledger error: {0}")]
    Ledger(String),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("invalid transition: {event} while {from}")]
    InvalidTransition {
        from: &'static str,
        event: &'static str,
    },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl EscrowError {
    /// True for outcomes where the transaction may still land; callers must
    /// re-query before submitting again.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Ledger(_))
    }
}
