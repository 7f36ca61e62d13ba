//! Capabilities the escrow client consumes. Production deployments back
//! these with a chain indexer, a wallet and the filesystem; the lab ships
//! in-process implementations.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use plutus_escrow_sdk::{
    Address, Credential, EscrowError, Network, OutputRef, ScriptHasher, TransactionId, Utxo,
};
use serde::Serialize;

use crate::tx::{SignedTransaction, Transaction};

/// Outcome of a bounded confirmation wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    Confirmed { slot: u64 },
    /// The ledger did not report inclusion in time. Says nothing about
    /// whether the transaction will land.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Never seen, or dropped.
    Unknown,
    Pending,
    Confirmed { slot: u64 },
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    fn network(&self) -> Network;

    /// The hash the ledger uses to name scripts.
    fn script_hasher(&self) -> &dyn ScriptHasher;

    /// `None` if the output does not exist or is already spent.
    async fn find_unspent_output(&self, out_ref: &OutputRef) -> Result<Option<Utxo>, EscrowError>;

    async fn utxos_at(&self, address: &Address) -> Result<Vec<Utxo>, EscrowError>;

    /// Fails with [`EscrowError::SubmissionRejected`] when the ledger refuses
    /// the transaction, including failed script evaluation.
    async fn submit(&self, tx: &SignedTransaction) -> Result<TransactionId, EscrowError>;

    /// Waits up to `timeout` for inclusion. Dropping the future abandons the
    /// wait only; the transaction's fate stays query-able.
    async fn await_confirmation(
        &self,
        tx_id: &TransactionId,
        timeout: Duration,
    ) -> Result<Confirmation, EscrowError>;

    async fn transaction_status(&self, tx_id: &TransactionId) -> Result<TxStatus, EscrowError>;
}

#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Adds `credential`'s witness to `tx`.
    async fn sign(
        &self,
        tx: SignedTransaction,
        credential: &Credential,
    ) -> Result<SignedTransaction, EscrowError>;

    async fn sign_new(
        &self,
        tx: Transaction,
        credential: &Credential,
    ) -> Result<SignedTransaction, EscrowError> {
        self.sign(SignedTransaction::unsigned(tx), credential).await
    }
}

#[async_trait]
pub trait ArtifactLoader: Send + Sync {
    /// Raw bytes of a compiled script artifact.
    async fn load(&self, path: &Path) -> Result<Vec<u8>, EscrowError>;
}
