//! In-process ledger.
//!
//! Validates submissions the way a node would (inputs, value, witnesses,
//! scripts), keeps accepted transactions pending for one block delay, then
//! applies them to the UTXO set. Script inputs are judged by an
//! [`AuthorizationOracle`]; the script bytes themselves are never run.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use plutus_escrow_sdk::data;
use plutus_escrow_sdk::escrow::DEFAULT_MIN_OUTPUT;
use plutus_escrow_sdk::helpers::{blake2b_256, schnorr_verify};
use plutus_escrow_sdk::types::PaymentPart;
use plutus_escrow_sdk::{
    Address, AuthorizationOracle, Blake2bHasher, EscrowError, Network, OutputRef, ScriptContext,
    ScriptHasher, TransactionId, TxOutput, Utxo,
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ledger::{Confirmation, LedgerClient, TxStatus};
use crate::tx::{SignedTransaction, Transaction};

#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    pub network: Network,
    pub min_output: u64,
    /// Time between acceptance and inclusion.
    pub block_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            network: Network::Preview,
            min_output: DEFAULT_MIN_OUTPUT,
            block_delay: Duration::from_secs(1),
            poll_interval: Duration::from_millis(500),
        }
    }
}

struct PendingTx {
    tx: Transaction,
    ready_at: Instant,
}

#[derive(Default)]
struct LedgerState {
    utxos: BTreeMap<OutputRef, TxOutput>,
    /// In submission order.
    pending: Vec<PendingTx>,
    confirmed: HashMap<TransactionId, u64>,
    slot: u64,
    genesis_count: u64,
}

impl LedgerState {
    fn claimed_by_pending(&self) -> HashSet<OutputRef> {
        self.pending
            .iter()
            .flat_map(|p| p.tx.body().inputs.iter().copied())
            .collect()
    }

    fn is_known(&self, tx_id: &TransactionId) -> bool {
        self.confirmed.contains_key(tx_id) || self.pending.iter().any(|p| p.tx.id() == *tx_id)
    }
}

pub struct EmulatorLedger {
    config: EmulatorConfig,
    oracle: Arc<dyn AuthorizationOracle>,
    hasher: Blake2bHasher,
    state: Mutex<LedgerState>,
    halted: AtomicBool,
}

impl EmulatorLedger {
    pub fn new(config: EmulatorConfig, oracle: Arc<dyn AuthorizationOracle>) -> Self {
        Self {
            config,
            oracle,
            hasher: Blake2bHasher,
            state: Mutex::new(LedgerState::default()),
            halted: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Mint a confirmed output out of thin air.
    pub async fn fund(&self, address: Address, value: u64) -> OutputRef {
        let mut state = self.state.lock().await;
        state.genesis_count += 1;
        let mut preimage = b"genesis".to_vec();
        preimage.extend_from_slice(&state.genesis_count.to_be_bytes());
        let out_ref = OutputRef::new(TransactionId::from_bytes(blake2b_256(&preimage)), 0);
        state.utxos.insert(
            out_ref,
            TxOutput {
                address,
                value,
                datum: None,
            },
        );
        debug!(%out_ref, %address, value, "genesis output");
        out_ref
    }

    /// Stop including transactions. Submissions are still accepted.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.halted.store(false, Ordering::SeqCst);
    }

    pub async fn slot(&self) -> u64 {
        let mut state = self.state.lock().await;
        self.settle(&mut state);
        state.slot
    }

    pub async fn balance(&self, address: &Address) -> u64 {
        let mut state = self.state.lock().await;
        self.settle(&mut state);
        state
            .utxos
            .values()
            .filter(|o| o.address == *address)
            .map(|o| o.value)
            .sum()
    }

    /// Include every pending transaction whose delay has elapsed.
    fn settle(&self, state: &mut LedgerState) {
        if self.halted.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
            .into_iter()
            .partition(|p| p.ready_at <= now);
        state.pending = waiting;
        if ready.is_empty() {
            return;
        }

        state.slot += 1;
        let slot = state.slot;
        for PendingTx { tx, .. } in ready {
            for input in &tx.body().inputs {
                state.utxos.remove(input);
            }
            for (i, output) in tx.body().outputs.iter().enumerate() {
                state.utxos.insert(tx.output_ref(i as u32), output.clone());
            }
            state.confirmed.insert(tx.id(), slot);
            info!(tx_id = %tx.id(), slot, "transaction confirmed");
        }
    }

    /// Phase-1 and script checks. `Err` carries the rejection reason.
    fn validate(&self, state: &LedgerState, signed: &SignedTransaction) -> Result<(), String> {
        let tx = &signed.tx;
        let body = tx.body();
        let tx_id = tx.id();

        if state.is_known(&tx_id) {
            return Err(format!("DuplicateTransaction: {tx_id}"));
        }
        if body.inputs.is_empty() {
            return Err("InputSetEmpty".into());
        }

        let claimed = state.claimed_by_pending();
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(body.inputs.len());
        for input in &body.inputs {
            if !seen.insert(*input) {
                return Err(format!("DuplicateInput: {input}"));
            }
            if claimed.contains(input) {
                return Err(format!("BadInputsUTxO: {input} is spent by a pending transaction"));
            }
            let output = state
                .utxos
                .get(input)
                .ok_or_else(|| format!("BadInputsUTxO: {input} does not exist"))?;
            resolved.push((*input, output));
        }

        let network = self.config.network.id();
        for (i, output) in body.outputs.iter().enumerate() {
            if output.address.network != network {
                return Err(format!("WrongNetwork: output {i}"));
            }
            if output.value < self.config.min_output {
                return Err(format!(
                    "OutputTooSmall: output {i} carries {} < {}",
                    output.value, self.config.min_output
                ));
            }
        }

        let consumed = resolved
            .iter()
            .try_fold(0u64, |acc, (_, o)| acc.checked_add(o.value))
            .ok_or("ValueNotConserved: input overflow")?;
        let produced = body
            .outputs
            .iter()
            .try_fold(body.fee, |acc, o| acc.checked_add(o.value))
            .ok_or("ValueNotConserved: output overflow")?;
        if consumed != produced {
            return Err(format!(
                "ValueNotConserved: consumed {consumed}, produced {produced}"
            ));
        }

        for witness in &signed.witnesses {
            if !schnorr_verify(&tx_id, &witness.vkey, &witness.signature) {
                return Err(format!("InvalidWitness: {}", hex::encode(witness.vkey)));
            }
        }
        let signatories = signed.signatories();

        for signer in &body.required_signers {
            if !signatories.contains(signer) {
                return Err(format!("MissingRequiredSigner: {signer}"));
            }
        }

        for (index, (out_ref, output)) in resolved.iter().enumerate() {
            match output.address.payment {
                PaymentPart::Key(credential) => {
                    if !signatories.contains(&credential) {
                        return Err(format!("MissingVKeyWitness: {credential} for {out_ref}"));
                    }
                }
                PaymentPart::Script(hash) => {
                    self.evaluate_script_input(signed, index as u32, *out_ref, output, hash)?;
                }
            }
        }
        Ok(())
    }

    fn evaluate_script_input(
        &self,
        signed: &SignedTransaction,
        index: u32,
        out_ref: OutputRef,
        output: &TxOutput,
        hash: plutus_escrow_sdk::ScriptHash,
    ) -> Result<(), String> {
        let body = signed.tx.body();
        let script = body
            .scripts
            .iter()
            .find(|s| s.script_hash(&self.hasher) == hash)
            .ok_or_else(|| format!("MissingScriptWitness: {hash} for {out_ref}"))?;
        let datum = output
            .datum
            .as_ref()
            .ok_or_else(|| format!("UnspendableUTxONoDatum: {out_ref}"))?;
        let entry = body
            .redeemers
            .iter()
            .find(|r| r.input_index == index)
            .ok_or_else(|| format!("MissingRedeemer: input {index}"))?;
        let redeemer = data::decode(&entry.data_cbor)
            .map_err(|e| format!("MalformedRedeemer: input {index}: {e}"))?;

        let ctx = ScriptContext {
            tx_id: signed.id(),
            spending: out_ref,
            signatories: signed.signatories(),
        };
        self.oracle
            .evaluate(script, datum, &redeemer, &ctx)
            .map_err(|reason| format!("ScriptFailure: input {index}: {reason}"))
    }
}

#[async_trait]
impl LedgerClient for EmulatorLedger {
    fn network(&self) -> Network {
        self.config.network
    }

    fn script_hasher(&self) -> &dyn ScriptHasher {
        &self.hasher
    }

    async fn find_unspent_output(&self, out_ref: &OutputRef) -> Result<Option<Utxo>, EscrowError> {
        let mut state = self.state.lock().await;
        self.settle(&mut state);
        Ok(state.utxos.get(out_ref).map(|output| Utxo {
            out_ref: *out_ref,
            output: output.clone(),
        }))
    }

    async fn utxos_at(&self, address: &Address) -> Result<Vec<Utxo>, EscrowError> {
        let mut state = self.state.lock().await;
        self.settle(&mut state);
        Ok(state
            .utxos
            .iter()
            .filter(|(_, o)| o.address == *address)
            .map(|(out_ref, output)| Utxo {
                out_ref: *out_ref,
                output: output.clone(),
            })
            .collect())
    }

    async fn submit(&self, signed: &SignedTransaction) -> Result<TransactionId, EscrowError> {
        let mut state = self.state.lock().await;
        self.settle(&mut state);

        let tx_id = signed.id();
        if let Err(reason) = self.validate(&state, signed) {
            warn!(%tx_id, %reason, "transaction rejected");
            return Err(EscrowError::SubmissionRejected(reason));
        }

        state.pending.push(PendingTx {
            tx: signed.tx.clone(),
            ready_at: Instant::now() + self.config.block_delay,
        });
        debug!(%tx_id, "transaction accepted");
        Ok(tx_id)
    }

    async fn await_confirmation(
        &self,
        tx_id: &TransactionId,
        timeout: Duration,
    ) -> Result<Confirmation, EscrowError> {
        let start = Instant::now();
        loop {
            if let TxStatus::Confirmed { slot } = self.transaction_status(tx_id).await? {
                return Ok(Confirmation::Confirmed { slot });
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Ok(Confirmation::TimedOut);
            }
            tokio::time::sleep(self.config.poll_interval.min(timeout - elapsed)).await;
        }
    }

    async fn transaction_status(&self, tx_id: &TransactionId) -> Result<TxStatus, EscrowError> {
        let mut state = self.state.lock().await;
        self.settle(&mut state);
        if let Some(&slot) = state.confirmed.get(tx_id) {
            return Ok(TxStatus::Confirmed { slot });
        }
        if state.pending.iter().any(|p| p.tx.id() == *tx_id) {
            return Ok(TxStatus::Pending);
        }
        Ok(TxStatus::Unknown)
    }
}
