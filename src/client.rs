//! Async lock/unlock against a ledger, with one outstanding unlock per output.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use plutus_escrow_sdk::escrow::DEFAULT_MIN_OUTPUT;
use plutus_escrow_sdk::{
    Address, Credential, EscrowBuilder, EscrowError, EscrowProtocol, EscrowState, OutputRef,
    PlutusData, TransactionId, ValidatorDescriptor, owner_of,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::ledger::{Confirmation, KeyStore, LedgerClient, TxStatus};
use crate::tx::{DEFAULT_FEE, build_lock_tx, build_unlock_tx};

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Flat fee, in lovelace, paid by every transaction.
    pub fee: u64,
    pub min_output: u64,
    pub confirmation_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            fee: DEFAULT_FEE,
            min_output: DEFAULT_MIN_OUTPUT,
            confirmation_timeout: Duration::from_secs(60),
        }
    }
}

/// An unlock this client started, and what it knows of the output.
#[derive(Debug, Clone, Copy)]
struct Claim {
    /// `Unlocked` until the output is read from the ledger, then `Locked`
    /// while the unlock is in flight and `Consumed` once it confirmed.
    state: EscrowState,
    /// Id of the signed unlock, recorded before it is handed to the ledger.
    unlock: Option<TransactionId>,
}

/// Claims by output. An entry stays until `reconcile` hands its final state
/// to the caller, so the map is bounded by the outputs this client has
/// unlocked and not yet reconciled.
#[derive(Default)]
struct Tracker {
    claims: HashMap<OutputRef, Claim>,
}

impl Tracker {
    /// Move every output spent by `tx_id` to `Consumed`.
    fn settle(&mut self, tx_id: TransactionId) {
        for (out_ref, claim) in &mut self.claims {
            if claim.unlock != Some(tx_id) || !matches!(claim.state, EscrowState::Locked { .. }) {
                continue;
            }
            match claim.state.unlock_confirmed(tx_id) {
                Ok(state) => claim.state = state,
                Err(e) => warn!(%out_ref, %tx_id, "cannot settle claim: {e}"),
            }
        }
    }

    fn release(&mut self, out_ref: &OutputRef, unlock: Option<TransactionId>) {
        if self.claims.get(out_ref).is_some_and(|c| c.unlock == unlock) {
            self.claims.remove(out_ref);
        }
    }
}

pub struct EscrowClient<L, K> {
    protocol: EscrowProtocol,
    ledger: Arc<L>,
    keys: Arc<K>,
    settings: ClientSettings,
    tracker: Mutex<Tracker>,
}

impl<L: LedgerClient, K: KeyStore> EscrowClient<L, K> {
    pub fn new(
        protocol: EscrowProtocol,
        ledger: Arc<L>,
        keys: Arc<K>,
        settings: ClientSettings,
    ) -> Self {
        Self {
            protocol,
            ledger,
            keys,
            settings,
            tracker: Mutex::new(Tracker::default()),
        }
    }

    /// Bind `validator` to the ledger's network and script hash.
    pub fn connect(
        validator: Arc<ValidatorDescriptor>,
        ledger: Arc<L>,
        keys: Arc<K>,
        settings: ClientSettings,
    ) -> Result<Self, EscrowError> {
        let protocol = EscrowBuilder::new(validator)
            .network(ledger.network())
            .min_output(settings.min_output)
            .build(ledger.script_hasher())?;
        info!(
            address = %protocol.address(),
            script_hash = %protocol.script_hash(),
            "escrow client ready"
        );
        Ok(Self::new(protocol, ledger, keys, settings))
    }

    pub fn protocol(&self) -> &EscrowProtocol {
        &self.protocol
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Wallet address of `credential` on the client's network.
    pub fn wallet_address(&self, credential: Credential) -> Address {
        Address::from_credential(self.protocol.network(), credential)
    }

    /// Lock `amount` under a datum naming `owner`, funded from `owner`'s
    /// wallet. Returns the escrow output once confirmed.
    pub async fn lock(&self, amount: u64, owner: Credential) -> Result<OutputRef, EscrowError> {
        let intent = self.protocol.lock(amount, owner)?;
        let wallet = self.wallet_address(owner);
        let funding = self.ledger.utxos_at(&wallet).await?;
        let tx = build_lock_tx(
            &intent,
            &funding,
            wallet,
            self.settings.fee,
            self.protocol.min_output(),
        )?;
        let out_ref = tx.output_ref(0);

        let signed = self.keys.sign_new(tx, &owner).await?;
        let tx_id = self.ledger.submit(&signed).await?;
        info!(%tx_id, %owner, amount, "lock submitted");

        let slot = self.confirm(tx_id).await?;
        info!(%out_ref, slot, "funds locked");
        Ok(out_ref)
    }

    /// Spend the escrow output `out_ref` with `redeemer`, signed by `signer`.
    ///
    /// Whether `signer` is allowed is decided by the ledger; a refusal comes
    /// back as [`EscrowError::SubmissionRejected`]. While an earlier unlock
    /// of the same output is unresolved this fails with
    /// [`EscrowError::StaleReference`] without touching the ledger.
    pub async fn unlock(
        &self,
        out_ref: OutputRef,
        redeemer: PlutusData,
        signer: Credential,
    ) -> Result<TransactionId, EscrowError> {
        self.claim(out_ref).await?;

        match self.submit_unlock(out_ref, redeemer, signer).await {
            Ok(tx_id) => {
                self.tracker.lock().await.settle(tx_id);
                info!(%out_ref, %tx_id, %signer, "funds unlocked");
                Ok(tx_id)
            }
            Err(e) => {
                let mut tracker = self.tracker.lock().await;
                let handed_over = tracker
                    .claims
                    .get(&out_ref)
                    .is_some_and(|c| c.unlock.is_some());
                if !(handed_over && e.is_ambiguous()) {
                    tracker.claims.remove(&out_ref);
                }
                Err(e)
            }
        }
    }

    async fn claim(&self, out_ref: OutputRef) -> Result<(), EscrowError> {
        let mut tracker = self.tracker.lock().await;
        if let Some(claim) = tracker.claims.get(&out_ref) {
            debug!(%out_ref, state = claim.state.name(), "unlock refused: output already claimed");
            return Err(EscrowError::StaleReference(out_ref));
        }
        tracker.claims.insert(
            out_ref,
            Claim {
                state: EscrowState::Unlocked,
                unlock: None,
            },
        );
        Ok(())
    }

    async fn submit_unlock(
        &self,
        out_ref: OutputRef,
        redeemer: PlutusData,
        signer: Credential,
    ) -> Result<TransactionId, EscrowError> {
        let utxo = self
            .ledger
            .find_unspent_output(&out_ref)
            .await?
            .ok_or(EscrowError::StaleReference(out_ref))?;
        let intent = self.protocol.unlock(&utxo, redeemer, signer)?;
        let owner = utxo
            .output
            .datum
            .as_ref()
            .and_then(owner_of)
            .ok_or(EscrowError::StaleReference(out_ref))?;
        let locked = EscrowState::Unlocked.lock_confirmed(out_ref, owner)?;

        let wallet = self.wallet_address(signer);
        let funding = self.ledger.utxos_at(&wallet).await?;
        let tx = build_unlock_tx(&intent, &funding, wallet, self.settings.fee)?;
        let signed = self.keys.sign_new(tx, &signer).await?;

        // Recorded before submission: a caller that stops waiting mid-submit
        // still leaves a claim `reconcile` can look up.
        let tx_id = signed.id();
        {
            let mut tracker = self.tracker.lock().await;
            let Some(claim) = tracker.claims.get_mut(&out_ref) else {
                // Released by `reconcile` while this unlock was running.
                return Err(EscrowError::StaleReference(out_ref));
            };
            claim.state = locked;
            claim.unlock = Some(tx_id);
        }

        self.ledger.submit(&signed).await?;
        info!(%tx_id, %out_ref, %signer, "unlock submitted");

        self.confirm(tx_id).await?;
        Ok(tx_id)
    }

    /// Bounded wait; a timeout is an error here, unlike in
    /// [`EscrowClient::await_confirmation`].
    async fn confirm(&self, tx_id: TransactionId) -> Result<u64, EscrowError> {
        let timeout = self.settings.confirmation_timeout;
        match self.ledger.await_confirmation(&tx_id, timeout).await? {
            Confirmation::Confirmed { slot } => Ok(slot),
            Confirmation::TimedOut => {
                warn!(%tx_id, ?timeout, "confirmation timed out");
                Err(EscrowError::Timeout {
                    tx_id,
                    waited: timeout,
                })
            }
        }
    }

    /// Wait again for a transaction, typically one that timed out earlier.
    /// Confirmation resolves any unlock waiting on it.
    pub async fn await_confirmation(
        &self,
        tx_id: TransactionId,
    ) -> Result<Confirmation, EscrowError> {
        let outcome = self
            .ledger
            .await_confirmation(&tx_id, self.settings.confirmation_timeout)
            .await?;
        if let Confirmation::Confirmed { slot } = outcome {
            debug!(%tx_id, slot, "late confirmation");
            self.tracker.lock().await.settle(tx_id);
        }
        Ok(outcome)
    }

    /// Resolve the claim on `out_ref` against the ledger and return the
    /// output's state.
    ///
    /// Meant for claims left behind by an unlock that is no longer running.
    /// A confirmed unlock is reported as `Consumed` and forgotten. A claim
    /// whose unlock is still pending stays. A claim whose transaction the
    /// ledger does not know is released so the output can be unlocked again.
    pub async fn reconcile(&self, out_ref: OutputRef) -> Result<EscrowState, EscrowError> {
        let claim = self.tracker.lock().await.claims.get(&out_ref).copied();
        let Some(claim) = claim else {
            return self.state(out_ref).await;
        };

        if let (EscrowState::Locked { .. }, Some(tx_id)) = (claim.state, claim.unlock) {
            match self.ledger.transaction_status(&tx_id).await? {
                TxStatus::Confirmed { slot } => {
                    info!(%out_ref, %tx_id, slot, "reconciled: unlock confirmed");
                    self.tracker.lock().await.settle(tx_id);
                }
                TxStatus::Pending => {
                    debug!(%out_ref, %tx_id, "reconciled: still pending");
                    return Ok(claim.state);
                }
                TxStatus::Unknown => {
                    warn!(%out_ref, %tx_id, "reconciled: unlock dropped, releasing claim");
                    self.tracker.lock().await.release(&out_ref, Some(tx_id));
                    return self.state(out_ref).await;
                }
            }
        }

        let mut tracker = self.tracker.lock().await;
        match tracker.claims.get(&out_ref).copied() {
            Some(Claim {
                state: state @ EscrowState::Consumed { .. },
                ..
            }) => {
                tracker.claims.remove(&out_ref);
                Ok(state)
            }
            // Never handed to the ledger.
            Some(Claim { unlock: None, .. }) => {
                tracker.release(&out_ref, None);
                drop(tracker);
                self.state(out_ref).await
            }
            _ => {
                drop(tracker);
                self.state(out_ref).await
            }
        }
    }

    /// Number of outputs with a claim held by this client.
    pub async fn tracked_outputs(&self) -> usize {
        self.tracker.lock().await.claims.len()
    }

    /// Where `out_ref` stands: locked under an owner, or consumed.
    ///
    /// A claimed output reports the state this client holds for it, moved to
    /// `Consumed` once its unlock confirmed; otherwise the ledger is read.
    /// Fails with [`EscrowError::StaleReference`] for anything that is not
    /// an unspent escrow output.
    pub async fn state(&self, out_ref: OutputRef) -> Result<EscrowState, EscrowError> {
        let claim = self.tracker.lock().await.claims.get(&out_ref).copied();
        if let Some(claim) = claim {
            match (claim.state, claim.unlock) {
                (EscrowState::Consumed { .. }, _) => return Ok(claim.state),
                (EscrowState::Locked { .. }, Some(tx_id)) => {
                    if let TxStatus::Confirmed { .. } =
                        self.ledger.transaction_status(&tx_id).await?
                    {
                        let mut tracker = self.tracker.lock().await;
                        tracker.settle(tx_id);
                        if let Some(settled) = tracker.claims.get(&out_ref) {
                            return Ok(settled.state);
                        }
                    }
                    return Ok(claim.state);
                }
                _ => {}
            }
        }

        match self.ledger.find_unspent_output(&out_ref).await? {
            Some(utxo) if self.protocol.is_escrow_output(&utxo) => {
                let owner = utxo
                    .output
                    .datum
                    .as_ref()
                    .and_then(owner_of)
                    .ok_or(EscrowError::StaleReference(out_ref))?;
                EscrowState::Unlocked.lock_confirmed(out_ref, owner)
            }
            _ => Err(EscrowError::StaleReference(out_ref)),
        }
    }
}
