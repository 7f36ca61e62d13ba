use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::data::PlutusData;
use crate::error::EscrowError;
use crate::types::{Address, Credential, Network, OutputRef, ScriptHash, TransactionId, Utxo};
use crate::validator::{ScriptHasher, ValidatorDescriptor};

/// Smallest output the ledger accepts, in lovelace.
pub const DEFAULT_MIN_OUTPUT: u64 = 1_000_000;

/// Datum naming the credential allowed to unlock: `Constr(0, [owner])`.
pub fn owner_datum(owner: &Credential) -> PlutusData {
    PlutusData::constr(0, vec![PlutusData::bytes(owner.as_bytes().to_vec())])
}

/// Inverse of [`owner_datum`].
pub fn owner_of(datum: &PlutusData) -> Option<Credential> {
    match datum.as_constr()? {
        c if c.tag == 0 && c.fields.len() == 1 => Credential::from_slice(c.fields[0].as_bytes()?),
        _ => None,
    }
}

/// What a locking transaction must contain.
#[derive(Debug, Clone)]
pub struct LockIntent {
    pub address: Address,
    pub value: u64,
    pub datum: PlutusData,
    pub datum_cbor: Vec<u8>,
}

/// What an unlocking transaction must contain.
#[derive(Debug, Clone)]
pub struct UnlockIntent {
    pub input: Utxo,
    pub redeemer: PlutusData,
    pub redeemer_cbor: Vec<u8>,
    pub required_signer: Credential,
    pub script: Arc<ValidatorDescriptor>,
}

/// Builder for an [`EscrowProtocol`] bound to one validator and network.
pub struct EscrowBuilder {
    validator: Arc<ValidatorDescriptor>,
    network: Network,
    min_output: u64,
}

impl EscrowBuilder {
    pub fn new(validator: Arc<ValidatorDescriptor>) -> Self {
        Self {
            validator,
            network: Network::default(),
            min_output: DEFAULT_MIN_OUTPUT,
        }
    }

    pub fn network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn min_output(mut self, lovelace: u64) -> Self {
        self.min_output = lovelace;
        self
    }

    pub fn build(self, hasher: &dyn ScriptHasher) -> Result<EscrowProtocol, EscrowError> {
        if self.min_output == 0 {
            return Err(EscrowError::InvalidConfig("min_output must be > 0".into()));
        }
        let script_hash = self.validator.verify_hash(hasher)?;
        let address = Address::from_script_hash(self.network, script_hash);

        Ok(EscrowProtocol {
            validator: self.validator,
            network: self.network,
            script_hash,
            address,
            min_output: self.min_output,
        })
    }
}

/// Produces lock and unlock intents for outputs guarded by one validator.
#[derive(Debug, Clone)]
pub struct EscrowProtocol {
    validator: Arc<ValidatorDescriptor>,
    network: Network,
    script_hash: ScriptHash,
    address: Address,
    min_output: u64,
}

impl EscrowProtocol {
    pub fn validator(&self) -> &Arc<ValidatorDescriptor> {
        &self.validator
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn script_hash(&self) -> ScriptHash {
        self.script_hash
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn min_output(&self) -> u64 {
        self.min_output
    }

    /// Intent to place `amount` at the validator address under a datum naming `owner`.
    pub fn lock(&self, amount: u64, owner: Credential) -> Result<LockIntent, EscrowError> {
        if amount == 0 || amount < self.min_output {
            return Err(EscrowError::InsufficientValue {
                amount,
                minimum: self.min_output,
            });
        }
        let datum = owner_datum(&owner);
        let datum_cbor = datum.encode()?;
        debug!(%owner, amount, address = %self.address, "lock intent");

        Ok(LockIntent {
            address: self.address,
            value: amount,
            datum,
            datum_cbor,
        })
    }

    /// Intent to spend `utxo` with `redeemer`, signed by `signer`.
    ///
    /// No authorization is checked here: whether `signer` may spend is for
    /// the ledger's script evaluation to decide.
    pub fn unlock(
        &self,
        utxo: &Utxo,
        redeemer: PlutusData,
        signer: Credential,
    ) -> Result<UnlockIntent, EscrowError> {
        if !self.is_escrow_output(utxo) {
            return Err(EscrowError::StaleReference(utxo.out_ref));
        }
        let redeemer_cbor = redeemer.encode()?;
        debug!(out_ref = %utxo.out_ref, %signer, "unlock intent");

        Ok(UnlockIntent {
            input: utxo.clone(),
            redeemer,
            redeemer_cbor,
            required_signer: signer,
            script: Arc::clone(&self.validator),
        })
    }

    /// Output sits at this validator's address and carries an inline datum.
    pub fn is_escrow_output(&self, utxo: &Utxo) -> bool {
        utxo.output.address == self.address && utxo.output.datum.is_some()
    }
}

/// Lifecycle of one escrowed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EscrowState {
    /// Funds not yet placed in escrow.
    Unlocked,
    Locked {
        out_ref: OutputRef,
        owner: Credential,
    },
    Consumed {
        out_ref: OutputRef,
        by: TransactionId,
    },
}

impl EscrowState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unlocked => "unlocked",
            Self::Locked { .. } => "locked",
            Self::Consumed { .. } => "consumed",
        }
    }

    pub fn lock_confirmed(
        self,
        out_ref: OutputRef,
        owner: Credential,
    ) -> Result<Self, EscrowError> {
        match self {
            Self::Unlocked => Ok(Self::Locked { out_ref, owner }),
            other => Err(EscrowError::InvalidTransition {
                from: other.name(),
                event: "lock confirmed",
            }),
        }
    }

    pub fn unlock_confirmed(self, by: TransactionId) -> Result<Self, EscrowError> {
        match self {
            Self::Locked { out_ref, .. } => Ok(Self::Consumed { out_ref, by }),
            Self::Consumed { out_ref, .. } => Err(EscrowError::StaleReference(out_ref)),
            Self::Unlocked => Err(EscrowError::InvalidTransition {
                from: "unlocked",
                event: "unlock confirmed",
            }),
        }
    }

    pub fn out_ref(&self) -> Option<OutputRef> {
        match self {
            Self::Unlocked => None,
            Self::Locked { out_ref, .. } | Self::Consumed { out_ref, .. } => Some(*out_ref),
        }
    }
}
