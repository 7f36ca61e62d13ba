use std::sync::Arc;

use minicbor::Encoder;

use plutus_escrow_sdk::helpers::{blake2b_224, blake2b_256};
use plutus_escrow_sdk::{
    Address, CodecError, Credential, EscrowError, LockIntent, OutputRef, TransactionId, TxOutput,
    UnlockIntent, Utxo, ValidatorDescriptor,
};

/// Flat fee charged by every transaction the lab builds.
pub const DEFAULT_FEE: u64 = 200_000;

/// Redeemer for the script input at `input_index`, kept in its encoded form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemerEntry {
    pub input_index: u32,
    pub data_cbor: Vec<u8>,
}

/// Everything a transaction commits to.
#[derive(Debug, Clone, Default)]
pub struct TransactionBody {
    pub inputs: Vec<OutputRef>,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,
    pub required_signers: Vec<Credential>,
    pub scripts: Vec<Arc<ValidatorDescriptor>>,
    pub redeemers: Vec<RedeemerEntry>,
}

impl TransactionBody {
    /// Canonical encoding; its blake2b-256 is the transaction id.
    ///
    /// ```text
    /// [ [[txid, index]..], [[address, value, datum?]..], fee,
    ///   [signer..], [[language, code]..], [[index, redeemer]..] ]
    /// ```
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut enc = Encoder::new(Vec::new());
        enc.array(6)?;

        enc.array(self.inputs.len() as u64)?;
        for input in &self.inputs {
            enc.array(2)?
                .bytes(input.transaction_id.as_bytes())?
                .u32(input.index)?;
        }

        enc.array(self.outputs.len() as u64)?;
        for output in &self.outputs {
            match &output.datum {
                Some(datum) => {
                    enc.array(3)?
                        .bytes(&output.address.to_bytes())?
                        .u64(output.value)?;
                    enc.writer_mut().extend_from_slice(&datum.encode()?);
                }
                None => {
                    enc.array(2)?
                        .bytes(&output.address.to_bytes())?
                        .u64(output.value)?;
                }
            }
        }

        enc.u64(self.fee)?;

        enc.array(self.required_signers.len() as u64)?;
        for signer in &self.required_signers {
            enc.bytes(signer.as_bytes())?;
        }

        enc.array(self.scripts.len() as u64)?;
        for script in &self.scripts {
            enc.array(2)?
                .u8(script.kind.language_tag())?
                .bytes(&script.code)?;
        }

        enc.array(self.redeemers.len() as u64)?;
        for redeemer in &self.redeemers {
            enc.array(2)?.u32(redeemer.input_index)?;
            enc.writer_mut().extend_from_slice(&redeemer.data_cbor);
        }

        Ok(enc.into_writer())
    }
}

/// A transaction body sealed with its id.
#[derive(Debug, Clone)]
pub struct Transaction {
    body: TransactionBody,
    id: TransactionId,
}

impl Transaction {
    pub fn new(body: TransactionBody) -> Result<Self, CodecError> {
        let id = TransactionId::from_bytes(blake2b_256(&body.to_bytes()?));
        Ok(Self { body, id })
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn body(&self) -> &TransactionBody {
        &self.body
    }

    pub fn output_ref(&self, index: u32) -> OutputRef {
        OutputRef::new(self.id, index)
    }
}

/// Signature by one verification key over the transaction id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VKeyWitness {
    /// 32-byte x-only public key.
    pub vkey: [u8; 32],
    pub signature: [u8; 64],
}

impl VKeyWitness {
    pub fn credential(&self) -> Credential {
        Credential::from_bytes(blake2b_224(&self.vkey))
    }
}

#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub witnesses: Vec<VKeyWitness>,
}

impl SignedTransaction {
    pub fn unsigned(tx: Transaction) -> Self {
        Self {
            tx,
            witnesses: Vec::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.tx.id()
    }

    pub fn with_witness(mut self, witness: VKeyWitness) -> Self {
        self.witnesses.retain(|w| w.vkey != witness.vkey);
        self.witnesses.push(witness);
        self
    }

    /// Credentials of the keys that claim to have signed; the ledger verifies.
    pub fn signatories(&self) -> Vec<Credential> {
        self.witnesses.iter().map(VKeyWitness::credential).collect()
    }
}

/// Largest-first selection of `funding` covering `target`. Change must be
/// zero or at least `min_change`. Returns the selected outputs and the change.
pub fn select_inputs(
    funding: &[Utxo],
    target: u64,
    min_change: u64,
) -> Result<(Vec<Utxo>, u64), EscrowError> {
    let mut candidates: Vec<&Utxo> = funding.iter().collect();
    candidates.sort_by(|a, b| b.output.value.cmp(&a.output.value));

    let mut selected = Vec::new();
    let mut total: u64 = 0;
    for utxo in candidates {
        if total >= target {
            let change = total - target;
            if change == 0 || change >= min_change {
                return Ok((selected, change));
            }
        }
        total = total
            .checked_add(utxo.output.value)
            .ok_or_else(|| EscrowError::InvalidConfig("funding total overflows u64".into()))?;
        selected.push(utxo.clone());
    }

    if total >= target {
        let change = total - target;
        if change == 0 || change >= min_change {
            return Ok((selected, change));
        }
    }
    let needed = if total > target {
        target.saturating_add(min_change)
    } else {
        target
    };
    Err(EscrowError::InsufficientFunds {
        needed,
        available: total,
    })
}

/// Build a locking transaction: owner's outputs -> escrow output at index 0,
/// change back to `change_address`.
pub fn build_lock_tx(
    intent: &LockIntent,
    funding: &[Utxo],
    change_address: Address,
    fee: u64,
    min_output: u64,
) -> Result<Transaction, EscrowError> {
    let target = intent
        .value
        .checked_add(fee)
        .ok_or_else(|| EscrowError::InvalidConfig("lock amount plus fee overflows u64".into()))?;
    let (selected, change) = select_inputs(funding, target, min_output)?;

    let mut outputs = vec![TxOutput {
        address: intent.address,
        value: intent.value,
        datum: Some(intent.datum.clone()),
    }];
    if change > 0 {
        outputs.push(TxOutput {
            address: change_address,
            value: change,
            datum: None,
        });
    }

    Ok(Transaction::new(TransactionBody {
        inputs: selected.iter().map(|u| u.out_ref).collect(),
        outputs,
        fee,
        ..Default::default()
    })?)
}

/// Build an unlocking transaction: escrow output (input 0) plus the signer's
/// outputs covering the fee -> `payout`.
pub fn build_unlock_tx(
    intent: &UnlockIntent,
    funding: &[Utxo],
    payout: Address,
    fee: u64,
) -> Result<Transaction, EscrowError> {
    let fee_inputs: Vec<Utxo> = funding
        .iter()
        .filter(|u| u.out_ref != intent.input.out_ref)
        .cloned()
        .collect();
    let (selected, change) = select_inputs(&fee_inputs, fee, 0)?;

    // Selected fee inputs sum to fee + change.
    let value = intent
        .input
        .output
        .value
        .checked_add(change)
        .ok_or_else(|| EscrowError::InvalidConfig("unlock value overflows u64".into()))?;

    let mut inputs = Vec::with_capacity(1 + selected.len());
    inputs.push(intent.input.out_ref);
    inputs.extend(selected.iter().map(|u| u.out_ref));

    Ok(Transaction::new(TransactionBody {
        inputs,
        outputs: vec![TxOutput {
            address: payout,
            value,
            datum: None,
        }],
        fee,
        required_signers: vec![intent.required_signer],
        scripts: vec![Arc::clone(&intent.script)],
        redeemers: vec![RedeemerEntry {
            input_index: 0,
            data_cbor: intent.redeemer_cbor.clone(),
        }],
    })?)
}
