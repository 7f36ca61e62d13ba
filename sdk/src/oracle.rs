//! The script-evaluation seam. The protocol never judges authorization
//! itself; a ledger consults an [`AuthorizationOracle`] for every script
//! input it validates.

use crate::data::PlutusData;
use crate::escrow::owner_of;
use crate::types::{Credential, OutputRef, TransactionId};
use crate::validator::ValidatorDescriptor;

/// What the script sees of the spending transaction.
#[derive(Debug, Clone)]
pub struct ScriptContext {
    pub tx_id: TransactionId,
    pub spending: OutputRef,
    /// Credentials whose signatures the transaction carries.
    pub signatories: Vec<Credential>,
}

pub trait AuthorizationOracle: Send + Sync {
    /// `Ok(())` accepts the spend; `Err` carries the evaluator's reason.
    fn evaluate(
        &self,
        script: &ValidatorDescriptor,
        datum: &PlutusData,
        redeemer: &PlutusData,
        ctx: &ScriptContext,
    ) -> Result<(), String>;
}

/// Accepts iff the transaction is signed by the credential named in the
/// datum. The redeemer is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerSignatureOracle;

impl AuthorizationOracle for OwnerSignatureOracle {
    fn evaluate(
        &self,
        _script: &ValidatorDescriptor,
        datum: &PlutusData,
        _redeemer: &PlutusData,
        ctx: &ScriptContext,
    ) -> Result<(), String> {
        let owner = owner_of(datum).ok_or_else(|| format!("datum {datum:?} names no owner"))?;
        if ctx.signatories.contains(&owner) {
            Ok(())
        } else {
            Err(format!("missing signature from owner {owner}"))
        }
    }
}
