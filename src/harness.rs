//! The three escrow scenarios, run against any ledger.
//!
//! A: the owner locks funds. B: a stranger tries to unlock them and must be
//! refused by the ledger. C: the owner unlocks them. Each scenario re-reads
//! the ledger rather than trusting the previous step, and reports failure
//! instead of panicking.

use plutus_escrow_sdk::{
    Address, Credential, EscrowError, EscrowState, OutputRef, PlutusData, ScriptHash,
    TransactionId, owner_datum,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::client::EscrowClient;
use crate::ledger::{KeyStore, LedgerClient};

pub const SCENARIO_LOCK: &str = "lock_funds";
pub const SCENARIO_STRANGER: &str = "unlock_as_stranger";
pub const SCENARIO_OWNER: &str = "unlock_as_owner";

#[derive(Debug, Clone, Serialize)]
pub struct Party {
    pub name: String,
    pub credential: Credential,
}

impl Party {
    pub fn new(name: impl Into<String>, credential: Credential) -> Self {
        Self {
            name: name.into(),
            credential,
        }
    }
}

/// The owner who locks and unlocks, and the stranger who tries to take.
#[derive(Debug, Clone)]
pub struct Parties {
    pub owner: Party,
    pub stranger: Party,
}

/// What scenario A leaves behind for B and C.
#[derive(Debug, Clone, Serialize)]
pub struct LockReceipt {
    pub out_ref: OutputRef,
    pub owner: Credential,
    pub amount: u64,
    pub datum_cbor: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<TransactionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<EscrowState>,
}

impl ScenarioReport {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            detail: detail.into(),
            tx_id: None,
            state: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        warn!(scenario = name, %detail, "scenario failed");
        Self {
            name,
            passed: false,
            detail,
            tx_id: None,
            state: None,
        }
    }

    fn with_tx(mut self, tx_id: TransactionId) -> Self {
        self.tx_id = Some(tx_id);
        self
    }

    fn with_state(mut self, state: EscrowState) -> Self {
        self.state = Some(state);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HarnessReport {
    pub validator_address: Address,
    pub script_hash: ScriptHash,
    pub amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<LockReceipt>,
    pub scenarios: Vec<ScenarioReport>,
}

impl HarnessReport {
    pub fn all_passed(&self) -> bool {
        !self.scenarios.is_empty() && self.scenarios.iter().all(|s| s.passed)
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.name == name)
    }
}

/// `Constr(0, ["Hello, World!"])`.
pub fn hello_redeemer() -> PlutusData {
    PlutusData::constr(0, vec![PlutusData::bytes_from_utf8("Hello, World!")])
}

/// Scenario A: `owner` locks `amount` and the ledger shows exactly that
/// output at the validator address, with a datum naming `owner`.
pub async fn lock_funds<L: LedgerClient, K: KeyStore>(
    client: &EscrowClient<L, K>,
    owner: &Party,
    amount: u64,
) -> Result<LockReceipt, EscrowError> {
    let out_ref = client.lock(amount, owner.credential).await?;

    let utxo = client
        .ledger()
        .find_unspent_output(&out_ref)
        .await?
        .ok_or(EscrowError::StaleReference(out_ref))?;
    let expected = owner_datum(&owner.credential);
    if utxo.output.address != *client.protocol().address()
        || utxo.output.value != amount
        || utxo.output.datum.as_ref() != Some(&expected)
    {
        return Err(EscrowError::Ledger(format!(
            "locked output {out_ref} does not match the lock intent"
        )));
    }

    info!(party = %owner.name, %out_ref, amount, "scenario A: funds locked");
    Ok(LockReceipt {
        out_ref,
        owner: owner.credential,
        amount,
        datum_cbor: expected.to_hex()?,
    })
}

/// Scenario B: `stranger` tries to spend the locked output. Passes when the
/// ledger rejects the attempt and the output is still there.
pub async fn unlock_as_stranger<L: LedgerClient, K: KeyStore>(
    client: &EscrowClient<L, K>,
    receipt: &LockReceipt,
    stranger: &Party,
    redeemer: PlutusData,
) -> ScenarioReport {
    if let Err(e) = require_unspent(client, receipt.out_ref).await {
        return ScenarioReport::fail(SCENARIO_STRANGER, e);
    }

    match client
        .unlock(receipt.out_ref, redeemer, stranger.credential)
        .await
    {
        Err(EscrowError::SubmissionRejected(reason)) => {
            if let Err(e) = require_unspent(client, receipt.out_ref).await {
                return ScenarioReport::fail(SCENARIO_STRANGER, e);
            }
            info!(party = %stranger.name, %reason, "scenario B: stranger refused");
            let report = ScenarioReport::pass(SCENARIO_STRANGER, reason);
            match client.state(receipt.out_ref).await {
                Ok(state) => report.with_state(state),
                Err(_) => report,
            }
        }
        Err(e) => ScenarioReport::fail(SCENARIO_STRANGER, format!("unexpected error: {e}")),
        Ok(tx_id) => ScenarioReport::fail(
            SCENARIO_STRANGER,
            format!("{} unlocked funds locked for another party", stranger.name),
        )
        .with_tx(tx_id),
    }
}

/// Scenario C: `owner` spends the locked output. Passes when the ledger
/// accepts it and the output is gone.
pub async fn unlock_as_owner<L: LedgerClient, K: KeyStore>(
    client: &EscrowClient<L, K>,
    receipt: &LockReceipt,
    owner: &Party,
    redeemer: PlutusData,
) -> ScenarioReport {
    if let Err(e) = require_unspent(client, receipt.out_ref).await {
        return ScenarioReport::fail(SCENARIO_OWNER, e);
    }

    let tx_id = match client
        .unlock(receipt.out_ref, redeemer, owner.credential)
        .await
    {
        Ok(tx_id) => tx_id,
        Err(e) => return ScenarioReport::fail(SCENARIO_OWNER, format!("unlock failed: {e}")),
    };

    match client.ledger().find_unspent_output(&receipt.out_ref).await {
        Ok(None) => {
            info!(party = %owner.name, %tx_id, "scenario C: owner unlocked");
            let report = ScenarioReport::pass(SCENARIO_OWNER, "output consumed").with_tx(tx_id);
            match client.state(receipt.out_ref).await {
                Ok(state) => report.with_state(state),
                Err(_) => report,
            }
        }
        Ok(Some(_)) => ScenarioReport::fail(
            SCENARIO_OWNER,
            format!("{} still unspent after unlock", receipt.out_ref),
        )
        .with_tx(tx_id),
        Err(e) => ScenarioReport::fail(SCENARIO_OWNER, format!("ledger query failed: {e}"))
            .with_tx(tx_id),
    }
}

async fn require_unspent<L: LedgerClient, K: KeyStore>(
    client: &EscrowClient<L, K>,
    out_ref: OutputRef,
) -> Result<(), String> {
    match client.ledger().find_unspent_output(&out_ref).await {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(format!("{out_ref} is not unspent")),
        Err(e) => Err(format!("ledger query failed: {e}")),
    }
}

/// Run A, then B and C against A's output.
pub async fn run<L: LedgerClient, K: KeyStore>(
    client: &EscrowClient<L, K>,
    parties: &Parties,
    amount: u64,
) -> HarnessReport {
    let mut report = HarnessReport {
        validator_address: *client.protocol().address(),
        script_hash: client.protocol().script_hash(),
        amount,
        receipt: None,
        scenarios: Vec::with_capacity(3),
    };

    let receipt = match lock_funds(client, &parties.owner, amount).await {
        Ok(receipt) => {
            let passed =
                ScenarioReport::pass(SCENARIO_LOCK, format!("locked at {}", receipt.out_ref));
            report.scenarios.push(match client.state(receipt.out_ref).await {
                Ok(state) => passed.with_state(state),
                Err(_) => passed,
            });
            receipt
        }
        Err(e) => {
            report.scenarios.push(ScenarioReport::fail(SCENARIO_LOCK, e.to_string()));
            for name in [SCENARIO_STRANGER, SCENARIO_OWNER] {
                report
                    .scenarios
                    .push(ScenarioReport::fail(name, "skipped: nothing was locked"));
            }
            return report;
        }
    };

    let redeemer = hello_redeemer();
    report.scenarios.push(
        unlock_as_stranger(client, &receipt, &parties.stranger, redeemer.clone()).await,
    );
    report
        .scenarios
        .push(unlock_as_owner(client, &receipt, &parties.owner, redeemer).await);
    report.receipt = Some(receipt);
    report
}
