//! Hello-world escrow, step by step, on the in-process ledger.
//!
//! 1. Owner locks 5 ADA under the bundled validator
//! 2. A stranger tries to spend it and is refused by the ledger
//! 3. The owner spends it with the "Hello, World!" redeemer
//! 4. A second unlock of the same output is refused without a submission
//!
//! Usage:
//!   cargo run --example hello_world_escrow
//!
//! Set `RUST_LOG=debug` to follow the ledger as well.

use std::sync::Arc;

use plutus_escrow_lab::harness::hello_redeemer;
use plutus_escrow_lab::sdk::{
    Address, EscrowError, Network, OwnerSignatureOracle, ValidatorDescriptor, data,
};
use plutus_escrow_lab::{
    ClientSettings, EmulatorConfig, EmulatorLedger, EscrowClient, MemoryKeyStore, logging,
};

const BLUEPRINT: &[u8] = include_bytes!("../fixtures/hello_world.plutus.json");
const LOCK_AMOUNT: u64 = 5_000_000;
const WALLET_FUNDS: u64 = 100_000_000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    println!("=== Hello-world escrow ===\n");

    let validator = Arc::new(ValidatorDescriptor::load(BLUEPRINT)?);
    let ledger = Arc::new(EmulatorLedger::new(
        EmulatorConfig::default(),
        Arc::new(OwnerSignatureOracle),
    ));

    let mut keys = MemoryKeyStore::new();
    let owner = keys.generate();
    let stranger = keys.generate();
    for (name, who) in [("owner", owner), ("stranger", stranger)] {
        let wallet = Address::from_credential(Network::Preview, who);
        ledger.fund(wallet, WALLET_FUNDS).await;
        println!("  {name:<8} {wallet}");
    }

    let client = EscrowClient::connect(
        validator,
        Arc::clone(&ledger),
        Arc::new(keys),
        ClientSettings::default(),
    )?;
    println!("  script   {}", client.protocol().address());
    println!("  hash     {}\n", client.protocol().script_hash());

    println!("[1] Locking {LOCK_AMOUNT} lovelace for the owner...");
    let out_ref = client.lock(LOCK_AMOUNT, owner).await?;
    println!("  Locked at {out_ref}");
    println!("  State: {:?}\n", client.state(out_ref).await?);

    let redeemer = hello_redeemer();
    println!("[2] Stranger unlocks with redeemer {}...", data::to_hex(&redeemer)?);
    match client.unlock(out_ref, redeemer.clone(), stranger).await {
        Err(EscrowError::SubmissionRejected(reason)) => println!("  Refused: {reason}\n"),
        Err(e) => return Err(e.into()),
        Ok(tx_id) => return Err(format!("stranger unlocked the funds in {tx_id}").into()),
    }

    println!("[3] Owner unlocks...");
    let tx_id = client.unlock(out_ref, redeemer.clone(), owner).await?;
    println!("  Unlocked by {tx_id}");
    println!("  State: {:?}\n", client.state(out_ref).await?);

    println!("[4] Owner unlocks again...");
    match client.unlock(out_ref, redeemer, owner).await {
        Err(EscrowError::StaleReference(r)) => println!("  Refused: {r} already consumed\n"),
        other => return Err(format!("expected a stale reference, got {other:?}").into()),
    }

    let wallet = Address::from_credential(Network::Preview, owner);
    println!("Owner balance: {} lovelace", ledger.balance(&wallet).await);
    println!("=== Done ===");
    Ok(())
}
