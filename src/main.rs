//! escrow-lab: lock funds under the bundled validator, try to take them as a
//! stranger, then take them back as the owner. Prints the report as JSON and
//! exits non-zero if any scenario failed.
//!
//! ```bash
//! cargo run --bin escrow-lab                 # defaults
//! cargo run --bin escrow-lab -- lab.toml     # or ESCROW_LAB_CONFIG=lab.toml
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use plutus_escrow_lab::artifact::FsArtifactLoader;
use plutus_escrow_lab::config::CONFIG_ENV;
use plutus_escrow_lab::sdk::{Address, Credential, OwnerSignatureOracle, ValidatorDescriptor};
use plutus_escrow_lab::{
    ArtifactLoader, EmulatorLedger, EscrowClient, LabConfig, MemoryKeyStore, Parties, Party,
    harness, logging,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let config = match std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
    {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            LabConfig::load(&path)?
        }
        None => LabConfig::default(),
    };

    let artifact = FsArtifactLoader.load(&config.validator).await?;
    let validator = match &config.validator_title {
        Some(title) => ValidatorDescriptor::load_titled(&artifact, title)?,
        None => ValidatorDescriptor::load(&artifact)?,
    };
    info!(title = %validator.title, kind = ?validator.kind, "validator loaded");

    let mut keys = MemoryKeyStore::new();
    let owner = party_key(&mut keys, config.owner_key.as_deref()).await?;
    let other = party_key(&mut keys, config.other_key.as_deref()).await?;

    let ledger = Arc::new(EmulatorLedger::new(
        config.emulator_config(),
        Arc::new(OwnerSignatureOracle),
    ));
    for credential in [owner, other] {
        let wallet = Address::from_credential(config.network, credential);
        ledger.fund(wallet, config.initial_funds).await;
        info!(%wallet, lovelace = config.initial_funds, "wallet funded");
    }

    let client = EscrowClient::connect(
        Arc::new(validator),
        ledger,
        Arc::new(keys),
        config.client_settings(),
    )?;
    let parties = Parties {
        owner: Party::new("owner", owner),
        stranger: Party::new("other", other),
    };

    let report = harness::run(&client, &parties, config.lock_amount).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.all_passed())
}

async fn party_key(
    keys: &mut MemoryKeyStore,
    path: Option<&Path>,
) -> Result<Credential, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => keys.load_secret_file(path).await?,
        None => keys.generate(),
    })
}
