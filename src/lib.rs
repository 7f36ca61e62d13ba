//! Plutus Escrow Lab
//!
//! Drives the escrow protocol from `plutus-escrow-sdk` end to end: builds
//! and signs lock/unlock transactions, submits them to a ledger and checks
//! that only the owner named in the datum can take the funds back.
//!
//! The ledger, key store and artifact source are traits ([`ledger`]); the
//! lab ships an in-process [`emulator::EmulatorLedger`], a
//! [`keystore::MemoryKeyStore`] and a [`artifact::FsArtifactLoader`].
//!
//! ## Running
//! ```bash
//! cargo run --bin escrow-lab [config.toml]
//! ```

pub mod artifact;
pub mod client;
pub mod config;
pub mod emulator;
pub mod harness;
pub mod keystore;
pub mod ledger;
pub mod logging;
pub mod tx;

pub use plutus_escrow_sdk as sdk;

pub use client::{ClientSettings, EscrowClient};
pub use config::{ConfigError, LabConfig};
pub use emulator::{EmulatorConfig, EmulatorLedger};
pub use harness::{HarnessReport, LockReceipt, Parties, Party, ScenarioReport};
pub use keystore::MemoryKeyStore;
pub use ledger::{ArtifactLoader, Confirmation, KeyStore, LedgerClient, TxStatus};
pub use tx::{SignedTransaction, Transaction, TransactionBody};
