//! Plutus Escrow SDK
//!
//! The pure core of a script-guarded escrow on a UTXO ledger:
//! - [`data`]: Plutus data values and their byte-exact CBOR encoding
//! - [`validator`]: blueprint loading, script hashing, address derivation
//! - [`escrow`]: lock/unlock intents and the escrow state machine
//! - [`oracle`]: the script-evaluation seam the ledger consults

pub mod data;
pub mod error;
pub mod escrow;
pub mod helpers;
pub mod oracle;
pub mod types;
pub mod validator;

pub use data::{Constr, PlutusData};
pub use error::{CodecError, EscrowError, ParseError};
pub use escrow::{
    EscrowBuilder, EscrowProtocol, EscrowState, LockIntent, UnlockIntent, owner_datum, owner_of,
};
pub use helpers::{credential_of, generate_keypair, schnorr_sign, schnorr_verify};
pub use oracle::{AuthorizationOracle, OwnerSignatureOracle, ScriptContext};
pub use types::{
    Address, Credential, Network, OutputRef, ScriptHash, TransactionId, TxOutput, Utxo,
};
pub use validator::{Blake2bHasher, ScriptHasher, ScriptVersion, ValidatorDescriptor};
