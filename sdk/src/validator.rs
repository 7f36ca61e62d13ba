//! Compiled validator scripts and the addresses they guard.

use serde::Deserialize;

use minicbor::data::Type;
use minicbor::{Decoder, Encoder};

use crate::error::{CodecError, EscrowError};
use crate::helpers::blake2b_224;
use crate::types::{Address, Network, ScriptHash};

/// Plutus language version of a compiled script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptVersion {
    PlutusV1,
    PlutusV2,
    PlutusV3,
}

impl ScriptVersion {
    /// Byte prepended to the script before hashing.
    pub fn language_tag(self) -> u8 {
        match self {
            Self::PlutusV1 => 1,
            Self::PlutusV2 => 2,
            Self::PlutusV3 => 3,
        }
    }

    fn from_blueprint(version: &str) -> Option<Self> {
        match version {
            "v1" => Some(Self::PlutusV1),
            "v2" => Some(Self::PlutusV2),
            "v3" => Some(Self::PlutusV3),
            _ => None,
        }
    }
}

/// One-way hash the ledger uses to name scripts.
pub trait ScriptHasher: Send + Sync {
    fn script_hash(&self, version: ScriptVersion, code: &[u8]) -> ScriptHash;
}

/// blake2b-224 over `language_tag || code`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake2bHasher;

impl ScriptHasher for Blake2bHasher {
    fn script_hash(&self, version: ScriptVersion, code: &[u8]) -> ScriptHash {
        let mut preimage = Vec::with_capacity(1 + code.len());
        preimage.push(version.language_tag());
        preimage.extend_from_slice(code);
        ScriptHash::from_bytes(blake2b_224(&preimage))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blueprint {
    preamble: Preamble,
    #[serde(default)]
    validators: Vec<BlueprintValidator>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Preamble {
    plutus_version: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlueprintValidator {
    title: String,
    compiled_code: Option<String>,
    hash: Option<String>,
}

/// A loaded, immutable validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorDescriptor {
    pub kind: ScriptVersion,
    /// The blueprint's `compiledCode`: a CBOR byte string wrapping the flat program.
    pub code: Vec<u8>,
    pub title: String,
    declared_hash: Option<ScriptHash>,
}

impl ValidatorDescriptor {
    /// Load the first validator of a blueprint artifact.
    pub fn load(artifact: &[u8]) -> Result<Self, EscrowError> {
        Self::select(artifact, None)
    }

    /// Load the validator named `title` from a blueprint artifact.
    pub fn load_titled(artifact: &[u8], title: &str) -> Result<Self, EscrowError> {
        Self::select(artifact, Some(title))
    }

    fn select(artifact: &[u8], title: Option<&str>) -> Result<Self, EscrowError> {
        let blueprint: Blueprint = serde_json::from_slice(artifact)
            .map_err(|e| EscrowError::Artifact(format!("malformed blueprint: {e}")))?;

        let kind = ScriptVersion::from_blueprint(&blueprint.preamble.plutus_version)
            .ok_or_else(|| {
                EscrowError::Artifact(format!(
                    "unsupported plutus version {}",
                    blueprint.preamble.plutus_version
                ))
            })?;

        let validator = match title {
            Some(title) => blueprint
                .validators
                .into_iter()
                .find(|v| v.title == title)
                .ok_or_else(|| EscrowError::Artifact(format!("no validator titled {title}")))?,
            None => blueprint
                .validators
                .into_iter()
                .next()
                .ok_or_else(|| EscrowError::Artifact("blueprint has no validators".into()))?,
        };

        let compiled = validator.compiled_code.ok_or_else(|| {
            EscrowError::Artifact(format!("validator {} has no compiledCode", validator.title))
        })?;
        let code = hex::decode(compiled.trim())
            .map_err(|e| EscrowError::Artifact(format!("compiledCode is not hex: {e}")))?;
        check_script_envelope(&code)?;

        let declared_hash = validator
            .hash
            .map(|h| {
                h.parse::<ScriptHash>()
                    .map_err(|e| EscrowError::Artifact(format!("declared hash: {e}")))
            })
            .transpose()?;

        Ok(Self {
            kind,
            code,
            title: validator.title,
            declared_hash,
        })
    }

    pub fn from_code(kind: ScriptVersion, code: Vec<u8>) -> Result<Self, EscrowError> {
        check_script_envelope(&code)?;
        Ok(Self {
            kind,
            code,
            title: String::new(),
            declared_hash: None,
        })
    }

    pub fn script_hash(&self, hasher: &dyn ScriptHasher) -> ScriptHash {
        hasher.script_hash(self.kind, &self.code)
    }

    /// Address of outputs guarded by this validator. Same code and network
    /// always give the same address.
    pub fn derive_address(&self, network: Network, hasher: &dyn ScriptHasher) -> Address {
        Address::from_script_hash(network, self.script_hash(hasher))
    }

    /// Check the hash the blueprint declared against the one the ledger computes.
    pub fn verify_hash(&self, hasher: &dyn ScriptHasher) -> Result<ScriptHash, EscrowError> {
        let actual = self.script_hash(hasher);
        match self.declared_hash {
            Some(declared) if declared != actual => Err(EscrowError::Artifact(format!(
                "blueprint declares hash {declared}, script hashes to {actual}"
            ))),
            _ => Ok(actual),
        }
    }

    /// The code wrapped in one more CBOR byte string, hex encoded; the form
    /// wallet tooling expects when attaching a script.
    pub fn double_cbor_hex(&self) -> Result<String, CodecError> {
        let mut enc = Encoder::new(Vec::new());
        enc.bytes(&self.code)?;
        Ok(hex::encode(enc.into_writer()))
    }
}

/// The compiled code must be exactly one non-empty CBOR byte string.
fn check_script_envelope(code: &[u8]) -> Result<(), EscrowError> {
    let mut dec = Decoder::new(code);
    if !matches!(dec.datatype(), Ok(Type::Bytes | Type::BytesIndef)) {
        return Err(EscrowError::Artifact(
            "compiledCode is not a CBOR byte string".into(),
        ));
    }
    let mut inner = Vec::new();
    let chunks = dec
        .bytes_iter()
        .map_err(|e| EscrowError::Artifact(format!("compiledCode: {e}")))?;
    for chunk in chunks {
        let chunk = chunk.map_err(|e| EscrowError::Artifact(format!("compiledCode: {e}")))?;
        inner.extend_from_slice(chunk);
    }
    if inner.is_empty() {
        return Err(EscrowError::Artifact("compiledCode is empty".into()));
    }
    if dec.position() < code.len() {
        return Err(EscrowError::Artifact(format!(
            "compiledCode has {} trailing bytes",
            code.len() - dec.position()
        )));
    }
    Ok(())
}
