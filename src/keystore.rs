use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use plutus_escrow_sdk::{Credential, EscrowError, credential_of, generate_keypair, schnorr_sign};
use secp256k1::{Keypair, SecretKey};
use tracing::debug;

use crate::ledger::KeyStore;
use crate::tx::{SignedTransaction, VKeyWitness};

/// Keys held in process memory, indexed by the credential they sign for.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: HashMap<Credential, Keypair>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate and keep a fresh key.
    pub fn generate(&mut self) -> Credential {
        let (kp, credential) = generate_keypair();
        self.keys.insert(credential, kp);
        credential
    }

    pub fn insert(&mut self, keypair: Keypair) -> Credential {
        let credential = credential_of(&keypair.x_only_public_key().0);
        self.keys.insert(credential, keypair);
        credential
    }

    /// Import a 32-byte secret key given as hex.
    pub fn import_secret_hex(&mut self, secret: &str) -> Result<Credential, EscrowError> {
        let bytes = hex::decode(secret.trim())
            .map_err(|e| EscrowError::Signing(format!("secret key is not hex: {e}")))?;
        let sk = SecretKey::from_slice(&bytes)
            .map_err(|e| EscrowError::Signing(format!("invalid secret key: {e}")))?;
        Ok(self.insert(Keypair::from_secret_key(secp256k1::SECP256K1, &sk)))
    }

    /// Import the hex secret key stored in `path`.
    pub async fn load_secret_file(&mut self, path: &Path) -> Result<Credential, EscrowError> {
        let secret = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| EscrowError::Signing(format!("reading {}: {e}", path.display())))?;
        let credential = self.import_secret_hex(&secret)?;
        debug!(%credential, path = %path.display(), "imported key");
        Ok(credential)
    }

    pub fn contains(&self, credential: &Credential) -> bool {
        self.keys.contains_key(credential)
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn sign(
        &self,
        tx: SignedTransaction,
        credential: &Credential,
    ) -> Result<SignedTransaction, EscrowError> {
        let kp = self
            .keys
            .get(credential)
            .ok_or_else(|| EscrowError::Signing(format!("no key for credential {credential}")))?;
        let witness = VKeyWitness {
            vkey: kp.x_only_public_key().0.serialize(),
            signature: schnorr_sign(&tx.id(), kp),
        };
        debug!(tx_id = %tx.id(), %credential, "signed");
        Ok(tx.with_witness(witness))
    }
}
