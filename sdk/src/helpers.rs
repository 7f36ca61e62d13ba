use blake2::digest::consts::{U28, U32};
use blake2::{Blake2b, Digest};
use rand::thread_rng;
use secp256k1::{Keypair, Message, XOnlyPublicKey, schnorr};

use crate::types::{Credential, TransactionId};

type Blake2b224 = Blake2b<U28>;
type Blake2b256 = Blake2b<U32>;

pub fn blake2b_224(data: &[u8]) -> [u8; 28] {
    Blake2b224::digest(data).into()
}

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    Blake2b256::digest(data).into()
}

/// Generate a new Schnorr keypair. Returns the keypair and the credential
/// that names it on the ledger.
pub fn generate_keypair() -> (Keypair, Credential) {
    let kp = Keypair::new(secp256k1::SECP256K1, &mut thread_rng());
    let credential = credential_of(&kp.x_only_public_key().0);
    (kp, credential)
}

/// Credential of a verification key: blake2b-224 of the 32-byte x-only key.
pub fn credential_of(pubkey: &XOnlyPublicKey) -> Credential {
    Credential::from_bytes(blake2b_224(&pubkey.serialize()))
}

/// Sign a transaction id. Returns the 64-byte Schnorr signature.
pub fn schnorr_sign(tx_id: &TransactionId, keypair: &Keypair) -> [u8; 64] {
    let msg = Message::from_digest(*tx_id.as_bytes());
    keypair.sign_schnorr(msg).serialize()
}

pub fn schnorr_verify(tx_id: &TransactionId, pubkey: &[u8; 32], signature: &[u8; 64]) -> bool {
    let (Ok(pk), Ok(sig)) = (
        XOnlyPublicKey::from_slice(pubkey),
        schnorr::Signature::from_slice(signature),
    ) else {
        return false;
    };
    let msg = Message::from_digest(*tx_id.as_bytes());
    secp256k1::SECP256K1.verify_schnorr(&sig, &msg, &pk).is_ok()
}
