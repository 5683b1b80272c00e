//!
//! The hash primitives of the scheme.
//!
//! `hash160` is RIPEMD-160 over SHA-256 and `hash256` is double SHA-256, the same
//! primitives the target stack machine exposes as `OP_HASH160` and `OP_HASH256`.
//!

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
// ---
use crate::common::{Hash160, PublicKey};
use crate::config::{HASH_SIZE, PUBLIC_KEY_SIZE};

/// Computes `RIPEMD160(SHA256(data))`.
pub fn hash160(data: &[u8]) -> Hash160 {
    let mut out = [0u8; HASH_SIZE];
    out.copy_from_slice(&Ripemd160::digest(Sha256::digest(data)));
    out
}

/// Computes `SHA256(SHA256(data))`.
pub fn hash256(data: &[u8]) -> PublicKey {
    let mut out = [0u8; PUBLIC_KEY_SIZE];
    out.copy_from_slice(&Sha256::digest(Sha256::digest(data)));
    out
}

/// Hashes the concatenation of two byte strings with `hash160`.
pub fn hash160_cat(first: &[u8], second: &[u8]) -> Hash160 {
    let mut concat = Vec::with_capacity(first.len() + second.len());
    concat.extend_from_slice(first);
    concat.extend_from_slice(second);
    hash160(&concat)
}

///
/// Reduces a message of arbitrary length into the 20-byte digest that gets signed.
///
pub fn envelope(message: &[u8]) -> Hash160 {
    hash160(message)
}
