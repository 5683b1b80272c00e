//!
//! Module defining the general interfaces.
//!

use crate::common::{DerivationIndex, MasterSecret, Result};
use crate::config::SECRET_SIZE;

///
/// An interface for the hierarchical deterministic derivation of child secrets.
///
/// The key generator only ever needs hardened children; a child secret must not be
/// computable from anything but the parent secret.
///
pub trait KeyDerivationTrait: Sized {
    /// Constructs the root node from the master secret (used as the HD seed).
    fn from_master(secret: &MasterSecret) -> Result<Self>;
    /// Derives the hardened child with the given index.
    fn derive_hardened(&self, index: DerivationIndex) -> Result<Self>;
    /// The raw secret scalar of this node.
    fn secret_bytes(&self) -> [u8; SECRET_SIZE];
    /// The encoded extended private key (e.g. base58 `xprv...`).
    fn to_extended_string(&self) -> String;
}

///
/// An interface for a hash-based one-time signature scheme that can generate key pairs,
/// sign a digest and also verify the signature of the provided digest.
///
/// Every key pair must sign at most one digest. Each signature reveals secret
/// material that would allow forging signatures of other digests.
///
pub trait SignatureSchemeTrait {
    type SecretKey;
    type PublicKey;
    type Signature;

    ///
    /// Deterministically derives the key pair from the master secret.
    ///
    fn gen_key_pair(&self, secret: &MasterSecret)
        -> Result<KeyPair<Self::SecretKey, Self::PublicKey>>;
    fn sign(&self, digest: &[u8], secret_key: &Self::SecretKey) -> Result<Self::Signature>;
    fn verify(&self, digest: &[u8], signature: &Self::Signature, pub_key: &Self::PublicKey)
        -> bool;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPair<GSecretKey, GPublicKey> {
    pub secret: GSecretKey,
    pub public: GPublicKey,
}

impl<GSecretKey, GPublicKey> KeyPair<GSecretKey, GPublicKey> {
    pub fn new(secret: GSecretKey, public: GPublicKey) -> Self {
        KeyPair { secret, public }
    }
}
