//!
//! The hierarchical deterministic key derivation backing the key generator.
//!

use bip32::{ChildNumber, Prefix, XPrv};
// ---
use crate::common::{DerivationIndex, Error, MasterSecret, Result};
use crate::traits::KeyDerivationTrait;

///
/// A BIP-32 extended private key node.
///
/// Only hardened children are derived, so no derived tree can be linked to another
/// through the public part of a parent.
///
#[derive(Clone)]
pub struct Bip32Node {
    xprv: XPrv,
}

impl KeyDerivationTrait for Bip32Node {
    fn from_master(secret: &MasterSecret) -> Result<Self> {
        let xprv = XPrv::new(secret.as_bytes()).map_err(|e| Error::Derivation(e.to_string()))?;
        Ok(Bip32Node { xprv })
    }

    fn derive_hardened(&self, index: DerivationIndex) -> Result<Self> {
        let child_number = ChildNumber::new(index, true).map_err(|e| {
            Error::Derivation(format!("invalid hardened index {index}: {e}"))
        })?;
        let xprv = self
            .xprv
            .derive_child(child_number)
            .map_err(|e| Error::Derivation(e.to_string()))?;
        Ok(Bip32Node { xprv })
    }

    fn secret_bytes(&self) -> [u8; 32] {
        self.xprv.to_bytes()
    }

    fn to_extended_string(&self) -> String {
        self.xprv.to_string(Prefix::XPRV).to_string()
    }
}
