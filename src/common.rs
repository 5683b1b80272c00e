//!
//! Code shared throught the project.
//!

use std::fmt;
use std::str::FromStr;
// ---
use thiserror::Error as ThisError;
use zeroize::{Zeroize, ZeroizeOnDrop};
// ---
use crate::config::{HASH_SIZE, PREIMAGE_SIZE, PUBLIC_KEY_SIZE, SECRET_SIZE};
use crate::machine::ScriptError;

//
// Usefull type aliases
//
/// Output of the 160-bit hash (tree nodes, leaf commitments, envelopes).
pub type Hash160 = [u8; HASH_SIZE];
/// The revealed leaf secret (truncated 160-bit hash of the derived child secret).
pub type Preimage = [u8; PREIMAGE_SIZE];
/// The aggregated root commitment of all digit trees.
pub type PublicKey = [u8; PUBLIC_KEY_SIZE];
/// Child index used with the hardened HD derivation.
pub type DerivationIndex = u32;

pub type Result<T> = std::result::Result<T, Error>;

// ***
// The general error type we're using throught this program.
// ***

/// General error type used in this library.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    /// The secret, digest, key or signature does not have the required length or encoding.
    #[error("format error: {0}")]
    Format(String),
    /// A tree does not have the shape it must have by construction.
    ///
    /// This is a defect and not a bad input; retrying yields the same error.
    #[error("structural invariant violated: {0}")]
    StructuralInvariant(String),
    /// The input is well-formed but cannot be used for the requested operation.
    #[error("precondition failed: {0}")]
    Precondition(String),
    /// The HD derivation collaborator failed.
    #[error("key derivation failed: {0}")]
    Derivation(String),
    /// The configuration file could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The verifier program rejected the witness on the dry-run machine.
    #[error("verifier program failed: {0}")]
    Script(#[from] ScriptError),
}

///
/// Decodes the hexadecimal string into exactly `N` bytes.
///
/// # Arguments
/// * `what` - Name of the decoded value used in the error message.
/// * `input` - The hex string (surrounding whitespace is ignored).
///
pub fn decode_hex_array<const N: usize>(what: &str, input: &str) -> Result<[u8; N]> {
    let bytes = decode_hex(what, input)?;
    bytes.as_slice().try_into().map_err(|_| {
        Error::Format(format!(
            "{what} must be {N} bytes ({} hex characters), got {} bytes",
            2 * N,
            bytes.len()
        ))
    })
}

/// Decodes an arbitrary-length hexadecimal string.
pub fn decode_hex(what: &str, input: &str) -> Result<Vec<u8>> {
    hex::decode(input.trim()).map_err(|e| Error::Format(format!("{what} is not valid hex: {e}")))
}

///
/// The 32-byte root of trust that all key material is derived from.
///
/// The bytes are wiped from memory once the value is dropped.
///
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret([u8; SECRET_SIZE]);

impl MasterSecret {
    pub fn new(bytes: [u8; SECRET_SIZE]) -> Self {
        MasterSecret(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_SIZE] {
        &self.0
    }
}

impl FromStr for MasterSecret {
    type Err = Error;

    /// Parses exactly 64 hexadecimal characters.
    fn from_str(s: &str) -> Result<Self> {
        decode_hex_array::<SECRET_SIZE>("secret", s).map(MasterSecret)
    }
}

/// Never print the secret itself.
impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterSecret(..)")
    }
}
