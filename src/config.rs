//!
//! General static config file with the fixed scheme parameters and the tunable ones.
//!

use std::path::Path;
// ---
use log::debug;
use serde::{Deserialize, Serialize};
// ---
use crate::common::{DerivationIndex, Error, Result};

/// A directory where the logs are stored when file logging is enabled.
pub const LOGS_DIR: &str = "logs/";

// ***************************************
//         FIXED SCHEME PARAMETERS
// ***************************************
/// Size of the master secret (the HD seed).
pub const SECRET_SIZE: usize = 256 / 8;
/// Size of the 160-bit hashes in the digit trees.
pub const HASH_SIZE: usize = 160 / 8;
/// Width of the revealed leaf preimage (the 160-bit hash truncated).
pub const PREIMAGE_SIZE: usize = 16;
/// Size of the public key (the double SHA-256 aggregate of all tree roots).
pub const PUBLIC_KEY_SIZE: usize = 256 / 8;
/// Hardened index reserving the derivation subtree of the signature keys.
pub const NAMESPACE_INDEX: DerivationIndex = 69420;
/// The control byte can address at most this many leaves.
pub const MAX_LEAF_COUNT: usize = 256;

// ***************************************
//          TUNABLE PARAMETERS
// ***************************************
/// Number of digest bytes (digit trees) of the canonical scheme.
pub const DEFAULT_DIGITS: usize = 20;
/// Number of leaves in each digit tree of the canonical scheme.
pub const DEFAULT_LEAF_COUNT: usize = 256;

///
/// The parameters that the key generator, the signer and the script compiler must agree on.
///
/// The value is threaded explicitly through all of them; no process-wide state is used.
///
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SchemeParams {
    /// Number of digit trees `D` (equals the digest length in bytes).
    pub digits: usize,
    /// Number of leaves `L` in each digit tree.
    pub leaf_count: usize,
}

impl Default for SchemeParams {
    fn default() -> Self {
        SchemeParams {
            digits: DEFAULT_DIGITS,
            leaf_count: DEFAULT_LEAF_COUNT,
        }
    }
}

impl SchemeParams {
    /// The parameters of the canonical scheme (`D = 20`, `L = 256`).
    pub const CANONICAL: SchemeParams = SchemeParams {
        digits: DEFAULT_DIGITS,
        leaf_count: DEFAULT_LEAF_COUNT,
    };

    ///
    /// Constructs and validates the parameters.
    ///
    /// # Arguments
    /// * `digits` - Number of digit trees (the digest length in bytes).
    /// * `leaf_count` - Number of leaves per tree; a power of two not exceeding 256.
    ///
    pub fn new(digits: usize, leaf_count: usize) -> Result<Self> {
        let params = SchemeParams { digits, leaf_count };
        params.validate()?;
        Ok(params)
    }

    /// Checks that the parameters describe a constructible scheme.
    pub fn validate(&self) -> Result<()> {
        if self.digits == 0 {
            return Err(Error::Precondition(
                "the number of digits must be positive".into(),
            ));
        }
        if !self.leaf_count.is_power_of_two() || self.leaf_count < 2 {
            return Err(Error::StructuralInvariant(format!(
                "the leaf count {} is not a power of two greater than one",
                self.leaf_count
            )));
        }
        if self.leaf_count > MAX_LEAF_COUNT {
            return Err(Error::Precondition(format!(
                "the leaf count {} cannot be addressed by a single control byte",
                self.leaf_count
            )));
        }
        if self.digits.checked_mul(self.proof_size()).is_none() {
            return Err(Error::Precondition(format!(
                "{} digits do not fit a signature",
                self.digits
            )));
        }
        Ok(())
    }

    /// Depth of each digit tree (`log2(leaf_count)`).
    pub fn depth(&self) -> usize {
        self.leaf_count.trailing_zeros() as usize
    }

    /// Size of one serialized digit proof.
    pub fn proof_size(&self) -> usize {
        self.depth() * HASH_SIZE + PREIMAGE_SIZE + 1
    }

    /// Size of the serialized signature.
    pub fn signature_size(&self) -> usize {
        self.digits * self.proof_size()
    }

    ///
    /// Loads the parameters from the TOML file.
    ///
    /// Keys missing in the file fall back to the canonical values.
    ///
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read '{}': {e}", path.display())))?;
        let params = Self::from_toml(&content)?;
        debug!("Loaded {:?} from '{}'.", params, path.display());
        Ok(params)
    }

    /// Parses and validates the parameters from the TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let params: SchemeParams =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_canonical_sizes() {
        let params = SchemeParams::CANONICAL;
        params.validate().unwrap();

        assert_eq!(params, SchemeParams::default());
        assert_eq!(params.depth(), 8);
        assert_eq!(params.proof_size(), 8 * 20 + 16 + 1);
        assert_eq!(params.signature_size(), 3540);
    }

    #[test]
    fn test_reduced_sizes() {
        let params = SchemeParams::new(2, 4).unwrap();
        assert_eq!(params.depth(), 2);
        assert_eq!(params.signature_size(), 2 * (2 * 20 + 16 + 1));
    }

    #[test]
    fn test_invalid_leaf_counts() {
        for leaf_count in [0, 1, 3, 6, 100, 255] {
            assert!(
                matches!(
                    SchemeParams::new(20, leaf_count),
                    Err(Error::StructuralInvariant(_))
                ),
                "leaf count {leaf_count} should be rejected"
            );
        }
        assert!(matches!(
            SchemeParams::new(20, 512),
            Err(Error::Precondition(_))
        ));
        assert!(matches!(SchemeParams::new(0, 256), Err(Error::Precondition(_))));
    }

    #[test]
    fn test_rejects_digits_overflowing_signature_size() {
        assert!(matches!(
            SchemeParams::new(usize::MAX, 256),
            Err(Error::Precondition(_))
        ));
        assert!(matches!(
            SchemeParams::new(usize::MAX / 10, 2),
            Err(Error::Precondition(_))
        ));
    }

    #[test]
    fn test_from_toml() {
        let params = SchemeParams::from_toml("digits = 4\nleaf_count = 16\n").unwrap();
        assert_eq!(params, SchemeParams::new(4, 16).unwrap());

        let params = SchemeParams::from_toml("digits = 2\n").unwrap();
        assert_eq!(params.leaf_count, DEFAULT_LEAF_COUNT);

        assert!(matches!(
            SchemeParams::from_toml("digits = \"many\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SchemeParams::from_toml("depth = 3"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SchemeParams::from_toml("leaf_count = 12"),
            Err(Error::StructuralInvariant(_))
        ));
    }
}
