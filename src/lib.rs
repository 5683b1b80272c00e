//!
//! Merkle-compressed Lamport one-time signatures together with a compiler of their verifier
//! for a two-stack machine.
//!
//! The key pair is derived from a 32-byte master secret through hardened HD derivation.
//! A signature authenticates one fixed-length digest; the compiled program recomputes the
//! public key from the signature on the machine and leaves the authenticated digest on the
//! stack.
//!
mod derivation;
mod merkle_tree;
// ---
pub mod common;
pub mod config;
pub mod hash;
pub mod lamport;
pub mod machine;
pub mod script;
pub mod traits;
// ---
pub use common::{Error, MasterSecret, PublicKey, Result};
pub use config::SchemeParams;
pub use derivation::Bip32Node;
pub use lamport::{DigitProof, LamportKeyPair, LamportScheme, LamportSecretKey, Signature};
pub use machine::{ScriptError, StackMachine};
pub use merkle_tree::MerkleTree;
pub use script::{ScriptCompiler, VerifierProgram};
pub use traits::{KeyDerivationTrait, KeyPair, SignatureSchemeTrait};
