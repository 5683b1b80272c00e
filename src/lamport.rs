//!
//! Lamport one-time signatures with Merkle-compressed digit trees.
//!
//! Every byte position of the signed digest ("digit") owns one Merkle tree whose leaves
//! commit to `L` secret preimages, one per possible byte value. Signing a byte reveals
//! the preimage of the leaf addressed by that byte together with its authentication
//! path. The public key commits to the roots of all digit trees.
//!
//! # Scheme parameters
//! * leaf commitment: `hash160(index || preimage)` with a one-byte index,
//! * preimage: `hash160(child_secret)` truncated to 16 bytes,
//! * inner node: `hash160(left || right)`,
//! * public key: `hash256(root_0 || root_1 || ... || root_{D-1})`.
//!

use std::fmt::{self, Debug, Display, Formatter};
use std::marker::PhantomData;
// ---
use log::{debug, info, trace};
use zeroize::{Zeroize, ZeroizeOnDrop};
// ---
use crate::common::{Error, Hash160, MasterSecret, Preimage, PublicKey, Result};
use crate::config::{SchemeParams, HASH_SIZE, MAX_LEAF_COUNT, NAMESPACE_INDEX, PREIMAGE_SIZE};
use crate::derivation::Bip32Node;
use crate::hash::{hash160, hash160_cat, hash256};
use crate::merkle_tree::MerkleTree;
use crate::traits::{KeyDerivationTrait, KeyPair, SignatureSchemeTrait};

pub type LamportKeyPair = KeyPair<LamportSecretKey, PublicKey>;

/// Computes the leaf commitment of the preimage at the given leaf index.
pub fn leaf_hash(index: u8, preimage: &Preimage) -> Hash160 {
    hash160_cat(&[index], preimage)
}

/// Reduces the digit tree roots (in ascending digit order) into the public key.
pub fn aggregate<'a>(roots: impl IntoIterator<Item = &'a Hash160>) -> PublicKey {
    let concat: Vec<u8> = roots.into_iter().flatten().copied().collect();
    hash256(&concat)
}

///
/// One leaf of a digit tree.
///
/// The preimage is wiped when the leaf is dropped.
///
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct LeafCommitment {
    pub index: u8,
    pub preimage: Preimage,
    pub hash: Hash160,
}

impl LeafCommitment {
    pub fn new(index: u8, preimage: Preimage) -> Self {
        LeafCommitment {
            index,
            preimage,
            hash: leaf_hash(index, &preimage),
        }
    }
}

///
/// The Merkle tree of leaf commitments dedicated to one byte position of the digest.
///
#[derive(Clone, PartialEq, Eq)]
pub struct DigitTree {
    leaves: Vec<LeafCommitment>,
    tree: MerkleTree,
}

impl DigitTree {
    ///
    /// Derives the leaf preimages below the given node and builds the tree over them.
    ///
    /// # Arguments
    /// * `node` - The derivation subtree root of this digit.
    /// * `leaf_count` - Number of leaves; a power of two not exceeding 256.
    ///
    pub fn build<Dv: KeyDerivationTrait>(node: &Dv, leaf_count: usize) -> Result<Self> {
        if leaf_count > MAX_LEAF_COUNT {
            return Err(Error::Precondition(format!(
                "{leaf_count} leaves cannot be indexed by one byte"
            )));
        }

        let mut leaves = Vec::with_capacity(leaf_count);
        for i in 0..leaf_count {
            let child = node.derive_hardened(i as u32)?;
            let full_preimage = hash160(&child.secret_bytes());

            let mut preimage = [0u8; PREIMAGE_SIZE];
            preimage.copy_from_slice(&full_preimage[..PREIMAGE_SIZE]);

            leaves.push(LeafCommitment::new(i as u8, preimage));
        }

        let tree = MerkleTree::construct(leaves.iter().map(|l| l.hash).collect())?;
        Ok(DigitTree { leaves, tree })
    }

    pub fn root(&self) -> &Hash160 {
        self.tree.root()
    }

    pub fn depth(&self) -> usize {
        self.tree.depth()
    }

    pub fn leaves(&self) -> &[LeafCommitment] {
        &self.leaves
    }

    ///
    /// Reveals the leaf addressed by the digit value.
    ///
    /// The siblings in the proof are in the root-to-leaf order.
    ///
    pub fn prove(&self, digit: u8) -> Result<DigitProof> {
        let leaf_idx = digit as usize;
        let mut siblings = self.tree.get_auth_path(leaf_idx)?;
        siblings.reverse();

        Ok(DigitProof {
            siblings,
            preimage: self.leaves[leaf_idx].preimage,
            control: digit,
        })
    }
}

///
/// The private material of the one-time key: all digit trees with their preimages.
///
#[derive(Clone, PartialEq, Eq)]
pub struct LamportSecretKey {
    trees: Vec<DigitTree>,
    /// Base58 extended private key of the HD master node.
    xprv: String,
}

impl LamportSecretKey {
    pub fn trees(&self) -> &[DigitTree] {
        &self.trees
    }

    pub fn xprv(&self) -> &str {
        &self.xprv
    }

    pub fn roots(&self) -> impl Iterator<Item = &Hash160> {
        self.trees.iter().map(|t| t.root())
    }
}

impl Drop for LamportSecretKey {
    fn drop(&mut self) {
        self.xprv.zeroize();
    }
}

impl Debug for LamportSecretKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LamportSecretKey")
            .field("trees", &self.trees.len())
            .finish_non_exhaustive()
    }
}

///
/// The revealed part of one digit tree.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitProof {
    /// The authentication path ordered from the root level down to the leaf level.
    pub siblings: Vec<Hash160>,
    pub preimage: Preimage,
    /// The leaf index, equal to the authenticated digest byte.
    pub control: u8,
}

impl DigitProof {
    ///
    /// Folds the revealed leaf up to the root of its tree.
    ///
    /// At the height `i` the bit `i` of the control byte tells whether the running
    /// value is the right child (`sibling || acc`) or the left one (`acc || sibling`).
    ///
    pub fn recover_root(&self) -> Hash160 {
        let control = u32::from(self.control);

        let mut acc = leaf_hash(self.control, &self.preimage);
        for (i, sibling) in self.siblings.iter().rev().enumerate() {
            let is_right = (control >> i) & 1 == 1;
            acc = if is_right {
                hash160_cat(sibling, &acc)
            } else {
                hash160_cat(&acc, sibling)
            };
        }
        acc
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        for s in self.siblings.iter() {
            out.extend_from_slice(s);
        }
        out.extend_from_slice(&self.preimage);
        out.push(self.control);
    }
}

///
/// A signature of one digest: one proof per digit, in the ascending digit order.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    proofs: Vec<DigitProof>,
}

impl Signature {
    pub fn new(proofs: Vec<DigitProof>) -> Self {
        Signature { proofs }
    }

    pub fn proofs(&self) -> &[DigitProof] {
        &self.proofs
    }

    /// The authenticated digest (the control bytes in the digit order).
    pub fn digest(&self) -> Vec<u8> {
        self.proofs.iter().map(|p| p.control).collect()
    }

    /// The public key this signature commits to.
    pub fn recover_public_key(&self) -> PublicKey {
        let roots: Vec<Hash160> = self.proofs.iter().map(|p| p.recover_root()).collect();
        aggregate(&roots)
    }

    ///
    /// Serializes into the wire format.
    ///
    /// Each digit is `siblings (root-to-leaf) || preimage || control`.
    ///
    pub fn to_bytes(&self) -> Vec<u8> {
        let proof_size = self
            .proofs
            .first()
            .map_or(0, |p| p.siblings.len() * HASH_SIZE + PREIMAGE_SIZE + 1);

        let mut out = Vec::with_capacity(self.proofs.len() * proof_size);
        for p in self.proofs.iter() {
            p.write_to(&mut out);
        }
        out
    }

    ///
    /// Parses the wire format of a signature made with the given parameters.
    ///
    pub fn from_bytes(bytes: &[u8], params: &SchemeParams) -> Result<Self> {
        params.validate()?;
        if bytes.len() != params.signature_size() {
            return Err(Error::Format(format!(
                "signature must be {} bytes, got {}",
                params.signature_size(),
                bytes.len()
            )));
        }

        let depth = params.depth();
        let proofs = bytes
            .chunks_exact(params.proof_size())
            .map(|chunk| {
                let (path, rest) = chunk.split_at(depth * HASH_SIZE);
                let siblings = path
                    .chunks_exact(HASH_SIZE)
                    .map(|s| {
                        let mut sibling = [0u8; HASH_SIZE];
                        sibling.copy_from_slice(s);
                        sibling
                    })
                    .collect();

                let mut preimage = [0u8; PREIMAGE_SIZE];
                preimage.copy_from_slice(&rest[..PREIMAGE_SIZE]);

                DigitProof {
                    siblings,
                    preimage,
                    control: rest[PREIMAGE_SIZE],
                }
            })
            .collect();

        Ok(Signature { proofs })
    }

    ///
    /// The stack items in the order they are pushed before running the verifier program.
    ///
    /// After pushing, the control byte of the last digit is on the top of the stack.
    ///
    pub fn witness(&self) -> Vec<Vec<u8>> {
        let mut items = vec![];
        for p in self.proofs.iter() {
            items.extend(p.siblings.iter().map(|s| s.to_vec()));
            items.push(p.preimage.to_vec());
            items.push(vec![p.control]);
        }
        items
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

///
/// The Lamport signature scheme with the digit trees derived from one master secret.
///
/// # Type parameters
/// * `Dv` - The HD derivation of the preimage secrets.
///
pub struct LamportScheme<Dv: KeyDerivationTrait = Bip32Node> {
    params: SchemeParams,
    _p: PhantomData<Dv>,
}

impl<Dv: KeyDerivationTrait> LamportScheme<Dv> {
    pub fn new(params: SchemeParams) -> Result<Self> {
        params.validate()?;
        Ok(LamportScheme {
            params,
            _p: PhantomData,
        })
    }

    pub fn params(&self) -> &SchemeParams {
        &self.params
    }

    fn check_digest(&self, digest: &[u8]) -> Result<()> {
        if digest.len() != self.params.digits {
            return Err(Error::Precondition(format!(
                "digest must be {} bytes, got {}",
                self.params.digits,
                digest.len()
            )));
        }
        if let Some((t, d)) = digest
            .iter()
            .enumerate()
            .find(|(_, d)| usize::from(**d) >= self.params.leaf_count)
        {
            return Err(Error::Precondition(format!(
                "digit {t} has value {d}, the trees only have {} leaves",
                self.params.leaf_count
            )));
        }
        Ok(())
    }
}

impl<Dv: KeyDerivationTrait> SignatureSchemeTrait for LamportScheme<Dv> {
    type SecretKey = LamportSecretKey;
    type PublicKey = PublicKey;
    type Signature = Signature;

    fn gen_key_pair(&self, secret: &MasterSecret) -> Result<LamportKeyPair> {
        let master = Dv::from_master(secret)?;
        let signature_root = master.derive_hardened(NAMESPACE_INDEX)?;

        let mut trees = Vec::with_capacity(self.params.digits);
        for t in 0..self.params.digits {
            let digit_root = signature_root.derive_hardened(t as u32)?;
            let tree = DigitTree::build(&digit_root, self.params.leaf_count)?;
            trace!("digit {}: root {}", t, hex::encode(tree.root()));
            trees.push(tree);
        }

        let secret = LamportSecretKey {
            trees,
            xprv: master.to_extended_string(),
        };
        let public = aggregate(secret.roots());

        info!(
            "Generated a key pair ({} digits, {} leaves): {}",
            self.params.digits,
            self.params.leaf_count,
            hex::encode(public)
        );
        Ok(KeyPair::new(secret, public))
    }

    fn sign(&self, digest: &[u8], secret_key: &LamportSecretKey) -> Result<Signature> {
        self.check_digest(digest)?;
        if secret_key.trees.len() != self.params.digits {
            return Err(Error::Precondition(format!(
                "secret key has {} digit trees, the scheme expects {}",
                secret_key.trees.len(),
                self.params.digits
            )));
        }

        let mut proofs = Vec::with_capacity(digest.len());
        for (t, (tree, d)) in secret_key.trees.iter().zip(digest).enumerate() {
            if tree.leaves().len() != self.params.leaf_count
                || tree.depth() != self.params.depth()
            {
                return Err(Error::Precondition(format!(
                    "digit tree {t} has {} leaves, the scheme expects {}",
                    tree.leaves().len(),
                    self.params.leaf_count
                )));
            }

            let proof = tree.prove(*d)?;

            // --- sanity check ---
            if proof.recover_root() != *tree.root() {
                return Err(Error::StructuralInvariant(format!(
                    "the proof of digit {t} does not reproduce its root"
                )));
            }
            // --- sanity check ---

            proofs.push(proof);
        }

        debug!("Signed digest {}.", hex::encode(digest));
        Ok(Signature::new(proofs))
    }

    fn verify(&self, digest: &[u8], signature: &Signature, pub_key: &PublicKey) -> bool {
        let depth = self.params.depth();
        if signature.proofs.len() != self.params.digits
            || signature.proofs.iter().any(|p| p.siblings.len() != depth)
        {
            debug!("The signature does not match the scheme parameters.");
            return false;
        }
        if signature.digest() != digest {
            debug!(
                "The signature authenticates {}, not {}.",
                hex::encode(signature.digest()),
                hex::encode(digest)
            );
            return false;
        }

        let act_pk = signature.recover_public_key();
        if act_pk != *pub_key {
            debug!(
                "{}\n\tvs\n {}",
                hex::encode(act_pk),
                hex::encode(pub_key)
            );
            return false;
        }
        true
    }
}
