//!
//! Binary Merkle tree over 160-bit hashes stored as one level-ordered array.
//!

use std::fmt::{Display, Formatter, Result as FmtResult};
// ---
use log::trace;
// ---
use crate::common::{Error, Hash160, Result};
use crate::config::HASH_SIZE;
use crate::hash::hash160_cat;

///
/// A perfectly balanced Merkle tree.
///
/// The nodes live in `data` layer by layer: the root at index 0, the layer `l` starting
/// at index `2^l - 1`, the leaves being the last layer. Children of the node `p` are at
/// `2p + 1` (left) and `2p + 2` (right). The `parent` table maps every node to its parent
/// (the root maps to itself) and is what the path extraction walks.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    data: Vec<Hash160>,
    parent: Vec<usize>,
    /// Number of leaves.
    t: usize,
    /// Number of layers including the root layer.
    h: usize,
}

impl MerkleTree {
    ///
    /// Folds the leaves pairwise bottom-up until the root remains.
    ///
    /// # Arguments
    /// * `leaves` - The leaf hashes; their number must be a power of two.
    ///
    pub fn construct(leaves: Vec<Hash160>) -> Result<Self> {
        let t = leaves.len();

        // Power of 2 check
        if !t.is_power_of_two() {
            return Err(Error::StructuralInvariant(format!(
                "number of leaves ({t}) is not a power of 2"
            )));
        }
        let h = t.trailing_zeros() as usize + 1;

        let size = 2 * t - 1;
        let mut data = vec![[0u8; HASH_SIZE]; size];
        let mut parent = vec![0usize; size];

        let base = t - 1;
        data[base..].copy_from_slice(&leaves);

        for l in (0..h - 1).rev() {
            let num_idxs = 1_usize << l;
            let base_prev = (1_usize << (l + 1)) - 1;
            let base = num_idxs - 1;

            for i in 0..num_idxs {
                let left = base_prev + 2 * i;
                let right = left + 1;

                data[base + i] = hash160_cat(&data[left], &data[right]);
                parent[left] = base + i;
                parent[right] = base + i;
            }
        }

        let tree = MerkleTree { data, parent, t, h };
        trace!("{}", tree);
        Ok(tree)
    }

    /// The node at the given layer (0 is the root layer).
    pub fn get(&self, layer: usize, idx: usize) -> &Hash160 {
        let i = ((1_usize << layer) - 1) + idx;
        &self.data[i]
    }

    pub fn root(&self) -> &Hash160 {
        &self.data[0]
    }

    pub fn leaf(&self, idx: usize) -> &Hash160 {
        self.get(self.h - 1, idx)
    }

    pub fn leaf_count(&self) -> usize {
        self.t
    }

    /// Number of hashing levels between a leaf and the root.
    pub fn depth(&self) -> usize {
        self.h - 1
    }

    ///
    /// Collects the siblings on the path from the leaf to the root.
    ///
    /// The returned hashes are ordered leaf-to-root.
    ///
    pub fn get_auth_path(&self, leaf_idx: usize) -> Result<Vec<Hash160>> {
        if leaf_idx >= self.t {
            return Err(Error::Precondition(format!(
                "leaf index {leaf_idx} out of range for {} leaves",
                self.t
            )));
        }

        let mut path = Vec::with_capacity(self.depth());
        let mut node = (self.t - 1) + leaf_idx;
        while node != 0 {
            // Left children have odd indices
            let sibling = if node % 2 == 1 { node + 1 } else { node - 1 };
            path.push(self.data[sibling]);
            node = self.parent[node];
        }

        if path.len() != self.depth() {
            return Err(Error::StructuralInvariant(format!(
                "authentication path has {} nodes, expected {}",
                path.len(),
                self.depth()
            )));
        }
        Ok(path)
    }
}

impl Display for MerkleTree {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        writeln!(
            f,
            r#"
--- MerkleTree ---
t:    {}
h:    {}
size: {}
"#,
            self.t,
            self.h,
            self.data.len()
        )?;

        for l in 0..self.h {
            let num_idxs = 1_usize << l;
            for i in 0..num_idxs {
                for b in self.get(l, i).iter().take(2) {
                    write!(f, "{:0>2x?}", b)?;
                }
                write!(f, "..\t")?;
            }
            writeln!(f)?;
        }
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use crate::hash::hash160;
    // ---
    use super::*;

    fn leaves(t: usize) -> Vec<Hash160> {
        (0..t).map(|i| hash160(&i.to_le_bytes())).collect()
    }

    /// Recomputes the root from a leaf-to-root path using the index parity.
    fn fold(mut idx: usize, leaf: Hash160, path: &[Hash160]) -> Hash160 {
        let mut acc = leaf;
        for s in path {
            acc = if idx % 2 == 1 {
                hash160_cat(s, &acc)
            } else {
                hash160_cat(&acc, s)
            };
            idx /= 2;
        }
        acc
    }

    #[test]
    fn test_construct_small_tree() {
        let l = leaves(4);
        let tree = MerkleTree::construct(l.clone()).unwrap();

        let n01 = hash160_cat(&l[0], &l[1]);
        let n23 = hash160_cat(&l[2], &l[3]);
        assert_eq!(tree.get(1, 0), &n01);
        assert_eq!(tree.get(1, 1), &n23);
        assert_eq!(tree.root(), &hash160_cat(&n01, &n23));
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.leaf_count(), 4);
        for (i, leaf) in l.iter().enumerate() {
            assert_eq!(tree.leaf(i), leaf);
        }
    }

    #[test]
    fn test_auth_path_order() {
        let l = leaves(4);
        let tree = MerkleTree::construct(l.clone()).unwrap();

        // Leaf 1: sibling leaf 0 first, then the right subtree node.
        let path = tree.get_auth_path(1).unwrap();
        assert_eq!(path, vec![l[0], hash160_cat(&l[2], &l[3])]);
    }

    #[test]
    fn test_auth_paths_reproduce_root() {
        for t in [2, 8, 256] {
            let l = leaves(t);
            let tree = MerkleTree::construct(l.clone()).unwrap();

            for (i, leaf) in l.iter().enumerate() {
                let path = tree.get_auth_path(i).unwrap();
                assert_eq!(path.len(), t.trailing_zeros() as usize);
                assert_eq!(&fold(i, *leaf, &path), tree.root());
            }
        }
    }

    #[test]
    fn test_single_leaf_tree() {
        let l = leaves(1);
        let tree = MerkleTree::construct(l.clone()).unwrap();
        assert_eq!(tree.root(), &l[0]);
        assert!(tree.get_auth_path(0).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        for t in [0, 3, 5, 255] {
            assert!(matches!(
                MerkleTree::construct(leaves(t)),
                Err(Error::StructuralInvariant(_))
            ));
        }
    }

    #[test]
    fn test_rejects_leaf_out_of_range() {
        let tree = MerkleTree::construct(leaves(4)).unwrap();
        assert!(matches!(tree.get_auth_path(4), Err(Error::Precondition(_))));
    }

    #[test]
    fn test_display_lists_all_layers() {
        let tree = MerkleTree::construct(leaves(4)).unwrap();
        let dump = format!("{tree}");
        assert!(dump.contains("--- MerkleTree ---"));
        assert!(dump.contains("t:    4"));
        assert!(dump.contains("h:    3"));
        assert!(dump.contains(&format!("{:0>2x?}{:0>2x?}..", tree.root()[0], tree.root()[1])));
    }
}
