//! Verification of RFC 6962 inclusion and consistency proofs.

use crate::hasher::{Hash, hash_children};

/// Errors from proof verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofError {
    /// Leaf index is not covered by the tree size.
    #[error("leaf index {index} out of range for tree size {size}")]
    IndexOutOfRange {
        /// Claimed leaf index.
        index: u64,
        /// Tree size the proof targets.
        size: u64,
    },

    /// The new size is smaller than the old size.
    #[error("tree size {new} is smaller than previous size {old}")]
    SizeRegression {
        /// Previously verified size.
        old: u64,
        /// Claimed new size.
        new: u64,
    },

    /// Proof has the wrong number of hashes for the claimed sizes.
    #[error("wrong proof size {got}, want {want}")]
    WrongProofSize {
        /// Number of hashes supplied.
        got: usize,
        /// Number of hashes required.
        want: usize,
    },

    /// Recomputation did not reproduce the expected root.
    #[error("computed root does not match expected root")]
    RootMismatch,
}

/// Verify that `leaf_hash` is the leaf at `index` of the tree with `size`
/// leaves and root `root`.
pub fn verify_inclusion(
    leaf_hash: &Hash,
    index: u64,
    size: u64,
    proof: &[Hash],
    root: &Hash,
) -> Result<(), ProofError> {
    if index >= size {
        return Err(ProofError::IndexOutOfRange { index, size });
    }
    let (inner, border) = decomp_inclusion(index, size);
    if proof.len() != inner + border {
        return Err(ProofError::WrongProofSize {
            got: proof.len(),
            want: inner + border,
        });
    }

    let mut seed = chain_inner(*leaf_hash, &proof[..inner], index);
    seed = chain_border_right(seed, &proof[inner..]);
    if seed == *root {
        Ok(())
    } else {
        Err(ProofError::RootMismatch)
    }
}

/// Verify that the tree of `old_size` leaves with root `old_root` is a
/// prefix of the tree of `new_size` leaves with root `new_root`.
pub fn verify_consistency(
    old_size: u64,
    new_size: u64,
    proof: &[Hash],
    old_root: &Hash,
    new_root: &Hash,
) -> Result<(), ProofError> {
    if new_size < old_size {
        return Err(ProofError::SizeRegression {
            old: old_size,
            new: new_size,
        });
    }
    if old_size == new_size {
        if !proof.is_empty() {
            return Err(ProofError::WrongProofSize {
                got: proof.len(),
                want: 0,
            });
        }
        if old_root != new_root {
            return Err(ProofError::RootMismatch);
        }
        return Ok(());
    }
    if old_size == 0 {
        // The empty tree is a prefix of everything; no proof required.
        if !proof.is_empty() {
            return Err(ProofError::WrongProofSize {
                got: proof.len(),
                want: 0,
            });
        }
        return Ok(());
    }

    // 0 < old_size < new_size.
    let shift = old_size.trailing_zeros() as usize;
    let (inner, border) = decomp_inclusion(old_size - 1, new_size);
    let inner = inner - shift;

    // The proof includes the old root as its first hash unless old_size is a
    // power of two, in which case the old root is known to the verifier.
    let (seed, start) = if old_size == 1 << shift {
        (*old_root, 0)
    } else {
        match proof.first() {
            Some(h) => (*h, 1),
            None => {
                return Err(ProofError::WrongProofSize {
                    got: 0,
                    want: 1 + inner + border,
                });
            }
        }
    };
    if proof.len() != start + inner + border {
        return Err(ProofError::WrongProofSize {
            got: proof.len(),
            want: start + inner + border,
        });
    }
    let proof = &proof[start..];
    let mask = (old_size - 1) >> shift;

    // Two chains over the same hashes: the right-border subset reproduces
    // the old root, the full chain reproduces the new root.
    let mut h1 = chain_inner_right(seed, &proof[..inner], mask);
    h1 = chain_border_right(h1, &proof[inner..]);
    if h1 != *old_root {
        return Err(ProofError::RootMismatch);
    }

    let mut h2 = chain_inner(seed, &proof[..inner], mask);
    h2 = chain_border_right(h2, &proof[inner..]);
    if h2 != *new_root {
        return Err(ProofError::RootMismatch);
    }
    Ok(())
}

/// Split an inclusion proof for `index` in a `size`-leaf tree into its
/// inner part (below the point where the path to the last leaf diverges)
/// and its border (the remaining left-siblings above it).
fn decomp_inclusion(index: u64, size: u64) -> (usize, usize) {
    let inner = bit_len(index ^ (size - 1));
    let border = (index >> inner).count_ones() as usize;
    (inner, border)
}

fn bit_len(x: u64) -> usize {
    (u64::BITS - x.leading_zeros()) as usize
}

fn chain_inner(mut seed: Hash, proof: &[Hash], index: u64) -> Hash {
    for (i, h) in proof.iter().enumerate() {
        if (index >> i) & 1 == 0 {
            seed = hash_children(&seed, h);
        } else {
            seed = hash_children(h, &seed);
        }
    }
    seed
}

fn chain_inner_right(mut seed: Hash, proof: &[Hash], index: u64) -> Hash {
    for (i, h) in proof.iter().enumerate() {
        if (index >> i) & 1 == 1 {
            seed = hash_children(h, &seed);
        }
    }
    seed
}

fn chain_border_right(mut seed: Hash, proof: &[Hash]) -> Hash {
    for h in proof {
        seed = hash_children(h, &seed);
    }
    seed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::{empty_root, hash_leaf};
    use crate::tree::MemoryTree;

    fn tree_with(n: u64) -> MemoryTree {
        let mut t = MemoryTree::new();
        for i in 0..n {
            t.append(format!("leaf-{i}").as_bytes());
        }
        t
    }

    #[test]
    fn test_inclusion_all_leaves_all_sizes() {
        for size in 1..=17u64 {
            let t = tree_with(size);
            let root = t.root();
            for index in 0..size {
                let leaf = hash_leaf(format!("leaf-{index}").as_bytes());
                let proof = t.inclusion_proof(index);
                verify_inclusion(&leaf, index, size, &proof, &root)
                    .unwrap_or_else(|e| panic!("size={size} index={index}: {e}"));
            }
        }
    }

    #[test]
    fn test_inclusion_rejects_wrong_leaf() {
        let t = tree_with(7);
        let proof = t.inclusion_proof(3);
        let wrong = hash_leaf(b"not-the-leaf");
        assert_eq!(
            verify_inclusion(&wrong, 3, 7, &proof, &t.root()),
            Err(ProofError::RootMismatch)
        );
    }

    #[test]
    fn test_inclusion_rejects_out_of_range() {
        let t = tree_with(4);
        assert_eq!(
            verify_inclusion(&hash_leaf(b"x"), 4, 4, &[], &t.root()),
            Err(ProofError::IndexOutOfRange { index: 4, size: 4 })
        );
    }

    #[test]
    fn test_inclusion_rejects_truncated_proof() {
        let t = tree_with(8);
        let mut proof = t.inclusion_proof(5);
        proof.pop();
        assert!(matches!(
            verify_inclusion(
                &hash_leaf(b"leaf-5"),
                5,
                8,
                &proof,
                &t.root()
            ),
            Err(ProofError::WrongProofSize { .. })
        ));
    }

    #[test]
    fn test_consistency_all_size_pairs() {
        let full = tree_with(17);
        for old in 0..=17u64 {
            let old_root = full.root_at(old);
            for new in old..=17u64 {
                let proof = full.consistency_proof(old, new);
                verify_consistency(old, new, &proof, &old_root, &full.root_at(new))
                    .unwrap_or_else(|e| panic!("old={old} new={new}: {e}"));
            }
        }
    }

    #[test]
    fn test_consistency_rejects_regression() {
        let t = tree_with(8);
        assert_eq!(
            verify_consistency(8, 4, &[], &t.root(), &t.root_at(4)),
            Err(ProofError::SizeRegression { old: 8, new: 4 })
        );
    }

    #[test]
    fn test_consistency_equal_sizes_requires_equal_roots() {
        let t = tree_with(5);
        let other = tree_with(6);
        assert_eq!(
            verify_consistency(5, 5, &[], &t.root(), &t.root()),
            Ok(())
        );
        assert_eq!(
            verify_consistency(5, 5, &[], &t.root(), &other.root()),
            Err(ProofError::RootMismatch)
        );
    }

    #[test]
    fn test_consistency_from_empty_tree() {
        let t = tree_with(9);
        assert_eq!(
            verify_consistency(0, 9, &[], &empty_root(), &t.root()),
            Ok(())
        );
        // A non-empty proof from size 0 is malformed.
        assert!(matches!(
            verify_consistency(0, 9, &[t.root()], &empty_root(), &t.root()),
            Err(ProofError::WrongProofSize { .. })
        ));
    }

    #[test]
    fn test_consistency_rejects_corrupt_hash() {
        let full = tree_with(13);
        let mut proof = full.consistency_proof(6, 13);
        assert!(!proof.is_empty());
        proof[0][0] ^= 0xff;
        assert_eq!(
            verify_consistency(6, 13, &proof, &full.root_at(6), &full.root()),
            Err(ProofError::RootMismatch)
        );
    }
}
