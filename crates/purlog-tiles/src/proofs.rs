//! RFC 6962 proof construction from tiles.
//!
//! [`ProofBuilder`] computes inclusion and consistency proofs for a fixed
//! tree size by fetching hash tiles through a [`TileReader`]. Hashes of
//! complete nodes come straight out of tiles; ragged right-edge hashes are
//! folded from the perfect subtrees that make up the range.

use std::collections::HashMap;

use purlog_merkle::{Hash, hash_children};

use crate::error::TileError;
use crate::layout::{TILE_HEIGHT, TILE_WIDTH, parse_hash_tile, tile_width};
use crate::storage::TileReader;

/// Builds proofs against a tree of a fixed size, caching fetched tiles.
pub struct ProofBuilder<'a> {
    reader: &'a dyn TileReader,
    size: u64,
    tiles: HashMap<(u32, u64), Vec<Hash>>,
}

impl<'a> ProofBuilder<'a> {
    /// Create a builder for the tree with `size` leaves.
    pub fn new(reader: &'a dyn TileReader, size: u64) -> Self {
        Self {
            reader,
            size,
            tiles: HashMap::new(),
        }
    }

    /// Inclusion proof for the leaf at `index`.
    pub async fn inclusion_proof(&mut self, index: u64) -> Result<Vec<Hash>, TileError> {
        if index >= self.size {
            return Err(TileError::OutOfRange {
                from: index,
                to: index + 1,
                size: self.size,
            });
        }
        let (mut lo, mut hi) = (0u64, self.size);
        let mut proof = Vec::new();
        while hi - lo > 1 {
            let k = split_point(hi - lo);
            if index - lo < k {
                proof.push(self.range_root(lo + k, hi).await?);
                hi = lo + k;
            } else {
                proof.push(self.range_root(lo, lo + k).await?);
                lo += k;
            }
        }
        proof.reverse();
        Ok(proof)
    }

    /// Consistency proof from `old` to `new` leaves (`old <= new <= size`).
    pub async fn consistency_proof(&mut self, old: u64, new: u64) -> Result<Vec<Hash>, TileError> {
        if old > new || new > self.size {
            return Err(TileError::OutOfRange {
                from: old,
                to: new,
                size: self.size,
            });
        }
        if old == 0 || old == new {
            return Ok(Vec::new());
        }

        // Iterative SUBPROOF(old, D[new], true) per RFC 6962 §2.1.2,
        // collecting siblings top-down and reversing at the end.
        let (mut lo, mut hi) = (0u64, new);
        let mut m = old;
        let mut complete = true;
        let mut proof = Vec::new();
        loop {
            let n = hi - lo;
            if m == n {
                if !complete {
                    proof.push(self.range_root(lo, hi).await?);
                }
                break;
            }
            let k = split_point(n);
            if m <= k {
                proof.push(self.range_root(lo + k, hi).await?);
                hi = lo + k;
            } else {
                proof.push(self.range_root(lo, lo + k).await?);
                lo += k;
                m -= k;
                complete = false;
            }
        }
        proof.reverse();
        Ok(proof)
    }

    /// Root of the leaf range `[lo, hi)`, where `lo` is aligned to the
    /// largest power of two not exceeding the range length.
    pub(crate) async fn range_root(&mut self, lo: u64, hi: u64) -> Result<Hash, TileError> {
        debug_assert!(lo < hi && hi <= self.size);
        // Decompose into perfect aligned subtrees, left to right.
        let mut parts = Vec::new();
        let mut offset = lo;
        let mut remaining = hi - lo;
        while remaining > 0 {
            let span = largest_pow2_leq(remaining);
            let level = span.trailing_zeros();
            parts.push(self.node_hash(level, offset >> level).await?);
            offset += span;
            remaining -= span;
        }
        // Fold right to left: the ragged tail hashes up under its left
        // neighbors per the MTH recursion.
        let mut root = parts.pop().expect("range is non-empty");
        for left in parts.into_iter().rev() {
            root = hash_children(&left, &root);
        }
        Ok(root)
    }

    /// Hash of the complete node at `(level, index)`.
    pub(crate) async fn node_hash(&mut self, level: u32, index: u64) -> Result<Hash, TileError> {
        let tile_level = level / TILE_HEIGHT;
        let sub_height = level - tile_level * TILE_HEIGHT;
        let span = 1u64 << sub_height;
        let first = index << sub_height;
        let tile_index = first / TILE_WIDTH;
        let offset = (first % TILE_WIDTH) as usize;

        let tile = self.tile(tile_level, tile_index).await?;
        if offset + span as usize > tile.len() {
            return Err(TileError::BadTile(format!(
                "node ({level}, {index}) not covered by tile ({tile_level}, {tile_index}) of width {}",
                tile.len()
            )));
        }
        let mut row: Vec<Hash> = tile[offset..offset + span as usize].to_vec();
        while row.len() > 1 {
            row = row
                .chunks_exact(2)
                .map(|pair| hash_children(&pair[0], &pair[1]))
                .collect();
        }
        Ok(row[0])
    }

    async fn tile(&mut self, tile_level: u32, tile_index: u64) -> Result<&[Hash], TileError> {
        if !self.tiles.contains_key(&(tile_level, tile_index)) {
            let width = tile_width(self.size, tile_level, tile_index).ok_or_else(|| {
                TileError::NotFound(format!(
                    "tile ({tile_level}, {tile_index}) beyond tree size {}",
                    self.size
                ))
            })?;
            let bytes = self.reader.read_tile(tile_level, tile_index, width).await?;
            let hashes = parse_hash_tile(&bytes, width)?;
            self.tiles.insert((tile_level, tile_index), hashes);
        }
        Ok(self
            .tiles
            .get(&(tile_level, tile_index))
            .expect("inserted above"))
    }
}

/// Largest power of two strictly less than `n` (`n >= 2`).
pub(crate) fn split_point(n: u64) -> u64 {
    debug_assert!(n >= 2);
    largest_pow2_leq(n - 1)
}

/// Largest power of two less than or equal to `n` (`n >= 1`).
pub(crate) fn largest_pow2_leq(n: u64) -> u64 {
    debug_assert!(n >= 1);
    1 << (63 - n.leading_zeros())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use purlog_merkle::{MemoryTree, hash_leaf, verify_consistency, verify_inclusion};

    /// A reader that recomputes tiles from a leaf-hash vector on demand.
    struct SyntheticReader {
        leaves: Vec<Hash>,
    }

    impl SyntheticReader {
        fn with_leaves(n: u64) -> Self {
            Self {
                leaves: (0..n)
                    .map(|i| hash_leaf(format!("entry-{i}").as_bytes()))
                    .collect(),
            }
        }

        /// Root of the perfect subtree of `span` leaves starting at `lo`.
        fn perfect_root(&self, lo: u64, span: u64) -> Hash {
            if span == 1 {
                return self.leaves[lo as usize];
            }
            let half = span / 2;
            hash_children(
                &self.perfect_root(lo, half),
                &self.perfect_root(lo + half, half),
            )
        }
    }

    #[async_trait]
    impl TileReader for SyntheticReader {
        async fn read_tile(
            &self,
            level: u32,
            index: u64,
            width: u16,
        ) -> Result<Vec<u8>, TileError> {
            let span = 1u64 << (level * TILE_HEIGHT);
            let mut out = Vec::with_capacity(width as usize * 32);
            for i in 0..width as u64 {
                let node = index * TILE_WIDTH + i;
                out.extend_from_slice(&self.perfect_root(node * span, span));
            }
            Ok(out)
        }
    }

    fn reference_tree(n: u64) -> MemoryTree {
        let mut t = MemoryTree::new();
        for i in 0..n {
            t.append(format!("entry-{i}").as_bytes());
        }
        t
    }

    #[tokio::test]
    async fn test_inclusion_proofs_verify_across_sizes() {
        for size in [1u64, 2, 3, 7, 8, 255, 256, 257, 300] {
            let reader = SyntheticReader::with_leaves(size);
            let tree = reference_tree(size);
            let root = tree.root();
            let mut builder = ProofBuilder::new(&reader, size);
            // Probe first, last and a middle leaf.
            for index in [0, size / 2, size - 1] {
                let proof = builder.inclusion_proof(index).await.unwrap();
                let leaf = hash_leaf(format!("entry-{index}").as_bytes());
                verify_inclusion(&leaf, index, size, &proof, &root)
                    .unwrap_or_else(|e| panic!("size={size} index={index}: {e}"));
            }
        }
    }

    #[tokio::test]
    async fn test_inclusion_proofs_match_memory_tree() {
        let size = 21u64;
        let reader = SyntheticReader::with_leaves(size);
        let tree = reference_tree(size);
        let mut builder = ProofBuilder::new(&reader, size);
        for index in 0..size {
            assert_eq!(
                builder.inclusion_proof(index).await.unwrap(),
                tree.inclusion_proof(index),
                "index {index}"
            );
        }
    }

    #[tokio::test]
    async fn test_consistency_proofs_verify_across_size_pairs() {
        let size = 300u64;
        let reader = SyntheticReader::with_leaves(size);
        let tree = reference_tree(size);
        let mut builder = ProofBuilder::new(&reader, size);
        for old in [0u64, 1, 2, 7, 8, 200, 255, 256, 257, 300] {
            for new in [old, 256, 300] {
                if new < old {
                    continue;
                }
                let proof = builder.consistency_proof(old, new).await.unwrap();
                verify_consistency(old, new, &proof, &tree.root_at(old), &tree.root_at(new))
                    .unwrap_or_else(|e| panic!("old={old} new={new}: {e}"));
            }
        }
    }

    #[tokio::test]
    async fn test_consistency_proofs_match_memory_tree() {
        let size = 19u64;
        let reader = SyntheticReader::with_leaves(size);
        let tree = reference_tree(size);
        let mut builder = ProofBuilder::new(&reader, size);
        for old in 0..=size {
            assert_eq!(
                builder.consistency_proof(old, size).await.unwrap(),
                tree.consistency_proof(old, size),
                "old {old}"
            );
        }
    }

    #[tokio::test]
    async fn test_out_of_range_rejected() {
        let reader = SyntheticReader::with_leaves(4);
        let mut builder = ProofBuilder::new(&reader, 4);
        assert!(matches!(
            builder.inclusion_proof(4).await,
            Err(TileError::OutOfRange { .. })
        ));
        assert!(matches!(
            builder.consistency_proof(2, 5).await,
            Err(TileError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_split_point() {
        assert_eq!(split_point(2), 1);
        assert_eq!(split_point(5), 4);
        assert_eq!(split_point(256), 128);
        assert_eq!(split_point(257), 256);
        assert_eq!(largest_pow2_leq(1), 1);
        assert_eq!(largest_pow2_leq(255), 128);
        assert_eq!(largest_pow2_leq(256), 256);
    }
}
