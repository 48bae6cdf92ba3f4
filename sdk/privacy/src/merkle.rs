//! Merkle Inclusion Proofs
//!
//! Builds fixed-depth inclusion proofs over the pool's deposit list,
//! reproducing the on-chain incremental tree's zero-padding convention.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    zero(1)
//!                /  \
//!               C0  zero(0)        (partially filled level 0)
//! ```
//!
//! The zero-hash ladder is `zero(0) = Z`, `zero(n) = chain(zero(n-1),
//! zero(n-1))`. Any deviation from the on-chain recursion produces proof
//! failures that are extremely hard to diagnose, so this module is tested
//! entirely offline.

use ark_bls12_381::Fr;
use ark_ff::{PrimeField, Zero};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commitment::{Commitment, PoseidonHasher, field_to_bytes};

/// Tree depth fixed by the pool contract (supports 2^20 deposits)
pub const POOL_TREE_DEPTH: usize = 20;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("leaf index {index} out of range for {leaves} leaves")]
    LeafIndexOutOfRange { index: usize, leaves: usize },
}

/// A Merkle path proving inclusion of a deposit commitment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Sibling hashes from leaf to root, exactly `POOL_TREE_DEPTH` entries
    pub path: Vec<[u8; 32]>,
    /// Position bits, 0 = current node is the left child, 1 = right child
    pub indices: Vec<u8>,
}

/// Builds inclusion proofs from the full leaf list.
///
/// Positions past the end of the list are implicit zero-hash subtrees.
pub struct MerkleProofBuilder {
    hasher: PoseidonHasher,
    /// Precomputed zero hash per level, `zero_hashes[n] = zero(n)`
    zero_hashes: Vec<Fr>,
}

impl MerkleProofBuilder {
    pub fn new() -> Self {
        let hasher = PoseidonHasher::new();
        let zero_hashes = compute_zero_hashes(&hasher);
        Self {
            hasher,
            zero_hashes,
        }
    }

    /// The canonical zero hash at a level of the tree
    pub fn zero_hash(&self, level: usize) -> [u8; 32] {
        field_to_bytes(self.zero_hashes[level])
    }

    /// Build the inclusion proof for `leaves[index]`.
    ///
    /// Walks the tree bottom-up, pairing adjacent nodes and padding odd
    /// tails with the level's zero hash, exactly as the on-chain
    /// incremental tree does.
    pub fn build_proof(
        &self,
        leaves: &[Commitment],
        index: usize,
    ) -> Result<MerkleProof, MerkleError> {
        if index >= leaves.len() {
            return Err(MerkleError::LeafIndexOutOfRange {
                index,
                leaves: leaves.len(),
            });
        }

        let mut level_nodes: Vec<Fr> = leaves.iter().map(|c| c.to_field()).collect();
        let mut current_index = index;
        let mut path = Vec::with_capacity(POOL_TREE_DEPTH);
        let mut indices = Vec::with_capacity(POOL_TREE_DEPTH);

        for level in 0..POOL_TREE_DEPTH {
            let sibling_index = current_index ^ 1;
            let sibling = level_nodes
                .get(sibling_index)
                .copied()
                .unwrap_or(self.zero_hashes[level]);

            path.push(field_to_bytes(sibling));
            indices.push((current_index & 1) as u8);

            level_nodes = self.next_level(&level_nodes, level);
            current_index /= 2;
        }

        Ok(MerkleProof { path, indices })
    }

    /// Root of the tree over `leaves` with implicit zero padding
    pub fn compute_root(&self, leaves: &[Commitment]) -> [u8; 32] {
        let mut level_nodes: Vec<Fr> = leaves.iter().map(|c| c.to_field()).collect();
        for level in 0..POOL_TREE_DEPTH {
            level_nodes = self.next_level(&level_nodes, level);
        }
        field_to_bytes(level_nodes[0])
    }

    /// Recompute the root from a leaf and its proof (offline verification)
    pub fn compute_root_from_path(&self, leaf: &Commitment, proof: &MerkleProof) -> [u8; 32] {
        let mut current = leaf.to_field();
        for (sibling, bit) in proof.path.iter().zip(proof.indices.iter()) {
            let sibling = Fr::from_le_bytes_mod_order(sibling);
            current = if *bit == 1 {
                self.hasher.chain_hash(sibling, current)
            } else {
                self.hasher.chain_hash(current, sibling)
            };
        }
        field_to_bytes(current)
    }

    fn next_level(&self, level_nodes: &[Fr], level: usize) -> Vec<Fr> {
        if level_nodes.is_empty() {
            // Keep the loop going above the filled portion of the tree.
            return vec![self
                .hasher
                .chain_hash(self.zero_hashes[level], self.zero_hashes[level])];
        }
        level_nodes
            .chunks(2)
            .map(|pair| {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(self.zero_hashes[level]);
                self.hasher.chain_hash(left, right)
            })
            .collect()
    }
}

impl Default for MerkleProofBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn compute_zero_hashes(hasher: &PoseidonHasher) -> Vec<Fr> {
    let mut zeros = vec![Fr::zero()];
    for level in 0..POOL_TREE_DEPTH {
        let prev = zeros[level];
        zeros.push(hasher.chain_hash(prev, prev));
    }
    zeros
}
