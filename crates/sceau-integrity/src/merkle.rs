//! Merkle batches for external anchoring.
//!
//! Anchoring one transaction per document is expensive.  Instead a batch of
//! record hashes is reduced to a single SHA-256 Merkle root, the root is
//! published once, and every member receives the same `AnchorRef` plus an
//! inclusion proof that ties its `record_hash` to the published root.
//!
//! Tree shape: leaves are the records' hex `record_hash` strings in the order
//! given; each parent is `sha256(left_hex || right_hex)` as lowercase hex; an
//! odd node at the end of a level is paired with itself.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use sceau_contracts::error::{LedgerError, LedgerResult};

/// Which side of the running hash a proof sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: String,
    pub side: Side,
}

/// Path from one leaf to the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf: String,
    pub steps: Vec<ProofStep>,
}

fn parent(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hex::encode(hasher.finalize())
}

fn next_level(level: &[String]) -> Vec<String> {
    level
        .chunks(2)
        .map(|pair| {
            let left = &pair[0];
            parent(left, pair.get(1).unwrap_or(left))
        })
        .collect()
}

fn empty_batch() -> LedgerError {
    LedgerError::InvalidInput {
        reason: "cannot build a Merkle root over an empty batch".to_string(),
    }
}

/// Merkle root over `leaves` (record hashes, in batch order).
pub fn merkle_root<S: AsRef<str>>(leaves: &[S]) -> LedgerResult<String> {
    if leaves.is_empty() {
        return Err(empty_batch());
    }
    let mut level: Vec<String> = leaves.iter().map(|l| l.as_ref().to_string()).collect();
    while level.len() > 1 {
        level = next_level(&level);
    }
    let root = level.swap_remove(0);
    debug!(leaves = leaves.len(), root = %root, "merkle root computed");
    Ok(root)
}

/// Inclusion proof for the leaf at `index`.
pub fn merkle_proof<S: AsRef<str>>(leaves: &[S], index: usize) -> LedgerResult<MerkleProof> {
    if leaves.is_empty() {
        return Err(empty_batch());
    }
    if index >= leaves.len() {
        return Err(LedgerError::InvalidInput {
            reason: format!("leaf index {} out of range for batch of {}", index, leaves.len()),
        });
    }

    let mut level: Vec<String> = leaves.iter().map(|l| l.as_ref().to_string()).collect();
    let leaf = level[index].clone();
    let mut steps = Vec::new();
    let mut position = index;

    while level.len() > 1 {
        let step = if position % 2 == 0 {
            // A trailing odd node is its own sibling.
            let sibling = level.get(position + 1).unwrap_or(&level[position]);
            ProofStep {
                sibling: sibling.clone(),
                side: Side::Right,
            }
        } else {
            ProofStep {
                sibling: level[position - 1].clone(),
                side: Side::Left,
            }
        };
        steps.push(step);
        level = next_level(&level);
        position /= 2;
    }

    Ok(MerkleProof { leaf, steps })
}

/// True when `proof` connects its leaf to `root`.
pub fn verify_proof(proof: &MerkleProof, root: &str) -> bool {
    let computed = proof.steps.iter().fold(proof.leaf.clone(), |acc, step| match step.side {
        Side::Left => parent(&step.sibling, &acc),
        Side::Right => parent(&acc, &step.sibling),
    });
    computed == root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{:064x}", i)).collect()
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let batch = leaves(1);
        assert_eq!(merkle_root(&batch).unwrap(), batch[0]);
    }

    #[test]
    fn two_leaves_hash_in_order() {
        let batch = leaves(2);
        let root = merkle_root(&batch).unwrap();
        assert_eq!(root, parent(&batch[0], &batch[1]));
        assert_ne!(root, parent(&batch[1], &batch[0]), "leaf order is significant");
    }

    #[test]
    fn odd_level_duplicates_last_node() {
        let batch = leaves(3);
        let expected = parent(&parent(&batch[0], &batch[1]), &parent(&batch[2], &batch[2]));
        assert_eq!(merkle_root(&batch).unwrap(), expected);
    }

    #[test]
    fn every_proof_verifies() {
        for n in 1..=9 {
            let batch = leaves(n);
            let root = merkle_root(&batch).unwrap();
            for i in 0..n {
                let proof = merkle_proof(&batch, i).unwrap();
                assert!(verify_proof(&proof, &root), "proof for leaf {i} of {n} must verify");
            }
        }
    }

    #[test]
    fn altered_leaf_fails_proof() {
        let batch = leaves(5);
        let root = merkle_root(&batch).unwrap();
        let mut proof = merkle_proof(&batch, 3).unwrap();
        proof.leaf = "f".repeat(64);
        assert!(!verify_proof(&proof, &root));
    }

    #[test]
    fn empty_batch_and_bad_index_rejected() {
        let none: Vec<String> = Vec::new();
        assert!(matches!(merkle_root(&none), Err(LedgerError::InvalidInput { .. })));
        assert!(matches!(merkle_proof(&leaves(2), 2), Err(LedgerError::InvalidInput { .. })));
    }
}
