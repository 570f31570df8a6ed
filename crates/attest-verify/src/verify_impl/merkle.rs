//! Merkle inclusion proofs (RFC 6962 / RFC 9162 hashing)

use super::crypto::sha256;
use crate::error::{Error, Result};

pub fn leaf_hash(data: &[u8]) -> [u8; 32] {
    let mut input = Vec::with_capacity(data.len() + 1);
    input.push(0x00);
    input.extend_from_slice(data);
    sha256(&input)
}

pub fn node_hash(left: &[u8], right: &[u8]) -> [u8; 32] {
    let mut input = Vec::with_capacity(left.len() + right.len() + 1);
    input.push(0x01);
    input.extend_from_slice(left);
    input.extend_from_slice(right);
    sha256(&input)
}

/// Recompute the root from a leaf hash and its audit path
///
/// Follows the verification algorithm of RFC 9162 section 2.1.3.2.
pub fn root_from_inclusion_proof(
    index: u64,
    tree_size: u64,
    leaf: [u8; 32],
    proof: &[Vec<u8>],
) -> Result<[u8; 32]> {
    if index >= tree_size {
        return Err(Error::Verification(format!(
            "leaf index {} is outside a tree of size {}",
            index, tree_size
        )));
    }

    let mut fn_ = index;
    let mut sn = tree_size - 1;
    let mut hash = leaf;
    for sibling in proof {
        if sibling.len() != 32 {
            return Err(Error::Verification(format!(
                "inclusion proof hash has length {}",
                sibling.len()
            )));
        }
        if sn == 0 {
            return Err(Error::Verification(
                "inclusion proof is longer than the tree height".to_string(),
            ));
        }
        if fn_ & 1 == 1 || fn_ == sn {
            hash = node_hash(sibling, &hash);
            if fn_ & 1 == 0 {
                while fn_ & 1 == 0 && fn_ != 0 {
                    fn_ >>= 1;
                    sn >>= 1;
                }
            }
        } else {
            hash = node_hash(&hash, sibling);
        }
        fn_ >>= 1;
        sn >>= 1;
    }

    if sn != 0 {
        return Err(Error::Verification(
            "inclusion proof is shorter than the tree height".to_string(),
        ));
    }
    Ok(hash)
}

/// Check that `leaf_data` sits at `index` in the tree with `root`
pub fn verify_inclusion(
    index: u64,
    tree_size: u64,
    leaf_data: &[u8],
    proof: &[Vec<u8>],
    root: &[u8],
) -> Result<()> {
    let computed = root_from_inclusion_proof(index, tree_size, leaf_hash(leaf_data), proof)?;
    if computed.as_slice() != root {
        return Err(Error::Verification(format!(
            "inclusion proof root {} does not match expected {}",
            hex::encode(computed),
            hex::encode(root)
        )));
    }
    Ok(())
}
