// SPDX-License-Identifier: CC0-1.0

//! # Tapleaf membership
//!
//! Checks that a script leaf revealed through a control block is committed
//! to by a Taproot Merkle root.

use bitcoin::taproot::{ControlBlock, LeafVersion, TapLeafHash, TapNodeHash};
use bitcoin::Script;

/// Recomputes the Merkle root from a leaf hash and the sibling hashes of a
/// control block, from the leaf upwards.
pub fn root_from_control_block(leaf_hash: TapLeafHash, control_block: &ControlBlock) -> TapNodeHash {
    control_block
        .merkle_branch
        .iter()
        .fold(TapNodeHash::from(leaf_hash), |node, sibling| {
            TapNodeHash::from_node_hashes(node, *sibling)
        })
}

/// Whether the leaf `(script, leaf_version)` revealed by `control_block`
/// hashes up to `merkle_root`.
///
/// Without a root there is nothing to check against and the leaf is
/// accepted.
pub fn is_leaf_in_tree(
    control_block: &ControlBlock,
    script: &Script,
    leaf_version: LeafVersion,
    merkle_root: Option<TapNodeHash>,
) -> bool {
    match merkle_root {
        None => true,
        Some(root) => {
            let leaf_hash = TapLeafHash::from_script(script, leaf_version);
            root_from_control_block(leaf_hash, control_block) == root
        }
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash;
    use bitcoin::key::XOnlyPublicKey;
    use bitcoin::opcodes::all::OP_CHECKSIG;
    use bitcoin::script::Builder;
    use bitcoin::secp256k1::Secp256k1;
    use bitcoin::taproot::TaprootBuilder;
    use bitcoin::ScriptBuf;
    use core::str::FromStr;

    use super::*;

    fn pk_script(hex: &str) -> ScriptBuf {
        let pk = XOnlyPublicKey::from_str(hex).unwrap();
        Builder::new().push_x_only_key(&pk).push_opcode(OP_CHECKSIG).into_script()
    }

    #[test]
    fn two_leaf_tree() {
        let secp = Secp256k1::verification_only();
        let internal = XOnlyPublicKey::from_str(
            "f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9",
        )
        .unwrap();
        let a = pk_script("dff1d77f2a671c5f36183726db2341be58feae1da2deced843240f7b502ba659");
        let b = pk_script("dd308afec5777e13121fa72b9cc1b7cc0139715309b086c960e18fd969774eb8");
        let info = TaprootBuilder::new()
            .add_leaf(1, a.clone())
            .unwrap()
            .add_leaf(1, b.clone())
            .unwrap()
            .finalize(&secp, internal)
            .unwrap();
        let root = info.merkle_root();
        assert!(root.is_some());

        for script in [&a, &b] {
            let cb = info.control_block(&(script.clone(), LeafVersion::TapScript)).unwrap();
            assert!(is_leaf_in_tree(&cb, script, LeafVersion::TapScript, root));
            assert!(is_leaf_in_tree(&cb, script, LeafVersion::TapScript, None));
        }

        let cb = info.control_block(&(a.clone(), LeafVersion::TapScript)).unwrap();
        // Wrong leaf for the path.
        assert!(!is_leaf_in_tree(&cb, &b, LeafVersion::TapScript, root));

        let mut bytes = root.unwrap().to_byte_array();
        bytes[0] ^= 1;
        let flipped = TapNodeHash::from_byte_array(bytes);
        assert!(!is_leaf_in_tree(&cb, &a, LeafVersion::TapScript, Some(flipped)));
    }
}
