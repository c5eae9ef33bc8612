// SPDX-License-Identifier: CC0-1.0

//! # Taproot input finalizer
//!
//! Builds the final witness of a Taproot input, either from its key-path
//! signature or from the signatures collected for one of its script leaves.
//! Signatures are not verified here.

use bitcoin::psbt::Input;
use bitcoin::taproot::TapLeafHash;
use bitcoin::Witness;

use super::{PsbtInputExt, TapLeafScript};
use crate::util::{pubkey_position_in_script, witness_to_bytes};
use crate::{Error, FinalizeError};

/// Picks the leaf of `input` to spend through.
///
/// Leaves are tried shallowest first, as the shortest control block makes the
/// cheapest witness. A leaf qualifies if at least one signature was made for
/// it and, when `leaf_hash` is given, if it is that leaf.
pub fn find_leaf_to_finalize(
    input: &Input,
    leaf_hash: Option<TapLeafHash>,
) -> Result<TapLeafScript<'_>, Error> {
    if input.tap_script_sigs.is_empty() {
        log::debug!("no tapleaf script signature to finalize with");
        return Err(Error::NoScriptSignature);
    }

    let mut leaves: Vec<TapLeafScript> = input.tap_leaf_scripts().collect();
    // Stable, so leaves of equal depth keep their map order.
    leaves.sort_by_key(|leaf| leaf.control_block.merkle_branch.len());
    leaves
        .into_iter()
        .find(|leaf| {
            let hash = leaf.leaf_hash();
            leaf_hash.map_or(true, |target| target == hash)
                && input.tap_script_sigs.keys().any(|(_, signed)| *signed == hash)
        })
        .ok_or_else(|| {
            log::debug!("no signed tapleaf matches {:?}", leaf_hash);
            Error::NoMatchingLeaf
        })
}

// A script signature and where its key appears in the leaf script.
struct PositionedSig {
    position: Option<usize>,
    signature: Vec<u8>,
}

/// The serialized signatures made for `leaf`, in witness order.
///
/// Script execution consumes the witness from the top, so the signature for
/// the key appearing last in the script comes first. Signatures whose key is
/// not found in the script go last.
pub fn sort_signatures(input: &Input, leaf: &TapLeafScript) -> Vec<Vec<u8>> {
    let leaf_hash = leaf.leaf_hash();
    let mut sigs: Vec<PositionedSig> = input
        .tap_script_sigs
        .iter()
        .filter(|((_, signed), _)| *signed == leaf_hash)
        .map(|((pubkey, _), sig)| PositionedSig {
            position: pubkey_position_in_script(pubkey, leaf.script),
            signature: sig.to_vec(),
        })
        .collect();
    sigs.sort_by(|a, b| b.position.cmp(&a.position));
    sigs.into_iter().map(|sig| sig.signature).collect()
}

/// Builds the script-path witness of the input at `index`.
///
/// The witness is the sorted signatures, then the leaf script, then the
/// control block. `leaf_hash` restricts the spend to one leaf.
pub fn finalize_witness(
    input: &Input,
    index: usize,
    leaf_hash: Option<TapLeafHash>,
) -> Result<Witness, FinalizeError> {
    let leaf =
        find_leaf_to_finalize(input, leaf_hash).map_err(|e| FinalizeError::new(index, e))?;

    let mut witness = Witness::new();
    for sig in sort_signatures(input, &leaf) {
        witness.push(sig);
    }
    witness.push(leaf.script.as_bytes());
    witness.push(leaf.control_block.serialize());
    log::trace!(
        "finalized input #{} through leaf {} with {} witness items",
        index,
        leaf.leaf_hash(),
        witness.len()
    );
    Ok(witness)
}

/// Like [`finalize_witness`], returning the consensus encoding of the
/// witness, ready to be stored as `PSBT_IN_FINAL_SCRIPTWITNESS`.
pub fn finalize(
    input: &Input,
    index: usize,
    leaf_hash: Option<TapLeafHash>,
) -> Result<Vec<u8>, FinalizeError> {
    finalize_witness(input, index, leaf_hash).map(|witness| witness_to_bytes(&witness))
}

/// Builds the key-path witness of the input at `index`: its key signature
/// alone.
pub fn finalize_key_spend(input: &Input, index: usize) -> Result<Witness, FinalizeError> {
    let sig = input
        .tap_key_sig
        .ok_or_else(|| FinalizeError::new(index, Error::NoKeySignature))?;
    log::trace!("finalized input #{} through the key path", index);
    Ok(Witness::from_slice(&[sig.to_vec()]))
}

/// Finalizes the input at `index` through the key path if it has a key
/// signature and no leaf is asked for, through the script path otherwise.
pub fn finalize_input(
    input: &Input,
    index: usize,
    leaf_hash: Option<TapLeafHash>,
) -> Result<Witness, FinalizeError> {
    match (input.tap_key_sig, leaf_hash) {
        (Some(_), None) => finalize_key_spend(input, index),
        _ => finalize_witness(input, index, leaf_hash),
    }
}
