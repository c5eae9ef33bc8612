// SPDX-License-Identifier: CC0-1.0

//! # Taproot fields of PSBT inputs and outputs
//!
//! Classifies inputs and outputs as Taproot or not, and validates updates to
//! their BIP 371 fields before a PSBT container merges them. Taproot fields
//! must never be mixed with the `redeem_script`, `witness_script` and
//! `bip32_derivation` fields of pre-Taproot spends.
//!
//! All checks are pure: they only read the values handed to them.

use core::fmt;
use std::collections::btree_map;

use bitcoin::key::XOnlyPublicKey;
use bitcoin::psbt::{Input, Output};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::taproot::{ControlBlock, LeafVersion, TapLeafHash, TapNodeHash, TapTweakHash};
use bitcoin::{Script, ScriptBuf};

#[cfg(feature = "serde")]
use actual_serde::{Deserialize, Serialize};

use crate::merkle::is_leaf_in_tree;
use crate::taptree::{list_to_tree, tap_tree_to_list, TapTree};
use crate::Error;

mod finalizer;
mod sigs;

pub use self::finalizer::{
    finalize, finalize_input, finalize_key_spend, finalize_witness, find_leaf_to_finalize,
    sort_signatures,
};
pub use self::sigs::{
    check_input_for_sigs, check_input_for_sigs_with, check_inputs_for_sigs,
    decode_schnorr_signature, extract_taproot_sigs, SighashPolicy, SignaturePolicy,
};

/// An update a PSBT container applies to its inputs, outputs or
/// transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "actual_serde"))]
pub enum Action {
    /// Adding an input to the transaction.
    AddInput,
    /// Adding an output to the transaction.
    AddOutput,
    /// Changing the sequence number of an input.
    SetInputSequence,
    /// Changing the transaction version.
    SetVersion,
    /// Changing the transaction lock time.
    SetLocktime,
    /// Updating the fields of an input.
    UpdateInput,
    /// Updating the fields of an output.
    UpdateOutput,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Action::AddInput => "add input",
            Action::AddOutput => "add output",
            Action::SetInputSequence => "set input sequence",
            Action::SetVersion => "set version",
            Action::SetLocktime => "set locktime",
            Action::UpdateInput => "update input",
            Action::UpdateOutput => "update output",
        })
    }
}

/// A `PSBT_IN_TAP_LEAF_SCRIPT` entry: a script leaf and the control block
/// revealing it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TapLeafScript<'a> {
    /// Control block proving the leaf is part of the tree.
    pub control_block: &'a ControlBlock,
    /// Leaf script.
    pub script: &'a Script,
    /// Leaf version.
    pub leaf_version: LeafVersion,
}

impl<'a> TapLeafScript<'a> {
    /// Computes the [`TapLeafHash`] of the leaf.
    pub fn leaf_hash(&self) -> TapLeafHash {
        TapLeafHash::from_script(self.script, self.leaf_version)
    }

    /// Whether the leaf hashes up to `merkle_root`; see [`is_leaf_in_tree`].
    pub fn is_in_tree(&self, merkle_root: Option<TapNodeHash>) -> bool {
        is_leaf_in_tree(self.control_block, self.script, self.leaf_version, merkle_root)
    }
}

/// Iterator over the [`TapLeafScript`]s of an input.
#[derive(Clone, Debug)]
pub struct TapLeafScripts<'a> {
    inner: btree_map::Iter<'a, ControlBlock, (ScriptBuf, LeafVersion)>,
}

impl<'a> Iterator for TapLeafScripts<'a> {
    type Item = TapLeafScript<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(control_block, (script, leaf_version))| TapLeafScript {
            control_block,
            script: script.as_script(),
            leaf_version: *leaf_version,
        })
    }
}

/// Inputs and outputs both carry the pre-Taproot fields.
pub trait NonTaprootFields {
    /// Whether a `redeem_script`, `witness_script` or `bip32_derivation` is
    /// set.
    fn has_non_taproot_fields(&self) -> bool;
}

impl NonTaprootFields for Input {
    fn has_non_taproot_fields(&self) -> bool {
        self.redeem_script.is_some()
            || self.witness_script.is_some()
            || !self.bip32_derivation.is_empty()
    }
}

impl NonTaprootFields for Output {
    fn has_non_taproot_fields(&self) -> bool {
        self.redeem_script.is_some()
            || self.witness_script.is_some()
            || !self.bip32_derivation.is_empty()
    }
}

/// Taproot related queries on a [`bitcoin::psbt::Input`].
pub trait PsbtInputExt: NonTaprootFields {
    /// Whether any Taproot field is set, or the spent output is Taproot.
    fn is_taproot(&self) -> bool;

    /// The `PSBT_IN_TAP_LEAF_SCRIPT` entries of this input.
    fn tap_leaf_scripts(&self) -> TapLeafScripts<'_>;
}

impl PsbtInputExt for Input {
    fn is_taproot(&self) -> bool {
        self.tap_internal_key.is_some()
            || self.tap_merkle_root.is_some()
            || !self.tap_scripts.is_empty()
            || !self.tap_key_origins.is_empty()
            || self.witness_utxo.as_ref().map_or(false, |utxo| utxo.script_pubkey.is_p2tr())
    }

    fn tap_leaf_scripts(&self) -> TapLeafScripts<'_> {
        TapLeafScripts { inner: self.tap_scripts.iter() }
    }
}

/// Taproot related queries on a [`bitcoin::psbt::Output`].
///
/// The script of an output lives in the unsigned transaction rather than in
/// the output map, so it is passed in where it matters.
pub trait PsbtOutputExt: NonTaprootFields {
    /// Whether any Taproot field is set, or `script_pubkey` is Taproot.
    fn is_taproot(&self, script_pubkey: Option<&Script>) -> bool;
}

impl PsbtOutputExt for Output {
    fn is_taproot(&self, script_pubkey: Option<&Script>) -> bool {
        self.tap_internal_key.is_some()
            || self.tap_tree.is_some()
            || !self.tap_key_origins.is_empty()
            || script_pubkey.map_or(false, Script::is_p2tr)
    }
}

/// Whether `input` is Taproot shaped.
pub fn is_taproot_input(input: &Input) -> bool { input.is_taproot() }

/// Whether `output`, whose script may be given, is Taproot shaped.
pub fn is_taproot_output(output: &Output, script_pubkey: Option<&Script>) -> bool {
    output.is_taproot(script_pubkey)
}

/// Whether an input or output has any pre-Taproot field set.
pub fn has_non_taproot_fields<T: NonTaprootFields>(io: &T) -> bool { io.has_non_taproot_fields() }

/// Validates merging the input fields `new` into `old`.
///
/// Fails with [`Error::MixedFields`] if the merge would put Taproot and
/// pre-Taproot fields on the same input. Passing the same input as `old` and
/// `new` checks that input on its own.
///
/// Then every revealed leaf must belong to the committed tree. The Merkle
/// root of `new` takes precedence and is checked against the leaves of both
/// inputs; otherwise the root of `old` is checked against the new leaves only,
/// the old ones having been checked when they were added.
pub fn check_taproot_input_fields(old: &Input, new: &Input, action: Action) -> Result<(), Error> {
    let bad_taproot_update = old.is_taproot() && new.has_non_taproot_fields();
    let bad_non_taproot_update = old.has_non_taproot_fields() && new.is_taproot();
    if bad_taproot_update || bad_non_taproot_update {
        log::debug!("rejecting {}: mixed Taproot and non-Taproot input fields", action);
        return Err(Error::MixedFields { action });
    }

    let leaves_in_tree = match (new.tap_merkle_root, old.tap_merkle_root) {
        (Some(root), _) => {
            new.tap_leaf_scripts().all(|leaf| leaf.is_in_tree(Some(root)))
                && old.tap_leaf_scripts().all(|leaf| leaf.is_in_tree(Some(root)))
        }
        (None, Some(root)) => new.tap_leaf_scripts().all(|leaf| leaf.is_in_tree(Some(root))),
        (None, None) => true,
    };
    if !leaves_in_tree {
        log::debug!("rejecting {}: tapleaf does not match the Merkle root", action);
        return Err(Error::LeafNotInTree { action });
    }
    Ok(())
}

/// Validates merging the output fields `new` into `old`, for an output
/// whose script may already be known.
///
/// Fails with [`Error::MixedFields`] on mixed Taproot and pre-Taproot
/// fields, then runs [`check_taproot_script_pubkey`].
pub fn check_taproot_output_fields(
    old: &Output,
    new: &Output,
    script_pubkey: Option<&Script>,
    action: Action,
) -> Result<(), Error> {
    let bad_taproot_update = old.is_taproot(None) && new.has_non_taproot_fields();
    let bad_non_taproot_update = old.has_non_taproot_fields() && new.is_taproot(None);
    if bad_taproot_update || bad_non_taproot_update {
        log::debug!("rejecting {}: mixed Taproot and non-Taproot output fields", action);
        return Err(Error::MixedFields { action });
    }
    check_taproot_script_pubkey(old, new, script_pubkey)
}

/// Checks that the internal key and tree of the merged output (`new`
/// overriding `old`) commit to `script_pubkey`.
///
/// Nothing is checked unless `new` sets the internal key or the tree, and
/// the merged output has an internal key.
pub fn check_taproot_script_pubkey(
    old: &Output,
    new: &Output,
    script_pubkey: Option<&Script>,
) -> Result<(), Error> {
    if new.tap_internal_key.is_none() && new.tap_tree.is_none() {
        return Ok(());
    }
    let internal_key = match new.tap_internal_key.or(old.tap_internal_key) {
        Some(key) => key,
        None => return Ok(()),
    };
    let tree = match new.tap_tree.as_ref().or(old.tap_tree.as_ref()) {
        Some(tap_tree) => Some(list_to_tree(&tap_tree_to_list(tap_tree)?)?),
        None => None,
    };
    let expected = taproot_output_script(internal_key, tree.as_ref());
    match script_pubkey {
        Some(script) if script != expected.as_script() => {
            log::debug!("output script {} does not match Taproot script {}", script, expected);
            Err(Error::ScriptMismatch { expected, got: script.to_owned() })
        }
        _ => Ok(()),
    }
}

/// Builds the Taproot output script for an internal key and an optional
/// script tree.
pub fn taproot_output_script(internal_key: XOnlyPublicKey, tree: Option<&TapTree>) -> ScriptBuf {
    let secp = Secp256k1::verification_only();
    ScriptBuf::new_p2tr(&secp, internal_key, tree.map(TapTree::merkle_root))
}

/// Tweaks the internal key of the input at `index` with its Merkle root,
/// returning the x-only output key.
pub fn tweak_internal_pubkey(index: usize, input: &Input) -> Result<XOnlyPublicKey, Error> {
    let internal_key =
        input.tap_internal_key.ok_or(Error::CannotTweak { index, internal_key: None })?;
    let tweak = TapTweakHash::from_key_and_tweak(internal_key, input.tap_merkle_root).to_scalar();
    let secp = Secp256k1::verification_only();
    internal_key
        .add_tweak(&secp, &tweak)
        .map(|(output_key, _parity)| output_key)
        .map_err(|_| Error::CannotTweak { index, internal_key: Some(internal_key) })
}
