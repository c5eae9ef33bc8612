// SPDX-License-Identifier: CC0-1.0

//! # Taproot PSBT
//!
//! Support for the Taproot fields of Partially Signed Bitcoin Transactions,
//! as defined in BIP 371.
//!
//! The library is built from small, pure pieces which a PSBT container calls
//! while it merges updates and finalizes inputs:
//!
//! * [`taptree`] converts between a binary Taproot script tree and the flat,
//!   depth annotated leaf list stored in `PSBT_OUT_TAP_TREE`.
//! * [`merkle`] checks that a revealed script leaf hashes up to a Merkle root.
//! * [`psbt`] classifies inputs and outputs as Taproot or not, validates field
//!   updates, extracts Schnorr signatures, decides whether they forbid a
//!   change to the transaction, and builds final witnesses.
//!
//! None of these functions verify signatures; that is the job of whoever
//! produced them.
//!
//! Only Taproot inputs are looked at when deciding whether signatures forbid
//! an update. Partial signatures of pre-Taproot inputs are left to the PSBT
//! container.
//!
//! ## Example: finalizing a key-path spend
//!
//! ```rust
//! use taproot_psbt::bitcoin::psbt::Input;
//! use taproot_psbt::psbt::finalize_input;
//!
//! // An input without any signature cannot be finalized.
//! let input = Input::default();
//! let err = finalize_input(&input, 0, None).unwrap_err();
//! assert_eq!(err.index, 0);
//! ```
//!

// Coding conventions
#![deny(unsafe_code)]
#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(missing_docs)]

pub extern crate bitcoin;
#[cfg(feature = "serde")]
pub extern crate actual_serde as serde;

mod error;
pub mod merkle;
pub mod psbt;
pub mod taptree;
mod util;

pub use crate::error::{Error, FinalizeError};
pub use crate::merkle::is_leaf_in_tree;
pub use crate::psbt::{
    check_taproot_input_fields, check_taproot_output_fields, is_taproot_input,
    is_taproot_output, Action, PsbtInputExt, PsbtOutputExt,
};
pub use crate::taptree::{list_to_tree, tree_to_list, FlatTapLeaf, ScriptLeaf, TapTree};
