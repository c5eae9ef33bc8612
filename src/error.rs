// SPDX-License-Identifier: CC0-1.0

//! Errors

use core::fmt;
use std::error;

use bitcoin::key::XOnlyPublicKey;
use bitcoin::ScriptBuf;

use crate::psbt::Action;

/// An error raised while converting, checking or finalizing the Taproot
/// fields of a PSBT input or output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The value handed over as a script tree is not a well-formed tree,
    /// e.g. an empty leaf list.
    NotATree,
    /// The flat leaf list does not describe a complete binary tree: a leaf
    /// found no free slot at its depth, or some slot was left empty.
    MalformedTapTree,
    /// A leaf sits deeper than the 128 levels allowed by BIP 341.
    DepthExceeded(usize),
    /// A leaf version byte which is not a valid Taproot leaf version.
    InvalidLeafVersion(u8),
    /// Taproot and non-Taproot fields were mixed on an input or output.
    MixedFields {
        /// The update which tried to mix the fields.
        action: Action,
    },
    /// A revealed script leaf does not hash up to the committed Merkle root.
    LeafNotInTree {
        /// The update which carried the leaf.
        action: Action,
    },
    /// The Taproot output script rebuilt from the internal key and tree does
    /// not match the script already set on the output.
    ScriptMismatch {
        /// Script rebuilt from the Taproot fields.
        expected: ScriptBuf,
        /// Script set on the output.
        got: ScriptBuf,
    },
    /// The input carries no Tapscript signature at all.
    NoScriptSignature,
    /// No Tapscript leaf of the input has a matching signature.
    NoMatchingLeaf,
    /// The input has no key-path signature to finalize with.
    NoKeySignature,
    /// The Taproot internal key is missing or could not be tweaked.
    CannotTweak {
        /// Input index.
        index: usize,
        /// The internal key, if any was set.
        internal_key: Option<XOnlyPublicKey>,
    },
    /// A Schnorr signature with a length other than 64 or 65 bytes.
    InvalidSignatureLength(usize),
    /// The signature bytes do not encode a Schnorr signature.
    InvalidSignature,
    /// A signature on one of the inputs forbids the requested update.
    SignaturesExist {
        /// Index of the first input holding a blocking signature.
        index: usize,
        /// The update which was refused.
        action: Action,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::NotATree => f.write_str("value is not a Taproot script tree"),
            Error::MalformedTapTree => {
                f.write_str("leaf depths do not describe a complete binary tree")
            }
            Error::DepthExceeded(depth) => {
                write!(f, "Taproot tree depth {} exceeds the maximum of 128", depth)
            }
            Error::InvalidLeafVersion(v) => write!(f, "invalid Taproot leaf version {:#04x}", v),
            Error::MixedFields { action } => {
                write!(f, "cannot use both Taproot and non-Taproot fields ({})", action)
            }
            Error::LeafNotInTree { action } => {
                write!(f, "invalid Taproot Merkle root for {}", action)
            }
            Error::ScriptMismatch { ref expected, ref got } => write!(
                f,
                "output script {} does not match the Taproot script {}",
                got, expected
            ),
            Error::NoScriptSignature => f.write_str("no tapleaf script signature provided"),
            Error::NoMatchingLeaf => f.write_str("signature for tapleaf script not found"),
            Error::NoKeySignature => f.write_str("no Taproot key-path signature provided"),
            Error::CannotTweak { index, internal_key: Some(ref key) } => write!(
                f,
                "cannot tweak Taproot internal key {} for input #{}",
                key, index
            ),
            Error::CannotTweak { index, internal_key: None } => {
                write!(f, "no Taproot internal key to tweak for input #{}", index)
            }
            Error::InvalidSignatureLength(len) => {
                write!(f, "Schnorr signature has {} bytes, expected 64 or 65", len)
            }
            Error::InvalidSignature => f.write_str("invalid Schnorr signature"),
            Error::SignaturesExist { index, action } => write!(
                f,
                "cannot {} (input #{} carries a signature which forbids it)",
                action, index
            ),
        }
    }
}

impl error::Error for Error {}

/// Failure to finalize a single PSBT input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeError {
    /// The input which could not be finalized.
    pub index: usize,
    /// The underlying reason.
    pub error: Error,
}

impl FinalizeError {
    pub(crate) fn new(index: usize, error: Error) -> Self { FinalizeError { index, error } }
}

impl fmt::Display for FinalizeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "cannot finalize Taproot input #{}: {}", self.index, self.error)
    }
}

impl error::Error for FinalizeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> { Some(&self.error) }
}
