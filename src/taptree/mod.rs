// SPDX-License-Identifier: CC0-1.0

//! # Taproot script trees
//!
//! Conversion between the binary script tree of a Taproot output and the
//! flat, depth annotated leaf list which PSBT outputs carry in their
//! `PSBT_OUT_TAP_TREE` field (BIP 371).
//!
//! The list holds the leaves in depth-first, left-to-right order. Turning a
//! list back into a tree inserts the leaves one after the other into a
//! partially built tree; the list is only valid if this fills every slot
//! implied by the depths exactly once.

use bitcoin::taproot::{self, LeafVersion, TapLeafHash, TapNodeHash, TaprootBuilder};
use bitcoin::{Script, ScriptBuf};

#[cfg(feature = "serde")]
use actual_serde::{Deserialize, Serialize};

use crate::Error;

mod iter;

pub use self::iter::{TapTreeIter, TapTreeIterItem};

/// Maximum depth of a Taproot script tree (BIP 341).
pub const TAPROOT_MAX_DEPTH: u8 = 128;

/// A script together with its Tapleaf version.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "actual_serde"))]
pub struct ScriptLeaf {
    script: ScriptBuf,
    leaf_version: LeafVersion,
}

impl ScriptLeaf {
    /// Creates a new leaf.
    pub fn new(script: ScriptBuf, leaf_version: LeafVersion) -> Self {
        ScriptLeaf { script, leaf_version }
    }

    /// Creates a leaf holding a BIP 342 Tapscript.
    pub fn tapscript(script: ScriptBuf) -> Self { Self::new(script, LeafVersion::TapScript) }

    /// The script of this leaf.
    pub fn script(&self) -> &Script { &self.script }

    /// The leaf version of this leaf.
    pub fn leaf_version(&self) -> LeafVersion { self.leaf_version }

    /// Computes the [`TapLeafHash`] committing to this leaf.
    pub fn leaf_hash(&self) -> TapLeafHash {
        TapLeafHash::from_script(&self.script, self.leaf_version)
    }
}

/// A complete binary Taproot script tree.
///
/// Every branch has exactly two children and no leaf sits deeper than
/// [`TAPROOT_MAX_DEPTH`]. Partially built trees only exist while decoding a
/// leaf list, see [`list_to_tree`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(crate = "actual_serde"))]
pub enum TapTree {
    /// A single script leaf.
    Leaf(ScriptLeaf),
    /// A node with a left and a right subtree.
    Branch(TapBranch),
}

/// The inner node of a [`TapTree`].
///
/// Only built through [`TapTree::combine`], which keeps track of the height.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(crate = "actual_serde"))]
pub struct TapBranch {
    left: Box<TapTree>,
    right: Box<TapTree>,
    height: u8,
}

impl TapBranch {
    /// The left subtree.
    pub fn left(&self) -> &TapTree { &self.left }

    /// The right subtree.
    pub fn right(&self) -> &TapTree { &self.right }

    /// The depth of the deepest leaf below this node, counted from it.
    pub fn height(&self) -> u8 { self.height }
}

impl TapTree {
    /// Creates a branch from two subtrees.
    ///
    /// Fails with [`Error::DepthExceeded`] if a leaf would end up deeper than
    /// [`TAPROOT_MAX_DEPTH`].
    pub fn combine(left: TapTree, right: TapTree) -> Result<Self, Error> {
        let height = checked_depth(usize::from(left.height().max(right.height())) + 1)?;
        Ok(TapTree::Branch(TapBranch { left: Box::new(left), right: Box::new(right), height }))
    }

    /// Creates a branch from children which may be missing.
    ///
    /// Trees coming from outside the crate may have holes; these are not
    /// script trees and are rejected with [`Error::NotATree`].
    pub fn branch(left: Option<TapTree>, right: Option<TapTree>) -> Result<Self, Error> {
        match (left, right) {
            (Some(left), Some(right)) => Self::combine(left, right),
            _ => Err(Error::NotATree),
        }
    }

    /// Iterates over all the leaves of the tree in depth-first preorder.
    pub fn leaves(&self) -> TapTreeIter<'_> { TapTreeIter::from_tree(self) }

    /// The depth of the deepest leaf.
    pub fn height(&self) -> u8 {
        match *self {
            TapTree::Leaf(_) => 0,
            TapTree::Branch(ref branch) => branch.height,
        }
    }

    /// Computes the Merkle root committed to by this tree.
    pub fn merkle_root(&self) -> TapNodeHash {
        // Leaves come in depth-first order, so two adjacent stack entries of
        // the same depth are always siblings.
        let mut stack: Vec<(usize, TapNodeHash)> = Vec::with_capacity(TAPROOT_MAX_DEPTH.into());
        for leaf in self.leaves() {
            let mut depth = leaf.depth();
            let mut hash = TapNodeHash::from(leaf.compute_tap_leaf_hash());
            while let Some(&(top_depth, top_hash)) = stack.last() {
                if top_depth != depth {
                    break;
                }
                stack.pop();
                hash = TapNodeHash::from_node_hashes(top_hash, hash);
                depth -= 1;
            }
            stack.push((depth, hash));
        }
        debug_assert_eq!(stack.len(), 1);
        stack.pop().map(|(_, hash)| hash).expect("a tree has at least one leaf")
    }
}

/// A leaf of the flat, depth annotated encoding of a [`TapTree`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(crate = "actual_serde"))]
pub struct FlatTapLeaf {
    /// Depth of the leaf, 0 being the root.
    pub depth: u8,
    /// Tapleaf version.
    pub leaf_version: LeafVersion,
    /// Leaf script.
    pub script: ScriptBuf,
}

impl FlatTapLeaf {
    /// Creates a flat leaf from its raw PSBT fields, checking the depth and
    /// the leaf version byte.
    pub fn from_raw(depth: u8, leaf_version: u8, script: ScriptBuf) -> Result<Self, Error> {
        if depth > TAPROOT_MAX_DEPTH {
            return Err(Error::DepthExceeded(depth.into()));
        }
        let leaf_version = LeafVersion::from_consensus(leaf_version)
            .map_err(|_| Error::InvalidLeafVersion(leaf_version))?;
        Ok(FlatTapLeaf { depth, leaf_version, script })
    }

    fn to_script_leaf(&self) -> ScriptLeaf {
        ScriptLeaf::new(self.script.clone(), self.leaf_version)
    }
}

/// Encodes a tree as its list of leaves in depth-first order.
pub fn tree_to_list(tree: &TapTree) -> Result<Vec<FlatTapLeaf>, Error> {
    tree.leaves()
        .map(|item| {
            Ok(FlatTapLeaf {
                depth: checked_depth(item.depth())?,
                leaf_version: item.leaf_version(),
                script: item.script().to_owned(),
            })
        })
        .collect()
}

/// Decodes a list of leaves into a tree.
///
/// Leaves are inserted in list order, each into the leftmost free slot at its
/// depth. A leaf without a free slot, or a slot left empty once all leaves are
/// in, makes the list [`Error::MalformedTapTree`].
pub fn list_to_tree(leaves: &[FlatTapLeaf]) -> Result<TapTree, Error> {
    if leaves.is_empty() {
        return Err(Error::NotATree);
    }
    let mut root = PartialTree::Empty;
    for leaf in leaves {
        if leaf.depth > TAPROOT_MAX_DEPTH {
            return Err(Error::DepthExceeded(leaf.depth.into()));
        }
        if !root.insert(leaf, 0) {
            log::debug!("no room for a tapleaf at depth {}", leaf.depth);
            return Err(Error::MalformedTapTree);
        }
    }
    root.complete()
}

/// Converts the `tap_tree` field of a [`bitcoin::psbt::Output`] into a flat
/// leaf list.
pub fn tap_tree_to_list(tree: &taproot::TapTree) -> Result<Vec<FlatTapLeaf>, Error> {
    tree.script_leaves()
        .map(|leaf| {
            let depth = leaf.merkle_branch().len();
            Ok(FlatTapLeaf {
                depth: checked_depth(depth)?,
                leaf_version: leaf.version(),
                script: leaf.script().to_owned(),
            })
        })
        .collect()
}

fn checked_depth(depth: usize) -> Result<u8, Error> {
    u8::try_from(depth)
        .ok()
        .filter(|depth| *depth <= TAPROOT_MAX_DEPTH)
        .ok_or(Error::DepthExceeded(depth))
}

/// Builds the `tap_tree` field of a [`bitcoin::psbt::Output`] from a flat
/// leaf list.
pub fn list_to_tap_tree(leaves: &[FlatTapLeaf]) -> Result<taproot::TapTree, Error> {
    // The builder wants strict depth-first order, so go through the tree once.
    let tree = list_to_tree(leaves)?;
    let mut builder = TaprootBuilder::new();
    for leaf in tree_to_list(&tree)? {
        builder = builder
            .add_leaf_with_ver(leaf.depth, leaf.script, leaf.leaf_version)
            .map_err(|_| Error::MalformedTapTree)?;
    }
    taproot::TapTree::try_from(builder).map_err(|_| Error::MalformedTapTree)
}

/// A tree under construction: slots which no leaf has claimed yet are
/// [`PartialTree::Empty`].
#[derive(Clone, Debug, PartialEq, Eq)]
enum PartialTree {
    Empty,
    Leaf(ScriptLeaf),
    Branch(Box<PartialTree>, Box<PartialTree>),
}

impl PartialTree {
    /// Inserts `leaf` into the leftmost free slot at `leaf.depth`, `depth`
    /// being the depth of `self`. Returns false, leaving `self` untouched,
    /// if there is no such slot.
    ///
    /// Recursion is bounded by the leaf depth, which callers cap at 128.
    fn insert(&mut self, leaf: &FlatTapLeaf, depth: u8) -> bool {
        if leaf.depth == depth {
            return match *self {
                PartialTree::Empty => {
                    *self = PartialTree::Leaf(leaf.to_script_leaf());
                    true
                }
                _ => false,
            };
        }
        match *self {
            PartialTree::Leaf(_) => false,
            PartialTree::Empty => {
                let mut left = PartialTree::Empty;
                // An empty slot above the leaf's depth always has room.
                let inserted = left.insert(leaf, depth + 1);
                *self = PartialTree::Branch(Box::new(left), Box::new(PartialTree::Empty));
                inserted
            }
            PartialTree::Branch(ref mut left, ref mut right) => {
                left.insert(leaf, depth + 1) || right.insert(leaf, depth + 1)
            }
        }
    }

    fn complete(self) -> Result<TapTree, Error> {
        match self {
            PartialTree::Empty => Err(Error::MalformedTapTree),
            PartialTree::Leaf(leaf) => Ok(TapTree::Leaf(leaf)),
            PartialTree::Branch(left, right) => {
                TapTree::combine(left.complete()?, right.complete()?)
            }
        }
    }
}
