// SPDX-License-Identifier: CC0-1.0

use bitcoin::taproot::{LeafVersion, TapLeafHash};
use bitcoin::Script;

use super::{ScriptLeaf, TapTree};

/// Depth-first, left-to-right iterator over the leaves of a [`TapTree`].
///
/// ```text
///        root
///       /    \
///      x      y
///     / \    / \
///    A   B  C   z
///              / \
///             D   E
/// ```
///
/// yields A, B and C at depth 2, then D and E at depth 3. This is the order
/// of the flat leaf list of `PSBT_OUT_TAP_TREE`.
///
/// The walk keeps its own stack, so arbitrarily nested trees cannot exhaust
/// the call stack.
#[derive(Debug, Clone)]
pub struct TapTreeIter<'a> {
    stack: Vec<(usize, &'a TapTree)>,
}

impl<'tr> TapTreeIter<'tr> {
    pub(super) fn from_tree(tree: &'tr TapTree) -> Self { Self { stack: vec![(0, tree)] } }
}

impl<'a> Iterator for TapTreeIter<'a> {
    type Item = TapTreeIterItem<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((depth, last)) = self.stack.pop() {
            match *last {
                TapTree::Branch(ref branch) => {
                    self.stack.push((depth + 1, branch.right()));
                    self.stack.push((depth + 1, branch.left()));
                }
                TapTree::Leaf(ref leaf) => return Some(TapTreeIterItem { leaf, depth }),
            }
        }
        None
    }
}

/// A leaf of a [`TapTree`] together with its depth.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TapTreeIterItem<'tr> {
    leaf: &'tr ScriptLeaf,
    depth: usize,
}

impl<'tr> TapTreeIterItem<'tr> {
    /// The leaf itself.
    #[inline]
    pub fn leaf(&self) -> &'tr ScriptLeaf { self.leaf }

    /// The depth of this leaf.
    ///
    /// This is useful for reconstructing the shape of the tree.
    #[inline]
    pub fn depth(&self) -> usize { self.depth }

    /// The Tapscript in the leaf.
    #[inline]
    pub fn script(&self) -> &'tr Script { self.leaf.script() }

    /// The Tapleaf version of this leaf.
    #[inline]
    pub fn leaf_version(&self) -> LeafVersion { self.leaf.leaf_version() }

    /// Computes the [`TapLeafHash`] of the leaf.
    #[inline]
    pub fn compute_tap_leaf_hash(&self) -> TapLeafHash { self.leaf.leaf_hash() }
}
