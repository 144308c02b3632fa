// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::TreeNode;

struct Frame<'a, N> {
    children: &'a [N],
    /// None until the first [TreeIterator::next_child] on this level.
    cursor: Option<usize>,
}

/// Root-first depth-first walk over any [TreeNode] tree, driven by the
/// caller so it can keep its own per-level state (a path stack, parent
/// indices) in step with the iterator:
///
/// ```
/// # use profstore_aggregation::tree::{ProfileTree, TreeIterator};
/// # let tree = ProfileTree::new();
/// let mut it = TreeIterator::new(tree.root());
/// while it.has_more() {
///     if it.next_child() {
///         let _node = it.at();
///         it.step_into();
///     } else {
///         it.step_up();
///     }
/// }
/// ```
///
/// The root itself is the single child of a synthetic holder level, so it
/// is the first node `at` returns. Siblings are visited in ascending
/// location id order.
pub struct TreeIterator<'a, N> {
    frames: Vec<Frame<'a, N>>,
}

impl<'a, N: TreeNode> TreeIterator<'a, N> {
    pub fn new(root: &'a N) -> Self {
        Self {
            frames: vec![Frame {
                children: std::slice::from_ref(root),
                cursor: None,
            }],
        }
    }

    /// False once the holder level has been stepped out of.
    #[inline]
    pub fn has_more(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Advances to the next sibling on the current level. Returns false when
    /// the level is exhausted, after which [Self::step_up] is expected.
    pub fn next_child(&mut self) -> bool {
        let Some(frame) = self.frames.last_mut() else {
            return false;
        };
        let next = frame.cursor.map_or(0, |cursor| cursor + 1);
        frame.cursor = Some(next.min(frame.children.len()));
        next < frame.children.len()
    }

    /// The node [Self::next_child] last advanced to.
    ///
    /// # Panics
    /// When called before `next_child` on this level, or after it returned
    /// false.
    #[track_caller]
    #[allow(clippy::panic)]
    pub fn at(&self) -> &'a N {
        let node = self.frames.last().and_then(|frame| {
            let cursor = frame.cursor?;
            frame.children.get(cursor)
        });
        match node {
            Some(node) => node,
            None => panic!("TreeIterator::at called without a current child"),
        }
    }

    /// Descends into the children of [Self::at].
    #[track_caller]
    pub fn step_into(&mut self) {
        let children = self.at().children();
        self.frames.push(Frame {
            children,
            cursor: None,
        });
    }

    pub fn step_up(&mut self) {
        self.frames.pop();
    }

    /// Number of real levels above the current one; 0 while visiting the
    /// root.
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ProfileTree;

    fn preorder(tree: &ProfileTree) -> Vec<(u64, usize)> {
        let mut visited = Vec::new();
        let mut it = TreeIterator::new(tree.root());
        while it.has_more() {
            if it.next_child() {
                visited.push((it.at().location_id(), it.depth()));
                it.step_into();
            } else {
                it.step_up();
            }
        }
        visited
    }

    #[test]
    fn visits_root_first_in_id_order() {
        let mut tree = ProfileTree::new();
        tree.insert(&[9u64, 1], 1);
        tree.insert(&[3u64, 1], 1);
        tree.insert(&[2u64], 1);

        assert_eq!(
            preorder(&tree),
            vec![(0, 0), (1, 1), (3, 2), (9, 2), (2, 1)]
        );
    }

    #[test]
    fn empty_tree_visits_only_the_root() {
        let tree = ProfileTree::new();
        assert_eq!(preorder(&tree), vec![(0, 0)]);
    }

    #[test]
    #[should_panic(expected = "without a current child")]
    fn at_before_next_child_panics() {
        let tree = ProfileTree::new();
        let it = TreeIterator::new(tree.root());
        it.at();
    }

    #[test]
    #[should_panic(expected = "without a current child")]
    fn at_after_exhausted_level_panics() {
        let tree = ProfileTree::new();
        let mut it = TreeIterator::new(tree.root());
        assert!(it.next_child());
        it.step_into();
        assert!(!it.next_child());
        it.at();
    }
}
