// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{TreeIterator, TreeNode, ROOT_LOCATION_ID};
use crate::normalize::NormalizedSample;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProfileTreeNode {
    location_id: u64,
    /// Only set on nodes where at least one stack ended.
    flat: Option<i64>,
    cumulative: i64,
    children: Vec<ProfileTreeNode>,
}

impl ProfileTreeNode {
    pub fn new(location_id: u64) -> Self {
        Self {
            location_id,
            flat: None,
            cumulative: 0,
            children: Vec::new(),
        }
    }

    pub(crate) fn with_values(
        location_id: u64,
        cumulative: i64,
        flat: Option<i64>,
        children: Vec<ProfileTreeNode>,
    ) -> Self {
        Self {
            location_id,
            flat,
            cumulative,
            children,
        }
    }

    #[inline]
    pub fn cumulative(&self) -> i64 {
        self.cumulative
    }

    /// Zero when no stack ended here.
    #[inline]
    pub fn flat(&self) -> i64 {
        self.flat.unwrap_or(0)
    }

    #[inline]
    pub fn flat_value(&self) -> Option<i64> {
        self.flat
    }

    /// The child [ProfileTree::insert] reaches for `location_id` from this
    /// node, if it exists.
    pub fn child_with_id(&self, location_id: u64) -> Option<&Self> {
        self.search_child(location_id)
            .ok()
            .map(|index| &self.children[index])
    }

    fn child_or_insert(&mut self, location_id: u64) -> &mut Self {
        let index = match self.search_child(location_id) {
            Ok(index) => index,
            Err(index) => {
                self.children.insert(index, Self::new(location_id));
                index
            }
        };
        &mut self.children[index]
    }
}

impl TreeNode for ProfileTreeNode {
    #[inline]
    fn location_id(&self) -> u64 {
        self.location_id
    }

    #[inline]
    fn children(&self) -> &[Self] {
        &self.children
    }
}

/// Call tree of one snapshot, for one sample type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProfileTree {
    root: ProfileTreeNode,
}

impl Default for ProfileTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileTree {
    pub fn new() -> Self {
        Self {
            root: ProfileTreeNode::new(ROOT_LOCATION_ID),
        }
    }

    pub(crate) fn from_root(root: ProfileTreeNode) -> Self {
        Self { root }
    }

    /// Builds a tree from samples at `sample_index` of their value vectors.
    pub fn from_samples(samples: &[NormalizedSample], sample_index: usize) -> Self {
        let mut tree = Self::new();
        for sample in samples {
            tree.insert(&sample.locations[..], sample.value(sample_index));
        }
        tree
    }

    /// Inserts a leaf-first path, walking it from the root frame. `value` is
    /// added to the cumulative of every node on the way, root included, and
    /// to the flat of the node the path ends at.
    pub fn insert<L>(&mut self, path: &[L], value: i64)
    where
        L: Copy + Into<u64>,
    {
        let mut node = &mut self.root;
        node.cumulative = node.cumulative.wrapping_add(value);
        for location_id in path.iter().rev() {
            node = node.child_or_insert((*location_id).into());
            node.cumulative = node.cumulative.wrapping_add(value);
        }
        let flat = node.flat.get_or_insert(0);
        *flat = flat.wrapping_add(value);
    }

    /// The node a leaf-first `path` ends at, if it was inserted.
    pub fn find<L>(&self, path: &[L]) -> Option<&ProfileTreeNode>
    where
        L: Copy + Into<u64>,
    {
        path.iter()
            .rev()
            .try_fold(&self.root, |node, id| node.child_with_id((*id).into()))
    }

    #[inline]
    pub fn root(&self) -> &ProfileTreeNode {
        &self.root
    }

    /// Root cumulative, which is the sum of every inserted value.
    #[inline]
    pub fn total(&self) -> i64 {
        self.root.cumulative
    }

    pub fn flat_total(&self) -> i64 {
        let mut total = 0i64;
        self.for_each(|node, _| total = total.wrapping_add(node.flat()));
        total
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        let mut len = 0;
        self.for_each(|_, _| len += 1);
        len
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty() && self.root.flat.is_none()
    }

    pub fn iter(&self) -> TreeIterator<'_, ProfileTreeNode> {
        TreeIterator::new(&self.root)
    }

    /// Calls `f` with every node and its depth, root first.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&ProfileTreeNode, usize),
    {
        let mut it = self.iter();
        while it.has_more() {
            if it.next_child() {
                f(it.at(), it.depth());
                it.step_into();
            } else {
                it.step_up();
            }
        }
    }
}
