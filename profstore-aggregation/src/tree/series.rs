// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{ProfileTree, ProfileTreeNode, SparseColumn, TreeNode, ROOT_LOCATION_ID};
use crate::error::{AggregationError, Result};
use std::ops::Range;

/// A call tree whose values are columns, one slot per snapshot index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SeriesNode {
    location_id: u64,
    cumulative: SparseColumn,
    /// Created the first time a stack ends at this node.
    flat: Option<SparseColumn>,
    children: Vec<SeriesNode>,
}

impl SeriesNode {
    fn new(location_id: u64) -> Self {
        Self {
            location_id,
            cumulative: SparseColumn::default(),
            flat: None,
            children: Vec::new(),
        }
    }

    /// Copies a whole profile subtree, values landing in column `index`.
    fn from_profile(node: &ProfileTreeNode, index: usize) -> Self {
        Self {
            location_id: node.location_id(),
            cumulative: SparseColumn::with_value(index, node.cumulative()),
            flat: node
                .flat_value()
                .map(|flat| SparseColumn::with_value(index, flat)),
            children: node
                .children()
                .iter()
                .map(|child| Self::from_profile(child, index))
                .collect(),
        }
    }

    fn record(&mut self, index: usize, node: &ProfileTreeNode) {
        self.cumulative.push(index, node.cumulative());
        if let Some(flat) = node.flat_value() {
            self.flat.get_or_insert_with(SparseColumn::default).push(index, flat);
        }
    }

    pub fn cumulative(&self) -> &SparseColumn {
        &self.cumulative
    }

    pub fn flat(&self) -> Option<&SparseColumn> {
        self.flat.as_ref()
    }

    fn at(&self, index: usize) -> Option<ProfileTreeNode> {
        let cumulative = self.cumulative.get_exact(index)?;
        let flat = self.flat.as_ref().and_then(|flat| flat.get_exact(index));
        let children = self
            .children
            .iter()
            .filter_map(|child| child.at(index))
            .collect();
        Some(ProfileTreeNode::with_values(
            self.location_id,
            cumulative,
            flat,
            children,
        ))
    }

    fn sum(&self, range: &Range<usize>) -> Option<ProfileTreeNode> {
        if self.cumulative.range(range.clone()).is_empty() {
            return None;
        }
        let flat = self
            .flat
            .as_ref()
            .filter(|flat| !flat.range(range.clone()).is_empty())
            .map(|flat| flat.sum(range.clone()));
        let children = self
            .children
            .iter()
            .filter_map(|child| child.sum(range))
            .collect();
        Some(ProfileTreeNode::with_values(
            self.location_id,
            self.cumulative.sum(range.clone()),
            flat,
            children,
        ))
    }
}

impl TreeNode for SeriesNode {
    #[inline]
    fn location_id(&self) -> u64 {
        self.location_id
    }

    #[inline]
    fn children(&self) -> &[Self] {
        &self.children
    }
}

/// Every snapshot of a series folded into one tree. The shape only grows;
/// snapshot `i` is stored in column `i` of the nodes it touched.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SeriesTree {
    root: SeriesNode,
    last_index: Option<usize>,
}

impl Default for SeriesTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesTree {
    pub fn new() -> Self {
        Self {
            root: SeriesNode::new(ROOT_LOCATION_ID),
            last_index: None,
        }
    }

    /// Merges `profile` into column `index`, walking both trees level by
    /// level the way a sorted merge-join does.
    ///
    /// # Errors
    /// [AggregationError::OutOfOrderIndex] when `index` is not greater than
    /// the last inserted index. The tree is not modified.
    pub fn insert(&mut self, index: usize, profile: &ProfileTree) -> Result<()> {
        if let Some(last) = self.last_index {
            if index <= last {
                return Err(AggregationError::OutOfOrderIndex { last, index });
            }
        }
        self.last_index = Some(index);

        self.root.record(index, profile.root());
        let mut pending = vec![(&mut self.root, profile.root())];
        while let Some((series, node)) = pending.pop() {
            merge_children(series, node, index, &mut pending);
        }
        Ok(())
    }

    /// The profile tree of snapshot `index`. Nodes the snapshot didn't touch
    /// are left out.
    pub fn profile_tree_at(&self, index: usize) -> ProfileTree {
        self.root
            .at(index)
            .map(ProfileTree::from_root)
            .unwrap_or_default()
    }

    /// Sums every snapshot in `range` into one profile tree.
    pub fn aggregate(&self, range: Range<usize>) -> ProfileTree {
        self.root
            .sum(&range)
            .map(ProfileTree::from_root)
            .unwrap_or_default()
    }

    #[inline]
    pub fn root(&self) -> &SeriesNode {
        &self.root
    }

    pub fn last_index(&self) -> Option<usize> {
        self.last_index
    }
}

/// One step of the merge-join: brings `series`'s children in line with
/// `node`'s, writing column `index`, and queues the matched pairs whose
/// children still need joining.
fn merge_children<'s, 'p>(
    series: &'s mut SeriesNode,
    node: &'p ProfileTreeNode,
    index: usize,
    pending: &mut Vec<(&'s mut SeriesNode, &'p ProfileTreeNode)>,
) {
    let incoming = node.children();
    let children = &mut series.children;
    let mut matched = Vec::new();
    let mut cursor = 0;

    for (offset, child) in incoming.iter().enumerate() {
        loop {
            let Some(existing) = children.get(cursor) else {
                children.push(SeriesNode::from_profile(child, index));
                cursor += 1;
                break;
            };
            if existing.location_id < child.location_id() {
                cursor += 1;
            } else if existing.location_id > child.location_id() {
                children.insert(cursor, SeriesNode::new(child.location_id()));
            } else {
                children[cursor].record(index, child);
                matched.push((cursor, offset));
                cursor += 1;
                break;
            }
        }
    }

    let mut matched = matched.into_iter().peekable();
    for (position, existing) in children.iter_mut().enumerate() {
        let Some(&(wanted, offset)) = matched.peek() else {
            break;
        };
        if wanted == position {
            pending.push((existing, &incoming[offset]));
            matched.next();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tree(paths: &[(&[u64], i64)]) -> ProfileTree {
        let mut tree = ProfileTree::new();
        for (path, value) in paths {
            tree.insert(*path, *value);
        }
        tree
    }

    #[test]
    fn columns_follow_insert_index() {
        let mut series = SeriesTree::new();
        series.insert(0, &tree(&[(&[2, 1], 3)])).unwrap();
        series.insert(2, &tree(&[(&[3, 1], 4), (&[2, 1], 1)])).unwrap();

        let one = series.root().children();
        assert_eq!(one.len(), 1);
        let leaves: Vec<_> = one[0].children().iter().map(|c| c.location_id()).collect();
        assert_eq!(leaves, vec![2, 3]);

        let two = &one[0].children()[0];
        assert_eq!(two.cumulative().get(0), 3);
        assert_eq!(two.cumulative().get(1), 0);
        assert_eq!(two.cumulative().get(2), 1);

        let three = &one[0].children()[1];
        assert_eq!(three.cumulative().get(0), 0);
        assert_eq!(three.flat().map(|f| f.get(2)), Some(4));
        assert!(one[0].flat().is_none());
    }

    #[test]
    fn simple_merge() {
        let mut series = SeriesTree::new();
        series.insert(0, &tree(&[(&[2, 1], 2)])).unwrap();
        series.insert(1, &tree(&[(&[3, 1], 1)])).unwrap();

        let merged = series.aggregate(0..2);
        assert_eq!(merged.total(), 3);
        assert_eq!(merged.find(&[1u64]).unwrap().cumulative(), 3);
        assert_eq!(merged.find(&[2u64, 1]).unwrap().cumulative(), 2);
        assert_eq!(merged.find(&[3u64, 1]).unwrap().cumulative(), 1);
    }

    #[test]
    fn out_of_order_index_is_rejected() {
        let mut series = SeriesTree::new();
        series.insert(3, &tree(&[(&[1], 1)])).unwrap();
        let before = series.clone();

        let err = series.insert(3, &tree(&[(&[2], 1)])).unwrap_err();
        assert!(matches!(
            err,
            AggregationError::OutOfOrderIndex { last: 3, index: 3 }
        ));
        assert_eq!(series, before);
        assert!(series.insert(1, &tree(&[(&[2], 1)])).is_err());
    }

    #[test]
    fn aggregate_sums_columns() {
        let mut series = SeriesTree::new();
        series.insert(0, &tree(&[(&[2, 1], 3)])).unwrap();
        series.insert(1, &tree(&[(&[3, 1], 4)])).unwrap();
        series.insert(2, &tree(&[(&[2, 1], 1)])).unwrap();

        let all = series.aggregate(0..3);
        assert_eq!(all, tree(&[(&[2, 1], 4), (&[3, 1], 4)]));

        let tail = series.aggregate(1..3);
        assert_eq!(tail, tree(&[(&[3, 1], 4), (&[2, 1], 1)]));

        assert_eq!(series.aggregate(5..9), ProfileTree::new());
        assert_eq!(series.profile_tree_at(7), ProfileTree::new());
    }

    fn snapshots() -> impl Strategy<Value = Vec<Vec<(Vec<u64>, i64)>>> {
        prop::collection::vec(
            prop::collection::vec(
                (prop::collection::vec(1u64..6, 0..5), 0i64..100),
                0..12,
            ),
            1..6,
        )
    }

    fn build(paths: &[(Vec<u64>, i64)]) -> ProfileTree {
        let mut tree = ProfileTree::new();
        for (path, value) in paths {
            tree.insert(path.as_slice(), *value);
        }
        tree
    }

    proptest! {
        #[test]
        fn every_snapshot_comes_back_out(snapshots in snapshots()) {
            let trees: Vec<_> = snapshots.iter().map(|s| build(s)).collect();
            let mut series = SeriesTree::new();
            for (index, tree) in trees.iter().enumerate() {
                series.insert(index, tree).unwrap();
            }
            for (index, tree) in trees.iter().enumerate() {
                prop_assert_eq!(&series.profile_tree_at(index), tree);
            }
        }

        #[test]
        fn aggregate_equals_combined_inserts(snapshots in snapshots()) {
            let mut series = SeriesTree::new();
            let mut combined = ProfileTree::new();
            for (index, paths) in snapshots.iter().enumerate() {
                series.insert(index, &build(paths)).unwrap();
                for (path, value) in paths {
                    combined.insert(path.as_slice(), *value);
                }
                prop_assert_eq!(&series.aggregate(0..index + 1), &combined);
            }
        }

        #[test]
        fn merged_tree_stays_consistent(snapshots in snapshots()) {
            let mut series = SeriesTree::new();
            for (index, paths) in snapshots.iter().enumerate() {
                series.insert(index, &build(paths)).unwrap();
            }
            let merged = series.aggregate(0..snapshots.len());
            let sum: i64 = snapshots.iter().flatten().map(|(_, v)| v).sum();
            prop_assert_eq!(merged.flat_total(), sum);
            merged.for_each(|node, _| {
                let children: i64 = node.children().iter().map(|c| c.cumulative()).sum();
                assert_eq!(node.cumulative(), node.flat() + children);
            });
        }
    }
}
