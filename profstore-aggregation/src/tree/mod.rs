// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Call trees keyed by canonical location id.
//!
//! Every tree has a synthetic root with location id 0. Children are kept
//! sorted by ascending location id, so lookups and inserts are binary
//! searches and every traversal visits siblings in the same order.

mod column;
mod iter;
mod profile;
mod series;

pub use column::*;
pub use iter::*;
pub use profile::*;
pub use series::*;

/// Location id of the synthetic root of every tree.
pub const ROOT_LOCATION_ID: u64 = 0;

/// A node of a tree that [TreeIterator] can walk.
pub trait TreeNode: Sized {
    fn location_id(&self) -> u64;

    /// Sorted by ascending [TreeNode::location_id].
    fn children(&self) -> &[Self];

    /// Index of the child with `location_id`, or where it would be inserted.
    #[inline]
    fn search_child(&self, location_id: u64) -> Result<usize, usize> {
        self.children()
            .binary_search_by_key(&location_id, TreeNode::location_id)
    }
}
