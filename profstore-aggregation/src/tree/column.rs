// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::ops::Range;

/// One value per snapshot index, only for the indices that were written.
/// Indices are strictly increasing; an index that was never written reads
/// as zero.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SparseColumn {
    entries: Vec<(usize, i64)>,
}

impl SparseColumn {
    pub fn with_value(index: usize, value: i64) -> Self {
        Self {
            entries: vec![(index, value)],
        }
    }

    /// Appends the value for `index`.
    ///
    /// Callers guarantee `index` is greater than [Self::last_index]; the
    /// series tree checks this once per insertion, before touching any
    /// column.
    pub fn push(&mut self, index: usize, value: i64) {
        debug_assert!(self.last_index().is_none_or(|last| last < index));
        self.entries.push((index, value));
    }

    pub fn last_index(&self) -> Option<usize> {
        self.entries.last().map(|(index, _)| *index)
    }

    /// The value written at exactly `index`, if any.
    pub fn get_exact(&self, index: usize) -> Option<i64> {
        self.entries
            .binary_search_by_key(&index, |(i, _)| *i)
            .ok()
            .map(|offset| self.entries[offset].1)
    }

    #[inline]
    pub fn get(&self, index: usize) -> i64 {
        self.get_exact(index).unwrap_or(0)
    }

    /// Entries whose index falls within `range`.
    pub fn range(&self, range: Range<usize>) -> &[(usize, i64)] {
        let start = self.entries.partition_point(|(i, _)| *i < range.start);
        let end = self.entries.partition_point(|(i, _)| *i < range.end);
        &self.entries[start..end.max(start)]
    }

    pub fn sum(&self, range: Range<usize>) -> i64 {
        self.range(range)
            .iter()
            .fold(0i64, |acc, (_, value)| acc.wrapping_add(*value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, i64)> + '_ {
        self.entries.iter().copied()
    }
}
