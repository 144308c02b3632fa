// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::*;
use std::cmp::Ordering;

/// Recognizes "the same stack" across samples: the canonical location path
/// plus the canonical label set. Samples sharing a key are summed.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct StackTraceKey {
    /// The ids recorded here correspond to canonical locations.
    /// The leaf is at locations\[0\].
    pub locations: Box<[LocationId]>,
    pub labels: LabelSetId,
}

/// Orders two leaf-first location paths starting from their root end, the
/// same direction a tree insertion walks them. A path that is a root-side
/// prefix of another sorts first.
pub fn cmp_root_first(a: &[LocationId], b: &[LocationId]) -> Ordering {
    a.iter().rev().cmp(b.iter().rev())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(ids: &[usize]) -> Vec<LocationId> {
        ids.iter().map(|id| LocationId::from_offset(*id)).collect()
    }

    #[test]
    fn compares_from_the_root() {
        // leaf-first: [leaf, .., root]
        let a = path(&[5, 1]);
        let b = path(&[0, 2]);
        assert_eq!(cmp_root_first(&a, &b), Ordering::Less);

        let c = path(&[0, 1]);
        assert_eq!(cmp_root_first(&c, &a), Ordering::Less);
    }

    #[test]
    fn root_side_prefix_sorts_first() {
        let short = path(&[1]);
        let long = path(&[7, 1]);
        assert_eq!(cmp_root_first(&short, &long), Ordering::Less);
        assert_eq!(cmp_root_first(&long, &short), Ordering::Greater);
        assert_eq!(cmp_root_first(&long, &long), Ordering::Equal);
    }
}
