// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::SeriesOptions;
use crate::error::{AggregationError, Result};
use crate::normalize::Normalizer;
use crate::tree::{ProfileTree, SeriesTree};
use profstore_protobuf as pprof;
use std::ops::Range;
use tracing::{debug, warn};

/// The in-memory history of one profile series: each appended snapshot is
/// normalized against the series' own tables and folded into a
/// [SeriesTree] at the next index.
#[derive(Clone, Debug, Default)]
pub struct Series {
    normalizer: Normalizer,
    tree: SeriesTree,
    next_index: usize,
    /// `(time_nanos, duration_nanos)` of every snapshot, by index.
    times: Vec<(i64, i64)>,
    options: SeriesOptions,
}

impl Series {
    pub fn new(options: SeriesOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Appends a snapshot and returns the index it was stored at.
    ///
    /// # Errors
    /// Fails without modifying the series when the snapshot is malformed,
    /// incompatible with earlier snapshots, or lacks the configured sample
    /// type.
    pub fn append(&mut self, profile: &pprof::Profile) -> Result<usize> {
        let sample_index = self.options.sample_index;
        if sample_index >= profile.sample_types.len() {
            warn!(
                sample_index,
                sample_types = profile.sample_types.len(),
                "rejected snapshot without the configured sample type"
            );
            return Err(AggregationError::malformed(format!(
                "sample index {sample_index} out of range for {} sample types",
                profile.sample_types.len()
            )));
        }

        let index = self.next_index;
        let samples = self
            .normalizer
            .normalize(profile)
            .inspect_err(|err| warn!(index, %err, "rejected snapshot"))?;
        let tree = ProfileTree::from_samples(&samples, sample_index);

        self.tree.insert(index, &tree)?;
        self.times.push((profile.time_nanos, profile.duration_nanos));
        self.next_index += 1;

        debug!(
            index,
            samples = samples.len(),
            total = tree.total(),
            "appended snapshot"
        );
        Ok(index)
    }

    /// Number of snapshots appended so far.
    pub fn len(&self) -> usize {
        self.next_index
    }

    pub fn is_empty(&self) -> bool {
        self.next_index == 0
    }

    pub fn profile_tree_at(&self, index: usize) -> ProfileTree {
        self.tree.profile_tree_at(index)
    }

    pub fn aggregate(&self, range: Range<usize>) -> ProfileTree {
        self.tree.aggregate(range)
    }

    /// Start time of the first snapshot in `range` and the summed duration
    /// of all of them.
    pub fn time_span(&self, range: Range<usize>) -> (i64, i64) {
        let end = range.end.min(self.times.len());
        let times = self.times.get(range.start..end).unwrap_or_default();
        let start = times.first().map(|(time, _)| *time).unwrap_or_default();
        let duration = times
            .iter()
            .fold(0i64, |acc, (_, duration)| acc.saturating_add(*duration));
        (start, duration)
    }

    pub fn sample_index(&self) -> usize {
        self.options.sample_index
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn tree(&self) -> &SeriesTree {
        &self.tree
    }
}
