// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Merging a time range of stored blobs with bounded memory.

use crate::codec::ProfileCodec;
use crate::error::{AggregationError, Result};
use profstore_protobuf as pprof;
use std::error::Error;
use tracing::{debug, trace, warn};

/// A stored, encoded snapshot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RawProfile {
    /// Nanoseconds since the epoch.
    pub timestamp: i64,
    pub data: Vec<u8>,
}

/// Groups the blobs of a sequence of series into batches of at least
/// `budget` raw bytes, in order. The last batch may be smaller.
///
/// One series is drained before the next is pulled. The first storage
/// error is yielded in place of the batch being filled, whose blobs are
/// dropped, and the iterator is fused from then on.
pub struct BatchIterator<S, P>
where
    P: IntoIterator,
{
    series: S,
    current: Option<P::IntoIter>,
    budget: usize,
    done: bool,
}

impl<S, P, E> BatchIterator<S, P>
where
    S: Iterator<Item = P>,
    P: IntoIterator<Item = std::result::Result<RawProfile, E>>,
    E: Into<Box<dyn Error + Send + Sync>>,
{
    pub fn new<I>(series: I, budget: usize) -> Self
    where
        I: IntoIterator<IntoIter = S>,
    {
        Self {
            series: series.into_iter(),
            current: None,
            budget,
            done: false,
        }
    }

    fn next_blob(&mut self) -> Option<std::result::Result<RawProfile, E>> {
        loop {
            if let Some(blob) = self.current.as_mut().and_then(Iterator::next) {
                return Some(blob);
            }
            self.current = Some(self.series.next()?.into_iter());
        }
    }
}

impl<S, P, E> Iterator for BatchIterator<S, P>
where
    S: Iterator<Item = P>,
    P: IntoIterator<Item = std::result::Result<RawProfile, E>>,
    E: Into<Box<dyn Error + Send + Sync>>,
{
    type Item = Result<Vec<RawProfile>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut batch = Vec::new();
        let mut bytes = 0usize;
        while let Some(blob) = self.next_blob() {
            match blob {
                Ok(raw) => {
                    bytes = bytes.saturating_add(raw.data.len());
                    batch.push(raw);
                    if bytes >= self.budget {
                        trace!(blobs = batch.len(), bytes, "batch full");
                        return Some(Ok(batch));
                    }
                }
                Err(err) => {
                    self.done = true;
                    let err = AggregationError::iteration(err);
                    warn!(dropped = batch.len(), %err, "storage iteration failed");
                    return Some(Err(err));
                }
            }
        }

        self.done = true;
        if batch.is_empty() {
            None
        } else {
            trace!(blobs = batch.len(), bytes, "last batch");
            Some(Ok(batch))
        }
    }
}

/// Merges every blob of `series` into one profile, holding roughly
/// `batch_bytes` of raw input at a time. The first blob seeds the result;
/// each batch is then folded into it with [ProfileCodec::merge].
///
/// Returns `Ok(None)` when there was nothing to merge. On any error the
/// partial result is discarded.
pub fn merge_range<C, I, P, E>(
    codec: &C,
    series: I,
    batch_bytes: usize,
) -> Result<Option<pprof::Profile>>
where
    C: ProfileCodec + ?Sized,
    I: IntoIterator<Item = P>,
    P: IntoIterator<Item = std::result::Result<RawProfile, E>>,
    E: Into<Box<dyn Error + Send + Sync>>,
{
    let mut merged: Option<pprof::Profile> = None;
    let mut blobs = 0usize;
    let mut batches = 0usize;

    for batch in BatchIterator::new(series, batch_bytes) {
        let batch = batch?;
        blobs += batch.len();
        batches += 1;

        let mut profiles = batch
            .iter()
            .map(|raw| codec.decode(&raw.data))
            .collect::<Result<Vec<_>>>()?;
        match merged.take() {
            Some(acc) => profiles.insert(0, acc),
            None => {
                if profiles.len() == 1 {
                    merged = profiles.pop();
                    continue;
                }
            }
        }
        debug!(batch = batches, profiles = profiles.len(), "merging batch");
        merged = Some(codec.merge(&profiles)?);
    }

    debug!(blobs, batches, merged = merged.is_some(), "range merge finished");
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PprofCodec;
    use crate::testing::ProfileBuilder;
    use std::io;

    type Blob = std::result::Result<RawProfile, io::Error>;

    fn raw(timestamp: i64, len: usize) -> Blob {
        Ok(RawProfile {
            timestamp,
            data: vec![0; len],
        })
    }

    fn sizes(batches: Vec<Result<Vec<RawProfile>>>) -> Vec<usize> {
        batches.into_iter().map(|b| b.unwrap().len()).collect()
    }

    #[test]
    fn batches_close_once_budget_is_reached() {
        let series: Vec<Vec<Blob>> = vec![(0..5).map(|t| raw(t, 1)).collect()];
        let batches: Vec<_> = BatchIterator::new(series, 2)
            .map(|batch| {
                batch
                    .unwrap()
                    .into_iter()
                    .map(|raw| raw.timestamp)
                    .collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(batches, vec![vec![0, 1], vec![2, 3], vec![4]]);
    }

    #[test]
    fn batches_span_series() {
        let series: Vec<Vec<Blob>> = vec![
            vec![raw(0, 10)],
            vec![],
            vec![raw(1, 10), raw(2, 10)],
            vec![raw(3, 30)],
        ];
        let batches: Vec<_> = BatchIterator::new(series, 20).collect();
        assert_eq!(sizes(batches), vec![2, 2]);
    }

    #[test]
    fn empty_input_yields_nothing() {
        let series: Vec<Vec<Blob>> = vec![vec![], vec![]];
        assert_eq!(BatchIterator::new(series, 20).count(), 0);
    }

    #[test]
    fn error_ends_iteration() {
        let series: Vec<Vec<Blob>> = vec![vec![
            raw(0, 10),
            raw(1, 10),
            raw(2, 10),
            Err(io::Error::other("disk gone")),
            raw(3, 10),
        ]];
        let mut batches = BatchIterator::new(series, 20);
        assert_eq!(batches.next().unwrap().unwrap().len(), 2);
        assert!(matches!(
            batches.next(),
            Some(Err(AggregationError::Iteration(_)))
        ));
        assert!(batches.next().is_none());
        assert!(batches.next().is_none());
    }

    fn encoded(frames: &[&str], value: i64) -> Blob {
        let profile = ProfileBuilder::new("cpu", "nanoseconds")
            .sample(frames, &[value])
            .build();
        Ok(RawProfile {
            timestamp: 0,
            data: PprofCodec::default().encode(&profile).unwrap(),
        })
    }

    fn total(profile: &pprof::Profile) -> i64 {
        profile.samples.iter().map(|s| s.values[0]).sum()
    }

    #[test]
    fn merge_range_folds_every_batch() {
        let series: Vec<Vec<Blob>> = vec![
            vec![encoded(&["a", "main"], 1), encoded(&["b", "main"], 2)],
            vec![encoded(&["a", "main"], 4)],
        ];
        // A budget of one byte puts every blob in its own batch.
        let merged = merge_range(&PprofCodec::default(), series, 1)
            .unwrap()
            .unwrap();
        assert_eq!(total(&merged), 7);
        assert_eq!(merged.samples.len(), 2);
    }

    #[test]
    fn merge_range_of_nothing() {
        let series: Vec<Vec<Blob>> = Vec::new();
        assert!(merge_range(&PprofCodec::default(), series, 1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn merge_range_discards_partial_result_on_error() {
        let series: Vec<Vec<Blob>> = vec![vec![
            encoded(&["a", "main"], 1),
            Ok(RawProfile {
                timestamp: 1,
                data: vec![0xff; 3],
            }),
        ]];
        let err = merge_range(&PprofCodec::default(), series, 1).unwrap_err();
        assert!(matches!(err, AggregationError::Decode(_)));
    }
}
