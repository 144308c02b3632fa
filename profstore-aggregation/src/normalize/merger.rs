// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{add_values, Normalizer};
use crate::collections::identifiable::{FxIndexMap, Id};
use crate::error::{AggregationError, Result};
use crate::internal::{StackTraceKey, ValueType};
use profstore_protobuf as pprof;
use tracing::debug;

/// Accumulates any number of compatible profiles into one.
///
/// Samples with the same canonical stack and labels are summed across all
/// merged profiles, not just within one. Order of samples in the result is
/// the order their stacks were first seen.
#[derive(Clone, Debug, Default)]
pub struct Merger {
    normalizer: Normalizer,
    samples: FxIndexMap<StackTraceKey, Vec<i64>>,
    time_nanos: i64,
    duration_nanos: i64,
    period: i64,
    profiles: usize,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one profile. On error the merger is left as it was before.
    pub fn merge(&mut self, profile: &pprof::Profile) -> Result<()> {
        for sample in self.normalizer.normalize(profile)? {
            let key = StackTraceKey {
                locations: sample.locations,
                labels: sample.labels,
            };
            match self.samples.get_mut(&key) {
                Some(values) => add_values(values, &sample.values),
                None => {
                    self.samples.insert(key, sample.values);
                }
            }
        }

        if profile.time_nanos != 0 && (self.time_nanos == 0 || profile.time_nanos < self.time_nanos)
        {
            self.time_nanos = profile.time_nanos;
        }
        self.duration_nanos = self.duration_nanos.saturating_add(profile.duration_nanos);
        self.period = self.period.max(profile.period);
        self.profiles += 1;
        Ok(())
    }

    /// Number of profiles merged so far.
    pub fn len(&self) -> usize {
        self.profiles
    }

    pub fn is_empty(&self) -> bool {
        self.profiles == 0
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Builds the merged sample graph. Its ids are the canonical ids.
    ///
    /// # Errors
    /// Fails when nothing was merged, since there are no sample types to
    /// describe the result.
    pub fn finish(mut self) -> Result<pprof::Profile> {
        let Some(sample_types) = self.normalizer.sample_types().map(<[_]>::to_vec) else {
            return Err(AggregationError::Merge("no profiles were merged".into()));
        };
        let sample_types = sample_types
            .iter()
            .map(|vt| self.value_type_to_pprof(vt))
            .collect::<Result<_>>()?;
        let period_type = match self.normalizer.period().cloned() {
            Some(period) => Some(self.value_type_to_pprof(&period.typ)?),
            None => None,
        };

        let samples = self
            .samples
            .iter()
            .map(|(key, values)| pprof::Sample {
                location_ids: key.locations.iter().map(|id| id.to_raw_id()).collect(),
                values: values.clone(),
                labels: self.normalizer.label_set_to_pprof(key.labels),
            })
            .collect();

        let tables = self.normalizer.to_pprof_tables();
        debug!(
            profiles = self.profiles,
            samples = self.samples.len(),
            locations = tables.locations.len(),
            "finished merge"
        );
        Ok(pprof::Profile {
            sample_types,
            samples,
            mappings: tables.mappings,
            locations: tables.locations,
            functions: tables.functions,
            string_table: tables.string_table,
            time_nanos: self.time_nanos,
            duration_nanos: self.duration_nanos,
            period_type,
            period: self.period,
            ..Default::default()
        })
    }
}

impl Merger {
    fn value_type_to_pprof(&mut self, value_type: &ValueType) -> Result<pprof::ValueType> {
        Ok(pprof::ValueType {
            r#type: self.normalizer.intern_str(&value_type.typ)?.to_raw_id(),
            unit: self.normalizer.intern_str(&value_type.unit)?.to_raw_id(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ProfileBuilder;

    fn value_of(profile: &pprof::Profile, leaf: &str) -> i64 {
        profile
            .samples
            .iter()
            .filter(|sample| {
                let location = profile
                    .locations
                    .iter()
                    .find(|l| l.id == sample.location_ids[0])
                    .unwrap();
                let function = profile
                    .functions
                    .iter()
                    .find(|f| f.id == location.lines[0].function_id)
                    .unwrap();
                profile.string_table_fetch(function.name) == leaf
            })
            .map(|sample| sample.values[0])
            .sum()
    }

    #[test]
    fn merges_across_profiles() {
        let a = ProfileBuilder::new("cpu", "nanoseconds")
            .period("cpu", "nanoseconds", 10)
            .time(2_000, 10)
            .sample(&["work", "main"], &[1])
            .build();
        let b = ProfileBuilder::new("cpu", "nanoseconds")
            .period("cpu", "nanoseconds", 20)
            .time(1_000, 5)
            .sample(&["work", "main"], &[1])
            .sample(&["idle", "main"], &[1])
            .build();

        let mut merger = Merger::new();
        merger.merge(&a).unwrap();
        merger.merge(&b).unwrap();
        assert_eq!(merger.len(), 2);

        let merged = merger.finish().unwrap();
        assert_eq!(merged.samples.len(), 2);
        assert_eq!(value_of(&merged, "work"), 2);
        assert_eq!(value_of(&merged, "idle"), 1);
        assert_eq!(merged.time_nanos, 1_000);
        assert_eq!(merged.duration_nanos, 15);
        assert_eq!(merged.period, 20);
        assert_eq!(merged.string_table_fetch(merged.sample_types[0].r#type), "cpu");
        assert!(merged.period_type.is_some());
    }

    #[test]
    fn finished_profile_normalizes_back() {
        let a = ProfileBuilder::new("samples", "count")
            .labeled_sample(&["work", "main"], &[3], &[("thread", "1")])
            .build();

        let mut merger = Merger::new();
        merger.merge(&a).unwrap();
        let merged = merger.finish().unwrap();

        let mut again = Merger::new();
        again.merge(&merged).unwrap();
        let twice = again.finish().unwrap();
        assert_eq!(twice.samples, merged.samples);
        assert_eq!(twice.samples[0].labels.len(), 1);
    }

    #[test]
    fn failed_merge_keeps_previous_state() {
        let a = ProfileBuilder::new("samples", "count")
            .sample(&["main"], &[1])
            .build();
        let b = ProfileBuilder::new("alloc_space", "bytes")
            .sample(&["main"], &[1])
            .build();

        let mut merger = Merger::new();
        merger.merge(&a).unwrap();
        assert!(merger.merge(&b).is_err());
        assert_eq!(merger.len(), 1);
        assert_eq!(value_of(&merger.finish().unwrap(), "main"), 1);
    }

    #[test]
    fn empty_merger_cannot_finish() {
        assert!(matches!(
            Merger::new().finish(),
            Err(AggregationError::Merge(_))
        ));
    }
}
