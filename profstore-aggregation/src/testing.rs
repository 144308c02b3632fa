// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Builds small sample graphs from frame names, for tests and benchmarks.

use crate::collections::identifiable::FxIndexSet;
use profstore_protobuf as pprof;

/// Frames are given leaf first by name. Every distinct frame becomes one
/// location; a frame named `"a;b"` becomes a single location with an
/// inlined line for `a` on top of `b`.
#[derive(Clone, Debug)]
pub struct ProfileBuilder {
    strings: FxIndexSet<String>,
    sample_types: Vec<(String, String)>,
    period: Option<(String, String, i64)>,
    mapping: Option<(u64, u64, String)>,
    frames: FxIndexSet<String>,
    samples: Vec<(Vec<usize>, Vec<i64>, Vec<(String, String)>)>,
    time_nanos: i64,
    duration_nanos: i64,
}

impl ProfileBuilder {
    pub fn new(typ: &str, unit: &str) -> Self {
        let mut strings = FxIndexSet::default();
        strings.insert(String::new());
        Self {
            strings,
            sample_types: vec![(typ.to_string(), unit.to_string())],
            period: None,
            mapping: None,
            frames: FxIndexSet::default(),
            samples: Vec::new(),
            time_nanos: 0,
            duration_nanos: 0,
        }
    }

    pub fn sample_type(mut self, typ: &str, unit: &str) -> Self {
        self.sample_types.push((typ.to_string(), unit.to_string()));
        self
    }

    pub fn period(mut self, typ: &str, unit: &str, value: i64) -> Self {
        self.period = Some((typ.to_string(), unit.to_string(), value));
        self
    }

    /// All locations are placed in this mapping, 16 bytes apart.
    pub fn mapping(mut self, memory_start: u64, memory_limit: u64, filename: &str) -> Self {
        self.mapping = Some((memory_start, memory_limit, filename.to_string()));
        self
    }

    pub fn time(mut self, time_nanos: i64, duration_nanos: i64) -> Self {
        self.time_nanos = time_nanos;
        self.duration_nanos = duration_nanos;
        self
    }

    pub fn sample(self, frames: &[&str], values: &[i64]) -> Self {
        self.labeled_sample(frames, values, &[])
    }

    pub fn labeled_sample(mut self, frames: &[&str], values: &[i64], labels: &[(&str, &str)]) -> Self {
        let frames = frames
            .iter()
            .map(|frame| self.frames.insert_full(frame.to_string()).0)
            .collect();
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.samples.push((frames, values.to_vec(), labels));
        self
    }

    pub fn build(&self) -> pprof::Profile {
        let mut strings = self.strings.clone();
        let mut intern = |s: &str| strings.insert_full(s.to_string()).0 as i64;

        let sample_types = self
            .sample_types
            .iter()
            .map(|(typ, unit)| pprof::ValueType {
                r#type: intern(typ),
                unit: intern(unit),
            })
            .collect();
        let (period_type, period) = match &self.period {
            Some((typ, unit, value)) => (
                Some(pprof::ValueType {
                    r#type: intern(typ),
                    unit: intern(unit),
                }),
                *value,
            ),
            None => (None, 0),
        };

        let (mappings, base, mapping_id) = match &self.mapping {
            Some((start, limit, filename)) => (
                vec![pprof::Mapping {
                    id: 1,
                    memory_start: *start,
                    memory_limit: *limit,
                    filename: intern(filename),
                    has_functions: true,
                    ..Default::default()
                }],
                *start,
                1,
            ),
            None => (Vec::new(), 0x1000, 0),
        };

        let mut functions: FxIndexSet<String> = FxIndexSet::default();
        let mut locations = Vec::with_capacity(self.frames.len());
        for (offset, frame) in self.frames.iter().enumerate() {
            let lines = frame
                .split(';')
                .map(|name| pprof::Line {
                    function_id: functions.insert_full(name.to_string()).0 as u64 + 1,
                    line: 0,
                })
                .collect();
            locations.push(pprof::Location {
                id: offset as u64 + 1,
                mapping_id,
                address: base + 0x10 * (offset as u64 + 1),
                lines,
                is_folded: false,
            });
        }
        let functions = functions
            .iter()
            .enumerate()
            .map(|(offset, name)| pprof::Function {
                id: offset as u64 + 1,
                name: intern(name),
                ..Default::default()
            })
            .collect();

        let samples = self
            .samples
            .iter()
            .map(|(frames, values, labels)| pprof::Sample {
                location_ids: frames.iter().map(|f| *f as u64 + 1).collect(),
                values: values.clone(),
                labels: labels
                    .iter()
                    .map(|(k, v)| pprof::Label {
                        key: intern(k),
                        str: intern(v),
                        ..Default::default()
                    })
                    .collect(),
            })
            .collect();

        pprof::Profile {
            sample_types,
            samples,
            mappings,
            locations,
            functions,
            string_table: strings.into_iter().collect(),
            time_nanos: self.time_nanos,
            duration_nanos: self.duration_nanos,
            period_type,
            period,
            ..Default::default()
        }
    }
}
