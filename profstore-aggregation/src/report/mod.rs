// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Renders an aggregated tree for API responses.

mod flamegraph;
mod format;
mod top;

pub use flamegraph::*;
pub use format::*;
pub use top::*;

use crate::collections::identifiable::FxHashMap;
use crate::config::ReportOptions;
use crate::error::{AggregationError, Result};
use crate::internal::{LocationId, ValueType};
use crate::normalize::Normalizer;
use crate::series::Series;
use crate::tree::{ProfileTree, TreeNode, ROOT_LOCATION_ID};
use profstore_protobuf as pprof;
use serde::Serialize;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

const ROOT_NAME: &str = "root";

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProfileMeta {
    pub period_type: Option<ValueType>,
    pub period: i64,
    /// The sample type the tree was built from.
    pub sample_type: ValueType,
    pub time_nanos: i64,
    pub duration_nanos: i64,
}

#[derive(Clone, Debug, PartialEq)]
struct Frame {
    name: String,
    inlined: bool,
}

/// A tree plus what a report needs to describe it: frame names and the
/// profile's metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregatedProfile {
    pub tree: ProfileTree,
    pub meta: ProfileMeta,
    frames: FxHashMap<u64, Frame>,
}

impl AggregatedProfile {
    /// Builds the tree of a decoded profile from the values at
    /// `sample_index`.
    pub fn from_pprof(profile: &pprof::Profile, sample_index: usize) -> Result<Self> {
        if sample_index >= profile.sample_types.len() {
            return Err(AggregationError::malformed(format!(
                "sample index {sample_index} out of range for {} sample types",
                profile.sample_types.len()
            )));
        }
        let mut normalizer = Normalizer::new();
        let samples = normalizer.normalize(profile)?;
        let tree = ProfileTree::from_samples(&samples, sample_index);
        let meta = ProfileMeta {
            time_nanos: profile.time_nanos,
            duration_nanos: profile.duration_nanos,
            ..meta_of(&normalizer, sample_index)
        };
        Ok(Self::new(tree, meta, &normalizer))
    }

    /// Sums the snapshots of `series` in `range`.
    pub fn from_series(series: &Series, range: Range<usize>) -> Self {
        let (time_nanos, duration_nanos) = series.time_span(range.clone());
        let tree = series.aggregate(range);
        let meta = ProfileMeta {
            time_nanos,
            duration_nanos,
            ..meta_of(series.normalizer(), series.sample_index())
        };
        Self::new(tree, meta, series.normalizer())
    }

    fn new(tree: ProfileTree, meta: ProfileMeta, normalizer: &Normalizer) -> Self {
        let mut frames = FxHashMap::default();
        tree.for_each(|node, _| {
            let id = node.location_id();
            if id == ROOT_LOCATION_ID || frames.contains_key(&id) {
                return;
            }
            if let Some(location) = LocationId::from_raw(id) {
                frames.insert(
                    id,
                    Frame {
                        name: normalizer.frame_name(location),
                        inlined: normalizer.is_inlined(location),
                    },
                );
            }
        });
        Self { tree, meta, frames }
    }

    pub fn frame_name(&self, location_id: u64) -> &str {
        if location_id == ROOT_LOCATION_ID {
            return ROOT_NAME;
        }
        self.frames
            .get(&location_id)
            .map(|frame| frame.name.as_str())
            .unwrap_or_default()
    }

    pub fn is_inlined(&self, location_id: u64) -> bool {
        self.frames
            .get(&location_id)
            .is_some_and(|frame| frame.inlined)
    }
}

fn meta_of(normalizer: &Normalizer, sample_index: usize) -> ProfileMeta {
    let period = normalizer.period();
    ProfileMeta {
        period_type: period.map(|p| p.typ.clone()),
        period: period.map(|p| p.value).unwrap_or_default(),
        sample_type: normalizer
            .sample_types()
            .and_then(|types| types.get(sample_index))
            .cloned()
            .unwrap_or_default(),
        time_nanos: 0,
        duration_nanos: 0,
    }
}

/// Summary of a profile without its tree.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Meta {
    #[serde(flatten)]
    pub meta: ProfileMeta,
    pub total: i64,
    pub total_formatted: String,
}

pub fn meta(profile: &AggregatedProfile) -> Meta {
    let total = profile.tree.total();
    Meta {
        meta: profile.meta.clone(),
        total,
        total_formatted: format_value(total, &profile.meta.sample_type.unit),
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReportKind {
    Meta,
    Top,
    Flamegraph,
}

impl FromStr for ReportKind {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "meta" => Ok(Self::Meta),
            "top" => Ok(Self::Top),
            "flamegraph" => Ok(Self::Flamegraph),
            other => Err(AggregationError::UnknownReportKind(other.to_string())),
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Meta => "meta",
            Self::Top => "top",
            Self::Flamegraph => "flamegraph",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Report {
    Meta(Meta),
    Top(Top),
    Flamegraph(Flamegraph),
}

impl Report {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

pub fn generate_report(
    profile: &AggregatedProfile,
    kind: ReportKind,
    options: &ReportOptions,
) -> Report {
    match kind {
        ReportKind::Meta => Report::Meta(meta(profile)),
        ReportKind::Top => Report::Top(top(profile, options)),
        ReportKind::Flamegraph => Report::Flamegraph(flamegraph(profile, options)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ProfileBuilder;

    fn heap() -> pprof::Profile {
        ProfileBuilder::new("alloc_objects", "count")
            .sample_type("alloc_space", "bytes")
            .period("space", "bytes", 524_288)
            .time(1_700_000_000_000_000_000, 60_000_000_000)
            .sample(&["malloc", "main"], &[3, 3072])
            .build()
    }

    #[test]
    fn report_kind_parses() {
        assert_eq!("top".parse::<ReportKind>().unwrap(), ReportKind::Top);
        assert_eq!(ReportKind::Flamegraph.to_string(), "flamegraph");
        assert!(matches!(
            "svg".parse::<ReportKind>(),
            Err(AggregationError::UnknownReportKind(kind)) if kind == "svg"
        ));
    }

    #[test]
    fn meta_uses_selected_sample_type() {
        let profile = AggregatedProfile::from_pprof(&heap(), 1).unwrap();
        let json = generate_report(&profile, ReportKind::Meta, &ReportOptions::default())
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["kind"], "meta");
        assert_eq!(value["sample_type"]["type"], "alloc_space");
        assert_eq!(value["period_type"]["unit"], "bytes");
        assert_eq!(value["period"], 524_288);
        assert_eq!(value["total"], 3072);
        assert_eq!(value["total_formatted"], "3.00kB");
        assert_eq!(value["duration_nanos"], 60_000_000_000i64);
    }

    #[test]
    fn sample_index_out_of_range() {
        assert!(matches!(
            AggregatedProfile::from_pprof(&heap(), 2),
            Err(AggregationError::MalformedProfile(_))
        ));
    }

    #[test]
    fn reports_are_deterministic() {
        let profile = AggregatedProfile::from_pprof(&heap(), 0).unwrap();
        let options = ReportOptions::default();
        for kind in [ReportKind::Meta, ReportKind::Top, ReportKind::Flamegraph] {
            let a = generate_report(&profile, kind, &options).to_json().unwrap();
            let b = generate_report(&profile.clone(), kind, &options)
                .to_json()
                .unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn series_range_report() {
        let mut series = Series::default();
        for value in [1, 2, 4] {
            let snapshot = ProfileBuilder::new("samples", "count")
                .time(value * 1_000, 10)
                .sample(&["work", "main"], &[value])
                .build();
            series.append(&snapshot).unwrap();
        }
        let profile = AggregatedProfile::from_series(&series, 1..3);
        assert_eq!(profile.tree.total(), 6);
        assert_eq!(profile.meta.time_nanos, 2_000);
        assert_eq!(profile.meta.duration_nanos, 20);

        let Report::Top(top) = generate_report(&profile, ReportKind::Top, &ReportOptions::default())
        else {
            panic!("expected a top report");
        };
        assert_eq!(top.rows[0].name, "work");
        assert_eq!(top.rows[0].flat, 6);
    }
}
