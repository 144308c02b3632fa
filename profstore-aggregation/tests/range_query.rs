// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use profstore_aggregation::config::ReportOptions;
use profstore_aggregation::report::{generate_report, AggregatedProfile, Report, ReportKind};
use profstore_aggregation::testing::ProfileBuilder;
use profstore_aggregation::{
    merge_range, AggregationConfig, AggregationError, Compression, PprofCodec, ProfileCodec,
    RawProfile, Series,
};
use std::io;

type Blob = Result<RawProfile, io::Error>;

/// Ten one-second CPU snapshots of one process, encoded with `codec`.
fn stored_series(codec: &PprofCodec, start: i64) -> Vec<Blob> {
    (0..10)
        .map(|i| {
            let mut builder = ProfileBuilder::new("cpu", "nanoseconds")
                .period("cpu", "nanoseconds", 10_000_000)
                .mapping(
                    0x40_0000 + (i as u64) * 0x10_0000,
                    0x48_0000 + (i as u64) * 0x10_0000,
                    "/srv/api",
                )
                .time(start + i * 1_000_000_000, 1_000_000_000)
                .sample(&["serve", "main"], &[10_000_000]);
            if i % 2 == 0 {
                builder = builder.sample(&["gc", "runtime"], &[20_000_000]);
            }
            let profile = builder.build();
            Ok(RawProfile {
                timestamp: profile.time_nanos,
                data: codec.encode(&profile)?,
            })
        })
        .map(|blob: Result<RawProfile, AggregationError>| blob.map_err(io::Error::other))
        .collect()
}

#[test]
fn range_merge_to_reports() {
    let config = AggregationConfig::from_json(r#"{"merge_batch_bytes": 256}"#).unwrap();
    let codec = PprofCodec::new(config.compression);
    let series = vec![stored_series(&codec, 1_000), stored_series(&codec, 5_000)];

    let merged = merge_range(&codec, series, config.merge_batch_bytes)
        .unwrap()
        .unwrap();
    assert_eq!(merged.time_nanos, 1_000);
    assert_eq!(merged.duration_nanos, 20_000_000_000);

    // Every snapshot loaded the binary at a different address; the stacks
    // still collapse onto the same locations.
    assert_eq!(merged.mappings.len(), 1);
    assert_eq!(merged.samples.len(), 2);

    let profile = AggregatedProfile::from_pprof(&merged, 0).unwrap();
    let total = 20 * 10_000_000 + 10 * 20_000_000;
    assert_eq!(profile.tree.total(), total);
    assert_eq!(profile.tree.flat_total(), total);

    let Report::Top(top) = generate_report(&profile, ReportKind::Top, &config.report) else {
        panic!("expected a top report");
    };
    assert_eq!(top.rows[0].name, "gc");
    assert_eq!(top.rows[0].flat_percent, 50.0);

    let json = generate_report(&profile, ReportKind::Flamegraph, &config.report)
        .to_json()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["kind"], "flamegraph");
    assert_eq!(value["root"]["value"], total);
    assert_eq!(value["root"]["children"][0]["name"], "main");
    assert_eq!(value["root"]["children"][1]["name"], "runtime");
}

#[test]
fn stored_and_live_paths_agree() {
    let codec = PprofCodec::new(Compression::Lz4);
    let blobs = stored_series(&codec, 0);

    let mut live = Series::default();
    for blob in &blobs {
        let raw = blob.as_ref().unwrap();
        live.append(&codec.decode(&raw.data).unwrap()).unwrap();
    }
    let merged = merge_range(&codec, vec![blobs], 1).unwrap().unwrap();

    let options = ReportOptions::default();
    let stored = AggregatedProfile::from_pprof(&merged, 0).unwrap();
    let live = AggregatedProfile::from_series(&live, 0..10);
    for kind in [ReportKind::Top, ReportKind::Flamegraph] {
        assert_eq!(
            generate_report(&stored, kind, &options).to_json().unwrap(),
            generate_report(&live, kind, &options).to_json().unwrap(),
        );
    }
}

#[test]
fn storage_failure_aborts_the_merge() {
    let codec = PprofCodec::default();
    let mut blobs = stored_series(&codec, 0);
    blobs.insert(5, Err(io::Error::other("segment missing")));

    let err = merge_range(&codec, vec![blobs], 1).unwrap_err();
    assert!(matches!(err, AggregationError::Iteration(_)));
}
