// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::codec::Compression;
use serde::Deserialize;

/// Batches handed to the codec merge stop growing once they hold this many
/// raw bytes.
pub const DEFAULT_MERGE_BATCH_BYTES: usize = 16 * 1024 * 1024;

/// Same defaults as `pprof -nodecount` and `-nodefraction`.
pub const DEFAULT_NODE_COUNT: usize = 80;
pub const DEFAULT_NODE_FRACTION: f64 = 0.005;

/// Everything the engine can be tuned with. Deserializable so an embedding
/// service can read it from its own config file; every field has a default.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct AggregationConfig {
    pub merge_batch_bytes: usize,
    /// Compression of blobs produced by merges.
    pub compression: Compression,
    pub series: SeriesOptions,
    pub report: ReportOptions,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            merge_batch_bytes: DEFAULT_MERGE_BATCH_BYTES,
            compression: Compression::default(),
            series: SeriesOptions::default(),
            report: ReportOptions::default(),
        }
    }
}

impl AggregationConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeriesOptions {
    /// Which slot of each sample's value vector the series tree records.
    pub sample_index: usize,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportOptions {
    /// Rows kept by the top report.
    pub node_count: usize,
    /// Flamegraph nodes whose cumulative value is below this fraction of the
    /// total are pruned along with their subtree.
    pub node_fraction: f64,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            node_count: DEFAULT_NODE_COUNT,
            node_fraction: DEFAULT_NODE_FRACTION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_default() {
        let config = AggregationConfig::from_json("{}").unwrap();
        assert_eq!(config, AggregationConfig::default());
    }

    #[test]
    fn partial_overrides() {
        let config = AggregationConfig::from_json(
            r#"{"merge_batch_bytes": 1024, "compression": "lz4", "report": {"node_count": 10}}"#,
        )
        .unwrap();
        assert_eq!(config.merge_batch_bytes, 1024);
        assert_eq!(config.compression, Compression::Lz4);
        assert_eq!(config.report.node_count, 10);
        assert_eq!(config.report.node_fraction, DEFAULT_NODE_FRACTION);
        assert_eq!(config.series.sample_index, 0);
    }
}
