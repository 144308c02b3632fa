// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Aggregation engine for continuous profiling.
//!
//! Snapshots arrive as pprof sample graphs. The [normalize] module maps
//! them onto canonical tables, [tree] folds them into call trees, [series]
//! keeps a per-series history of them, [merge] combines a stored range with
//! bounded memory, and [report] renders the result.

pub mod codec;
pub mod collections;
pub mod config;
pub mod error;
pub mod internal;
pub mod merge;
pub mod normalize;
pub mod report;
pub mod series;
pub mod testing;
pub mod tree;

pub use codec::{Compression, PprofCodec, ProfileCodec};
pub use config::AggregationConfig;
pub use error::{AggregationError, Result};
pub use merge::{merge_range, BatchIterator, RawProfile};
pub use series::Series;
