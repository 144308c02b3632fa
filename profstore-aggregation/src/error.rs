// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::internal::ValueType;
use std::io;

/// Represents errors that occur while normalizing, aggregating, merging or
/// projecting profiles. None of them are retried internally; they are all
/// reported to the immediate caller.
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    /// The incoming profile's period type or primary sample type differs
    /// from the accumulator's. Nothing was merged.
    #[error("incompatible profile: expected {expected}, found {found}")]
    IncompatibleProfile { expected: String, found: String },
    /// The incoming profile references something it doesn't define, or its
    /// sample values don't line up with its sample types. Nothing was merged.
    #[error("malformed profile: {0}")]
    MalformedProfile(String),
    /// A series tree column was written out of order.
    #[error("column {index} written after column {last}")]
    OutOfOrderIndex { last: usize, index: usize },
    #[error("failed to decode profile: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("failed to encode profile: {0}")]
    Encode(#[from] prost::EncodeError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("failed to merge profiles: {0}")]
    Merge(String),
    /// The storage sequence feeding a range merge failed.
    #[error("failed to iterate stored profiles: {0}")]
    Iteration(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("unknown report kind `{0}`")]
    UnknownReportKind(String),
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    /// A canonical table has handed out every id it can represent.
    #[error(transparent)]
    Capacity(#[from] anyhow::Error),
}

impl AggregationError {
    pub fn incompatible(expected: &ValueType, found: &ValueType) -> Self {
        Self::IncompatibleProfile {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Profiles without a period type only combine with each other.
    pub fn incompatible_period(expected: Option<&ValueType>, found: Option<&ValueType>) -> Self {
        let describe = |typ: Option<&ValueType>| match typ {
            Some(typ) => format!("period type {typ}"),
            None => String::from("no period type"),
        };
        Self::IncompatibleProfile {
            expected: describe(expected),
            found: describe(found),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedProfile(message.into())
    }

    pub fn iteration(error: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self::Iteration(error.into())
    }
}

pub type Result<T, E = AggregationError> = std::result::Result<T, E>;
