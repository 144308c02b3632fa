// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use std::fmt;

/// A sample or period type held as owned strings, independent of any string
/// table, so it can be compared across profiles.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize)]
pub struct ValueType {
    #[serde(rename = "type")]
    pub typ: Box<str>,
    pub unit: Box<str>,
}

impl ValueType {
    pub fn new(typ: &str, unit: &str) -> Self {
        Self {
            typ: typ.into(),
            unit: unit.into(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.typ, self.unit)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Period {
    #[serde(rename = "type")]
    pub typ: ValueType,
    pub value: i64,
}
