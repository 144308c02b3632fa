// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Canonical, deduplicated entities. Everything here is owned by a
//! [crate::normalize::Normalizer] and referenced by its ids.

mod function;
mod label;
mod location;
mod mapping;
mod stack_trace;
mod value_type;

pub use function::*;
pub use label::*;
pub use location::*;
pub use mapping::*;
pub use stack_trace::*;
pub use value_type::*;

use crate::collections::identifiable::*;
use profstore_protobuf as pprof;
use std::num::NonZeroU32;
