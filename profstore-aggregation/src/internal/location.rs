// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::*;

/// One source line of a [Location]. A location holding several lines is an
/// inlined call chain, innermost callee first.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Line {
    pub function_id: FunctionId,
    pub line: i64,
}

/// Represents a [pprof::Location] without its id. The address has already
/// been re-based onto the canonical mapping, so the struct itself is the
/// dedup key: (address, mapping, folded flag, lines).
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub mapping_id: Option<MappingId>,
    pub address: u64,
    pub is_folded: bool,
    pub lines: Box<[Line]>,
}

impl Location {
    #[inline]
    pub fn is_inlined(&self) -> bool {
        self.lines.len() > 1
    }
}

impl Item for Location {
    type Id = LocationId;
}

impl PprofItem for Location {
    type PprofMessage = pprof::Location;

    fn to_pprof(&self, id: Self::Id) -> Self::PprofMessage {
        pprof::Location {
            id: id.to_raw_id(),
            mapping_id: self.mapping_id.map(MappingId::to_raw_id).unwrap_or(0),
            address: self.address,
            lines: self
                .lines
                .iter()
                .map(|line| pprof::Line {
                    function_id: line.function_id.to_raw_id(),
                    line: line.line,
                })
                .collect(),
            is_folded: self.is_folded,
        }
    }
}

/// Canonical location id. Never zero: zero is the synthetic root of every
/// tree.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct LocationId(NonZeroU32);

impl LocationId {
    /// Rebuilds an id from its raw value, e.g. one read back from a tree
    /// node. Returns `None` for zero and for values that don't fit.
    pub fn from_raw(raw: u64) -> Option<Self> {
        let small = u32::try_from(raw).ok()?;
        NonZeroU32::new(small).map(Self)
    }
}

impl Id for LocationId {
    type RawId = u64;

    fn from_offset(offset: usize) -> Self {
        #[allow(clippy::expect_used)]
        Self(small_non_zero_pprof_id(offset).expect("LocationId to fit into a u32"))
    }

    fn to_offset(self) -> usize {
        (self.0.get() - 1) as usize
    }

    fn to_raw_id(self) -> Self::RawId {
        self.0.get().into()
    }
}

impl From<LocationId> for u64 {
    fn from(id: LocationId) -> Self {
        id.to_raw_id()
    }
}
