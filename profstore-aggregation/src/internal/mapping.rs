// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::*;

/// Mapping sizes are rounded up to this boundary before comparing, so small
/// discrepancies in the reported limit don't split one binary in two.
pub const MAPPING_SIZE_ROUNDING: u64 = 0x1000;

/// Represents a [pprof::Mapping] with some space-saving changes:
///  - The id is not stored on the struct. It's stored in the container that holds the struct.
///  - strings are [StringId]s into the owning string table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Mapping {
    pub memory_start: u64,
    pub memory_limit: u64,
    pub file_offset: u64,
    pub filename: StringId,
    pub build_id: StringId,
    pub has_functions: bool,
    pub has_filenames: bool,
    pub has_line_numbers: bool,
    pub has_inline_frames: bool,
}

impl Mapping {
    pub fn to_pprof(&self, id: MappingId) -> pprof::Mapping {
        pprof::Mapping {
            id: id.to_raw_id(),
            memory_start: self.memory_start,
            memory_limit: self.memory_limit,
            file_offset: self.file_offset,
            filename: self.filename.to_raw_id(),
            build_id: self.build_id.to_raw_id(),
            has_functions: self.has_functions,
            has_filenames: self.has_filenames,
            has_line_numbers: self.has_line_numbers,
            has_inline_frames: self.has_inline_frames,
        }
    }
}

/// Recognizes the same binary across processes despite address space layout
/// randomization. A mapping with neither build id nor filename is a fake
/// mapping; all of those share the [StringId::ZERO] identity so they merge.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct MappingKey {
    pub size: u64,
    pub offset: u64,
    pub build_id_or_file: StringId,
}

impl MappingKey {
    pub fn new(
        memory_start: u64,
        memory_limit: u64,
        file_offset: u64,
        filename: StringId,
        build_id: StringId,
    ) -> Self {
        let size = memory_limit.saturating_sub(memory_start);
        let size = size
            .saturating_add(MAPPING_SIZE_ROUNDING - 1)
            / MAPPING_SIZE_ROUNDING
            * MAPPING_SIZE_ROUNDING;
        let build_id_or_file = if !build_id.is_zero() {
            build_id
        } else {
            filename
        };
        Self {
            size,
            offset: file_offset,
            build_id_or_file,
        }
    }
}

impl Item for MappingKey {
    type Id = MappingId;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct MappingId(NonZeroU32);

impl Id for MappingId {
    type RawId = u64;

    fn from_offset(offset: usize) -> Self {
        #[allow(clippy::expect_used)]
        Self(small_non_zero_pprof_id(offset).expect("MappingId to fit into a u32"))
    }

    fn to_offset(self) -> usize {
        (self.0.get() - 1) as usize
    }

    fn to_raw_id(self) -> Self::RawId {
        self.0.get().into()
    }
}
