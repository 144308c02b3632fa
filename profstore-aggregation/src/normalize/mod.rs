// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Canonicalizes incoming sample graphs into an accumulator's own tables.
//!
//! A [Normalizer] owns string, mapping, location, function and label tables.
//! Every profile passed to [Normalizer::normalize] is first validated and
//! checked for compatibility, and only then re-numbered into those tables,
//! so a rejected profile never leaves partial state behind.

mod merger;

pub use merger::*;

use crate::collections::identifiable::*;
use crate::collections::string_table::StringTable;
use crate::error::{AggregationError, Result};
use crate::internal::*;
use anyhow::Context;
use profstore_protobuf as pprof;
use tracing::{debug, trace};

/// A sample whose locations and labels reference the normalizer's tables.
/// Samples with the same stack and labels have already been summed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NormalizedSample {
    /// The leaf is at locations\[0\], the root frame is last.
    pub locations: Box<[LocationId]>,
    pub labels: LabelSetId,
    pub values: Vec<i64>,
}

impl NormalizedSample {
    /// The value at `sample_index`, or zero when the vector is shorter.
    #[inline]
    pub fn value(&self, sample_index: usize) -> i64 {
        self.values.get(sample_index).copied().unwrap_or(0)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Normalizer {
    strings: StringTable,
    functions: FxIndexSet<Function>,
    locations: FxIndexSet<Location>,
    mappings: FxIndexMap<MappingKey, Mapping>,
    labels: FxIndexSet<Label>,
    label_sets: FxIndexSet<LabelSet>,
    /// Established by the first accepted profile.
    sample_types: Option<Box<[ValueType]>>,
    period: Option<Period>,
}

/// Public API
impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalizes `profile` into this normalizer's tables and returns its
    /// deduplicated samples sorted root-first (see [cmp_root_first]).
    ///
    /// Samples whose values are all zero are dropped before anything is
    /// interned for them.
    ///
    /// # Errors
    /// [AggregationError::MalformedProfile] when the profile references ids
    /// or strings it doesn't define, and
    /// [AggregationError::IncompatibleProfile] when its period type or
    /// sample types differ from the ones already established. In both cases
    /// no table is modified. The first accepted profile establishes both,
    /// so a profile without a period type is only compatible with others
    /// that lack one too.
    ///
    /// [AggregationError::Capacity] when a canonical table has no ids left.
    pub fn normalize(&mut self, profile: &pprof::Profile) -> Result<Vec<NormalizedSample>> {
        let index = GraphIndex::new(profile)?;
        let (sample_types, period) = read_types(profile)?;
        self.check_compatible(&sample_types, &period)?;

        if self.sample_types.is_none() {
            for sample_type in sample_types.iter() {
                self.strings.intern(&sample_type.typ)?;
                self.strings.intern(&sample_type.unit)?;
            }
            self.sample_types = Some(sample_types);
            self.period = period;
        }

        let mut pass = Pass::new(index);
        let mut samples: FxIndexMap<StackTraceKey, Vec<i64>> = FxIndexMap::default();
        let mut dropped = 0usize;

        for sample in profile.samples.iter() {
            if sample.values.iter().all(|v| *v == 0) {
                dropped += 1;
                continue;
            }

            let locations = sample
                .location_ids
                .iter()
                .map(|id| self.map_location(&mut pass, *id))
                .collect::<Result<Box<[LocationId]>>>()?;
            let labels = self.map_labels(&mut pass, &sample.labels)?;
            let key = StackTraceKey { locations, labels };

            match samples.get_mut(&key) {
                Some(values) => {
                    trace!(locations = key.locations.len(), "summing duplicate stack");
                    add_values(values, &sample.values);
                }
                None => {
                    samples.insert(key, sample.values.clone());
                }
            }
        }

        let mut normalized: Vec<NormalizedSample> = samples
            .into_iter()
            .map(|(key, values)| NormalizedSample {
                locations: key.locations,
                labels: key.labels,
                values,
            })
            .collect();
        normalized.sort_by(|a, b| cmp_root_first(&a.locations, &b.locations));

        debug!(
            incoming = profile.samples.len(),
            normalized = normalized.len(),
            dropped_zero = dropped,
            locations = self.locations.len(),
            "normalized profile"
        );
        Ok(normalized)
    }

    /// The sample types established by the first accepted profile.
    pub fn sample_types(&self) -> Option<&[ValueType]> {
        self.sample_types.as_deref()
    }

    pub fn period(&self) -> Option<&Period> {
        self.period.as_ref()
    }

    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.locations.get_index(id.to_offset())
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get_index(id.to_offset())
    }

    pub fn mapping(&self, id: MappingId) -> Option<&Mapping> {
        self.mappings.get_index(id.to_offset()).map(|(_, m)| m)
    }

    pub fn string(&self, id: StringId) -> &str {
        self.strings.get(id)
    }

    pub fn locations_len(&self) -> usize {
        self.locations.len()
    }

    pub fn functions_len(&self) -> usize {
        self.functions.len()
    }

    pub fn mappings_len(&self) -> usize {
        self.mappings.len()
    }

    pub fn strings_len(&self) -> usize {
        self.strings.len()
    }

    /// Human readable name of a frame: the function names of its lines,
    /// innermost first, joined by `;`. Frames without symbols are named by
    /// their hex address.
    pub fn frame_name(&self, id: LocationId) -> String {
        let Some(location) = self.location(id) else {
            return format!("<unknown location {}>", id.to_raw_id());
        };
        let names: Vec<&str> = location
            .lines
            .iter()
            .filter_map(|line| self.function(line.function_id))
            .map(|function| self.string(function.name))
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            format!("{:#x}", location.address)
        } else {
            names.join(";")
        }
    }

    pub fn is_inlined(&self, id: LocationId) -> bool {
        self.location(id).is_some_and(Location::is_inlined)
    }
}

/// Private helper functions
impl Normalizer {
    fn check_compatible(&self, sample_types: &[ValueType], period: &Option<Period>) -> Result<()> {
        // The first accepted profile fixes both, including an absent period.
        let Some(established) = &self.sample_types else {
            return Ok(());
        };
        let expected_period = self.period.as_ref().map(|p| &p.typ);
        let found_period = period.as_ref().map(|p| &p.typ);
        if expected_period != found_period {
            return Err(AggregationError::incompatible_period(expected_period, found_period));
        }

        let empty = ValueType::default();
        for index in 0..established.len().max(sample_types.len()) {
            let expected = established.get(index).unwrap_or(&empty);
            let found = sample_types.get(index).unwrap_or(&empty);
            if expected != found {
                return Err(AggregationError::incompatible(expected, found));
            }
        }
        Ok(())
    }

    fn intern(&mut self, pass: &mut Pass<'_>, id: i64) -> Result<StringId> {
        let offset = id as usize;
        if let Some(Some(interned)) = pass.strings.get(offset) {
            return Ok(*interned);
        }
        let interned = self
            .strings
            .intern(pass.index.string(id))
            .context("string table is full")?;
        if let Some(slot) = pass.strings.get_mut(offset) {
            *slot = Some(interned);
        }
        Ok(interned)
    }

    /// Returns the canonical mapping and the delta that re-bases addresses
    /// of the incoming mapping onto it.
    fn map_mapping(&mut self, pass: &mut Pass<'_>, id: u64) -> Result<(MappingId, u64)> {
        if let Some(mapped) = pass.mappings.get(&id) {
            return Ok(*mapped);
        }
        let src = pass.index.mappings[&id];
        let filename = self.intern(pass, src.filename)?;
        let build_id = self.intern(pass, src.build_id)?;
        let key = MappingKey::new(
            src.memory_start,
            src.memory_limit,
            src.file_offset,
            filename,
            build_id,
        );

        let mapped = match self.mappings.get_full(&key) {
            Some((offset, _, existing)) => (
                MappingId::from_offset(offset),
                existing.memory_start.wrapping_sub(src.memory_start),
            ),
            None => {
                let mapping_id: MappingId =
                    checked_id(self.mappings.len()).context("mapping table is full")?;
                self.mappings.insert(
                    key,
                    Mapping {
                        memory_start: src.memory_start,
                        memory_limit: src.memory_limit,
                        file_offset: src.file_offset,
                        filename,
                        build_id,
                        has_functions: src.has_functions,
                        has_filenames: src.has_filenames,
                        has_line_numbers: src.has_line_numbers,
                        has_inline_frames: src.has_inline_frames,
                    },
                );
                (mapping_id, 0)
            }
        };
        pass.mappings.insert(id, mapped);
        Ok(mapped)
    }

    fn map_function(&mut self, pass: &mut Pass<'_>, id: u64) -> Result<FunctionId> {
        if let Some(mapped) = pass.functions.get(&id) {
            return Ok(*mapped);
        }
        let src = pass.index.functions[&id];
        let function = Function {
            start_line: src.start_line,
            name: self.intern(pass, src.name)?,
            system_name: self.intern(pass, src.system_name)?,
            filename: self.intern(pass, src.filename)?,
        };
        let mapped = self
            .functions
            .checked_dedup(function)
            .context("function table is full")?;
        pass.functions.insert(id, mapped);
        Ok(mapped)
    }

    fn map_location(&mut self, pass: &mut Pass<'_>, id: u64) -> Result<LocationId> {
        if let Some(mapped) = pass.locations.get(&id) {
            return Ok(*mapped);
        }
        let src = pass.index.locations[&id];
        let (mapping_id, delta) = match src.mapping_id {
            0 => (None, 0),
            mapping_id => {
                let (mapped, delta) = self.map_mapping(pass, mapping_id)?;
                (Some(mapped), delta)
            }
        };
        let lines = src
            .lines
            .iter()
            .map(|line| {
                Ok(Line {
                    function_id: self.map_function(pass, line.function_id)?,
                    line: line.line,
                })
            })
            .collect::<Result<_>>()?;
        let location = Location {
            mapping_id,
            address: src.address.wrapping_add(delta),
            is_folded: src.is_folded,
            lines,
        };
        let mapped = self
            .locations
            .checked_dedup(location)
            .context("location table is full")?;
        pass.locations.insert(id, mapped);
        Ok(mapped)
    }

    fn map_labels(&mut self, pass: &mut Pass<'_>, labels: &[pprof::Label]) -> Result<LabelSetId> {
        let labels = labels
            .iter()
            .map(|label| {
                let key = self.intern(pass, label.key)?;
                let label = if label.str != 0 {
                    Label::str(key, self.intern(pass, label.str)?)
                } else {
                    let num_unit = match label.num_unit {
                        0 => None,
                        unit => Some(self.intern(pass, unit)?),
                    };
                    Label::num(key, label.num, num_unit)
                };
                Ok(self.labels.checked_dedup(label).context("label table is full")?)
            })
            .collect::<Result<_>>()?;
        let set = self
            .label_sets
            .checked_dedup(LabelSet::new(labels))
            .context("label set table is full")?;
        Ok(set)
    }

    pub(crate) fn intern_str(&mut self, str: &str) -> Result<StringId> {
        Ok(self.strings.intern(str).context("string table is full")?)
    }

    pub(crate) fn to_pprof_tables(&self) -> PprofTables {
        PprofTables {
            mappings: self
                .mappings
                .values()
                .enumerate()
                .map(|(offset, mapping)| mapping.to_pprof(MappingId::from_offset(offset)))
                .collect(),
            locations: to_pprof_iter(&self.locations).collect(),
            functions: to_pprof_iter(&self.functions).collect(),
            string_table: self.strings.to_vec(),
        }
    }

    pub(crate) fn label_set_to_pprof(&self, id: LabelSetId) -> Vec<pprof::Label> {
        self.label_sets
            .get_index(id.to_offset())
            .map(|set| {
                set.iter()
                    .filter_map(|label_id| self.labels.get_index(label_id.to_offset()))
                    .map(pprof::Label::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub(crate) struct PprofTables {
    pub mappings: Vec<pprof::Mapping>,
    pub locations: Vec<pprof::Location>,
    pub functions: Vec<pprof::Function>,
    pub string_table: Vec<String>,
}

fn add_values(into: &mut [i64], values: &[i64]) {
    for (acc, value) in into.iter_mut().zip(values) {
        *acc = acc.wrapping_add(*value);
    }
}

/// Lookup tables over one incoming profile, built while validating it.
struct GraphIndex<'a> {
    profile: &'a pprof::Profile,
    mappings: FxHashMap<u64, &'a pprof::Mapping>,
    locations: FxHashMap<u64, &'a pprof::Location>,
    functions: FxHashMap<u64, &'a pprof::Function>,
}

impl<'a> GraphIndex<'a> {
    /// Checks that every id and string the profile references exists, so
    /// that canonicalization afterwards cannot fail half-way.
    fn new(profile: &'a pprof::Profile) -> Result<Self> {
        let strings = profile.string_table.len() as i64;
        let check_string = |what: &str, id: i64| -> Result<()> {
            if (0..strings).contains(&id) {
                Ok(())
            } else {
                Err(AggregationError::malformed(format!(
                    "{what} references string {id}, string table has {strings} entries"
                )))
            }
        };
        if profile.string_table.first().is_some_and(|s| !s.is_empty()) {
            return Err(AggregationError::malformed(
                "string table must start with the empty string",
            ));
        }

        let mut functions = FxHashMap::default();
        for function in profile.functions.iter() {
            check_string("function name", function.name)?;
            check_string("function system name", function.system_name)?;
            check_string("function filename", function.filename)?;
            insert_unique("function", &mut functions, function.id, function)?;
        }

        let mut mappings = FxHashMap::default();
        for mapping in profile.mappings.iter() {
            check_string("mapping filename", mapping.filename)?;
            check_string("mapping build id", mapping.build_id)?;
            insert_unique("mapping", &mut mappings, mapping.id, mapping)?;
        }

        let mut locations = FxHashMap::default();
        for location in profile.locations.iter() {
            if location.mapping_id != 0 && !mappings.contains_key(&location.mapping_id) {
                return Err(AggregationError::malformed(format!(
                    "location {} references unknown mapping {}",
                    location.id, location.mapping_id
                )));
            }
            if let Some(line) = location
                .lines
                .iter()
                .find(|line| !functions.contains_key(&line.function_id))
            {
                return Err(AggregationError::malformed(format!(
                    "location {} references unknown function {}",
                    location.id, line.function_id
                )));
            }
            insert_unique("location", &mut locations, location.id, location)?;
        }

        for sample_type in profile.sample_types.iter().chain(profile.period_type.iter()) {
            check_string("value type", sample_type.r#type)?;
            check_string("value type unit", sample_type.unit)?;
        }

        for sample in profile.samples.iter() {
            if sample.values.len() != profile.sample_types.len() {
                return Err(AggregationError::malformed(format!(
                    "expected {} sample types, but sample had {} sample types",
                    profile.sample_types.len(),
                    sample.values.len()
                )));
            }
            if let Some(id) = sample
                .location_ids
                .iter()
                .find(|id| !locations.contains_key(*id))
            {
                return Err(AggregationError::malformed(format!(
                    "sample references unknown location {id}"
                )));
            }
            for label in sample.labels.iter() {
                check_string("label key", label.key)?;
                check_string("label value", label.str)?;
                check_string("label unit", label.num_unit)?;
            }
        }

        Ok(Self {
            profile,
            mappings,
            locations,
            functions,
        })
    }

    /// Only valid for ids checked by [GraphIndex::new].
    fn string(&self, id: i64) -> &'a str {
        self.profile.string(id).unwrap_or("")
    }
}

fn insert_unique<'a, T>(
    what: &str,
    map: &mut FxHashMap<u64, &'a T>,
    id: u64,
    item: &'a T,
) -> Result<()> {
    if id == 0 {
        return Err(AggregationError::malformed(format!("{what} with id 0")));
    }
    if map.insert(id, item).is_some() {
        return Err(AggregationError::malformed(format!("duplicate {what} id {id}")));
    }
    Ok(())
}

fn read_types(profile: &pprof::Profile) -> Result<(Box<[ValueType]>, Option<Period>)> {
    let value_type = |vt: &pprof::ValueType| {
        ValueType::new(
            profile.string(vt.r#type).unwrap_or(""),
            profile.string(vt.unit).unwrap_or(""),
        )
    };
    if profile.sample_types.is_empty() {
        return Err(AggregationError::malformed("profile has no sample types"));
    }
    let sample_types = profile.sample_types.iter().map(value_type).collect();
    let period = profile.period_type.as_ref().map(|vt| Period {
        typ: value_type(vt),
        value: profile.period,
    });
    Ok((sample_types, period))
}

/// Per-pass memo tables from the incoming profile's ids to canonical ids.
struct Pass<'a> {
    index: GraphIndex<'a>,
    strings: Vec<Option<StringId>>,
    mappings: FxHashMap<u64, (MappingId, u64)>,
    functions: FxHashMap<u64, FunctionId>,
    locations: FxHashMap<u64, LocationId>,
}

impl<'a> Pass<'a> {
    fn new(index: GraphIndex<'a>) -> Self {
        Self {
            strings: vec![None; index.profile.string_table.len()],
            index,
            mappings: FxHashMap::default(),
            functions: FxHashMap::default(),
            locations: FxHashMap::default(),
        }
    }
}
