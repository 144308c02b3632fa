// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::format::{format_value, percent};
use super::AggregatedProfile;
use crate::collections::identifiable::{FxHashMap, FxIndexMap};
use crate::config::ReportOptions;
use crate::tree::{TreeNode, ROOT_LOCATION_ID};
use serde::Serialize;
use std::cmp::Reverse;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TopRow {
    pub name: String,
    pub flat: i64,
    pub flat_formatted: String,
    pub flat_percent: f64,
    pub cumulative: i64,
    pub cumulative_formatted: String,
    pub cumulative_percent: f64,
    pub inlined: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Top {
    pub unit: String,
    pub total: i64,
    pub rows: Vec<TopRow>,
}

#[derive(Default)]
struct Totals {
    flat: i64,
    cumulative: i64,
}

/// Flattens the tree per frame: flat values are summed, cumulative values
/// are counted once per path even when a frame recurses. Rows are ranked by
/// flat then cumulative, both descending, then by name and location id, and
/// cut to `node_count`.
pub fn top(profile: &AggregatedProfile, options: &ReportOptions) -> Top {
    let total = profile.tree.total();
    let unit = profile.meta.sample_type.unit.to_string();

    let mut frames: FxIndexMap<u64, Totals> = FxIndexMap::default();
    // Frames on the current path, with how often each appears on it.
    let mut on_path: FxHashMap<u64, usize> = FxHashMap::default();
    let mut path: Vec<u64> = Vec::new();

    let mut it = profile.tree.iter();
    while it.has_more() {
        if !it.next_child() {
            it.step_up();
            if let Some(id) = path.pop() {
                if let Some(count) = on_path.get_mut(&id) {
                    *count -= 1;
                }
            }
            continue;
        }
        let node = it.at();
        let id = node.location_id();
        if id != ROOT_LOCATION_ID {
            let recursive = on_path.get(&id).is_some_and(|count| *count > 0);
            let totals = frames.entry(id).or_default();
            totals.flat = totals.flat.wrapping_add(node.flat());
            if !recursive {
                totals.cumulative = totals.cumulative.wrapping_add(node.cumulative());
            }
        }
        *on_path.entry(id).or_default() += 1;
        path.push(id);
        it.step_into();
    }

    let mut ranked: Vec<(u64, Totals)> = frames.into_iter().collect();
    ranked.sort_by_cached_key(|(id, totals)| {
        (
            Reverse(totals.flat),
            Reverse(totals.cumulative),
            profile.frame_name(*id).to_string(),
            *id,
        )
    });
    ranked.truncate(options.node_count);

    let rows = ranked
        .into_iter()
        .map(|(id, totals)| TopRow {
            name: profile.frame_name(id).to_string(),
            flat: totals.flat,
            flat_formatted: format_value(totals.flat, &unit),
            flat_percent: percent(totals.flat, total),
            cumulative: totals.cumulative,
            cumulative_formatted: format_value(totals.cumulative, &unit),
            cumulative_percent: percent(totals.cumulative, total),
            inlined: profile.is_inlined(id),
        })
        .collect();

    Top { unit, total, rows }
}
