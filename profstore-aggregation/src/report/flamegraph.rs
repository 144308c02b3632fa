// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::format::{format_value, percent};
use super::AggregatedProfile;
use crate::config::ReportOptions;
use crate::tree::TreeNode;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlamegraphNode {
    pub name: String,
    pub value: i64,
    pub formatted: String,
    pub percent: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FlamegraphNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Flamegraph {
    pub unit: String,
    pub total: i64,
    pub root: FlamegraphNode,
}

struct Visited {
    location_id: u64,
    value: i64,
    parent: Option<usize>,
}

/// Projects the tree onto a flamegraph. Frames whose cumulative value is
/// below `node_fraction` of the total are left out with everything under
/// them.
pub fn flamegraph(profile: &AggregatedProfile, options: &ReportOptions) -> Flamegraph {
    let total = profile.tree.total();
    let unit = profile.meta.sample_type.unit.to_string();
    let threshold = (total as f64 * options.node_fraction).abs();

    // Pass one: preorder list of kept nodes with their parent's position.
    let mut visited: Vec<Visited> = Vec::new();
    let mut path: Vec<usize> = Vec::new();
    let mut it = profile.tree.iter();
    while it.has_more() {
        if !it.next_child() {
            it.step_up();
            path.pop();
            continue;
        }
        let node = it.at();
        let is_root = visited.is_empty();
        if !is_root && (node.cumulative().abs() as f64) < threshold {
            continue;
        }
        visited.push(Visited {
            location_id: node.location_id(),
            value: node.cumulative(),
            parent: path.last().copied(),
        });
        path.push(visited.len() - 1);
        it.step_into();
    }

    // Pass two: children come after their parent in preorder, so building in
    // reverse finishes every child before its parent. Siblings are ordered by
    // name so the output doesn't depend on how location ids were assigned;
    // frames sharing a name and value fall back to location id order.
    let mut children: Vec<Vec<(u64, FlamegraphNode)>> =
        visited.iter().map(|_| Vec::new()).collect();
    let mut root = None;
    for (index, node) in visited.iter().enumerate().rev() {
        let mut kids = std::mem::take(&mut children[index]);
        kids.sort_by(|(a_id, a), (b_id, b)| {
            a.name
                .cmp(&b.name)
                .then(b.value.cmp(&a.value))
                .then(a_id.cmp(b_id))
        });
        let built = FlamegraphNode {
            name: profile.frame_name(node.location_id).to_string(),
            value: node.value,
            formatted: format_value(node.value, &unit),
            percent: percent(node.value, total),
            children: kids.into_iter().map(|(_, kid)| kid).collect(),
        };
        match node.parent {
            Some(parent) => children[parent].push((node.location_id, built)),
            None => root = Some(built),
        }
    }

    Flamegraph {
        root: root.unwrap_or_else(|| FlamegraphNode {
            name: profile.frame_name(0).to_string(),
            value: 0,
            formatted: format_value(0, &unit),
            percent: 0.0,
            children: Vec::new(),
        }),
        unit,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ProfileBuilder;

    fn profile(builder: ProfileBuilder) -> AggregatedProfile {
        AggregatedProfile::from_pprof(&builder.build(), 0).unwrap()
    }

    fn names(node: &FlamegraphNode) -> Vec<&str> {
        node.children.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn nests_frames_under_root() {
        let profile = profile(
            ProfileBuilder::new("cpu", "nanoseconds")
                .sample(&["work", "main"], &[3_000])
                .sample(&["gc", "main"], &[1_000]),
        );
        let graph = flamegraph(&profile, &ReportOptions::default());

        assert_eq!(graph.total, 4_000);
        assert_eq!(graph.root.name, "root");
        assert_eq!(graph.root.percent, 100.0);
        assert_eq!(names(&graph.root), vec!["main"]);

        let main = &graph.root.children[0];
        assert_eq!(main.value, 4_000);
        assert_eq!(main.formatted, "4.00µs");
        assert_eq!(names(main), vec!["gc", "work"]);
        let gc = main.children.iter().find(|c| c.name == "gc").unwrap();
        assert_eq!(gc.percent, 25.0);
    }

    #[test]
    fn prunes_small_frames() {
        let profile = profile(
            ProfileBuilder::new("samples", "count")
                .sample(&["hot", "main"], &[999])
                .sample(&["cold", "rare", "main"], &[1]),
        );
        let options = ReportOptions {
            node_fraction: 0.01,
            ..Default::default()
        };
        let graph = flamegraph(&profile, &options);
        let main = &graph.root.children[0];
        assert_eq!(names(main), vec!["hot"]);
        assert_eq!(main.value, 1000);
    }

    #[test]
    fn empty_profile_has_only_a_root() {
        let profile = profile(ProfileBuilder::new("samples", "count"));
        let graph = flamegraph(&profile, &ReportOptions::default());
        assert_eq!(graph.total, 0);
        assert!(graph.root.children.is_empty());
    }

    #[test]
    fn rendering_ignores_insertion_order() {
        let a = profile(
            ProfileBuilder::new("samples", "count")
                .sample(&["b", "main"], &[2])
                .sample(&["a", "main"], &[1]),
        );
        let b = profile(
            ProfileBuilder::new("samples", "count")
                .sample(&["a", "main"], &[1])
                .sample(&["b", "main"], &[2]),
        );
        let options = ReportOptions::default();
        let a = serde_json::to_string(&flamegraph(&a, &options)).unwrap();
        let b = serde_json::to_string(&flamegraph(&b, &options)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn same_named_siblings_follow_location_order() {
        let mut pprof = ProfileBuilder::new("samples", "count")
            .sample(&["parse", "work", "main"], &[1])
            .sample(&["render", "work_again", "main"], &[1])
            .build();
        let function_id = |name: &str| {
            pprof
                .functions
                .iter()
                .find(|f| pprof.string_table_fetch(f.name) == name)
                .unwrap()
                .id
        };
        let (work, work_again) = (function_id("work"), function_id("work_again"));
        // Same function at a second address: a distinct location named "work".
        for line in pprof.locations.iter_mut().flat_map(|l| l.lines.iter_mut()) {
            if line.function_id == work_again {
                line.function_id = work;
            }
        }

        let profile = AggregatedProfile::from_pprof(&pprof, 0).unwrap();
        let graph = flamegraph(&profile, &ReportOptions::default());
        let main = &graph.root.children[0];
        assert_eq!(names(main), vec!["work", "work"]);
        assert_eq!(names(&main.children[0]), vec!["parse"]);
        assert_eq!(names(&main.children[1]), vec!["render"]);
    }
}
