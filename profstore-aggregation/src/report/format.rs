// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

const BYTE_UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];
const NANOSECOND_UNITS: [&str; 4] = ["ns", "µs", "ms", "s"];

/// Renders `value` for humans according to the sample type's unit.
pub fn format_value(value: i64, unit: &str) -> String {
    match unit {
        "bytes" => scaled(value, 1024.0, &BYTE_UNITS),
        "nanoseconds" => scaled(value, 1000.0, &NANOSECOND_UNITS),
        _ => value.to_string(),
    }
}

fn scaled(value: i64, base: f64, units: &[&str]) -> String {
    let mut scaled = value as f64;
    let mut unit = 0;
    while scaled.abs() >= base && unit + 1 < units.len() {
        scaled /= base;
        unit += 1;
    }
    if unit == 0 {
        format!("{value}{}", units[0])
    } else {
        format!("{scaled:.2}{}", units[unit])
    }
}

/// Share of `total`, in percent. Zero when the total is.
pub fn percent(value: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        value as f64 * 100.0 / total as f64
    }
}
