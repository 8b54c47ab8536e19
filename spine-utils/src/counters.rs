//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock};

// Process-wide counter registry.
//
// Counters are keyed by flat dotted names (e.g. "decision.spf_runs") and live
// for the lifetime of the process.
static REGISTRY: OnceLock<Mutex<BTreeMap<String, i64>>> = OnceLock::new();

fn registry() -> &'static Mutex<BTreeMap<String, i64>> {
    REGISTRY.get_or_init(Default::default)
}

/// Increments the named counter by one.
pub fn inc(key: &str) {
    add(key, 1);
}

/// Adds the given amount to the named counter.
pub fn add(key: &str, value: i64) {
    let mut counters = registry().lock().unwrap();
    *counters.entry(key.to_owned()).or_default() += value;
}

/// Returns the current value of the named counter.
pub fn get(key: &str) -> i64 {
    let counters = registry().lock().unwrap();
    counters.get(key).copied().unwrap_or(0)
}

/// Returns a snapshot of all counters.
pub fn snapshot() -> BTreeMap<String, i64> {
    registry().lock().unwrap().clone()
}
