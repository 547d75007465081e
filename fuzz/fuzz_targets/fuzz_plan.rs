// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use libfuzzer_sys::fuzz_target;
use tidyfs::plan::{is_within, Plan};
use tidyfs::planner::parse_response;

// Planner output is untrusted: parsing and ingestion must never panic,
// and every accepted operation must stay inside the root.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(raw) = parse_response(text) else {
        return;
    };
    if let Ok(plans) = Plan::ingest(raw) {
        for op in plans.iter().flat_map(|p| &p.operations) {
            assert!(!op.source.starts_with('/'));
            assert!(!op.destination.split('/').any(|c| c == ".."));
            assert!(!is_within(&op.destination, &op.source));
        }
    }
});
