// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::{HashMap, hash_map::Entry};

use parking_lot::Mutex;

/// One counting window: the wall-clock second it belongs to and how many
/// requests it has admitted within that second.
#[derive(Debug, Clone, Copy)]
struct Window {
    ts: u64,
    count: u16,
}

/// Per-key requests-per-second gate.
///
/// Each distinct ceiling tracks its own window, so two callers enforcing
/// different ceilings on the same key never drain each other's budget.
#[derive(Debug, Default)]
pub struct Limiter {
    windows: Mutex<HashMap<u16, Window>>,
}

impl Limiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits or denies one request against `limit` requests per second at
    /// the wall-clock second `now`. A ceiling of 0 always admits and leaves
    /// the window table untouched.
    pub fn admit(&self, limit: u16, now: u64) -> bool {
        if limit == 0 {
            return true;
        }

        let mut windows = self.windows.lock();
        match windows.entry(limit) {
            Entry::Vacant(slot) => {
                slot.insert(Window { ts: now, count: 1 });
                true
            },
            Entry::Occupied(mut slot) => {
                let window = slot.get_mut();
                if window.ts == now && window.count == limit {
                    false
                } else if window.ts != now {
                    *window = Window { ts: now, count: 1 };
                    true
                } else {
                    window.count += 1;
                    true
                }
            },
        }
    }
}
