// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Request/error counters, byte totals and latency histograms, kept as
//! arrays of atomics indexed by small enums. Every cell updates
//! independently with relaxed ordering; a snapshot is therefore not a
//! consistent cut, which the statistics command tolerates.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::store::OpError;

/// The operations the dispatcher accounts for, in wire snapshot order.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Generate,
    Exist,
    Add,
    Prolong,
    Remove,
    AddKey,
    ExistKey,
    RemoveKey,
    ProlongKey,
    GetKey,
    SetKey,
    SetForceKey,
    AddKeyToAll,
    RemoveKeyFromAll,
}

pub const OP_COUNT: usize = 14;

/// Error kinds, in wire snapshot order.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    WrongCommand,
    WrongParams,
    SessionNone,
    KeyNone,
    LimitExceeded,
    LifetimeExceeded,
    DuplicateKey,
    RecordBeenChanged,
    LimitPerSecExceeded,
    DuplicateSession,
    Disconnection,
}

pub const ERROR_COUNT: usize = 11;

impl From<OpError> for ErrorKind {
    fn from(err: OpError) -> Self {
        match err {
            OpError::SessionNone => Self::SessionNone,
            OpError::KeyNone => Self::KeyNone,
            OpError::LimitExceeded => Self::LimitExceeded,
            OpError::LifetimeExceeded => Self::LifetimeExceeded,
            OpError::DuplicateKey => Self::DuplicateKey,
            OpError::RecordBeenChanged => Self::RecordBeenChanged,
            OpError::LimitPerSecExceeded => Self::LimitPerSecExceeded,
            OpError::DuplicateSession => Self::DuplicateSession,
        }
    }
}

/// The three latency histograms.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Receiving,
    Processing,
    Sending,
}

const STAGE_COUNT: usize = 3;

/// Histogram buckets: `[<5, <10, <20, <50, <100, <200, <500, <1000, other]`.
pub const BUCKET_COUNT: usize = 9;
const BUCKET_BOUNDS_MS: [u64; BUCKET_COUNT - 1] = [5, 10, 20, 50, 100, 200, 500, 1000];

/// Number of values the statistics snapshot serializes.
pub const SNAPSHOT_LEN: usize =
    2 + 2 * OP_COUNT + ERROR_COUNT + STAGE_COUNT * BUCKET_COUNT + 1;

fn bucket(ms: u64) -> usize {
    BUCKET_BOUNDS_MS
        .iter()
        .position(|bound| ms < *bound)
        .unwrap_or(BUCKET_COUNT - 1)
}

#[derive(Debug, Default)]
pub struct Monitoring {
    sent_bytes: AtomicU64,
    received_bytes: AtomicU64,
    passed: [AtomicU64; OP_COUNT],
    failed: [AtomicU64; OP_COUNT],
    errors: [AtomicU64; ERROR_COUNT],
    durations: [[AtomicU64; BUCKET_COUNT]; STAGE_COUNT],
    total_free_sessions: AtomicU64,
}

impl Monitoring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_sent_bytes(&self, bytes: u64) {
        self.sent_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn inc_received_bytes(&self, bytes: u64) {
        self.received_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn inc_passed(&self, op: Op) {
        self.passed[op as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self, op: Op) {
        self.failed[op as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_error(&self, kind: ErrorKind) {
        self.errors[kind as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_duration(&self, stage: Stage, ms: u64) {
        self.durations[stage as usize][bucket(ms)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_total_free_sessions(&self, total: u32) {
        self.total_free_sessions
            .store(u64::from(total), Ordering::Relaxed);
    }

    pub fn passed_count(&self, op: Op) -> u64 {
        self.passed[op as usize].load(Ordering::Relaxed)
    }

    pub fn failed_count(&self, op: Op) -> u64 {
        self.failed[op as usize].load(Ordering::Relaxed)
    }

    pub fn error_count(&self, kind: ErrorKind) -> u64 {
        self.errors[kind as usize].load(Ordering::Relaxed)
    }

    /// Reads every cell in the canonical wire order: byte totals, passed,
    /// failed, errors, the three histograms, free-session gauge. The cells
    /// are read one by one without a barrier, so the values may be mutually
    /// inconsistent under load.
    pub fn snapshot(&self) -> Vec<u64> {
        let mut out = Vec::with_capacity(SNAPSHOT_LEN);

        out.push(self.sent_bytes.load(Ordering::Relaxed));
        out.push(self.received_bytes.load(Ordering::Relaxed));
        out.extend(self.passed.iter().map(|c| c.load(Ordering::Relaxed)));
        out.extend(self.failed.iter().map(|c| c.load(Ordering::Relaxed)));
        out.extend(self.errors.iter().map(|c| c.load(Ordering::Relaxed)));
        for stage in &self.durations {
            out.extend(stage.iter().map(|c| c.load(Ordering::Relaxed)));
        }
        out.push(self.total_free_sessions.load(Ordering::Relaxed));

        out
    }
}
