// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The two-level session/key map with lifetimes, optimistic-concurrency
//! counters and per-key rate limiting.
//!
//! Locking is layered: one reader-writer lock over the session map, one per
//! session over its value map, one per value over its bytes and counters,
//! and a plain mutex inside each limiter. Acquisition always follows
//! store → session → value → limiter order. Session-creating, bulk and
//! sweep operations take the top lock exclusively; everything else shares it.

pub mod entry;
pub mod limiter;

use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;
use parking_lot::RwLock;
use thiserror::Error;

use crate::{
    store::entry::{Expiry, Session, SessionState, Value},
    utils,
};

/// Why a store operation was refused. Carried to the client as a one-byte
/// result code; never an exception path.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OpError {
    #[error("session does not exist")]
    SessionNone,
    #[error("session already exists")]
    DuplicateSession,
    #[error("key does not exist")]
    KeyNone,
    #[error("session limit exceeded")]
    LimitExceeded,
    #[error("key lifetime exceeds session lifetime")]
    LifetimeExceeded,
    #[error("key already exists")]
    DuplicateKey,
    #[error("record has been changed")]
    RecordBeenChanged,
    #[error("per-second limit exceeded")]
    LimitPerSecExceeded,
}

pub type OpResult<T = ()> = Result<T, OpError>;

/// Everything a successful read returns: the bytes plus both CAS tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRead {
    pub data: Bytes,
    pub counter_keys: u32,
    pub counter_record: u32,
}

#[derive(Debug, Default)]
struct Registry {
    sessions: HashMap<String, Session>,
    /// Cap on live sessions; 0 means unlimited.
    limit: u32,
    /// Entries present in the map, live or not.
    count: u32,
}

impl Registry {
    fn check_capacity(&self) -> OpResult {
        if (self.count == self.limit && self.limit != 0) || self.count == u32::MAX {
            return Err(OpError::LimitExceeded);
        }
        Ok(())
    }
}

/// The shared store. Cheap to share behind an `Arc`; all methods take
/// `&self`.
#[derive(Debug, Default)]
pub struct Store {
    inner: RwLock<Registry>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// A key lifetime must not outlive a bounded session expiry.
    fn check_child(parent: Expiry, lifetime: u32, now: u64) -> OpResult {
        if lifetime == 0 {
            return Ok(());
        }
        match parent.end() {
            Some(end) if now + u64::from(lifetime) > end => {
                Err(OpError::LifetimeExceeded)
            },
            _ => Ok(()),
        }
    }

    fn live_value<'a>(
        state: &'a SessionState,
        key: &str,
        now: u64,
    ) -> OpResult<&'a Value> {
        let val = state.values.get(key).ok_or(OpError::KeyNone)?;
        if !val.cell.read().expiry.is_live(now) {
            return Err(OpError::KeyNone);
        }
        Ok(val)
    }

    /// Installs the session cap. A cap of 0 means unlimited and also resets
    /// the session counter, matching the historical wire behavior.
    pub fn set_limit(&self, limit: u32) {
        let mut inner = self.inner.write();
        if limit == 0 {
            inner.count = 0;
        }
        inner.limit = limit;
    }

    /// Creates a session under a freshly drawn id and returns the id in
    /// canonical text form.
    pub fn generate(&self, lifetime: u32) -> OpResult<String> {
        let now = Self::now();
        let mut inner = self.inner.write();
        inner.check_capacity()?;

        let id = loop {
            let candidate = utils::generate();
            if !inner.sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        inner
            .sessions
            .insert(id.clone(), Session::new(Expiry::from_lifetime(lifetime, now)));
        inner.count += 1;

        Ok(id)
    }

    /// Creates a session under a client-supplied id. An existing live entry
    /// is a duplicate; a dead one is silently replaced.
    pub fn add(&self, id: &str, lifetime: u32) -> OpResult {
        let now = Self::now();
        let mut inner = self.inner.write();
        inner.check_capacity()?;

        if let Some(sess) = inner.sessions.get_mut(id)
            && sess.state.get_mut().expiry.is_live(now)
        {
            return Err(OpError::DuplicateSession);
        }

        inner
            .sessions
            .insert(id.to_owned(), Session::new(Expiry::from_lifetime(lifetime, now)));
        inner.count += 1;

        Ok(())
    }

    pub fn exist(&self, id: &str) -> OpResult {
        let now = Self::now();
        let inner = self.inner.read();
        let sess = inner.sessions.get(id).ok_or(OpError::SessionNone)?;
        if sess.state.read().expiry.is_live(now) {
            Ok(())
        } else {
            Err(OpError::SessionNone)
        }
    }

    /// Tombstones a live session; the sweep erases it. No-op otherwise.
    pub fn remove(&self, id: &str) {
        let now = Self::now();
        let inner = self.inner.read();
        let Some(sess) = inner.sessions.get(id) else {
            return;
        };
        let mut state = sess.state.write();
        if state.expiry.is_live(now) {
            state.expiry = Expiry::Tombstoned;
        }
    }

    pub fn prolong(&self, id: &str, lifetime: u32) -> OpResult {
        let now = Self::now();
        let inner = self.inner.read();
        let sess = inner.sessions.get(id).ok_or(OpError::SessionNone)?;
        let mut state = sess.state.write();
        if !state.expiry.is_live(now) {
            return Err(OpError::SessionNone);
        }
        state.expiry = Expiry::from_lifetime(lifetime, now);
        Ok(())
    }

    /// Adds a key and returns the fresh `(counter_keys, counter_record)`
    /// pair the client needs for conditional writes.
    pub fn add_key(
        &self,
        id: &str,
        key: &str,
        value: &[u8],
        lifetime: u32,
    ) -> OpResult<(u32, u32)> {
        let now = Self::now();
        let inner = self.inner.read();
        let sess = inner.sessions.get(id).ok_or(OpError::SessionNone)?;
        let mut state = sess.state.write();
        if !state.expiry.is_live(now) {
            return Err(OpError::SessionNone);
        }
        Self::check_child(state.expiry, lifetime, now)?;
        if state.values.contains_key(key) {
            return Err(OpError::DuplicateKey);
        }

        state.counter_keys = state.counter_keys.wrapping_add(1);
        let counter_keys = state.counter_keys;
        state.values.insert(
            key.to_owned(),
            Value::new(
                Bytes::copy_from_slice(value),
                Expiry::from_lifetime(lifetime, now),
            ),
        );

        Ok((counter_keys, 0))
    }

    pub fn exist_key(&self, id: &str, key: &str) -> OpResult {
        let now = Self::now();
        let inner = self.inner.read();
        let sess = inner.sessions.get(id).ok_or(OpError::SessionNone)?;
        let state = sess.state.read();
        if !state.expiry.is_live(now) {
            return Err(OpError::SessionNone);
        }
        Self::live_value(&state, key, now).map(|_| ())
    }

    pub fn prolong_key(&self, id: &str, key: &str, lifetime: u32) -> OpResult {
        let now = Self::now();
        let inner = self.inner.read();
        let sess = inner.sessions.get(id).ok_or(OpError::SessionNone)?;
        let state = sess.state.read();
        if !state.expiry.is_live(now) {
            return Err(OpError::SessionNone);
        }
        Self::check_child(state.expiry, lifetime, now)?;
        let val = Self::live_value(&state, key, now)?;

        val.cell.write().expiry = Expiry::from_lifetime(lifetime, now);
        Ok(())
    }

    /// Conditional overwrite: succeeds only when the caller presents the
    /// current counters, then bumps the write counter.
    pub fn set_key(
        &self,
        id: &str,
        key: &str,
        value: &[u8],
        counter_keys: u32,
        counter_record: u32,
        limit: u16,
    ) -> OpResult {
        let now = Self::now();
        let inner = self.inner.read();
        let sess = inner.sessions.get(id).ok_or(OpError::SessionNone)?;
        let state = sess.state.read();
        if !state.expiry.is_live(now) {
            return Err(OpError::SessionNone);
        }
        let val = Self::live_value(&state, key, now)?;

        let mut cell = val.cell.write();
        if cell.counter_record != counter_record || state.counter_keys != counter_keys
        {
            return Err(OpError::RecordBeenChanged);
        }
        if !cell.limiter_write.admit(limit, now) {
            return Err(OpError::LimitPerSecExceeded);
        }

        cell.data = Bytes::copy_from_slice(value);
        cell.counter_record = cell.counter_record.wrapping_add(1);
        Ok(())
    }

    /// Unconditional overwrite; the write limiter still applies.
    pub fn set_force_key(
        &self,
        id: &str,
        key: &str,
        value: &[u8],
        limit: u16,
    ) -> OpResult {
        let now = Self::now();
        let inner = self.inner.read();
        let sess = inner.sessions.get(id).ok_or(OpError::SessionNone)?;
        let state = sess.state.read();
        if !state.expiry.is_live(now) {
            return Err(OpError::SessionNone);
        }
        let val = Self::live_value(&state, key, now)?;

        let mut cell = val.cell.write();
        if !cell.limiter_write.admit(limit, now) {
            return Err(OpError::LimitPerSecExceeded);
        }

        cell.data = Bytes::copy_from_slice(value);
        cell.counter_record = cell.counter_record.wrapping_add(1);
        Ok(())
    }

    pub fn get_key(&self, id: &str, key: &str, limit: u16) -> OpResult<ValueRead> {
        let now = Self::now();
        let inner = self.inner.read();
        let sess = inner.sessions.get(id).ok_or(OpError::SessionNone)?;
        let state = sess.state.read();
        if !state.expiry.is_live(now) {
            return Err(OpError::SessionNone);
        }
        let val = Self::live_value(&state, key, now)?;

        let cell = val.cell.read();
        if !cell.limiter_read.admit(limit, now) {
            return Err(OpError::LimitPerSecExceeded);
        }

        Ok(ValueRead {
            data: cell.data.clone(),
            counter_keys: state.counter_keys,
            counter_record: cell.counter_record,
        })
    }

    /// Erases the key if present, live or not. The session must be live.
    pub fn remove_key(&self, id: &str, key: &str) -> OpResult {
        let now = Self::now();
        let inner = self.inner.read();
        let sess = inner.sessions.get(id).ok_or(OpError::SessionNone)?;
        let mut state = sess.state.write();
        if !state.expiry.is_live(now) {
            return Err(OpError::SessionNone);
        }
        state.values.remove(key);
        Ok(())
    }

    /// Seeds `key` into every live session that does not already have it.
    /// Inserted values never expire on their own and start with fresh
    /// limiters.
    pub fn add_all_key(&self, key: &str, value: &[u8]) {
        let now = Self::now();
        let mut inner = self.inner.write();

        for sess in inner.sessions.values_mut() {
            let state = sess.state.get_mut();
            if !state.expiry.is_live(now) || state.values.contains_key(key) {
                continue;
            }
            state.values.insert(
                key.to_owned(),
                Value::new(Bytes::copy_from_slice(value), Expiry::NoExpiry),
            );
        }
    }

    /// Erases `key` from every live session.
    pub fn remove_all_key(&self, key: &str) {
        let now = Self::now();
        let mut inner = self.inner.write();

        for sess in inner.sessions.values_mut() {
            let state = sess.state.get_mut();
            if !state.expiry.is_live(now) {
                continue;
            }
            state.values.remove(key);
        }
    }

    /// One full sweep: erases tombstoned and expired sessions, then expired
    /// values inside the survivors. Holds the top-level writer lock for the
    /// whole scan.
    pub fn clear_inactive(&self) {
        let now = Self::now();
        let mut inner = self.inner.write();

        let mut erased = 0u32;
        inner.sessions.retain(|_, sess| {
            let state = sess.state.get_mut();
            if !state.expiry.is_live(now) {
                erased += 1;
                return false;
            }
            state
                .values
                .retain(|_, val| val.cell.get_mut().expiry.is_live(now));
            true
        });
        inner.count = inner.count.saturating_sub(erased);
    }

    /// Remaining capacity, for the monitoring gauge.
    pub fn free_sessions(&self) -> u32 {
        let inner = self.inner.read();
        if inner.limit == 0 {
            u32::MAX.saturating_sub(inner.count)
        } else {
            inner.limit.saturating_sub(inner.count)
        }
    }

    /// Entries currently present in the top-level map, live or not.
    pub fn session_count(&self) -> u32 {
        self.inner.read().count
    }
}
