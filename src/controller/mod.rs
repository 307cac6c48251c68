// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Turns one framed request payload into one store operation and one reply
//! buffer. The first payload byte selects the command, the rest is decoded
//! against that command's schema; the reply is always a single outer STRING
//! wrapping `CHAR(code)` plus optional success fields.
//!
//! Identifiers travel as 16 raw bytes and are converted to canonical text
//! before touching the store. Commands without an id skip the conversion.

use std::{str, sync::Arc};

use anyhow::{Result, anyhow};
use bytes::Bytes;

use crate::{
    monitoring::{ErrorKind, Monitoring, Op},
    store::{OpError, Store},
    utils::{self, UUID_RAW_LEN},
    wire::{
        codec::{self, CodecError, Item, Unpacker},
        command::{Command, ResultCode},
    },
};

type RawId = [u8; UUID_RAW_LEN];

pub struct RequestController {
    store: Arc<Store>,
    monitoring: Arc<Monitoring>,
}

impl RequestController {
    pub fn new(store: Arc<Store>, monitoring: Arc<Monitoring>) -> Self {
        Self { store, monitoring }
    }

    /// Handles one request payload and returns the reply envelope. Protocol
    /// and store failures become result codes; `Err` is reserved for
    /// conditions that indicate a broken process state.
    pub fn handle(&self, payload: &[u8]) -> Result<Bytes> {
        let Some((cmd_byte, params)) = payload.split_first() else {
            self.monitoring.inc_error(ErrorKind::WrongCommand);
            return Ok(reply_status(ResultCode::WrongCommand));
        };
        let Ok(cmd) = Command::try_from(*cmd_byte) else {
            self.monitoring.inc_error(ErrorKind::WrongCommand);
            return Ok(reply_status(ResultCode::WrongCommand));
        };

        match cmd {
            Command::Generate => self.generate(params),
            Command::Exist => self.exist(params),
            Command::Remove => self.remove(params),
            Command::Prolong => self.prolong(params),
            Command::AddKey => self.add_key(params),
            Command::GetKey => self.get_key(params),
            Command::SetKey => self.set_key(params),
            Command::SetForceKey => self.set_force_key(params),
            Command::RemoveKey => self.remove_key(params),
            Command::ExistKey => self.exist_key(params),
            Command::ProlongKey => self.prolong_key(params),
            Command::AllAddKey => self.all_add_key(params),
            Command::AllRemoveKey => self.all_remove_key(params),
            Command::AddSession => self.add_session(params),
            Command::GetStatistics => self.statistics(params),
        }
    }

    /// Reaper tick: sweep dead entries, refresh the free-session gauge.
    pub fn interval(&self) {
        self.store.clear_inactive();
        self.monitoring
            .update_total_free_sessions(self.store.free_sessions());
    }

    fn generate(&self, params: &[u8]) -> Result<Bytes> {
        let Ok(lifetime) = decode_lifetime(params) else {
            return Ok(self.wrong_params(Op::Generate));
        };
        match self.store.generate(lifetime) {
            Ok(id) => {
                let raw = utils::to_bin(&id)
                    .ok_or_else(|| anyhow!("generated session id is not hex: {id}"))?;
                self.monitoring
                    .update_total_free_sessions(self.store.free_sessions());
                Ok(self.passed(Op::Generate, &[
                    Item::Char(ResultCode::Ok as u8),
                    Item::FixedString(&raw),
                ]))
            },
            Err(err) => Ok(self.failed(Op::Generate, err)),
        }
    }

    fn exist(&self, params: &[u8]) -> Result<Bytes> {
        let Ok(raw) = decode_id(params) else {
            return Ok(self.wrong_params(Op::Exist));
        };
        // An absent session is a normal probe outcome, not a failure.
        let code = match self.store.exist(&utils::to_normal(&raw)) {
            Ok(()) => ResultCode::Ok,
            Err(err) => err.into(),
        };
        Ok(self.passed_status(Op::Exist, code))
    }

    fn remove(&self, params: &[u8]) -> Result<Bytes> {
        let Ok(raw) = decode_id(params) else {
            return Ok(self.wrong_params(Op::Remove));
        };
        self.store.remove(&utils::to_normal(&raw));
        Ok(self.passed_status(Op::Remove, ResultCode::Ok))
    }

    fn prolong(&self, params: &[u8]) -> Result<Bytes> {
        let Ok((raw, lifetime)) = decode_id_lifetime(params) else {
            return Ok(self.wrong_params(Op::Prolong));
        };
        match self.store.prolong(&utils::to_normal(&raw), lifetime) {
            Ok(()) => Ok(self.passed_status(Op::Prolong, ResultCode::Ok)),
            Err(err) => Ok(self.failed(Op::Prolong, err)),
        }
    }

    fn add_key(&self, params: &[u8]) -> Result<Bytes> {
        let Ok((raw, key, value, lifetime)) = decode_add_key(params) else {
            return Ok(self.wrong_params(Op::AddKey));
        };
        match self
            .store
            .add_key(&utils::to_normal(&raw), key, value, lifetime)
        {
            Ok((counter_keys, counter_record)) => Ok(self.passed(Op::AddKey, &[
                Item::Char(ResultCode::Ok as u8),
                Item::Int(counter_keys),
                Item::Int(counter_record),
            ])),
            Err(err) => Ok(self.failed(Op::AddKey, err)),
        }
    }

    fn get_key(&self, params: &[u8]) -> Result<Bytes> {
        let Ok((raw, key, limit)) = decode_get_key(params) else {
            return Ok(self.wrong_params(Op::GetKey));
        };
        match self.store.get_key(&utils::to_normal(&raw), key, limit) {
            Ok(read) => Ok(self.passed(Op::GetKey, &[
                Item::Char(ResultCode::Ok as u8),
                Item::String(&read.data),
                Item::Int(read.counter_keys),
                Item::Int(read.counter_record),
            ])),
            Err(err) => Ok(self.failed(Op::GetKey, err)),
        }
    }

    fn set_key(&self, params: &[u8]) -> Result<Bytes> {
        let Ok((raw, key, value, counter_keys, counter_record, limit)) =
            decode_set_key(params)
        else {
            return Ok(self.wrong_params(Op::SetKey));
        };
        match self.store.set_key(
            &utils::to_normal(&raw),
            key,
            value,
            counter_keys,
            counter_record,
            limit,
        ) {
            Ok(()) => Ok(self.passed_status(Op::SetKey, ResultCode::Ok)),
            Err(err) => Ok(self.failed(Op::SetKey, err)),
        }
    }

    fn set_force_key(&self, params: &[u8]) -> Result<Bytes> {
        let Ok((raw, key, value, limit)) = decode_set_force_key(params) else {
            return Ok(self.wrong_params(Op::SetForceKey));
        };
        match self
            .store
            .set_force_key(&utils::to_normal(&raw), key, value, limit)
        {
            Ok(()) => Ok(self.passed_status(Op::SetForceKey, ResultCode::Ok)),
            Err(err) => Ok(self.failed(Op::SetForceKey, err)),
        }
    }

    fn remove_key(&self, params: &[u8]) -> Result<Bytes> {
        let Ok((raw, key)) = decode_id_key(params) else {
            return Ok(self.wrong_params(Op::RemoveKey));
        };
        match self.store.remove_key(&utils::to_normal(&raw), key) {
            Ok(()) => Ok(self.passed_status(Op::RemoveKey, ResultCode::Ok)),
            Err(err) => Ok(self.failed(Op::RemoveKey, err)),
        }
    }

    fn exist_key(&self, params: &[u8]) -> Result<Bytes> {
        let Ok((raw, key)) = decode_id_key(params) else {
            return Ok(self.wrong_params(Op::ExistKey));
        };
        match self.store.exist_key(&utils::to_normal(&raw), key) {
            Ok(()) => Ok(self.passed_status(Op::ExistKey, ResultCode::Ok)),
            // A missing key is a normal probe outcome, not a failure.
            Err(OpError::KeyNone) => {
                Ok(self.passed_status(Op::ExistKey, ResultCode::KeyNone))
            },
            Err(err) => Ok(self.failed(Op::ExistKey, err)),
        }
    }

    fn prolong_key(&self, params: &[u8]) -> Result<Bytes> {
        let Ok((raw, key, lifetime)) = decode_id_key_lifetime(params) else {
            return Ok(self.wrong_params(Op::ProlongKey));
        };
        match self
            .store
            .prolong_key(&utils::to_normal(&raw), key, lifetime)
        {
            Ok(()) => Ok(self.passed_status(Op::ProlongKey, ResultCode::Ok)),
            Err(err) => Ok(self.failed(Op::ProlongKey, err)),
        }
    }

    fn all_add_key(&self, params: &[u8]) -> Result<Bytes> {
        let Ok((key, value)) = decode_key_value(params) else {
            return Ok(self.wrong_params(Op::AddKeyToAll));
        };
        self.store.add_all_key(key, value);
        Ok(self.passed_status(Op::AddKeyToAll, ResultCode::Ok))
    }

    fn all_remove_key(&self, params: &[u8]) -> Result<Bytes> {
        let Ok(key) = decode_key(params) else {
            return Ok(self.wrong_params(Op::RemoveKeyFromAll));
        };
        self.store.remove_all_key(key);
        Ok(self.passed_status(Op::RemoveKeyFromAll, ResultCode::Ok))
    }

    fn add_session(&self, params: &[u8]) -> Result<Bytes> {
        let Ok((raw, lifetime)) = decode_id_lifetime(params) else {
            return Ok(self.wrong_params(Op::Add));
        };
        match self.store.add(&utils::to_normal(&raw), lifetime) {
            Ok(()) => {
                self.monitoring
                    .update_total_free_sessions(self.store.free_sessions());
                Ok(self.passed_status(Op::Add, ResultCode::Ok))
            },
            Err(err) => Ok(self.failed(Op::Add, err)),
        }
    }

    fn statistics(&self, params: &[u8]) -> Result<Bytes> {
        if !params.is_empty() {
            self.monitoring.inc_error(ErrorKind::WrongParams);
            return Ok(reply_status(ResultCode::WrongParams));
        }
        let snapshot = self.monitoring.snapshot();
        let mut items = Vec::with_capacity(snapshot.len() + 1);
        items.push(Item::Char(ResultCode::Ok as u8));
        items.extend(snapshot.iter().map(|v| Item::LongInt(*v)));
        Ok(reply(&items))
    }

    fn passed(&self, op: Op, items: &[Item<'_>]) -> Bytes {
        self.monitoring.inc_passed(op);
        reply(items)
    }

    fn passed_status(&self, op: Op, code: ResultCode) -> Bytes {
        self.monitoring.inc_passed(op);
        reply_status(code)
    }

    fn failed(&self, op: Op, err: OpError) -> Bytes {
        self.monitoring.inc_failed(op);
        self.monitoring.inc_error(err.into());
        reply_status(err.into())
    }

    fn wrong_params(&self, op: Op) -> Bytes {
        self.monitoring.inc_failed(op);
        self.monitoring.inc_error(ErrorKind::WrongParams);
        reply_status(ResultCode::WrongParams)
    }
}

/// Wraps the inner reply in the outer STRING envelope. The transport adds
/// its own length prefix on top; the envelope is redundant but part of the
/// wire contract.
fn reply(items: &[Item<'_>]) -> Bytes {
    let inner = codec::pack(items);
    codec::pack(&[Item::String(&inner)])
}

fn reply_status(code: ResultCode) -> Bytes {
    reply(&[Item::Char(code as u8)])
}

fn read_id(p: &mut Unpacker<'_>) -> Result<RawId, CodecError> {
    p.read_fixed_string(UUID_RAW_LEN)?
        .try_into()
        .map_err(|_| CodecError)
}

/// Key names are zero-terminated identifiers and must be valid UTF-8.
fn read_key<'a>(p: &mut Unpacker<'a>) -> Result<&'a str, CodecError> {
    str::from_utf8(p.read_string_with_null()?).map_err(|_| CodecError)
}

fn decode_lifetime(params: &[u8]) -> Result<u32, CodecError> {
    let mut p = Unpacker::new(params);
    let lifetime = p.read_int()?;
    p.finish()?;
    Ok(lifetime)
}

fn decode_id(params: &[u8]) -> Result<RawId, CodecError> {
    let mut p = Unpacker::new(params);
    let raw = read_id(&mut p)?;
    p.finish()?;
    Ok(raw)
}

fn decode_id_lifetime(params: &[u8]) -> Result<(RawId, u32), CodecError> {
    let mut p = Unpacker::new(params);
    let raw = read_id(&mut p)?;
    let lifetime = p.read_int()?;
    p.finish()?;
    Ok((raw, lifetime))
}

fn decode_id_key(params: &[u8]) -> Result<(RawId, &str), CodecError> {
    let mut p = Unpacker::new(params);
    let raw = read_id(&mut p)?;
    let key = read_key(&mut p)?;
    p.finish()?;
    Ok((raw, key))
}

fn decode_id_key_lifetime(params: &[u8]) -> Result<(RawId, &str, u32), CodecError> {
    let mut p = Unpacker::new(params);
    let raw = read_id(&mut p)?;
    let key = read_key(&mut p)?;
    let lifetime = p.read_int()?;
    p.finish()?;
    Ok((raw, key, lifetime))
}

fn decode_add_key(params: &[u8]) -> Result<(RawId, &str, &[u8], u32), CodecError> {
    let mut p = Unpacker::new(params);
    let raw = read_id(&mut p)?;
    let key = read_key(&mut p)?;
    let value = p.read_string()?;
    let lifetime = p.read_int()?;
    p.finish()?;
    Ok((raw, key, value, lifetime))
}

fn decode_get_key(params: &[u8]) -> Result<(RawId, &str, u16), CodecError> {
    let mut p = Unpacker::new(params);
    let raw = read_id(&mut p)?;
    let key = read_key(&mut p)?;
    let limit = p.read_short_int()?;
    p.finish()?;
    Ok((raw, key, limit))
}

#[allow(clippy::type_complexity)]
fn decode_set_key(
    params: &[u8],
) -> Result<(RawId, &str, &[u8], u32, u32, u16), CodecError> {
    let mut p = Unpacker::new(params);
    let raw = read_id(&mut p)?;
    let key = read_key(&mut p)?;
    let value = p.read_string()?;
    let counter_keys = p.read_int()?;
    let counter_record = p.read_int()?;
    let limit = p.read_short_int()?;
    p.finish()?;
    Ok((raw, key, value, counter_keys, counter_record, limit))
}

fn decode_set_force_key(
    params: &[u8],
) -> Result<(RawId, &str, &[u8], u16), CodecError> {
    let mut p = Unpacker::new(params);
    let raw = read_id(&mut p)?;
    let key = read_key(&mut p)?;
    let value = p.read_string()?;
    let limit = p.read_short_int()?;
    p.finish()?;
    Ok((raw, key, value, limit))
}

fn decode_key_value(params: &[u8]) -> Result<(&str, &[u8]), CodecError> {
    let mut p = Unpacker::new(params);
    let key = read_key(&mut p)?;
    let value = p.read_string()?;
    p.finish()?;
    Ok((key, value))
}

fn decode_key(params: &[u8]) -> Result<&str, CodecError> {
    let mut p = Unpacker::new(params);
    let key = read_key(&mut p)?;
    p.finish()?;
    Ok(key)
}
