// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The one-byte command ids and the one-byte result codes of the protocol.
//! The numbering is part of the wire contract and must not change.

use thiserror::Error;

use crate::store::OpError;

/// Request commands, keyed by the first payload byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Generate = 1,
    Exist = 2,
    Remove = 3,
    Prolong = 4,
    AddKey = 5,
    GetKey = 6,
    SetKey = 7,
    SetForceKey = 8,
    RemoveKey = 9,
    ExistKey = 10,
    ProlongKey = 11,
    /* 12–13, 16–17 retired */
    AllAddKey = 14,
    AllRemoveKey = 15,
    AddSession = 18,
    GetStatistics = 19,
}

impl Command {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Generate,
            2 => Self::Exist,
            3 => Self::Remove,
            4 => Self::Prolong,
            5 => Self::AddKey,
            6 => Self::GetKey,
            7 => Self::SetKey,
            8 => Self::SetForceKey,
            9 => Self::RemoveKey,
            10 => Self::ExistKey,
            11 => Self::ProlongKey,
            14 => Self::AllAddKey,
            15 => Self::AllRemoveKey,
            18 => Self::AddSession,
            19 => Self::GetStatistics,
            _ => return None,
        })
    }
}

/// Returned when the first payload byte names no command.
#[derive(Debug, Error)]
#[error("unknown command: 0x{0:02x}")]
pub struct UnknownCommand(pub u8);

impl TryFrom<u8> for Command {
    type Error = UnknownCommand;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_u8(byte).ok_or(UnknownCommand(byte))
    }
}

/// Reply status carried in the single CHAR field of every response.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Ok = 1,
    WrongCommand = 2,
    WrongParams = 3,
    SessionNone = 4,
    KeyNone = 5,
    LimitExceeded = 6,
    LifetimeExceeded = 7,
    DuplicateKey = 8,
    RecordBeenChanged = 9,
    LimitPerSecExceeded = 10,
    DuplicateSession = 11,
}

impl From<OpError> for ResultCode {
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
