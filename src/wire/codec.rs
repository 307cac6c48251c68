// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Packing and unpacking of the typed item sequences the protocol is built
//! from. Every multi-byte integer on the wire is big-endian.
//!
//! Two string flavors exist on purpose: [`Item::String`] carries an explicit
//! 4-byte length and may hold arbitrary binary data, while
//! [`Item::StringWithNull`] is a zero-terminated identifier that needs no
//! length prefix.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Flat decode failure. The protocol does not distinguish *why* a buffer is
/// malformed; any violation yields the same error and no partial state.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("malformed wire buffer")]
pub struct CodecError;

/// One typed item of a wire sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item<'a> {
    /// Single byte.
    Char(u8),
    /// 4-byte big-endian length followed by that many bytes.
    String(&'a [u8]),
    /// Raw bytes whose length is known from the schema, not the wire.
    FixedString(&'a [u8]),
    /// Bytes up to and including a terminating zero byte.
    StringWithNull(&'a [u8]),
    /// 2-byte big-endian integer.
    ShortInt(u16),
    /// 4-byte big-endian integer.
    Int(u32),
    /// 8-byte big-endian integer (statistics counters).
    LongInt(u64),
}

impl Item<'_> {
    fn wire_len(&self) -> usize {
        match self {
            Item::Char(_) => 1,
            Item::String(s) => 4 + s.len(),
            Item::FixedString(s) => s.len(),
            Item::StringWithNull(s) => s.len() + 1,
            Item::ShortInt(_) => 2,
            Item::Int(_) => 4,
            Item::LongInt(_) => 8,
        }
    }
}

/// Serializes the item sequence into a single owned buffer.
///
/// The exact output size is summed up front so the buffer never reallocates.
pub fn pack(items: &[Item<'_>]) -> Bytes {
    let total = items.iter().map(Item::wire_len).sum();
    let mut buf = BytesMut::with_capacity(total);

    for item in items {
        match *item {
            Item::Char(v) => buf.put_u8(v),
            Item::String(s) => {
                buf.put_u32(s.len() as u32);
                buf.put_slice(s);
            },
            Item::FixedString(s) => buf.put_slice(s),
            Item::StringWithNull(s) => {
                buf.put_slice(s);
                buf.put_u8(0);
            },
            Item::ShortInt(v) => buf.put_u16(v),
            Item::Int(v) => buf.put_u32(v),
            Item::LongInt(v) => buf.put_u64(v),
        }
    }

    buf.freeze()
}

/// Cursor that walks a request buffer according to a per-command schema.
///
/// Every read is bounds-checked against the input; string reads borrow from
/// the input rather than copying. After the last field the caller must invoke
/// [`Unpacker::finish`] so trailing garbage is rejected.
#[derive(Debug)]
pub struct Unpacker<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.offset.checked_add(n).ok_or(CodecError)?;
        if end > self.data.len() {
            return Err(CodecError);
        }
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    pub fn read_char(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_short_int(&mut self) -> Result<u16, CodecError> {
        let raw = self.take(2)?;
        Ok(u16::from_be_bytes([raw[0], raw[1]]))
    }

    pub fn read_int(&mut self) -> Result<u32, CodecError> {
        let raw = self.take(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// 4-byte length prefix, then that many bytes.
    pub fn read_string(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_int()? as usize;
        self.take(len)
    }

    /// Exactly `len` bytes; the length comes from the schema.
    pub fn read_fixed_string(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.take(len)
    }

    /// Bytes up to the terminating zero. The terminator is consumed but not
    /// part of the returned slice; a missing terminator is malformed.
    pub fn read_string_with_null(&mut self) -> Result<&'a [u8], CodecError> {
        let rest = &self.data[self.offset..];
        let end = rest.iter().position(|b| *b == 0).ok_or(CodecError)?;
        let slice = &rest[..end];
        self.offset += end + 1;
        Ok(slice)
    }

    /// The whole input must be consumed; leftover bytes are malformed.
    pub fn finish(self) -> Result<(), CodecError> {
        if self.offset == self.data.len() {
            Ok(())
        } else {
            Err(CodecError)
        }
    }
}
