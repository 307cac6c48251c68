// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use rand::RngExt;

/// Length of the canonical text form (`xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx`).
pub const UUID_TEXT_LEN: usize = 36;
/// Length of the raw binary form carried on the wire.
pub const UUID_RAW_LEN: usize = 16;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Generates a v4-shaped session id in canonical lowercase text form.
///
/// Hyphens sit at indices 8/13/18/23, index 14 is the version digit `4` and
/// index 19 carries the variant bits (one of `8`, `9`, `a`, `b`).
pub fn generate() -> String {
    let mut rng = rand::rng();
    let mut out = String::with_capacity(UUID_TEXT_LEN);

    for i in 0..UUID_TEXT_LEN {
        let ch = match i {
            8 | 13 | 18 | 23 => '-',
            14 => '4',
            19 => HEX[rng.random_range(8..12)] as char,
            _ => HEX[rng.random_range(0..16)] as char,
        };
        out.push(ch);
    }

    out
}

/// Parses the 36-char text form into 16 raw bytes.
///
/// Hyphen positions are skipped unchecked; any non-hex digit elsewhere
/// returns `None`. Uppercase digits are accepted.
pub fn to_bin(text: &str) -> Option<[u8; UUID_RAW_LEN]> {
    let bytes = text.as_bytes();
    if bytes.len() != UUID_TEXT_LEN {
        return None;
    }

    let mut out = [0u8; UUID_RAW_LEN];
    let mut nibbles = 0usize;

    for (i, b) in bytes.iter().enumerate() {
        if matches!(i, 8 | 13 | 18 | 23) {
            continue;
        }
        let digit = (*b as char).to_digit(16)? as u8;
        if nibbles % 2 == 0 {
            out[nibbles / 2] = digit << 4;
        } else {
            out[nibbles / 2] |= digit;
        }
        nibbles += 1;
    }

    Some(out)
}

/// Renders 16 raw bytes as the canonical lowercase text form. Inverse of
/// [`to_bin`] for every id produced by [`generate`].
pub fn to_normal(raw: &[u8; UUID_RAW_LEN]) -> String {
    let mut out = String::with_capacity(UUID_TEXT_LEN);

    for (i, b) in raw.iter().enumerate() {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0F) as usize] as char);
        if matches!(i, 3 | 5 | 7 | 9) {
            out.push('-');
        }
    }

    out
}
