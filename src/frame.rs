// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Frame encoding.
//!
//! ```text
//! +------+---------+---------+------+-----------------+------+------+
//! | FLAG | Address | Control | BCC1 | payload (I only)| BCC2 | FLAG |
//! +------+---------+---------+------+-----------------+------+------+
//! ```
//!
//! Everything between the two FLAGs is byte-stuffed. Decoding lives in
//! [`crate::scanner`].

use crate::protocol::*;

/// XOR of all bytes
pub fn bcc(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Largest possible encoding of an information frame with `payload_len`
/// bytes: every stuffable byte doubled, plus the two delimiters.
pub fn max_encoded_len(payload_len: usize) -> usize {
    // address, control, BCC1, payload, BCC2
    2 + 2 * (3 + payload_len + 1)
}

fn push_stuffed(out: &mut Vec<u8>, byte: u8) {
    if byte == FLAG || byte == ESCAPE {
        out.push(ESCAPE);
        out.push(byte ^ ESCAPE_XOR);
    } else {
        out.push(byte);
    }
}

/// Build a 5-byte supervisory or unnumbered frame sent by `role`
pub fn encode_control(role: Role, command: Command) -> [u8; 5] {
    let address = role.address();
    let control = Control::Command(command).to_byte();
    [FLAG, address, control, address ^ control, FLAG]
}

/// Build an information frame. Only the transmitter sends these.
pub fn encode_information(seq: Seq, payload: &[u8]) -> Vec<u8> {
    let address = Role::Transmitter.address();
    let control = Control::Information(seq).to_byte();

    let mut frame = Vec::with_capacity(max_encoded_len(payload.len()));
    frame.push(FLAG);
    for byte in [address, control, address ^ control] {
        push_stuffed(&mut frame, byte);
    }
    for &byte in payload {
        push_stuffed(&mut frame, byte);
    }
    push_stuffed(&mut frame, bcc(payload));
    frame.push(FLAG);

    frame
}
