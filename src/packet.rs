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

//! File transfer packets carried as link layer payloads.
//!
//! ```text
//! control: | START/END | T=0 | L | size (big-endian) | T=1 | L | name |
//! data:    | DATA | L2 | L1 | L2*256+L1 bytes |
//! ```

use thiserror::Error;
use crate::protocol::*;

/// Largest file chunk that still fits one information frame
pub const MAX_CHUNK_SIZE: usize = MAX_PAYLOAD_SIZE - 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,

    #[error("unknown packet type 0x{0:02X}")]
    UnknownType(u8),

    #[error("packet truncated")]
    Truncated,

    #[error("data packet declares {declared} bytes but carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("unexpected field type 0x{0:02X}")]
    UnexpectedField(u8),

    #[error("file name longer than 255 bytes")]
    FileNameTooLong,

    #[error("file name is not valid UTF-8")]
    InvalidFileName,

    #[error("file size field of {0} bytes")]
    InvalidSizeField(usize),

    #[error("data chunk of {0} bytes exceeds packet limit")]
    ChunkTooLarge(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Start { file_size: u64, file_name: String },
    Data(Vec<u8>),
    End { file_size: u64, file_name: String },
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        match self {
            Packet::Start { file_size, file_name } => encode_control(P_START, *file_size, file_name),
            Packet::End { file_size, file_name } => encode_control(P_END, *file_size, file_name),
            Packet::Data(chunk) => {
                if chunk.len() > MAX_CHUNK_SIZE {
                    return Err(PacketError::ChunkTooLarge(chunk.len()));
                }
                let mut packet = Vec::with_capacity(3 + chunk.len());
                packet.push(P_DATA);
                packet.push((chunk.len() >> 8) as u8);
                packet.push((chunk.len() & 0xFF) as u8);
                packet.extend_from_slice(chunk);
                Ok(packet)
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Packet, PacketError> {
        let (&kind, rest) = bytes.split_first().ok_or(PacketError::Empty)?;
        match kind {
            P_DATA => {
                let [l2, l1, data @ ..] = rest else {
                    return Err(PacketError::Truncated);
                };
                let declared = usize::from(*l2) * 256 + usize::from(*l1);
                if declared != data.len() {
                    return Err(PacketError::LengthMismatch { declared, actual: data.len() });
                }
                Ok(Packet::Data(data.to_vec()))
            }
            P_START | P_END => {
                let (file_size, file_name) = decode_control(rest)?;
                if kind == P_START {
                    Ok(Packet::Start { file_size, file_name })
                } else {
                    Ok(Packet::End { file_size, file_name })
                }
            }
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

fn encode_control(kind: u8, file_size: u64, file_name: &str) -> Result<Vec<u8>, PacketError> {
    let name = file_name.as_bytes();
    if name.len() > u8::MAX as usize {
        return Err(PacketError::FileNameTooLong);
    }

    // shortest big-endian form, at least one byte
    let size_bytes = file_size.to_be_bytes();
    let skip = size_bytes.iter().take_while(|&&b| b == 0).count().min(7);
    let size = &size_bytes[skip..];

    let mut packet = Vec::with_capacity(5 + size.len() + name.len());
    packet.push(kind);
    packet.push(T_FILE_SIZE);
    packet.push(size.len() as u8);
    packet.extend_from_slice(size);
    packet.push(T_FILE_NAME);
    packet.push(name.len() as u8);
    packet.extend_from_slice(name);
    Ok(packet)
}

/// Split one TLV off the front of `bytes`
fn take_field(bytes: &[u8]) -> Result<(u8, &[u8], &[u8]), PacketError> {
    let [kind, len, rest @ ..] = bytes else {
        return Err(PacketError::Truncated);
    };
    let len = usize::from(*len);
    if rest.len() < len {
        return Err(PacketError::Truncated);
    }
    let (value, rest) = rest.split_at(len);
    Ok((*kind, value, rest))
}

fn decode_control(bytes: &[u8]) -> Result<(u64, String), PacketError> {
    let (kind, size, rest) = take_field(bytes)?;
    if kind != T_FILE_SIZE {
        return Err(PacketError::UnexpectedField(kind));
    }
    if size.is_empty() || size.len() > 8 {
        return Err(PacketError::InvalidSizeField(size.len()));
    }
    let file_size = size.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));

    let (kind, name, _) = take_field(rest)?;
    if kind != T_FILE_NAME {
        return Err(PacketError::UnexpectedField(kind));
    }
    let file_name = String::from_utf8(name.to_vec()).map_err(|_| PacketError::InvalidFileName)?;

    Ok((file_size, file_name))
}
