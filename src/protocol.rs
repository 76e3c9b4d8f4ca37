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

//! Link protocol constants and control field types

/// Frame delimiter
pub const FLAG: u8 = 0x7E;

/// Byte-stuffing marker
pub const ESCAPE: u8 = 0x7D;

/// Stuffed bytes are XORed with this after an ESCAPE
pub const ESCAPE_XOR: u8 = 0x20;

/// Address of frames sent by the transmitter
pub const A_TRANSMITTER: u8 = 0x03;

/// Address of frames sent by the receiver
pub const A_RECEIVER: u8 = 0x01;

/// Connection request
pub const C_SET: u8 = 0x03;

/// Unnumbered acknowledgment
pub const C_UA: u8 = 0x07;

/// Disconnect
pub const C_DISC: u8 = 0x0B;

/// Information frame, sequence 0
pub const C_I0: u8 = 0x00;

/// Information frame, sequence 1
pub const C_I1: u8 = 0x40;

/// Receiver ready, expecting sequence 0
pub const C_RR0: u8 = 0x05;

/// Receiver ready, expecting sequence 1
pub const C_RR1: u8 = 0x85;

/// Reject, parity 0
pub const C_REJ0: u8 = 0x01;

/// Reject, parity 1
pub const C_REJ1: u8 = 0x81;

/// Largest payload carried by a single information frame
pub const MAX_PAYLOAD_SIZE: usize = 1000;

/// Which end of the link this process is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Transmitter,
    Receiver,
}

impl Role {
    /// Address byte carried by frames this role sends
    pub fn address(self) -> u8 {
        match self {
            Role::Transmitter => A_TRANSMITTER,
            Role::Receiver => A_RECEIVER,
        }
    }

    pub fn peer(self) -> Role {
        match self {
            Role::Transmitter => Role::Receiver,
            Role::Receiver => Role::Transmitter,
        }
    }
}

/// One-bit alternating sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Seq {
    #[default]
    Zero,
    One,
}

impl Seq {
    pub fn flip(self) -> Seq {
        match self {
            Seq::Zero => Seq::One,
            Seq::One => Seq::Zero,
        }
    }

    pub fn bit(self) -> u8 {
        match self {
            Seq::Zero => 0,
            Seq::One => 1,
        }
    }
}

/// Control frames that carry no payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Set,
    Ua,
    Disc,
    Rr(Seq),
    Rej(Seq),
}

/// Decoded control byte of any frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Command(Command),
    Information(Seq),
}

impl Control {
    pub fn to_byte(self) -> u8 {
        match self {
            Control::Command(Command::Set) => C_SET,
            Control::Command(Command::Ua) => C_UA,
            Control::Command(Command::Disc) => C_DISC,
            Control::Command(Command::Rr(Seq::Zero)) => C_RR0,
            Control::Command(Command::Rr(Seq::One)) => C_RR1,
            Control::Command(Command::Rej(Seq::Zero)) => C_REJ0,
            Control::Command(Command::Rej(Seq::One)) => C_REJ1,
            Control::Information(Seq::Zero) => C_I0,
            Control::Information(Seq::One) => C_I1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Control> {
        let control = match byte {
            C_SET => Control::Command(Command::Set),
            C_UA => Control::Command(Command::Ua),
            C_DISC => Control::Command(Command::Disc),
            C_RR0 => Control::Command(Command::Rr(Seq::Zero)),
            C_RR1 => Control::Command(Command::Rr(Seq::One)),
            C_REJ0 => Control::Command(Command::Rej(Seq::Zero)),
            C_REJ1 => Control::Command(Command::Rej(Seq::One)),
            C_I0 => Control::Information(Seq::Zero),
            C_I1 => Control::Information(Seq::One),
            _ => return None,
        };
        Some(control)
    }
}

// ============================================================================
// Application packets
// ============================================================================

/// Control packet opening a file transfer
pub const P_START: u8 = 0x01;

/// Data packet carrying one file chunk
pub const P_DATA: u8 = 0x02;

/// Control packet closing a file transfer
pub const P_END: u8 = 0x03;

/// TLV type: file size, big-endian
pub const T_FILE_SIZE: u8 = 0x00;

/// TLV type: file name
pub const T_FILE_NAME: u8 = 0x01;
