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

//! Byte-at-a-time frame recognizer.
//!
//! One automaton serves every wait in the link layer: it is configured with
//! the address the peer sends from and the set of control fields the caller
//! is interested in. Anything else is treated as line noise.
//!
//! ```text
//!   AwaitFlag --FLAG--> AwaitAddress --addr--> AwaitControl --ctl--> AwaitChecksum
//!                           ^                                             |
//!                           |                                           BCC1
//!                           |                                             v
//!                           +----------------FLAG (frame done)-------- Body <--> Escape
//! ```
//!
//! A FLAG seen in any state starts a new frame. Any other unexpected byte
//! drops back to `AwaitFlag` and discards the partial frame.

use crate::frame::bcc;
use crate::protocol::*;

/// Control fields a scanner will recognize
#[derive(Debug, Clone, Copy)]
pub struct Accept {
    commands: &'static [Command],
    information: bool,
}

impl Accept {
    #[cfg(test)]
    pub const INFORMATION: Accept = Accept { commands: &[], information: true };

    pub const fn commands(commands: &'static [Command]) -> Accept {
        Accept { commands, information: false }
    }

    pub const fn with_information(self) -> Accept {
        Accept { commands: self.commands, information: true }
    }

    fn allows(&self, control: Control) -> bool {
        match control {
            Control::Command(command) => self.commands.contains(&command),
            Control::Information(_) => self.information,
        }
    }
}

/// A complete frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Command(Command),
    Information { seq: Seq, payload: Vec<u8> },
    /// Information frame whose BCC2 did not match its payload
    BadChecksum { seq: Seq },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    AwaitFlag,
    AwaitAddress,
    AwaitControl,
    AwaitChecksum(Control),
    Body(Control),
    Escape(Seq),
}

pub struct FrameScanner {
    address: u8,
    accept: Accept,
    state: ScanState,
    body: Vec<u8>,
}

impl FrameScanner {
    pub fn new(address: u8, accept: Accept) -> Self {
        FrameScanner {
            address,
            accept,
            state: ScanState::AwaitFlag,
            body: Vec::new(),
        }
    }

    /// Forget any partially scanned frame
    pub fn reset(&mut self) {
        self.state = ScanState::AwaitFlag;
        self.body.clear();
    }

    /// Feed one byte. Returns an event when `byte` closes a frame.
    pub fn push(&mut self, byte: u8) -> Option<ScanEvent> {
        if byte == FLAG {
            let event = match self.state {
                ScanState::Body(control) => self.finish(control),
                _ => None,
            };
            self.body.clear();
            self.state = ScanState::AwaitAddress;
            return event;
        }

        let state = self.state;
        self.state = match state {
            ScanState::AwaitFlag => ScanState::AwaitFlag,
            ScanState::AwaitAddress if byte == self.address => ScanState::AwaitControl,
            ScanState::AwaitControl => match Control::from_byte(byte) {
                Some(control) if self.accept.allows(control) => ScanState::AwaitChecksum(control),
                _ => ScanState::AwaitFlag,
            },
            ScanState::AwaitChecksum(control) if byte == self.address ^ control.to_byte() => {
                ScanState::Body(control)
            }
            ScanState::Body(Control::Information(seq)) => {
                if byte == ESCAPE {
                    ScanState::Escape(seq)
                } else {
                    self.collect(byte, seq)
                }
            }
            ScanState::Escape(seq) => match byte ^ ESCAPE_XOR {
                FLAG | ESCAPE => self.collect(byte ^ ESCAPE_XOR, seq),
                _ => ScanState::AwaitFlag,
            },
            // unexpected address, BCC1 mismatch, or payload after a command
            _ => ScanState::AwaitFlag,
        };

        if self.state == ScanState::AwaitFlag {
            self.body.clear();
        }
        None
    }

    fn collect(&mut self, byte: u8, seq: Seq) -> ScanState {
        // payload plus BCC2
        if self.body.len() > MAX_PAYLOAD_SIZE {
            return ScanState::AwaitFlag;
        }
        self.body.push(byte);
        ScanState::Body(Control::Information(seq))
    }

    fn finish(&mut self, control: Control) -> Option<ScanEvent> {
        match control {
            Control::Command(command) => Some(ScanEvent::Command(command)),
            Control::Information(seq) => {
                let (&checksum, payload) = self.body.split_last()?;
                if bcc(payload) == checksum {
                    let mut payload = std::mem::take(&mut self.body);
                    payload.pop();
                    Some(ScanEvent::Information { seq, payload })
                } else {
                    Some(ScanEvent::BadChecksum { seq })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{encode_control, encode_information};

    const REPLIES: Accept = Accept::commands(&[Command::Ua, Command::Disc]);

    fn feed(scanner: &mut FrameScanner, bytes: &[u8]) -> Vec<ScanEvent> {
        bytes.iter().filter_map(|&b| scanner.push(b)).collect()
    }

    #[test]
    fn test_recognizes_control_frame() {
        let mut scanner = FrameScanner::new(A_RECEIVER, REPLIES);
        let events = feed(&mut scanner, &encode_control(Role::Receiver, Command::Ua));
        assert_eq!(events, vec![ScanEvent::Command(Command::Ua)]);
    }

    #[test]
    fn test_noise_before_frame_is_skipped() {
        let mut scanner = FrameScanner::new(A_RECEIVER, REPLIES);
        let mut bytes = vec![0x00, 0x55, 0x01, 0x07];
        bytes.extend_from_slice(&encode_control(Role::Receiver, Command::Disc));
        assert_eq!(feed(&mut scanner, &bytes), vec![ScanEvent::Command(Command::Disc)]);
    }

    #[test]
    fn test_flag_mid_frame_restarts() {
        let mut scanner = FrameScanner::new(A_RECEIVER, REPLIES);
        // truncated header followed directly by a full frame
        let mut bytes = vec![FLAG, A_RECEIVER, C_UA];
        bytes.extend_from_slice(&encode_control(Role::Receiver, Command::Ua));
        assert_eq!(feed(&mut scanner, &bytes), vec![ScanEvent::Command(Command::Ua)]);
    }

    #[test]
    fn test_back_to_back_frames_share_nothing() {
        let mut scanner = FrameScanner::new(A_RECEIVER, REPLIES);
        let mut bytes = encode_control(Role::Receiver, Command::Ua).to_vec();
        bytes.extend_from_slice(&encode_control(Role::Receiver, Command::Disc));
        assert_eq!(
            feed(&mut scanner, &bytes),
            vec![ScanEvent::Command(Command::Ua), ScanEvent::Command(Command::Disc)]
        );
    }

    #[test]
    fn test_wrong_address_is_ignored() {
        let mut scanner = FrameScanner::new(A_RECEIVER, REPLIES);
        let events = feed(&mut scanner, &encode_control(Role::Transmitter, Command::Ua));
        assert!(events.is_empty());
    }

    #[test]
    fn test_unaccepted_control_is_ignored() {
        let mut scanner = FrameScanner::new(A_RECEIVER, REPLIES);
        let events = feed(&mut scanner, &encode_control(Role::Receiver, Command::Rr(Seq::One)));
        assert!(events.is_empty());
    }

    #[test]
    fn test_bad_header_checksum_is_ignored() {
        let mut scanner = FrameScanner::new(A_RECEIVER, REPLIES);
        let events = feed(&mut scanner, &[FLAG, A_RECEIVER, C_UA, 0x00, FLAG]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_command_with_trailing_bytes_is_ignored() {
        let mut scanner = FrameScanner::new(A_RECEIVER, REPLIES);
        let events = feed(&mut scanner, &[FLAG, A_RECEIVER, C_UA, A_RECEIVER ^ C_UA, 0x42, FLAG]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_information_destuffs_delimiters() {
        let mut scanner = FrameScanner::new(A_TRANSMITTER, Accept::INFORMATION);
        let payload = vec![FLAG, ESCAPE, 0x20, FLAG];
        let events = feed(&mut scanner, &encode_information(Seq::One, &payload));
        assert_eq!(events, vec![ScanEvent::Information { seq: Seq::One, payload }]);
    }

    #[test]
    fn test_bad_payload_checksum_reported_at_flag() {
        let mut scanner = FrameScanner::new(A_TRANSMITTER, Accept::INFORMATION);
        let mut frame = encode_information(Seq::Zero, &[0x01, 0x02, 0x03]);
        let bcc2 = frame.len() - 2;
        frame[bcc2] ^= 0x01;

        let (body, closing) = frame.split_at(frame.len() - 1);
        assert!(feed(&mut scanner, body).is_empty());
        assert_eq!(feed(&mut scanner, closing), vec![ScanEvent::BadChecksum { seq: Seq::Zero }]);
    }

    #[test]
    fn test_malformed_escape_discards_frame() {
        let mut scanner = FrameScanner::new(A_TRANSMITTER, Accept::INFORMATION);
        // ESCAPE followed by a byte that is not a stuffed delimiter
        let bytes = [FLAG, A_TRANSMITTER, C_I0, A_TRANSMITTER ^ C_I0, 0x01, ESCAPE, 0x41, 0x01, FLAG];
        assert!(feed(&mut scanner, &bytes).is_empty());

        let good = encode_information(Seq::Zero, &[0x09]);
        assert_eq!(
            feed(&mut scanner, &good),
            vec![ScanEvent::Information { seq: Seq::Zero, payload: vec![0x09] }]
        );
    }

    #[test]
    fn test_information_without_checksum_is_noise() {
        let mut scanner = FrameScanner::new(A_TRANSMITTER, Accept::INFORMATION);
        let bytes = [FLAG, A_TRANSMITTER, C_I1, A_TRANSMITTER ^ C_I1, FLAG];
        assert!(feed(&mut scanner, &bytes).is_empty());
    }

    #[test]
    fn test_oversized_body_is_dropped() {
        let mut scanner = FrameScanner::new(A_TRANSMITTER, Accept::INFORMATION);
        let payload = vec![0x11; MAX_PAYLOAD_SIZE + 1];
        assert!(feed(&mut scanner, &encode_information(Seq::Zero, &payload)).is_empty());
    }

    #[test]
    fn test_mixed_accept_set() {
        let accept = Accept::commands(&[Command::Set]).with_information();
        let mut scanner = FrameScanner::new(A_TRANSMITTER, accept);
        let mut bytes = encode_control(Role::Transmitter, Command::Set).to_vec();
        bytes.extend_from_slice(&encode_information(Seq::Zero, &[0xAA]));
        assert_eq!(
            feed(&mut scanner, &bytes),
            vec![
                ScanEvent::Command(Command::Set),
                ScanEvent::Information { seq: Seq::Zero, payload: vec![0xAA] },
            ]
        );
    }

    #[test]
    fn test_reset_forgets_partial_frame() {
        let mut scanner = FrameScanner::new(A_RECEIVER, REPLIES);
        feed(&mut scanner, &[FLAG, A_RECEIVER, C_UA]);
        scanner.reset();
        assert!(feed(&mut scanner, &[A_RECEIVER ^ C_UA, FLAG]).is_empty());
    }
}
