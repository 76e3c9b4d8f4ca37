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

//! Stop-and-wait transfer of information frames.
//!
//! The transmitter sends `I(s)` and waits for `RR(!s)`. A REJ or an RR of
//! the wrong parity triggers an immediate retransmission, silence triggers
//! one after the timeout. The receiver answers every good frame with
//! `RR(!s)`, every corrupted one with `REJ`, and recognizes a repeated
//! `I(s)` (its RR got lost) by its stale parity.

use tracing::{debug, info, warn};
use crate::error::{ExchangeError, ReadError, WriteError};
use crate::frame::{encode_control, encode_information};
use crate::link::{Session, Verdict};
use crate::protocol::{Command, MAX_PAYLOAD_SIZE, Role, Seq};
use crate::scanner::{Accept, ScanEvent};

/// Replies the transmitter listens for after an I-frame. UA shows up when
/// the receiver answers a late SET.
const ACK_REPLIES: Accept = Accept::commands(&[
    Command::Rr(Seq::Zero),
    Command::Rr(Seq::One),
    Command::Rej(Seq::Zero),
    Command::Rej(Seq::One),
    Command::Ua,
]);

const DATA_FRAMES: Accept = Accept::commands(&[Command::Set, Command::Disc]).with_information();

impl Session {
    /// Send one payload. Returns the size of the frame on the wire.
    pub fn write(&mut self, payload: &[u8]) -> Result<usize, WriteError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(WriteError::PayloadTooLarge { len: payload.len(), max: MAX_PAYLOAD_SIZE });
        }

        let seq = self.send_seq;
        let frame = encode_information(seq, payload);
        let ack = Command::Rr(seq.flip());

        let result = self.exchange(&frame, ACK_REPLIES, |event| match event {
            ScanEvent::Command(command) if *command == ack => Verdict::Accept,
            ScanEvent::Command(Command::Rr(_) | Command::Rej(_)) => Verdict::Resend,
            _ => Verdict::Ignore,
        });

        match result {
            Ok((_, attempts)) => {
                self.count_transmissions(attempts);
                self.stats.bytes_sent += payload.len() as u64;
                self.send_seq = seq.flip();
                debug!("I{} acknowledged after {} attempt(s)", seq.bit(), attempts);
                Ok(frame.len())
            }
            Err(ExchangeError::Exhausted { attempts }) => {
                self.count_transmissions(attempts);
                Err(WriteError::RetriesExhausted { attempts })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn count_transmissions(&mut self, attempts: u32) {
        self.stats.frames_sent += u64::from(attempts);
        self.stats.retransmissions += u64::from(attempts.saturating_sub(1));
    }

    /// Receive one payload into `buf`. [`ReadError::BadChecksum`] means the
    /// frame was already rejected on the wire and the caller should read
    /// again.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        if self.peer_disconnected {
            return Err(ReadError::Disconnected);
        }

        let mut scanner = self.scanner(DATA_FRAMES);
        loop {
            match self.wait_event(&mut scanner)? {
                ScanEvent::Information { seq, payload } if seq == self.recv_seq => {
                    if payload.len() > buf.len() {
                        // left unacknowledged, the peer will retransmit
                        return Err(ReadError::BufferTooSmall {
                            needed: payload.len(),
                            available: buf.len(),
                        });
                    }
                    buf[..payload.len()].copy_from_slice(&payload);

                    self.send_frame(&encode_control(Role::Receiver, Command::Rr(seq.flip())))?;
                    self.recv_seq = seq.flip();
                    self.stats.frames_received += 1;
                    self.stats.bytes_received += payload.len() as u64;
                    return Ok(payload.len());
                }
                ScanEvent::Information { seq, .. } => {
                    debug!("Duplicate I{}, acknowledging again", seq.bit());
                    self.stats.duplicates += 1;
                    self.send_frame(&encode_control(Role::Receiver, Command::Rr(seq.flip())))?;
                }
                ScanEvent::BadChecksum { seq } => {
                    warn!("I{} failed checksum, rejecting", seq.bit());
                    self.stats.rejects_sent += 1;
                    let rej = Command::Rej(self.recv_seq.flip());
                    self.send_frame(&encode_control(Role::Receiver, rej))?;
                    return Err(ReadError::BadChecksum);
                }
                ScanEvent::Command(Command::Set) => {
                    debug!("Peer repeated SET, answering UA");
                    self.send_frame(&encode_control(Role::Receiver, Command::Ua))?;
                }
                ScanEvent::Command(Command::Disc) => {
                    info!("Peer requested disconnect");
                    self.peer_disconnected = true;
                    return Err(ReadError::Disconnected);
                }
                ScanEvent::Command(_) => {}
            }
        }
    }
}
