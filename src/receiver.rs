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

use std::marker::PhantomData;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use crate::error::{CloseError, ReadError};
use crate::link::Session;
use crate::packet::Packet;
use crate::protocol::MAX_PAYLOAD_SIZE;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{source} (in state: {state})")]
    Read {
        state: &'static str,
        #[source]
        source: ReadError,
    },

    #[error("invalid file name {0:?}")]
    InvalidFileName(String),

    #[error("close failed: {0}")]
    Close(#[from] CloseError),

    #[error("Transfer complete")]
    TransferComplete,
}

// ============================================================================
// States
// ============================================================================

pub struct WaitStart;
pub struct ReceiveData;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct ReceiverFsm<State> {
    state: PhantomData<State>,
    link: Session,
    output_dir: PathBuf,
    current_file: Option<File>,
    file_name: String,
    expected_size: u64,
    bytes_received: u64,
    buffer: Vec<u8>,
    report_statistics: bool,
}

// ============================================================================
// Trait
// ============================================================================

pub trait ReceiverState: Send {
    fn step(self: Box<Self>) -> Result<Box<dyn ReceiverState>, ReceiverError>;
}

/// Outcome of one link layer read
enum Incoming {
    Packet(Packet),
    /// Frame rejected or unusable; read again
    Retry,
    /// Peer sent DISC before the transfer finished
    Disconnected,
}

// ============================================================================
// Helper to transition states
// ============================================================================

impl<S> ReceiverFsm<S> {
    fn transition<T>(self) -> Box<ReceiverFsm<T>> {
        Box::new(ReceiverFsm {
            state: PhantomData,
            link: self.link,
            output_dir: self.output_dir,
            current_file: self.current_file,
            file_name: self.file_name,
            expected_size: self.expected_size,
            bytes_received: self.bytes_received,
            buffer: self.buffer,
            report_statistics: self.report_statistics,
        })
    }

    fn read_error(&self, source: ReadError) -> ReceiverError {
        let type_name = std::any::type_name::<S>();
        let state = type_name.split("::").last().unwrap_or(type_name);
        ReceiverError::Read { state, source }
    }

    fn receive(&mut self) -> Result<Incoming, ReceiverError> {
        match self.link.read(&mut self.buffer) {
            Ok(len) => match Packet::decode(&self.buffer[..len]) {
                Ok(packet) => Ok(Incoming::Packet(packet)),
                Err(e) => {
                    warn!("Discarding malformed packet: {}", e);
                    Ok(Incoming::Retry)
                }
            },
            Err(e) if e.is_retryable() => {
                debug!("Read failed ({}), retrying", e);
                Ok(Incoming::Retry)
            }
            Err(ReadError::Disconnected) => Ok(Incoming::Disconnected),
            Err(e) => Err(self.read_error(e)),
        }
    }

    /// Close the link and end the state machine
    fn finish(self) -> Result<Box<dyn ReceiverState>, ReceiverError> {
        self.link.close(self.report_statistics)?;
        Err(ReceiverError::TransferComplete)
    }

    /// Answer the peer's early DISC, then fail
    fn abort(self) -> Result<Box<dyn ReceiverState>, ReceiverError> {
        let error = self.read_error(ReadError::Disconnected);
        self.link.close(self.report_statistics)?;
        Err(error)
    }
}

// ============================================================================
// State Implementations
// ============================================================================

impl ReceiverState for ReceiverFsm<WaitStart> {
    fn step(self: Box<Self>) -> Result<Box<dyn ReceiverState>, ReceiverError> {
        let mut fsm = *self;

        match fsm.receive()? {
            Incoming::Packet(Packet::Start { file_size, file_name }) => {
                let path = output_path(&fsm.output_dir, &file_name)?;
                fsm.current_file = Some(File::create(&path)?);
                info!("Receiving {} ({} bytes) into {}", file_name, file_size, path.display());

                fsm.file_name = file_name;
                fsm.expected_size = file_size;
                fsm.bytes_received = 0;
                let next = fsm.transition::<ReceiveData>();
                Ok(next as Box<dyn ReceiverState>)
            }
            Incoming::Packet(other) => {
                warn!("Expected START, got {:?}", other);
                Ok(Box::new(fsm) as Box<dyn ReceiverState>)
            }
            Incoming::Retry => Ok(Box::new(fsm) as Box<dyn ReceiverState>),
            Incoming::Disconnected => fsm.abort(),
        }
    }
}

impl ReceiverState for ReceiverFsm<ReceiveData> {
    fn step(self: Box<Self>) -> Result<Box<dyn ReceiverState>, ReceiverError> {
        let mut fsm = *self;

        match fsm.receive()? {
            Incoming::Packet(Packet::Data(chunk)) => {
                if let Some(ref mut file) = fsm.current_file {
                    file.write_all(&chunk)?;
                }
                fsm.bytes_received += chunk.len() as u64;
                debug!("Received {}/{} bytes", fsm.bytes_received, fsm.expected_size);
                Ok(Box::new(fsm) as Box<dyn ReceiverState>)
            }
            Incoming::Packet(Packet::End { file_size, file_name }) => {
                if file_name != fsm.file_name || file_size != fsm.expected_size {
                    warn!("END packet ({}, {} bytes) does not match START ({}, {} bytes)",
                          file_name, file_size, fsm.file_name, fsm.expected_size);
                }
                if fsm.bytes_received != fsm.expected_size {
                    warn!("Received {} bytes, expected {}", fsm.bytes_received, fsm.expected_size);
                }
                if let Some(mut file) = fsm.current_file.take() {
                    file.flush()?;
                }
                info!("Received {} ({} bytes)", fsm.file_name, fsm.bytes_received);
                fsm.finish()
            }
            Incoming::Packet(Packet::Start { .. }) => {
                warn!("Ignoring repeated START");
                Ok(Box::new(fsm) as Box<dyn ReceiverState>)
            }
            Incoming::Retry => Ok(Box::new(fsm) as Box<dyn ReceiverState>),
            Incoming::Disconnected => fsm.abort(),
        }
    }
}

// ============================================================================
// Constructor
// ============================================================================

impl ReceiverFsm<WaitStart> {
    pub fn new(link: Session, output_dir: PathBuf, report_statistics: bool) -> Box<dyn ReceiverState> {
        Box::new(ReceiverFsm {
            state: PhantomData::<WaitStart>,
            link,
            output_dir,
            current_file: None,
            file_name: String::new(),
            expected_size: 0,
            bytes_received: 0,
            buffer: vec![0; MAX_PAYLOAD_SIZE],
            report_statistics,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Place the announced file inside `output_dir`, dropping any directories
/// the sender included
fn output_path(output_dir: &Path, file_name: &str) -> Result<PathBuf, ReceiverError> {
    match Path::new(file_name).file_name() {
        Some(name) => Ok(output_dir.join(name)),
        None => Err(ReceiverError::InvalidFileName(file_name.to_string())),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{encode_control, encode_information};
    use crate::link::test_session;
    use crate::protocol::{Command, Role, Seq};

    fn run_receiver(mut fsm: Box<dyn ReceiverState>) -> Result<(), ReceiverError> {
        loop {
            match fsm.step() {
                Ok(next) => fsm = next,
                Err(ReceiverError::TransferComplete) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    fn rr(seq: Seq) -> Vec<u8> {
        encode_control(Role::Receiver, Command::Rr(seq)).to_vec()
    }

    /// I-frames for `packets` starting at I0, followed by the peer's DISC and UA
    fn incoming(packets: &[Packet]) -> Vec<Option<u8>> {
        let mut bytes = Vec::new();
        let mut seq = Seq::Zero;
        for packet in packets {
            bytes.extend(encode_information(seq, &packet.encode().unwrap()));
            seq = seq.flip();
        }
        bytes.extend(encode_control(Role::Transmitter, Command::Disc));
        bytes.extend(encode_control(Role::Transmitter, Command::Ua));
        bytes.into_iter().map(Some).collect()
    }

    fn acks(count: usize) -> Vec<u8> {
        let mut writes = Vec::new();
        for i in 0..count {
            writes.extend(rr(if i % 2 == 0 { Seq::One } else { Seq::Zero }));
        }
        writes.extend(encode_control(Role::Receiver, Command::Disc));
        writes
    }

    #[test]
    fn test_output_path_strips_directories() {
        let dir = Path::new("/tmp/out");
        assert_eq!(output_path(dir, "a.txt").unwrap(), PathBuf::from("/tmp/out/a.txt"));
        assert_eq!(output_path(dir, "../../etc/passwd").unwrap(), PathBuf::from("/tmp/out/passwd"));
        assert!(output_path(dir, "..").is_err());
    }

    #[test]
    fn test_receiver_full_transfer() {
        let temp_dir = std::env::temp_dir();
        let name = "serlink_recv_small.txt".to_string();
        let packets = [
            Packet::Start { file_size: 9, file_name: name.clone() },
            Packet::Data(b"Test data".to_vec()),
            Packet::End { file_size: 9, file_name: name.clone() },
        ];

        let link = test_session(Role::Receiver, 3, incoming(&packets), acks(3));
        let fsm = ReceiverFsm::new(link, temp_dir.clone(), true);

        if let Err(e) = run_receiver(fsm) {
            panic!("Transfer failed: {:?}", e);
        }

        let filepath = temp_dir.join(&name);
        let content = std::fs::read(&filepath).expect("Should read file");
        assert_eq!(content, b"Test data");

        std::fs::remove_file(&filepath).ok();
    }

    #[test]
    fn test_receiver_bad_checksum_retry() {
        let temp_dir = std::env::temp_dir();
        let name = "serlink_recv_badcs.txt".to_string();

        let start = Packet::Start { file_size: 6, file_name: name.clone() };
        let data = Packet::Data(b"Bad cs".to_vec());
        let end = Packet::End { file_size: 6, file_name: name.clone() };

        let good = encode_information(Seq::One, &data.encode().unwrap());
        let mut bad = good.clone();
        let bcc2 = bad.len() - 2;
        bad[bcc2] ^= 0xFF;

        let mut bytes = encode_information(Seq::Zero, &start.encode().unwrap());
        bytes.extend(&bad);
        bytes.extend(&good);
        bytes.extend(encode_information(Seq::Zero, &end.encode().unwrap()));
        bytes.extend(encode_control(Role::Transmitter, Command::Disc));
        bytes.extend(encode_control(Role::Transmitter, Command::Ua));

        let mut expected_writes = rr(Seq::One);
        expected_writes.extend(encode_control(Role::Receiver, Command::Rej(Seq::Zero)));
        expected_writes.extend(rr(Seq::Zero));
        expected_writes.extend(rr(Seq::One));
        expected_writes.extend(encode_control(Role::Receiver, Command::Disc));

        let link = test_session(Role::Receiver, 3, bytes.into_iter().map(Some).collect(), expected_writes);
        let fsm = ReceiverFsm::new(link, temp_dir.clone(), false);

        if let Err(e) = run_receiver(fsm) {
            panic!("Transfer failed: {:?}", e);
        }

        let filepath = temp_dir.join(&name);
        let content = std::fs::read(&filepath).expect("Should read file");
        assert_eq!(content, b"Bad cs");

        std::fs::remove_file(&filepath).ok();
    }

    #[test]
    fn test_receiver_multiple_chunks() {
        let temp_dir = std::env::temp_dir();
        let name = "serlink_recv_multi.bin".to_string();
        let content: Vec<u8> = (0..2000).map(|i| (i % 256) as u8).collect();

        let mut packets = vec![Packet::Start { file_size: 2000, file_name: name.clone() }];
        for chunk in content.chunks(500) {
            packets.push(Packet::Data(chunk.to_vec()));
        }
        packets.push(Packet::End { file_size: 2000, file_name: name.clone() });

        let link = test_session(Role::Receiver, 3, incoming(&packets), acks(packets.len()));
        let fsm = ReceiverFsm::new(link, temp_dir.clone(), false);

        if let Err(e) = run_receiver(fsm) {
            panic!("Transfer failed: {:?}", e);
        }

        let filepath = temp_dir.join(&name);
        assert_eq!(std::fs::read(&filepath).expect("Should read file"), content);

        std::fs::remove_file(&filepath).ok();
    }

    #[test]
    fn test_receiver_skips_data_before_start() {
        let temp_dir = std::env::temp_dir();
        let name = "serlink_recv_stray.txt".to_string();
        let packets = [
            Packet::Data(b"stray".to_vec()),
            Packet::Start { file_size: 2, file_name: name.clone() },
            Packet::Data(b"ok".to_vec()),
            Packet::End { file_size: 2, file_name: name.clone() },
        ];

        let link = test_session(Role::Receiver, 3, incoming(&packets), acks(4));
        let fsm = ReceiverFsm::new(link, temp_dir.clone(), false);

        if let Err(e) = run_receiver(fsm) {
            panic!("Transfer failed: {:?}", e);
        }

        let filepath = temp_dir.join(&name);
        assert_eq!(std::fs::read(&filepath).expect("Should read file"), b"ok");

        std::fs::remove_file(&filepath).ok();
    }

    #[test]
    fn test_receiver_premature_disconnect() {
        let temp_dir = std::env::temp_dir();
        let mut bytes = encode_control(Role::Transmitter, Command::Disc).to_vec();
        bytes.extend(encode_control(Role::Transmitter, Command::Ua));

        let expected_writes = encode_control(Role::Receiver, Command::Disc).to_vec();
        let link = test_session(Role::Receiver, 3, bytes.into_iter().map(Some).collect(), expected_writes);
        let fsm = ReceiverFsm::new(link, temp_dir, false);

        match run_receiver(fsm) {
            Err(ReceiverError::Read { state, source: ReadError::Disconnected }) => {
                assert_eq!(state, "WaitStart");
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }
}
