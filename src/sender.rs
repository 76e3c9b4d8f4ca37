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
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};
use crate::error::{CloseError, WriteError};
use crate::link::Session;
use crate::packet::{Packet, PacketError, MAX_CHUNK_SIZE};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum SenderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("{source} (in state: {state})")]
    Write {
        state: &'static str,
        #[source]
        source: WriteError,
    },

    #[error("close failed: {0}")]
    Close(#[from] CloseError),

    #[error("Transfer complete")]
    TransferComplete,
}

// ============================================================================
// States
// ============================================================================

pub struct SendStart;
pub struct SendData;
pub struct SendEnd;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct SenderFsm<State> {
    state: PhantomData<State>,
    link: Session,
    file: File,
    file_name: String,
    file_size: u64,
    bytes_sent: u64,
    buffer: Vec<u8>,
    report_statistics: bool,
}

// ============================================================================
// Trait
// ============================================================================

pub trait SenderState: Send {
    fn step(self: Box<Self>) -> Result<Box<dyn SenderState>, SenderError>;
}

// ============================================================================
// Helper to transition states
// ============================================================================

impl<S> SenderFsm<S> {
    fn transition<T>(self) -> Box<SenderFsm<T>> {
        Box::new(SenderFsm {
            state: PhantomData,
            link: self.link,
            file: self.file,
            file_name: self.file_name,
            file_size: self.file_size,
            bytes_sent: self.bytes_sent,
            buffer: self.buffer,
            report_statistics: self.report_statistics,
        })
    }

    fn send(&mut self, packet: &Packet) -> Result<(), SenderError> {
        let bytes = packet.encode()?;
        self.link.write(&bytes).map_err(|source| {
            let type_name = std::any::type_name::<S>();
            let state = type_name.split("::").last().unwrap_or(type_name);
            SenderError::Write { state, source }
        })?;
        Ok(())
    }

    fn control(&self, end: bool) -> Packet {
        let file_size = self.file_size;
        let file_name = self.file_name.clone();
        if end {
            Packet::End { file_size, file_name }
        } else {
            Packet::Start { file_size, file_name }
        }
    }
}

// ============================================================================
// State Implementations
// ============================================================================

impl SenderState for SenderFsm<SendStart> {
    fn step(self: Box<Self>) -> Result<Box<dyn SenderState>, SenderError> {
        let mut fsm = *self;
        let start = fsm.control(false);
        fsm.send(&start)?;
        info!("Sending {} ({} bytes)", fsm.file_name, fsm.file_size);

        let next = fsm.transition::<SendData>();
        Ok(next as Box<dyn SenderState>)
    }
}

impl SenderState for SenderFsm<SendData> {
    fn step(self: Box<Self>) -> Result<Box<dyn SenderState>, SenderError> {
        let mut fsm = *self;

        let bytes_read = fsm.file.read(&mut fsm.buffer)?;
        if bytes_read == 0 {
            let next = fsm.transition::<SendEnd>();
            return Ok(next as Box<dyn SenderState>);
        }

        let chunk = Packet::Data(fsm.buffer[..bytes_read].to_vec());
        fsm.send(&chunk)?;
        fsm.bytes_sent += bytes_read as u64;
        debug!("Sent {}/{} bytes", fsm.bytes_sent, fsm.file_size);

        Ok(Box::new(fsm) as Box<dyn SenderState>)
    }
}

impl SenderState for SenderFsm<SendEnd> {
    fn step(self: Box<Self>) -> Result<Box<dyn SenderState>, SenderError> {
        let mut fsm = *self;
        if fsm.bytes_sent != fsm.file_size {
            warn!("File changed while sending: {} bytes announced, {} sent",
                  fsm.file_size, fsm.bytes_sent);
        }

        let end = fsm.control(true);
        fsm.send(&end)?;

        fsm.link.close(fsm.report_statistics)?;
        Err(SenderError::TransferComplete)
    }
}

// ============================================================================
// Constructor
// ============================================================================

impl SenderFsm<SendStart> {
    pub fn new(link: Session, path: &Path, report_statistics: bool) -> Result<Box<dyn SenderState>, SenderError> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("file")
            .to_string();

        Ok(Box::new(SenderFsm {
            state: PhantomData::<SendStart>,
            link,
            file,
            file_name,
            file_size,
            bytes_sent: 0,
            buffer: vec![0; MAX_CHUNK_SIZE],
            report_statistics,
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================
