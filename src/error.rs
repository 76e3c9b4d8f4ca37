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

//! Link layer error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("failed to open serial port {port}: {source}")]
    Port {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no answer from peer after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("frame not acknowledged after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The frame was rejected on the wire; call `read` again
    #[error("frame failed checksum, rejected")]
    BadChecksum,

    #[error("frame carries {needed} bytes but buffer holds {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("peer disconnected")]
    Disconnected,
}

impl ReadError {
    /// Whether calling `read` again can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReadError::BadChecksum | ReadError::BufferTooSmall { .. })
    }
}

#[derive(Debug, Error)]
pub enum CloseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("disconnect not answered after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// Failure of a timed send-and-wait exchange
#[derive(Debug)]
pub(crate) enum ExchangeError {
    Io(std::io::Error),
    Exhausted { attempts: u32 },
}

impl From<std::io::Error> for ExchangeError {
    fn from(err: std::io::Error) -> Self {
        ExchangeError::Io(err)
    }
}

impl From<ExchangeError> for OpenError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Io(e) => OpenError::Io(e),
            ExchangeError::Exhausted { attempts } => OpenError::RetriesExhausted { attempts },
        }
    }
}

impl From<ExchangeError> for WriteError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Io(e) => WriteError::Io(e),
            ExchangeError::Exhausted { attempts } => WriteError::RetriesExhausted { attempts },
        }
    }
}

impl From<ExchangeError> for CloseError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Io(e) => CloseError::Io(e),
            ExchangeError::Exhausted { attempts } => CloseError::RetriesExhausted { attempts },
        }
    }
}
