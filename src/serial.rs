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

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use serialport::{SerialPort as SerialPortTrait, DataBits, Parity, StopBits};

/// How long a single byte read may block before handing control back
/// to the caller so it can check its timer.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// SerialPort Trait
// ============================================================================

/// Byte transport used by the link layer
pub trait SerialPort: Send {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    /// Read one byte. `Ok(None)` means nothing arrived within the poll window.
    fn read_byte(&mut self) -> std::io::Result<Option<u8>>;

    /// Release the port. Called once when the session closes.
    fn close(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Line settings
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialFraming {
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for SerialFraming {
    fn default() -> Self {
        SerialFraming {
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

// ============================================================================
// Real Serial Port Implementation
// ============================================================================

/// Real serial port implementation that wraps the serialport crate
pub struct RealSerialPort {
    port: Box<dyn SerialPortTrait>,
}

impl RealSerialPort {
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        framing: SerialFraming,
    ) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(framing.data_bits)
            .parity(framing.parity)
            .stop_bits(framing.stop_bits)
            .timeout(POLL_INTERVAL)
            .open()?;

        Ok(RealSerialPort { port })
    }
}

impl SerialPort for RealSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.port.write_all(buf)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.port.flush()?;
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(std::io::Error::other)
    }
}

// ============================================================================
// Mock Serial Port for Testing
// ============================================================================

#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(test)]
pub struct MockSerialPort {
    // Data to return on reads (None = read interrupted by the alarm)
    read_buffer: Vec<Option<u8>>,
    read_pos: usize,
    // Tripped whenever a None is replayed
    alarm: Option<Arc<AtomicBool>>,
    // Track what was written
    write_log: Vec<u8>,
    // Expected writes for verification
    expected_writes: Vec<u8>,
}

#[cfg(test)]
impl MockSerialPort {
    pub fn new(responses: Vec<Option<u8>>, expected_writes: Vec<u8>) -> Self {
        MockSerialPort {
            read_buffer: responses,
            read_pos: 0,
            alarm: None,
            write_log: Vec::new(),
            expected_writes,
        }
    }

    pub fn with_alarm(mut self, alarm: Arc<AtomicBool>) -> Self {
        self.alarm = Some(alarm);
        self
    }
}

#[cfg(test)]
impl SerialPort for MockSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_log.extend_from_slice(buf);
        Ok(())
    }

    fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
        // Out of responses = the peer went silent for good
        if self.read_pos >= self.read_buffer.len() {
            return Err(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                "Mock exhausted"
            ));
        }

        let response = self.read_buffer[self.read_pos];
        self.read_pos += 1;

        if response.is_none() {
            if let Some(alarm) = &self.alarm {
                alarm.store(true, Ordering::SeqCst);
            }
        }

        Ok(response)
    }
}

#[cfg(test)]
impl Drop for MockSerialPort {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        assert_eq!(
            self.read_pos,
            self.read_buffer.len(),
            "MockSerialPort dropped with {} unconsumed responses (read {} of {} bytes)",
            self.read_buffer.len() - self.read_pos,
            self.read_pos,
            self.read_buffer.len()
        );

        assert_eq!(
            &self.write_log,
            &self.expected_writes,
            "MockSerialPort write log mismatch!\nExpected {} bytes:\n{:02X?}\nGot {} bytes:\n{:02X?}",
            self.expected_writes.len(),
            self.expected_writes,
            self.write_log.len(),
            self.write_log
        );
    }
}

/// Flattens whole frames into a mock response script
#[cfg(test)]
pub fn script(frames: &[&[u8]]) -> Vec<Option<u8>> {
    frames.iter().flat_map(|f| f.iter().copied().map(Some)).collect()
}
