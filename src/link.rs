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

//! Link layer session.
//!
//! A [`Session`] owns everything one end of the link needs: the serial
//! port, the retransmission timer, both sequence bits and the statistics.
//! It is created by [`Session::open`] (see [`crate::connection`]), moved
//! through [`Session::write`]/[`Session::read`] (see [`crate::transfer`])
//! and consumed by [`Session::close`].

use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use crate::error::ExchangeError;
use crate::protocol::{Role, Seq};
use crate::scanner::{Accept, FrameScanner, ScanEvent};
use crate::serial::{SerialFraming, SerialPort};
use crate::stats::Statistics;
use crate::timer::Timer;

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Clone)]
pub struct ConnectionParameters {
    /// Serial device, e.g. /dev/ttyS0
    pub port: String,
    pub baud_rate: u32,
    pub role: Role,
    /// Total transmissions allowed for one frame before giving up
    pub max_retries: u32,
    pub timeout: Duration,
    pub framing: SerialFraming,
}

impl ConnectionParameters {
    pub fn new(port: impl Into<String>, baud_rate: u32, role: Role) -> Self {
        ConnectionParameters {
            port: port.into(),
            baud_rate,
            role,
            max_retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            framing: SerialFraming::default(),
        }
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_framing(mut self, framing: SerialFraming) -> Self {
        self.framing = framing;
        self
    }
}

// ============================================================================
// Session
// ============================================================================

pub struct Session {
    pub(crate) params: ConnectionParameters,
    pub(crate) port: Box<dyn SerialPort>,
    pub(crate) timer: Box<dyn Timer>,
    /// Sequence bit of the next information frame we send
    pub(crate) send_seq: Seq,
    /// Sequence bit of the next information frame we accept
    pub(crate) recv_seq: Seq,
    /// DISC already consumed by `read`
    pub(crate) peer_disconnected: bool,
    pub(crate) stats: Statistics,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("params", &self.params)
            .field("send_seq", &self.send_seq)
            .field("recv_seq", &self.recv_seq)
            .field("peer_disconnected", &self.peer_disconnected)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// How a timed exchange treats a frame received while waiting
pub(crate) enum Verdict {
    /// The awaited reply; stop waiting
    Accept,
    /// Negative acknowledgment; retransmit now
    Resend,
    Ignore,
}

impl Session {
    pub(crate) fn from_parts(
        params: ConnectionParameters,
        port: Box<dyn SerialPort>,
        timer: Box<dyn Timer>,
    ) -> Self {
        let stats = Statistics::new(params.baud_rate);
        Session {
            params,
            port,
            timer,
            send_seq: Seq::Zero,
            recv_seq: Seq::Zero,
            peer_disconnected: false,
            stats,
        }
    }

    pub fn role(&self) -> Role {
        self.params.role
    }

    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    #[cfg(test)]
    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Scanner for frames coming from the other end
    pub(crate) fn scanner(&self, accept: Accept) -> FrameScanner {
        FrameScanner::new(self.role().peer().address(), accept)
    }

    pub(crate) fn send_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        debug!("Sent: {:02X?}", frame);
        self.port.write_all(frame)
    }

    /// Block until a frame matching `scanner` arrives
    pub(crate) fn wait_event(&mut self, scanner: &mut FrameScanner) -> std::io::Result<ScanEvent> {
        loop {
            if let Some(byte) = self.port.read_byte()? {
                if let Some(event) = scanner.push(byte) {
                    debug!("Received: {:?}", event);
                    return Ok(event);
                }
            }
        }
    }

    /// Like [`Session::wait_event`], but gives up with `None` once the
    /// timer has fired
    fn wait_event_timed(&mut self, scanner: &mut FrameScanner) -> std::io::Result<Option<ScanEvent>> {
        loop {
            if let Some(byte) = self.port.read_byte()? {
                if let Some(event) = scanner.push(byte) {
                    debug!("Received: {:?}", event);
                    return Ok(Some(event));
                }
            }
            if self.timer.has_fired() {
                return Ok(None);
            }
        }
    }

    /// Send `frame` and wait for the reply `judge` accepts, retransmitting
    /// on timeout or negative acknowledgment. Returns the reply and the
    /// number of transmissions it took.
    pub(crate) fn exchange<F>(
        &mut self,
        frame: &[u8],
        accept: Accept,
        mut judge: F,
    ) -> Result<(ScanEvent, u32), ExchangeError>
    where
        F: FnMut(&ScanEvent) -> Verdict,
    {
        let limit = self.params.max_retries.max(1);
        let mut scanner = self.scanner(accept);
        let mut attempts = 0;

        loop {
            attempts += 1;
            self.send_frame(frame)?;
            self.timer.arm(self.params.timeout);
            scanner.reset();

            let timed_out = loop {
                match self.wait_event_timed(&mut scanner)? {
                    Some(event) => match judge(&event) {
                        Verdict::Accept => {
                            self.timer.cancel();
                            return Ok((event, attempts));
                        }
                        Verdict::Resend => break false,
                        Verdict::Ignore => debug!("Ignoring {:?} while waiting", event),
                    },
                    None => break true,
                }
            };

            if attempts >= limit {
                self.timer.cancel();
                warn!("Giving up after {} attempts", attempts);
                return Err(ExchangeError::Exhausted { attempts });
            }

            if timed_out {
                warn!("Timeout, retransmitting (attempt {}/{})", attempts + 1, limit);
            } else {
                debug!("Negative acknowledgment, retransmitting (attempt {}/{})", attempts + 1, limit);
            }
        }
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

#[cfg(test)]
pub(crate) fn test_session(
    role: Role,
    max_retries: u32,
    responses: Vec<Option<u8>>,
    expected_writes: Vec<u8>,
) -> Session {
    use crate::serial::MockSerialPort;
    use crate::timer::ManualTimer;

    let params = ConnectionParameters::new("mock", 9600, role)
        .with_retries(max_retries)
        .with_timeout(Duration::from_secs(1));
    let (timer, trip) = ManualTimer::new();
    let port = MockSerialPort::new(responses, expected_writes).with_alarm(trip);
    Session::from_parts(params, Box::new(port), Box::new(timer))
}
