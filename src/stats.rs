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

use std::time::{Duration, Instant};
use tracing::info;

/// Counters kept by the information-frame transport
#[derive(Debug, Clone)]
pub struct Statistics {
    /// Information frames put on the wire, retransmissions included
    pub frames_sent: u64,
    /// Information frames accepted and delivered
    pub frames_received: u64,
    pub retransmissions: u64,
    /// Payload bytes delivered to the caller
    pub bytes_received: u64,
    /// Payload bytes acknowledged by the peer
    pub bytes_sent: u64,
    pub rejects_sent: u64,
    pub duplicates: u64,
    pub started_at: Instant,
    pub ended_at: Option<Instant>,
    baud_rate: u32,
}

impl Statistics {
    pub fn new(baud_rate: u32) -> Self {
        Statistics {
            frames_sent: 0,
            frames_received: 0,
            retransmissions: 0,
            bytes_received: 0,
            bytes_sent: 0,
            rejects_sent: 0,
            duplicates: 0,
            started_at: Instant::now(),
            ended_at: None,
            baud_rate,
        }
    }

    pub fn finish(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    pub fn elapsed(&self) -> Duration {
        let end = self.ended_at.unwrap_or_else(Instant::now);
        end.duration_since(self.started_at)
    }

    /// Retransmissions per information frame sent
    pub fn frame_error_rate(&self) -> f64 {
        if self.frames_sent == 0 {
            return 0.0;
        }
        self.retransmissions as f64 / self.frames_sent as f64
    }

    /// Accepted payload bits over the configured baud rate
    pub fn efficiency(&self) -> f64 {
        if self.baud_rate == 0 {
            return 0.0;
        }
        (self.bytes_received * 8) as f64 / self.baud_rate as f64
    }

    pub fn report(&self) {
        info!("Session time: {:.3} s", self.elapsed().as_secs_f64());
        info!("Frames sent: {} ({} retransmissions)", self.frames_sent, self.retransmissions);
        info!("Frames received: {} ({} duplicates, {} rejected)",
              self.frames_received, self.duplicates, self.rejects_sent);
        info!("Bytes sent: {}, bytes received: {}", self.bytes_sent, self.bytes_received);
        info!("Frame error rate: {:.4}", self.frame_error_rate());
        info!("Efficiency: {:.4}", self.efficiency());
    }
}
