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

//! Retransmission timeout.
//!
//! A single countdown armed after each transmission. Expiry latches a
//! "timed out" flag that stays set until the next [`Timer::arm`], so the
//! waiting loop can observe it between byte reads.

use std::time::{Duration, Instant};

pub trait Timer: Send {
    /// Start (or restart) the countdown and clear any latched expiry.
    fn arm(&mut self, duration: Duration);

    /// Stop the countdown and clear any latched expiry.
    fn cancel(&mut self);

    fn has_fired(&mut self) -> bool;
}

/// Wall-clock timer checked on every poll
#[derive(Debug, Default)]
pub struct DeadlineTimer {
    deadline: Option<Instant>,
    fired: bool,
}

impl DeadlineTimer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Timer for DeadlineTimer {
    fn arm(&mut self, duration: Duration) {
        // a deadline past what Instant can represent never fires
        self.deadline = Instant::now().checked_add(duration);
        self.fired = false;
    }

    fn cancel(&mut self) {
        self.deadline = None;
        self.fired = false;
    }

    fn has_fired(&mut self) -> bool {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.deadline = None;
                self.fired = true;
            }
        }
        self.fired
    }
}

// ============================================================================
// Manual Timer for Testing
// ============================================================================

#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

/// Fires when its shared trip flag is set while armed. The mock serial
/// port sets the flag on each scripted timeout.
#[cfg(test)]
pub struct ManualTimer {
    armed: bool,
    trip: Arc<AtomicBool>,
}

#[cfg(test)]
impl ManualTimer {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let trip = Arc::new(AtomicBool::new(false));
        (ManualTimer { armed: false, trip: trip.clone() }, trip)
    }
}

#[cfg(test)]
impl Timer for ManualTimer {
    fn arm(&mut self, _duration: Duration) {
        self.armed = true;
        self.trip.store(false, Ordering::SeqCst);
    }

    fn cancel(&mut self) {
        self.armed = false;
        self.trip.store(false, Ordering::SeqCst);
    }

    fn has_fired(&mut self) -> bool {
        self.armed && self.trip.load(Ordering::SeqCst)
    }
}
