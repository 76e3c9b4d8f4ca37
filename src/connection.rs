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

//! Connection setup and teardown.
//!
//! ```text
//!   Transmitter                 Receiver
//!       |  ---------- SET -------->  |      open
//!       |  <--------- UA ----------  |
//!       |           ...              |
//!       |  ---------- DISC ------->  |      close
//!       |  <--------- DISC --------  |
//!       |  ---------- UA --------->  |
//! ```
//!
//! Only the side that is waiting for a reply to its own frame runs the
//! timer; the passive side blocks.

use tracing::{info, warn};
use crate::error::{CloseError, ExchangeError, OpenError};
use crate::frame::encode_control;
use crate::link::{ConnectionParameters, Session, Verdict};
use crate::protocol::{Command, Role};
use crate::scanner::{Accept, ScanEvent};
use crate::serial::{RealSerialPort, SerialPort};
use crate::stats::Statistics;
use crate::timer::{DeadlineTimer, Timer};

const SET_REQUEST: Accept = Accept::commands(&[Command::Set]);
const UA_REPLY: Accept = Accept::commands(&[Command::Ua]);
const DISC_REPLY: Accept = Accept::commands(&[Command::Disc]);
const FINAL_UA: Accept = Accept::commands(&[Command::Ua, Command::Disc]);
/// Receiver waiting for DISC may still see retransmitted data
const DISC_REQUEST: Accept = Accept::commands(&[Command::Disc]).with_information();

impl Session {
    /// Open the serial port named in `params` and establish the link
    pub fn open(params: ConnectionParameters) -> Result<Session, OpenError> {
        let port = RealSerialPort::open(&params.port, params.baud_rate, params.framing)
            .map_err(|source| OpenError::Port { port: params.port.clone(), source })?;
        info!("Opened {} at {} baud", params.port, params.baud_rate);

        Session::open_with(params, Box::new(port), Box::new(DeadlineTimer::new()))
    }

    /// Establish the link over an already opened transport
    pub fn open_with(
        params: ConnectionParameters,
        port: Box<dyn SerialPort>,
        timer: Box<dyn Timer>,
    ) -> Result<Session, OpenError> {
        let mut session = Session::from_parts(params, port, timer);

        let result = match session.role() {
            Role::Transmitter => session.connect(),
            Role::Receiver => session.accept(),
        };
        if let Err(e) = result {
            if let Err(close_err) = session.port.close() {
                warn!("Failed to release port: {}", close_err);
            }
            return Err(e);
        }

        info!("Link established as {:?}", session.role());
        session.stats = Statistics::new(session.params.baud_rate);
        Ok(session)
    }

    fn connect(&mut self) -> Result<(), OpenError> {
        let set = encode_control(Role::Transmitter, Command::Set);
        self.exchange(&set, UA_REPLY, |_| Verdict::Accept)?;
        Ok(())
    }

    fn accept(&mut self) -> Result<(), OpenError> {
        let mut scanner = self.scanner(SET_REQUEST);
        self.wait_event(&mut scanner)?;
        self.send_frame(&encode_control(Role::Receiver, Command::Ua))?;
        Ok(())
    }

    /// Tear the link down and release the port. The port is released even
    /// when the handshake fails.
    pub fn close(mut self, report_statistics: bool) -> Result<Statistics, CloseError> {
        let result = match self.role() {
            Role::Transmitter => self.disconnect(),
            Role::Receiver => self.await_disconnect(),
        };
        self.stats.finish();
        let released = self.port.close();

        result?;
        released?;

        info!("Link closed");
        if report_statistics {
            self.stats.report();
        }
        Ok(self.stats)
    }

    fn disconnect(&mut self) -> Result<(), CloseError> {
        let disc = encode_control(Role::Transmitter, Command::Disc);
        self.exchange(&disc, DISC_REPLY, |_| Verdict::Accept)?;
        self.send_frame(&encode_control(Role::Transmitter, Command::Ua))?;
        Ok(())
    }

    fn await_disconnect(&mut self) -> Result<(), CloseError> {
        if !self.peer_disconnected {
            let mut scanner = self.scanner(DISC_REQUEST);
            loop {
                match self.wait_event(&mut scanner)? {
                    ScanEvent::Command(Command::Disc) => break,
                    ScanEvent::Information { seq, .. } if seq != self.recv_seq => {
                        // our last RR was lost
                        self.send_frame(&encode_control(Role::Receiver, Command::Rr(seq.flip())))?;
                    }
                    event => warn!("Unexpected {:?} while closing", event),
                }
            }
        }

        let disc = encode_control(Role::Receiver, Command::Disc);
        let result = self.exchange(&disc, FINAL_UA, |event| match event {
            ScanEvent::Command(Command::Ua) => Verdict::Accept,
            // peer never saw our DISC
            _ => Verdict::Resend,
        });

        match result {
            Ok(_) => Ok(()),
            Err(ExchangeError::Exhausted { attempts }) => {
                // The transmitter does not wait after its final UA
                warn!("No UA after {} DISC transmissions, closing anyway", attempts);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_information;
    use crate::link::test_session;
    use crate::protocol::Seq;
    use crate::serial::{script, MockSerialPort};
    use crate::timer::ManualTimer;

    fn frame(role: Role, command: Command) -> Vec<u8> {
        encode_control(role, command).to_vec()
    }

    fn open_mock(
        role: Role,
        responses: Vec<Option<u8>>,
        expected_writes: Vec<u8>,
    ) -> Result<Session, OpenError> {
        let params = ConnectionParameters::new("mock", 9600, role).with_retries(3);
        let (timer, trip) = ManualTimer::new();
        let port = MockSerialPort::new(responses, expected_writes).with_alarm(trip);
        Session::open_with(params, Box::new(port), Box::new(timer))
    }

    #[test]
    fn test_transmitter_open() {
        let ua = frame(Role::Receiver, Command::Ua);
        let set = frame(Role::Transmitter, Command::Set);

        let session = open_mock(Role::Transmitter, script(&[&ua]), set).unwrap();
        assert_eq!(session.role(), Role::Transmitter);
    }

    #[test]
    fn test_transmitter_open_retries_after_silence() {
        let ua = frame(Role::Receiver, Command::Ua);
        let set = frame(Role::Transmitter, Command::Set);

        let mut responses = vec![None, None];
        responses.extend(script(&[&ua]));

        open_mock(Role::Transmitter, responses, set.repeat(3)).unwrap();
    }

    #[test]
    fn test_transmitter_open_gives_up_after_retries() {
        let set = frame(Role::Transmitter, Command::Set);

        let err = open_mock(Role::Transmitter, vec![None, None, None], set.repeat(3)).unwrap_err();
        assert!(matches!(err, OpenError::RetriesExhausted { attempts: 3 }));
    }

    #[test]
    fn test_transmitter_open_ignores_own_echo() {
        let ua = frame(Role::Receiver, Command::Ua);
        let set = frame(Role::Transmitter, Command::Set);
        // a UA carrying the transmitter address is not the peer's reply
        let echo = frame(Role::Transmitter, Command::Ua);

        open_mock(Role::Transmitter, script(&[&echo, &ua]), set).unwrap();
    }

    #[test]
    fn test_receiver_open() {
        let set = frame(Role::Transmitter, Command::Set);
        let ua = frame(Role::Receiver, Command::Ua);

        let mut responses = script(&[&[0x00, 0x13]]);
        responses.extend(script(&[&set]));

        let session = open_mock(Role::Receiver, responses, ua).unwrap();
        assert_eq!(session.role(), Role::Receiver);
    }

    #[test]
    fn test_receiver_open_blocks_through_idle_reads() {
        let set = frame(Role::Transmitter, Command::Set);
        let ua = frame(Role::Receiver, Command::Ua);

        let mut responses = vec![None, None, None, None];
        responses.extend(script(&[&set]));

        open_mock(Role::Receiver, responses, ua).unwrap();
    }

    #[test]
    fn test_transmitter_close() {
        let disc_rx = frame(Role::Receiver, Command::Disc);
        let mut expected = frame(Role::Transmitter, Command::Disc);
        expected.extend(frame(Role::Transmitter, Command::Ua));

        let session = test_session(Role::Transmitter, 3, script(&[&disc_rx]), expected);
        let stats = session.close(true).unwrap();
        assert!(stats.ended_at.is_some());
    }

    #[test]
    fn test_transmitter_close_gives_up_after_retries() {
        let disc_tx = frame(Role::Transmitter, Command::Disc);

        let session = test_session(Role::Transmitter, 2, vec![None, None], disc_tx.repeat(2));
        let err = session.close(false).unwrap_err();
        assert!(matches!(err, CloseError::RetriesExhausted { attempts: 2 }));
    }

    #[test]
    fn test_receiver_close() {
        let disc_tx = frame(Role::Transmitter, Command::Disc);
        let ua_tx = frame(Role::Transmitter, Command::Ua);
        let disc_rx = frame(Role::Receiver, Command::Disc);

        let session = test_session(Role::Receiver, 3, script(&[&disc_tx, &ua_tx]), disc_rx);
        session.close(false).unwrap();
    }

    #[test]
    fn test_receiver_close_resends_disc_when_peer_repeats_disc() {
        let disc_tx = frame(Role::Transmitter, Command::Disc);
        let ua_tx = frame(Role::Transmitter, Command::Ua);
        let disc_rx = frame(Role::Receiver, Command::Disc);

        let session = test_session(
            Role::Receiver,
            3,
            script(&[&disc_tx, &disc_tx, &ua_tx]),
            disc_rx.repeat(2),
        );
        session.close(false).unwrap();
    }

    #[test]
    fn test_receiver_close_without_final_ua_still_closes() {
        let disc_tx = frame(Role::Transmitter, Command::Disc);
        let disc_rx = frame(Role::Receiver, Command::Disc);

        let mut responses = script(&[&disc_tx]);
        responses.extend([None, None]);

        let session = test_session(Role::Receiver, 2, responses, disc_rx.repeat(2));
        session.close(false).unwrap();
    }

    #[test]
    fn test_receiver_close_reacknowledges_stale_data() {
        let stale = encode_information(Seq::One, &[0x42]);
        let disc_tx = frame(Role::Transmitter, Command::Disc);
        let ua_tx = frame(Role::Transmitter, Command::Ua);

        let mut expected = frame(Role::Receiver, Command::Rr(Seq::Zero));
        expected.extend(frame(Role::Receiver, Command::Disc));

        // recv_seq is still Zero, so I1 is the frame we already accepted
        let session = test_session(Role::Receiver, 3, script(&[&stale, &disc_tx, &ua_tx]), expected);
        session.close(false).unwrap();
    }
}
