// Copyright 2016 James Bendig. See the COPYRIGHT file at the top-level
// directory of this distribution.
//
// Licensed under:
//   the MIT license
//     <LICENSE-MIT or https://opensource.org/licenses/MIT>
//   or the Apache License, Version 2.0
//     <LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0>,
// at your option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The byte-transport responder (spec 1: "Out of scope: ... the byte-transport responder
//! (send/disconnect capabilities)"). `Session` borrows a `Box<dyn Responder>` and calls it
//! synchronously from under the session mutex (spec 5, "Suspension / blocking points").

use std::fmt;
use std::io;

/// Send/disconnect capability for one connected session. Implementations may block; `Session`
/// intentionally holds its lock across the call to preserve per-session serialized outbound
/// framing (spec 5, "Ordering guarantees").
pub trait Responder: fmt::Debug {
    fn send(&mut self,bytes: &[u8]) -> Result<(),io::Error>;
    fn disconnect(&mut self);
}

/// A `Responder` that records every send for inspection, used by tests in place of a real
/// socket.
#[derive(Debug,Default)]
pub struct RecordingResponder {
    pub sent: Vec<Vec<u8>>,
    pub disconnected: bool,
}

impl RecordingResponder {
    pub fn new() -> RecordingResponder {
        RecordingResponder::default()
    }
}

impl Responder for RecordingResponder {
    fn send(&mut self,bytes: &[u8]) -> Result<(),io::Error> {
        self.sent.push(bytes.to_vec());
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnected = true;
    }
}
