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

//! The user-supplied application callback surface (spec 1: "Out of scope: ... the user-supplied
//! application callback surface"). `Session` borrows an `Application` and invokes it at the
//! points spec 4.5 describes; this crate ships no implementation beyond `NullApplication`, used
//! by tests and by callers with nothing to hook.

use crate::errors::SessionError;
use crate::message::Message;
use crate::session::SessionId;
use crate::validation_rules::Direction;

/// Mirrors QuickFIX's `Application` interface: `onCreate`/`onLogon`/`onLogout`/`toAdmin`/
/// `toApp`/`fromAdmin`/`fromApp`, plus the two rejection-observing hooks from spec 7
/// ("User-visible").
pub trait Application {
    fn on_create(&mut self,_session_id: &SessionId) {}
    fn on_logon(&mut self,_session_id: &SessionId) {}
    fn on_logout(&mut self,_session_id: &SessionId) {}

    /// Called immediately before an outbound admin message is sent; may mutate `message` in
    /// place (e.g. to add a custom tag).
    fn to_admin(&mut self,_session_id: &SessionId,_message: &mut Message) {}

    /// Called immediately before an outbound application message is sent. Returning
    /// `Err(SessionError::DoNotSend)` silently drops the message (spec 4.5, step 3).
    fn to_app(&mut self,_session_id: &SessionId,_message: &mut Message) -> Result<(),SessionError> {
        Ok(())
    }

    fn from_admin(&mut self,_session_id: &SessionId,_message: &Message) {}
    fn from_app(&mut self,_session_id: &SessionId,_message: &Message) {}

    /// An outgoing message this session declined to send (spec 7, "User-visible").
    fn on_outgoing_rejected(&mut self,_session_id: &SessionId,_raw: &[u8],_reason: &str) {}
    /// An incoming message this session rejected (spec 7, "User-visible").
    fn on_incoming_rejected(&mut self,_session_id: &SessionId,_raw: &[u8],_reason: &str) {}

    /// Fired when `Session` resets its sequence numbers, either via a `ResetSeqNumFlag=Y` logon
    /// or an administrative `reset()` (SPEC_FULL supplemented feature, spec 4.4 "reset").
    fn on_reset(&mut self,_session_id: &SessionId) {}

    fn direction_label(&self,direction: Direction) -> &'static str {
        match direction {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

/// An `Application` that does nothing. Useful for tests and for callers that only want the
/// session state machine without any business logic hooked in.
#[derive(Clone,Copy,Debug,Default)]
pub struct NullApplication;

impl Application for NullApplication {}
