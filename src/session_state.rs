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

//! Per-session mutable state (spec 3, "SessionState"; spec 4.4). Owns sequence numbers, flags,
//! timers, the pending resend range, and the out-of-order inbound queue.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime,Utc};

use crate::message::Message;
use crate::store::MessageStore;

/// `(begin, end)`; `(0, 0)` means no outstanding resend request (spec 3).
#[derive(Clone,Copy,Debug,Default,Eq,PartialEq)]
pub struct ResendRange {
    pub begin: u64,
    pub end: u64,
}

impl ResendRange {
    pub fn none() -> ResendRange {
        ResendRange::default()
    }

    pub fn is_none(&self) -> bool {
        self.begin == 0 && self.end == 0
    }
}

/// Per-session mutable state (spec 3, "SessionState"). Sequence numbers are delegated to the
/// owned `MessageStore` so they persist across reconnects (spec 3, "Lifecycle").
pub struct SessionState {
    store: Box<dyn MessageStore>,

    pub sent_logon: bool,
    pub received_logon: bool,
    pub sent_logout: bool,
    pub sent_reset: bool,
    pub received_reset: bool,
    pub initiate: bool,
    pub manual_login_requested: bool,
    pub manual_logout_requested: bool,

    pub last_sent_time: Option<DateTime<Utc>>,
    pub last_received_time: Option<DateTime<Utc>>,
    pub last_connection_attempt_time: Option<DateTime<Utc>>,
    pub heart_bt_int: Duration,
    pub logon_timeout: Duration,
    pub logout_timeout: Duration,
    pub test_request_counter: u32,

    pub resend_range: ResendRange,
    pub message_queue: BTreeMap<u64,Message>,
    pub logout_reason: String,
}

impl SessionState {
    pub fn new(initiate: bool,store: Box<dyn MessageStore>) -> SessionState {
        SessionState {
            store,
            sent_logon: false,
            received_logon: false,
            sent_logout: false,
            sent_reset: false,
            received_reset: false,
            initiate,
            manual_login_requested: false,
            manual_logout_requested: false,
            last_sent_time: None,
            last_received_time: None,
            last_connection_attempt_time: None,
            heart_bt_int: Duration::from_secs(30),
            logon_timeout: Duration::from_secs(10),
            logout_timeout: Duration::from_secs(2),
            test_request_counter: 0,
            resend_range: ResendRange::none(),
            message_queue: BTreeMap::new(),
            logout_reason: String::new(),
        }
    }

    pub fn next_sender_msg_seq_num(&self) -> u64 {
        self.store.next_sender_msg_seq_num()
    }

    pub fn next_target_msg_seq_num(&self) -> u64 {
        self.store.next_target_msg_seq_num()
    }

    pub fn set_next_sender_msg_seq_num(&mut self,seq_num: u64) {
        self.store.set_next_sender_msg_seq_num(seq_num).ok();
    }

    pub fn set_next_target_msg_seq_num(&mut self,seq_num: u64) {
        self.store.set_next_target_msg_seq_num(seq_num).ok();
    }

    pub fn incr_next_sender_msg_seq_num(&mut self) {
        let next = self.next_sender_msg_seq_num() + 1;
        self.set_next_sender_msg_seq_num(next);
    }

    pub fn incr_next_target_msg_seq_num(&mut self) {
        let next = self.next_target_msg_seq_num() + 1;
        self.set_next_target_msg_seq_num(next);
    }

    pub fn persist(&mut self,seq_num: u64,message: &Message) {
        self.store.set(seq_num,message).ok();
    }

    pub fn stored_range(&self,begin: u64,end: u64) -> Vec<(u64,Message)> {
        self.store.get_range(begin,end).unwrap_or_default()
    }

    /// Reloads persisted sequence numbers without touching transient state (SPEC_FULL E.1).
    pub fn refresh(&mut self) {
        self.store.refresh().ok();
    }

    /// Clears transient flags and the out-of-order queue but preserves sequence numbers (spec
    /// 4.4, "`softReset`").
    pub fn soft_reset(&mut self) {
        self.sent_logon = false;
        self.received_logon = false;
        self.sent_logout = false;
        self.sent_reset = false;
        self.received_reset = false;
        self.manual_login_requested = false;
        self.manual_logout_requested = false;
        self.resend_range = ResendRange::none();
        self.message_queue.clear();
        self.logout_reason.clear();
        self.test_request_counter = 0;
    }

    /// Restores sequence numbers to 1 and clears all transient state (spec 4.4, "`reset`").
    pub fn reset(&mut self) {
        self.soft_reset();
        self.store.reset().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_tag::FieldTag;
    use crate::store::MemoryMessageStore;

    #[test]
    fn soft_reset_preserves_sequence_numbers() {
        let mut state = SessionState::new(true,Box::new(MemoryMessageStore::new()));
        state.set_next_sender_msg_seq_num(10);
        state.set_next_target_msg_seq_num(7);
        state.sent_logon = true;
        state.message_queue.insert(8,Message::new());

        state.soft_reset();

        assert_eq!(state.next_sender_msg_seq_num(),10);
        assert_eq!(state.next_target_msg_seq_num(),7);
        assert!(!state.sent_logon);
        assert!(state.message_queue.is_empty());
    }

    #[test]
    fn reset_restores_sequence_numbers_to_one() {
        let mut state = SessionState::new(true,Box::new(MemoryMessageStore::new()));
        state.set_next_sender_msg_seq_num(42);
        state.set_next_target_msg_seq_num(42);

        state.reset();

        assert_eq!(state.next_sender_msg_seq_num(),1);
        assert_eq!(state.next_target_msg_seq_num(),1);
    }

    #[test]
    fn resend_range_none_when_zero() {
        assert!(ResendRange::none().is_none());
        assert!(!ResendRange{ begin: 5, end: 10 }.is_none());
    }

    #[test]
    fn stores_and_replays_persisted_messages() {
        let mut state = SessionState::new(true,Box::new(MemoryMessageStore::new()));
        let mut message = Message::new();
        message.set_body_field(FieldTag(58),"hi");
        state.persist(5,&message);
        let replayed = state.stored_range(5,5);
        assert_eq!(replayed.len(),1);
        assert_eq!(replayed[0].1.field_value(FieldTag(58)),Some("hi"));
    }
}
