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

//! The message-store collaborator (spec 1: "Out of scope: ... the message-store that persists
//! outbound messages by sequence number"). `SessionState` owns a `Box<dyn MessageStore>`; this
//! module defines the trait plus an in-memory implementation used by tests and by callers with
//! no durability requirement.

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use crate::message::Message;

/// Persists outbound messages by sequence number so a `ResendRequest` can be replayed (spec 4.5,
/// "Resend"), and remembers the next sender/target sequence numbers across reconnects (spec 3,
/// "Lifecycle": "State persists across reconnects unless reset").
pub trait MessageStore: fmt::Debug {
    fn set(&mut self,seq_num: u64,message: &Message) -> Result<(),io::Error>;
    fn get_range(&self,begin: u64,end: u64) -> Result<Vec<(u64,Message)>,io::Error>;

    fn next_sender_msg_seq_num(&self) -> u64;
    fn next_target_msg_seq_num(&self) -> u64;
    fn set_next_sender_msg_seq_num(&mut self,seq_num: u64) -> Result<(),io::Error>;
    fn set_next_target_msg_seq_num(&mut self,seq_num: u64) -> Result<(),io::Error>;

    /// Clears persisted messages and resets both sequence numbers to 1 (spec 4.4, "`reset`").
    fn reset(&mut self) -> Result<(),io::Error>;

    /// Reloads sequence numbers from durable storage without touching persisted messages
    /// (SPEC_FULL E.1, `Session::refresh`).
    fn refresh(&mut self) -> Result<(),io::Error> {
        Ok(())
    }
}

/// A non-durable `MessageStore` backed by a `BTreeMap`. Sufficient for tests and for
/// short-lived sessions; production deployments plug in a durable implementation (spec 1, "Out
/// of scope").
#[derive(Debug,Default)]
pub struct MemoryMessageStore {
    messages: BTreeMap<u64,Message>,
    next_sender_msg_seq_num: u64,
    next_target_msg_seq_num: u64,
}

impl MemoryMessageStore {
    pub fn new() -> MemoryMessageStore {
        MemoryMessageStore {
            messages: BTreeMap::new(),
            next_sender_msg_seq_num: 1,
            next_target_msg_seq_num: 1,
        }
    }
}

impl MessageStore for MemoryMessageStore {
    fn set(&mut self,seq_num: u64,message: &Message) -> Result<(),io::Error> {
        self.messages.insert(seq_num,message.clone());
        Ok(())
    }

    fn get_range(&self,begin: u64,end: u64) -> Result<Vec<(u64,Message)>,io::Error> {
        Ok(self.messages.range(begin..=end).map(|(seq,message)| (*seq,message.clone())).collect())
    }

    fn next_sender_msg_seq_num(&self) -> u64 {
        self.next_sender_msg_seq_num
    }

    fn next_target_msg_seq_num(&self) -> u64 {
        self.next_target_msg_seq_num
    }

    fn set_next_sender_msg_seq_num(&mut self,seq_num: u64) -> Result<(),io::Error> {
        self.next_sender_msg_seq_num = seq_num;
        Ok(())
    }

    fn set_next_target_msg_seq_num(&mut self,seq_num: u64) -> Result<(),io::Error> {
        self.next_target_msg_seq_num = seq_num;
        Ok(())
    }

    fn reset(&mut self) -> Result<(),io::Error> {
        self.messages.clear();
        self.next_sender_msg_seq_num = 1;
        self.next_target_msg_seq_num = 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_tag::FieldTag;

    #[test]
    fn stores_and_retrieves_a_range() {
        let mut store = MemoryMessageStore::new();
        for seq in 2..=5u64 {
            let mut message = Message::new();
            message.set_body_field(FieldTag(58),format!("msg{}",seq));
            store.set(seq,&message).unwrap();
        }
        let range = store.get_range(3,4).unwrap();
        assert_eq!(range.len(),2);
        assert_eq!(range[0].0,3);
        assert_eq!(range[1].0,4);
    }

    #[test]
    fn reset_clears_messages_and_sequence_numbers() {
        let mut store = MemoryMessageStore::new();
        store.set_next_sender_msg_seq_num(42).unwrap();
        store.set(10,&Message::new()).unwrap();
        store.reset().unwrap();
        assert_eq!(store.next_sender_msg_seq_num(),1);
        assert!(store.get_range(1,100).unwrap().is_empty());
    }
}
