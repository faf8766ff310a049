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

//! The protocol state machine (spec 3 "Session"; spec 4.5). Connects the `Schedule`,
//! `SessionState`, the session/app `DataDictionary` pair, `ValidationRules`, a `Responder`, and
//! an `Application` and drives logon, heartbeat, resend, reject, and logout flows.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime,Utc};

use crate::application::Application;
use crate::constant::*;
use crate::dictionary::DataDictionary;
use crate::errors::{BusinessRejectReason,SessionError,SessionRejectReason,ValidationError};
use crate::field_tag::FieldTag;
use crate::fix_version::FIXVersion;
use crate::message::{Field,Message};
use crate::message_version::MessageVersion;
use crate::responder::Responder;
use crate::schedule::Schedule;
use crate::session_state::{ResendRange,SessionState};
use crate::store::MessageStore;
use crate::validation_rules::{Direction,ValidationRules};

/// Immutable (BeginString, SenderCompID, TargetCompID) triple plus an optional qualifier (spec
/// 3, "SessionID").
#[derive(Clone,Debug,Eq,Hash,PartialEq)]
pub struct SessionId {
    pub begin_string: String,
    pub sender_comp_id: String,
    pub target_comp_id: String,
    pub qualifier: Option<String>,
}

impl SessionId {
    pub fn new(begin_string: impl Into<String>,sender_comp_id: impl Into<String>,target_comp_id: impl Into<String>) -> SessionId {
        SessionId {
            begin_string: begin_string.into(),
            sender_comp_id: sender_comp_id.into(),
            target_comp_id: target_comp_id.into(),
            qualifier: None,
        }
    }

    pub fn with_qualifier(mut self,qualifier: impl Into<String>) -> SessionId {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn is_fixt(&self) -> bool {
        self.begin_string == FIXT_1_1_BEGIN_STRING
    }

    /// Swaps Sender/Target -- used by `lookup_session(bytes, reverse=true)` (spec 4.5, "Static
    /// session registry").
    pub fn reversed(&self) -> SessionId {
        SessionId {
            begin_string: self.begin_string.clone(),
            sender_comp_id: self.target_comp_id.clone(),
            target_comp_id: self.sender_comp_id.clone(),
            qualifier: self.qualifier.clone(),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self,f: &mut fmt::Formatter) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f,"{}:{}->{}:{}",self.begin_string,self.sender_comp_id,self.target_comp_id,q),
            None => write!(f,"{}:{}->{}",self.begin_string,self.sender_comp_id,self.target_comp_id),
        }
    }
}

fn is_admin_msg_type(msg_type: &str) -> bool {
    matches!(msg_type,
        MSG_TYPE_HEARTBEAT | MSG_TYPE_TEST_REQUEST | MSG_TYPE_RESEND_REQUEST |
        MSG_TYPE_REJECT | MSG_TYPE_SEQUENCE_RESET | MSG_TYPE_LOGOUT | MSG_TYPE_LOGON
    )
}

fn format_sending_time(now: DateTime<Utc>,millis: bool) -> String {
    if millis {
        now.format("%Y%m%d-%H:%M:%S%.3f").to_string()
    }
    else {
        now.format("%Y%m%d-%H:%M:%S").to_string()
    }
}

fn parse_sending_time(raw: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(raw,"%Y%m%d-%H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw,"%Y%m%d-%H:%M:%S"))
        .ok()
}

/// Outcome of `verify` for one inbound message (spec 4.5, "Verify").
enum VerifyOutcome {
    Proceed,
    Queued,
    Duplicate,
    Handled, //verify itself generated a Reject+Logout; caller should stop processing
}

/// The FIX protocol state machine (spec 3, "Session"; spec 4.5). Generic over the application
/// callback surface and the byte-transport responder so both can be supplied without a trait
/// object or a global registry (spec 9, "Global session registry").
pub struct Session<A: Application,R: Responder> {
    session_id: SessionId,
    state: SessionState,
    session_dd: DataDictionary,
    app_dd: DataDictionary,
    parsing_dd: DataDictionary,
    rules: ValidationRules,
    schedule: Schedule,
    responder: R,
    application: A,

    pub check_comp_id: bool,
    pub check_latency: bool,
    pub max_latency: Duration,
    pub reset_on_logon: bool,
    pub reset_on_logout: bool,
    pub millis_in_timestamp: bool,
    pub send_redundant_resend_requests: bool,
    pub refresh_on_logon: bool,
}

impl<A: Application,R: Responder> Session<A,R> {
    pub fn new(
        session_id: SessionId,
        initiate: bool,
        session_dd: DataDictionary,
        app_dd: DataDictionary,
        rules: ValidationRules,
        schedule: Schedule,
        store: Box<dyn MessageStore>,
        responder: R,
        mut application: A,
    ) -> Session<A,R> {
        let parsing_dd = DataDictionary::merged_for_parsing(&session_dd,&app_dd);
        let state = SessionState::new(initiate,store);

        application.on_create(&session_id);

        Session {
            session_id,
            state,
            session_dd,
            app_dd,
            parsing_dd,
            rules,
            schedule,
            responder,
            application,
            check_comp_id: true,
            check_latency: true,
            max_latency: Duration::from_secs(120),
            reset_on_logon: false,
            reset_on_logout: false,
            millis_in_timestamp: true,
            send_redundant_resend_requests: false,
            refresh_on_logon: false,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn application_mut(&mut self) -> &mut A {
        &mut self.application
    }

    pub fn responder_mut(&mut self) -> &mut R {
        &mut self.responder
    }

    pub fn is_logged_on(&self) -> bool {
        self.state.sent_logon && self.state.received_logon
    }

    /// `isLogonTime` (spec 4.5).
    pub fn is_logon_time(&self,now: DateTime<Utc>) -> bool {
        self.schedule.is_in_range(&now)
    }

    /// `isConnectTime` (spec 4.5): prerequisites plus the reconnect interval having elapsed.
    pub fn is_connect_time(&self,now: DateTime<Utc>) -> bool {
        if !self.state.initiate || !self.schedule.should_auto_connect() {
            return false;
        }
        match self.state.last_connection_attempt_time {
            None => true,
            Some(last) => (now - last).to_std().map(|elapsed| elapsed >= self.schedule.reconnect_interval()).unwrap_or(true),
        }
    }

    /// Reloads persisted sequence numbers from the `MessageStore` without a full reset
    /// (SPEC_FULL E.1): used after a process restart to resume where a prior process left off.
    pub fn refresh(&mut self) {
        self.state.refresh();
    }

    /// Forces end-of-day processing outside of the automatic schedule-driven tick (SPEC_FULL
    /// E.2).
    pub fn eod(&mut self) {
        if self.schedule.should_auto_eod() {
            self.state.reset();
        }
        else {
            self.state.soft_reset();
        }
    }

    /// Administrative override of the next sender sequence number, guarded the same way a reset
    /// is: refused while a resend is outstanding (SPEC_FULL E.3).
    pub fn set_next_sender_msg_seq_num(&mut self,seq_num: u64) -> Result<(),SessionError> {
        if !self.state.resend_range.is_none() {
            return Err(SessionError::RejectLogon("cannot override sequence numbers during an outstanding resend".to_string()));
        }
        self.state.set_next_sender_msg_seq_num(seq_num);
        Ok(())
    }

    pub fn set_next_target_msg_seq_num(&mut self,seq_num: u64) -> Result<(),SessionError> {
        if !self.state.resend_range.is_none() {
            return Err(SessionError::RejectLogon("cannot override sequence numbers during an outstanding resend".to_string()));
        }
        self.state.set_next_target_msg_seq_num(seq_num);
        Ok(())
    }

    /// Clears the schedule (installing a null one) and logs out; a blunt instrument that
    /// implicitly disables future reconnects (spec 4.5, "`mustLogout`"; spec 9 flags this as
    /// worth replacing with an explicit `stop()` in a future revision).
    pub fn must_logout(&mut self,reason: &str,now: DateTime<Utc>) -> Result<(),SessionError> {
        self.schedule = Schedule::null();
        self.generate_logout(now,reason)
    }

    fn fill_header(&self,message: &mut Message,now: DateTime<Utc>,seq_num: u64) {
        message.set_header_field(FieldTag(BEGIN_STRING_TAG),self.session_dd.version.clone());
        message.set_header_field(FieldTag(SENDER_COMP_ID_TAG),self.session_id.sender_comp_id.clone());
        message.set_header_field(FieldTag(TARGET_COMP_ID_TAG),self.session_id.target_comp_id.clone());
        message.set_header_field(FieldTag(MSG_SEQ_NUM_TAG),seq_num.to_string());
        let use_millis = self.millis_in_timestamp && self.session_dd_version_supports_millis();
        message.set_header_field(FieldTag(SENDING_TIME_TAG),format_sending_time(now,use_millis));
    }

    /// The session dictionary's `BeginString` resolved to a `FIXVersion` so comparisons use the
    /// (family, major, minor) ordering instead of lexicographic string comparison (spec 9,
    /// "Version comparison"). Falls back to `FIX_4_2` -- the oldest version with a defined
    /// `SessionRejectReason`/`BusinessMessageReject` surface -- for an unrecognized BeginString.
    fn version(&self) -> FIXVersion {
        FIXVersion::from_begin_string(&self.session_dd.version).unwrap_or(FIXVersion::FIX_4_2)
    }

    fn session_dd_version_supports_millis(&self) -> bool {
        self.version().uses_millisecond_timestamps()
    }

    /// Outbound application-level send (spec 4.5, "Outbound send contract"): strips
    /// PossDupFlag(43)/OrigSendingTime(122) and calls `sendRaw`.
    pub fn send(&mut self,mut message: Message,now: DateTime<Utc>) -> Result<(),SessionError> {
        message.strip_retransmission_fields();
        self.send_raw(message,now,None)
    }

    /// `sendRaw` (spec 4.5). `explicit_seq_num` is used for retransmissions and for the outbound
    /// gap-fill SequenceReset, neither of which consume `nextSender` (spec 4.5, "Outbound
    /// SequenceReset").
    fn send_raw(&mut self,mut message: Message,now: DateTime<Utc>,explicit_seq_num: Option<u64>) -> Result<(),SessionError> {
        let msg_type = message.msg_type().unwrap_or_default().to_string();
        let is_logon = msg_type == MSG_TYPE_LOGON;
        let carries_reset = message.field_value(FieldTag(RESET_SEQ_NUM_FLAG_TAG)) == Some("Y");

        if is_logon && carries_reset && explicit_seq_num.is_none() && !self.state.received_reset {
            self.state.reset();
            self.state.sent_reset = true;
            self.application.on_reset(&self.session_id);
        }

        let seq_num = explicit_seq_num.unwrap_or_else(|| self.state.next_sender_msg_seq_num());
        self.fill_header(&mut message,now,seq_num);

        if is_admin_msg_type(&msg_type) {
            self.application.to_admin(&self.session_id,&mut message);
        }
        else {
            if !self.is_logged_on() && !self.state.resend_range.is_none() {
                return Ok(()); //spec 4.5 step 3: drop while logon pending and a reset is pending
            }
            if let Err(error) = self.application.to_app(&self.session_id,&mut message) {
                let bytes = message.to_bytes(&self.session_dd.version);
                self.application.on_outgoing_rejected(&self.session_id,&bytes,&error.to_string());
                return match error {
                    SessionError::DoNotSend => Ok(()),
                    other => Err(other),
                };
            }
        }

        let bytes = message.to_bytes(&self.session_dd.version);

        if explicit_seq_num.is_none() {
            self.state.persist(seq_num,&message);
        }

        let should_transmit = is_logon
            || msg_type == MSG_TYPE_LOGOUT
            || msg_type == MSG_TYPE_RESEND_REQUEST
            || msg_type == MSG_TYPE_SEQUENCE_RESET
            || self.is_logged_on();

        if should_transmit {
            self.responder.send(&bytes)?;
            self.state.last_sent_time = Some(now);
            log::info!("{}: sent {}",self.session_id,msg_type);
        }

        if explicit_seq_num.is_none() {
            self.state.incr_next_sender_msg_seq_num();
        }

        Ok(())
    }

    /// Inbound entry point (spec 4.5, "Inbound"). `queued` is true when replaying a message that
    /// was previously held in the out-of-order queue, in which case the drain loop (not this
    /// call) is responsible for further draining and the timer tick.
    pub fn next(&mut self,tokens: &[(FieldTag,Vec<u8>)],now: DateTime<Utc>,queued: bool) -> Result<(),SessionError> {
        let msg_type = Message::msg_type_from_tokens(tokens).unwrap_or_default();
        let begin_string = Message::begin_string_from_tokens(tokens);

        let message = match self.parsing_dd.parse_message(tokens,&msg_type) {
            Ok(message) => message,
            Err(parse_error) => {
                let raw = tokens.iter().flat_map(|(tag,value)| {
                    let mut bytes = tag.to_bytes();
                    bytes.push(TAG_END);
                    bytes.extend_from_slice(value);
                    bytes.push(VALUE_END);
                    bytes
                }).collect::<Vec<u8>>();
                self.application.on_incoming_rejected(&self.session_id,&raw,&parse_error.to_string());
                return Err(SessionError::IoError(std::io::Error::new(std::io::ErrorKind::InvalidData,parse_error.to_string())));
            },
        };

        if let Some(begin_string) = begin_string {
            if begin_string != self.session_id.begin_string {
                return self.on_unsupported_version(&message,now);
            }
        }

        self.state.last_received_time = Some(now);

        let result = match msg_type.as_str() {
            MSG_TYPE_LOGON => self.next_logon(message,now),
            MSG_TYPE_HEARTBEAT => self.next_heartbeat(message,now),
            MSG_TYPE_TEST_REQUEST => self.next_test_request(message,now),
            MSG_TYPE_SEQUENCE_RESET => self.next_sequence_reset(message,now),
            MSG_TYPE_LOGOUT => self.next_logout(message,now),
            MSG_TYPE_RESEND_REQUEST => self.next_resend_request(message,now),
            MSG_TYPE_REJECT => self.next_reject(message,now),
            _ => self.next_app_message(message,now),
        };

        if !queued {
            self.drain_queue(now)?;
            if self.is_logged_on() {
                self.on_timer(now)?;
            }
        }

        result
    }

    fn on_unsupported_version(&mut self,message: &Message,now: DateTime<Utc>) -> Result<(),SessionError> {
        self.application.on_incoming_rejected(&self.session_id,b"",&ValidationError::UnsupportedVersion.to_string());
        let msg_type = message.msg_type().unwrap_or_default().to_string();
        if msg_type != MSG_TYPE_LOGOUT {
            self.generate_logout(now,"unsupported BeginString")?;
        }
        Err(SessionError::UnsupportedVersion)
    }

    /// `verify` (spec 4.5): liveness/identity/time checks plus gap detection, shared by every
    /// dispatch branch except `nextLogon` (which has its own handshake-specific checks).
    fn verify(&mut self,message: &Message,now: DateTime<Utc>) -> Result<VerifyOutcome,SessionError> {
        if !self.state.received_logon {
            return Err(SessionError::RejectLogon("session not established".to_string()));
        }

        if self.check_latency {
            if let Some(sending_time) = message.sending_time() {
                if let Some(parsed) = parse_sending_time(sending_time) {
                    let sent_utc = DateTime::<Utc>::from_naive_utc_and_offset(parsed,Utc);
                    let delta = (now - sent_utc).num_seconds().unsigned_abs();
                    if delta > self.max_latency.as_secs() {
                        self.generate_reject(message,SessionRejectReason::SendingTimeAccuracyProblem,None,now)?;
                        self.generate_logout(now,"SendingTime accuracy problem")?;
                        return Ok(VerifyOutcome::Handled);
                    }
                }
            }
        }

        if self.check_comp_id {
            let sender_ok = message.sender_comp_id() == Some(self.session_id.target_comp_id.as_str());
            let target_ok = message.target_comp_id() == Some(self.session_id.sender_comp_id.as_str());
            if !sender_ok || !target_ok {
                self.generate_reject(message,SessionRejectReason::CompIDProblem,None,now)?;
                self.generate_logout(now,"CompID problem")?;
                return Ok(VerifyOutcome::Handled);
            }
        }

        let seq_num = message.msg_seq_num().unwrap_or(0);
        let expected = self.state.next_target_msg_seq_num();

        if seq_num > expected {
            self.state.message_queue.insert(seq_num,message.clone());
            let redundant = !self.state.resend_range.is_none();
            if !redundant || self.send_redundant_resend_requests {
                self.send_resend_request(expected,now)?;
                self.state.resend_range = ResendRange{ begin: expected, end: seq_num.saturating_sub(1) };
            }
            return Ok(VerifyOutcome::Queued);
        }

        if seq_num < expected {
            if message.poss_dup_flag() {
                if let (Some(orig),Some(sending)) = (message.orig_sending_time(),message.sending_time()) {
                    if let (Some(orig_parsed),Some(sending_parsed)) = (parse_sending_time(orig),parse_sending_time(sending)) {
                        if orig_parsed > sending_parsed {
                            self.generate_reject(message,SessionRejectReason::SendingTimeAccuracyProblem,None,now)?;
                            self.generate_logout(now,"OrigSendingTime after SendingTime")?;
                            return Ok(VerifyOutcome::Handled);
                        }
                    }
                }
                return Ok(VerifyOutcome::Duplicate);
            }
            self.generate_logout(now,"MsgSeqNum too low, no PossDupFlag")?;
            return Err(SessionError::RejectLogon("MsgSeqNum lower than expected without PossDupFlag".to_string()));
        }

        if !self.state.resend_range.is_none() && seq_num >= self.state.resend_range.end {
            self.state.resend_range = ResendRange::none();
        }

        Ok(VerifyOutcome::Proceed)
    }

    fn drain_queue(&mut self,now: DateTime<Utc>) -> Result<(),SessionError> {
        loop {
            let expected = self.state.next_target_msg_seq_num();
            let Some(message) = self.state.message_queue.remove(&expected) else { break; };
            self.dispatch_queued(message,now)?;
        }
        Ok(())
    }

    fn dispatch_queued(&mut self,message: Message,now: DateTime<Utc>) -> Result<(),SessionError> {
        let msg_type = message.msg_type().unwrap_or_default().to_string();
        match msg_type.as_str() {
            MSG_TYPE_LOGON => self.next_logon(message,now),
            MSG_TYPE_HEARTBEAT => self.next_heartbeat(message,now),
            MSG_TYPE_TEST_REQUEST => self.next_test_request(message,now),
            MSG_TYPE_SEQUENCE_RESET => self.next_sequence_reset(message,now),
            MSG_TYPE_LOGOUT => self.next_logout(message,now),
            MSG_TYPE_RESEND_REQUEST => self.next_resend_request(message,now),
            MSG_TYPE_REJECT => self.next_reject(message,now),
            _ => self.next_app_message(message,now),
        }
    }

    fn next_logon(&mut self,message: Message,now: DateTime<Utc>) -> Result<(),SessionError> {
        self.application.from_admin(&self.session_id,&message);

        if self.session_id.is_fixt() {
            let expected = MessageVersion::from_dictionary_version(&self.app_dd.version);
            let received = message.field_value(FieldTag(DEFAULT_APPL_VER_ID_TAG))
                .and_then(|v| v.parse::<u32>().ok())
                .and_then(MessageVersion::new);

            if received.is_none() || (expected.is_some() && received != expected) {
                self.generate_reject(&message,SessionRejectReason::InvalidOrUnsupportedApplicationVersion,Some(FieldTag(DEFAULT_APPL_VER_ID_TAG)),now)?;
                self.generate_logout(now,"unsupported DefaultApplVerID")?;
                return Err(SessionError::RejectLogon("DefaultApplVerID not supported by this session's application dictionary".to_string()));
            }
        }

        let reset_requested = message.field_value(FieldTag(RESET_SEQ_NUM_FLAG_TAG)) == Some("Y");
        if reset_requested {
            self.state.reset();
            self.state.received_reset = true;
            self.application.on_reset(&self.session_id);
        }

        if let Some(heart_bt_int) = message.field_value(FieldTag(HEART_BT_INT_TAG)).and_then(|v| v.parse::<u64>().ok()) {
            self.state.heart_bt_int = Duration::from_secs(heart_bt_int);
        }

        let was_already_logged_on = self.state.received_logon;
        self.state.received_logon = true;
        self.state.incr_next_target_msg_seq_num();

        if !was_already_logged_on && !self.state.initiate {
            let mut logon = Message::new();
            logon.set_header_field(FieldTag(MSG_TYPE_TAG),MSG_TYPE_LOGON);
            logon.set_body_field(FieldTag(ENCRYPT_METHOD_TAG),"0");
            logon.set_body_field(FieldTag(HEART_BT_INT_TAG),self.state.heart_bt_int.as_secs().to_string());
            if reset_requested {
                logon.set_body_field(FieldTag(RESET_SEQ_NUM_FLAG_TAG),"Y");
            }
            self.send_raw(logon,now,None)?;
            self.state.sent_logon = true;
        }

        self.state.received_reset = false;
        self.application.on_logon(&self.session_id);
        Ok(())
    }

    /// Initiator side of the handshake: called from `on_timer` while not yet logged on (spec
    /// 4.5, "Logon handshake").
    fn should_send_logon(&self,now: DateTime<Utc>) -> bool {
        !self.state.sent_logon && self.is_connect_time(now)
    }

    fn send_logon_request(&mut self,now: DateTime<Utc>) -> Result<(),SessionError> {
        self.state.last_connection_attempt_time = Some(now);

        let mut logon = Message::new();
        logon.set_header_field(FieldTag(MSG_TYPE_TAG),MSG_TYPE_LOGON);
        logon.set_body_field(FieldTag(ENCRYPT_METHOD_TAG),"0");
        logon.set_body_field(FieldTag(HEART_BT_INT_TAG),self.state.heart_bt_int.as_secs().to_string());
        if self.session_id.is_fixt() {
            if let Some(version) = MessageVersion::from_dictionary_version(&self.app_dd.version) {
                logon.set_body_field(FieldTag(DEFAULT_APPL_VER_ID_TAG),version.as_value().to_string());
            }
        }
        if self.reset_on_logon && self.state.next_sender_msg_seq_num() == 1 && self.state.next_target_msg_seq_num() == 1 {
            logon.set_body_field(FieldTag(RESET_SEQ_NUM_FLAG_TAG),"Y");
        }

        self.send_raw(logon,now,None)?;
        self.state.sent_logon = true;
        Ok(())
    }

    fn next_heartbeat(&mut self,message: Message,now: DateTime<Utc>) -> Result<(),SessionError> {
        match self.verify(&message,now)? {
            VerifyOutcome::Proceed => {
                self.application.from_admin(&self.session_id,&message);
                self.state.incr_next_target_msg_seq_num();
            },
            VerifyOutcome::Duplicate | VerifyOutcome::Queued | VerifyOutcome::Handled => {},
        }
        Ok(())
    }

    fn next_test_request(&mut self,message: Message,now: DateTime<Utc>) -> Result<(),SessionError> {
        match self.verify(&message,now)? {
            VerifyOutcome::Proceed => {
                self.application.from_admin(&self.session_id,&message);
                self.state.incr_next_target_msg_seq_num();
                let mut heartbeat = Message::new();
                heartbeat.set_header_field(FieldTag(MSG_TYPE_TAG),MSG_TYPE_HEARTBEAT);
                if let Some(test_req_id) = message.field_value(FieldTag(TEST_REQ_ID_TAG)) {
                    heartbeat.set_body_field(FieldTag(TEST_REQ_ID_TAG),test_req_id.to_string());
                }
                self.send_raw(heartbeat,now,None)?;
            },
            VerifyOutcome::Duplicate | VerifyOutcome::Queued | VerifyOutcome::Handled => {},
        }
        Ok(())
    }

    fn next_sequence_reset(&mut self,message: Message,now: DateTime<Utc>) -> Result<(),SessionError> {
        //GapFill SequenceResets still need CompID/time checks, but not the too-low fatal error
        //(they exist precisely to jump the target forward) so verify() is intentionally skipped
        //here; NewSeqNo handling performs the equivalent bounds check (spec 8, "Boundary").
        self.application.from_admin(&self.session_id,&message);

        let new_seq_no = message.field_value(FieldTag(NEW_SEQ_NO_TAG)).and_then(|v| v.parse::<u64>().ok());
        let expected = self.state.next_target_msg_seq_num();

        match new_seq_no {
            Some(new_seq_no) if new_seq_no > expected => {
                self.state.set_next_target_msg_seq_num(new_seq_no);
            },
            Some(new_seq_no) if new_seq_no < expected => {
                self.generate_reject(&message,SessionRejectReason::ValueIsIncorrectForThisTag,Some(FieldTag(NEW_SEQ_NO_TAG)),now)?;
            },
            _ => {},
        }
        Ok(())
    }

    fn next_logout(&mut self,message: Message,now: DateTime<Utc>) -> Result<(),SessionError> {
        self.application.from_admin(&self.session_id,&message);

        if !self.state.sent_logout {
            let mut logout = Message::new();
            logout.set_header_field(FieldTag(MSG_TYPE_TAG),MSG_TYPE_LOGOUT);
            self.send_raw(logout,now,None)?;
            self.state.sent_logout = true;
        }

        self.state.incr_next_target_msg_seq_num();

        if self.reset_on_logout {
            self.state.reset();
        }
        if self.schedule.should_auto_disconnect() {
            self.responder.disconnect();
        }

        self.application.on_logout(&self.session_id);
        Ok(())
    }

    fn next_resend_request(&mut self,message: Message,now: DateTime<Utc>) -> Result<(),SessionError> {
        match self.verify(&message,now)? {
            VerifyOutcome::Handled | VerifyOutcome::Queued | VerifyOutcome::Duplicate => return Ok(()),
            VerifyOutcome::Proceed => {},
        }

        self.application.from_admin(&self.session_id,&message);
        self.state.incr_next_target_msg_seq_num();

        let begin = message.field_value(FieldTag(BEGIN_SEQ_NO_TAG)).and_then(|v| v.parse::<u64>().ok()).unwrap_or(1);
        let raw_end = message.field_value(FieldTag(END_SEQ_NO_TAG)).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);

        let next_sender = self.state.next_sender_msg_seq_num();
        //end=0 (FIX>=4.2) or end=999999 (FIX<=4.1) both mean "through current" (spec 8,
        //"Boundary"); clamp to nextSender-1.
        let is_to_infinity = raw_end == 0 || raw_end == 999_999 || raw_end >= next_sender;
        let end = if is_to_infinity { next_sender.saturating_sub(1) } else { raw_end };

        self.resend_range_of(begin,end,now)?;
        Ok(())
    }

    /// `nextResendRequest`'s replay loop (spec 4.5, "Resend"). Admin messages coalesce into a
    /// trailing gap-fill; application messages are replayed individually with PossDupFlag=Y.
    fn resend_range_of(&mut self,begin: u64,end: u64,now: DateTime<Utc>) -> Result<(),SessionError> {
        if begin > end {
            return Ok(());
        }

        let stored = self.state.stored_range(begin,end);
        if stored.is_empty() {
            //No persistence, or nothing stored in range: a single gap-fill covers it all.
            return self.send_gap_fill(begin,end + 1,now);
        }

        let mut gap_start = begin;
        let mut index_by_seq: std::collections::BTreeMap<u64,Message> = stored.into_iter().collect();

        for seq in begin..=end {
            let Some(stored_message) = index_by_seq.remove(&seq) else {
                //Nothing persisted for this seq (outside what the store returned) -- extend the
                //gap.
                continue;
            };

            let msg_type = stored_message.msg_type().unwrap_or_default().to_string();
            if is_admin_msg_type(&msg_type) {
                //Admin messages, including Logon, coalesce into the gap fill instead of being
                //replayed verbatim (spec 4.5, "Resend").
                continue;
            }

            if gap_start < seq {
                self.send_gap_fill(gap_start,seq,now)?;
            }

            let mut replay = stored_message;
            replay.set_header_field(FieldTag(POSS_DUP_FLAG_TAG),"Y");
            if let Some(sending_time) = replay.sending_time().map(|s| s.to_string()) {
                replay.set_header_field(FieldTag(ORIG_SENDING_TIME_TAG),sending_time);
            }

            match self.application.to_app(&self.session_id,&mut replay) {
                Ok(()) => {
                    self.send_raw(replay,now,Some(seq))?;
                    gap_start = seq + 1;
                },
                Err(_) => {
                    //DoNotSend extends the gap over this message too.
                },
            }
        }

        if gap_start <= end {
            self.send_gap_fill(gap_start,end + 1,now)?;
        }

        self.state.resend_range = ResendRange{ begin, end };
        Ok(())
    }

    fn send_gap_fill(&mut self,begin: u64,new_seq_no: u64,now: DateTime<Utc>) -> Result<(),SessionError> {
        if begin >= new_seq_no {
            return Ok(());
        }
        let mut reset = Message::new();
        reset.set_header_field(FieldTag(MSG_TYPE_TAG),MSG_TYPE_SEQUENCE_RESET);
        reset.set_header_field(FieldTag(POSS_DUP_FLAG_TAG),"Y");
        reset.set_body_field(FieldTag(GAP_FILL_FLAG_TAG),"Y");
        reset.set_body_field(FieldTag(NEW_SEQ_NO_TAG),new_seq_no.to_string());
        self.send_raw(reset,now,Some(begin))
    }

    fn next_reject(&mut self,message: Message,now: DateTime<Utc>) -> Result<(),SessionError> {
        match self.verify(&message,now)? {
            VerifyOutcome::Proceed => {
                self.application.from_admin(&self.session_id,&message);
                self.state.incr_next_target_msg_seq_num();
            },
            VerifyOutcome::Duplicate | VerifyOutcome::Queued | VerifyOutcome::Handled => {},
        }
        Ok(())
    }

    fn next_app_message(&mut self,message: Message,now: DateTime<Utc>) -> Result<(),SessionError> {
        let msg_type = message.msg_type().unwrap_or_default().to_string();

        match self.verify(&message,now)? {
            VerifyOutcome::Handled => return Ok(()),
            VerifyOutcome::Queued => return Ok(()),
            VerifyOutcome::Duplicate => return Ok(()),
            VerifyOutcome::Proceed => {},
        }

        let direction = Direction::Incoming;
        if let Err(error) = DataDictionary::validate(direction,&message,&self.session_dd,&self.app_dd,&self.rules) {
            self.state.incr_next_target_msg_seq_num();
            return self.reject_inbound(&message,&msg_type,&error,now);
        }

        self.application.from_app(&self.session_id,&message);
        self.state.incr_next_target_msg_seq_num();
        Ok(())
    }

    /// Translates a `ValidationError` into a session-level Reject(3) or, for FIX >= 4.2
    /// application messages, a BusinessMessageReject(j) (spec 4.5, "Reject generation"; spec 7,
    /// "Propagation policy").
    fn reject_inbound(&mut self,message: &Message,msg_type: &str,error: &ValidationError,now: DateTime<Utc>) -> Result<(),SessionError> {
        let raw = message.to_bytes(&self.session_dd.version);
        self.application.on_incoming_rejected(&self.session_id,&raw,&error.to_string());

        let use_business_reject = !is_admin_msg_type(msg_type) && self.version().at_least_4_2();

        if use_business_reject {
            self.generate_business_reject(message,BusinessRejectReason::from(error),now)
        }
        else {
            self.generate_reject(message,SessionRejectReason::from(error),error.offending_tag(),now)
        }
    }

    /// `Reject generation` (spec 4.5): only emitted once a Logon has been received; otherwise an
    /// error is raised (spec 4.5, "Rejects are emitted only when receivedLogon").
    fn generate_reject(&mut self,message: &Message,reason: SessionRejectReason,ref_tag: Option<FieldTag>,now: DateTime<Utc>) -> Result<(),SessionError> {
        if !self.state.received_logon {
            return Err(SessionError::RejectLogon("cannot reject before a Logon has been received".to_string()));
        }

        let mut reject = Message::new();
        reject.set_header_field(FieldTag(MSG_TYPE_TAG),MSG_TYPE_REJECT);
        if let Some(ref_seq_num) = message.msg_seq_num() {
            reject.set_body_field(FieldTag(REF_SEQ_NUM_TAG),ref_seq_num.to_string());
        }

        if self.version().at_least_4_2() {
            if let Some(ref_msg_type) = message.msg_type() {
                reject.set_body_field(FieldTag(REF_MSG_TYPE_TAG),ref_msg_type.to_string());
            }
            //SessionRejectReason(373): InvalidMsgType only at exactly FIX.4.2 (spec 4.5).
            if reason != SessionRejectReason::InvalidMsgType || self.version() == FIXVersion::FIX_4_2 {
                reject.set_body_field(FieldTag(SESSION_REJECT_REASON_TAG),reason.as_value().to_string());
            }
        }
        if let Some(tag) = ref_tag {
            reject.set_body_field(FieldTag(REF_TAG_ID_TAG),tag.to_string());
        }
        reject.set_body_field(FieldTag(TEXT_TAG),format!("{:?}",reason));

        self.send_raw(reject,now,None)
    }

    fn generate_business_reject(&mut self,message: &Message,reason: BusinessRejectReason,now: DateTime<Utc>) -> Result<(),SessionError> {
        if !self.state.received_logon {
            return Err(SessionError::RejectLogon("cannot reject before a Logon has been received".to_string()));
        }

        let mut reject = Message::new();
        reject.set_header_field(FieldTag(MSG_TYPE_TAG),MSG_TYPE_BUSINESS_MESSAGE_REJECT);
        if let Some(ref_msg_type) = message.msg_type() {
            reject.set_body_field(FieldTag(REF_MSG_TYPE_TAG),ref_msg_type.to_string());
        }
        if let Some(ref_seq_num) = message.msg_seq_num() {
            reject.set_body_field(FieldTag(BUSINESS_REJECT_REF_ID_TAG),ref_seq_num.to_string());
        }
        reject.set_body_field(FieldTag(BUSINESS_REJECT_REASON_TAG),reason.as_value().to_string());
        reject.set_body_field(FieldTag(TEXT_TAG),format!("{:?}",reason));

        self.send_raw(reject,now,None)
    }

    fn generate_logout(&mut self,now: DateTime<Utc>,reason: &str) -> Result<(),SessionError> {
        if self.state.sent_logout {
            return Ok(());
        }
        self.state.logout_reason = reason.to_string();
        let mut logout = Message::new();
        logout.set_header_field(FieldTag(MSG_TYPE_TAG),MSG_TYPE_LOGOUT);
        logout.set_body_field(FieldTag(TEXT_TAG),reason.to_string());
        self.send_raw(logout,now,None)?;
        self.state.sent_logout = true;
        if self.schedule.should_auto_disconnect() {
            self.responder.disconnect();
        }
        Ok(())
    }

    /// Gap-detection resend requests always ask "through current" (spec 8, "Boundary";
    /// scenario 2) using the version's to-infinity sentinel: 0 for FIX>=4.2, 999999 otherwise.
    fn send_resend_request(&mut self,begin: u64,now: DateTime<Utc>) -> Result<(),SessionError> {
        let end_value = if self.version().at_least_4_2() { 0 } else { 999_999 };
        let mut request = Message::new();
        request.set_header_field(FieldTag(MSG_TYPE_TAG),MSG_TYPE_RESEND_REQUEST);
        request.set_body_field(FieldTag(BEGIN_SEQ_NO_TAG),begin.to_string());
        request.set_body_field(FieldTag(END_SEQ_NO_TAG),end_value.to_string());
        self.send_raw(request,now,None)
    }

    /// The periodic tick (spec 2, "Session.next(now) drives timers"): session-time enforcement,
    /// initiator logon, and heartbeat/test-request liveness (spec 4.5, "Heartbeat / TestRequest").
    pub fn on_timer(&mut self,now: DateTime<Utc>) -> Result<(),SessionError> {
        if !self.is_logon_time(now) && !self.state.manual_login_requested && !self.state.manual_logout_requested {
            if self.is_logged_on() {
                self.generate_logout(now,"session time ended")?;
            }
            else {
                if self.schedule.should_auto_eod() {
                    self.state.reset();
                }
                else {
                    self.state.soft_reset();
                }
                if self.schedule.should_auto_disconnect() {
                    self.responder.disconnect();
                }
            }
            return Ok(());
        }

        if !self.is_logged_on() {
            if self.state.initiate && self.should_send_logon(now) {
                self.send_logon_request(now)?;
            }
            return Ok(());
        }

        let since_sent = self.state.last_sent_time.map(|last| (now - last).num_milliseconds()).unwrap_or(i64::MAX);
        let heartbeat_ms = self.state.heart_bt_int.as_millis() as i64;
        if since_sent >= heartbeat_ms {
            let mut heartbeat = Message::new();
            heartbeat.set_header_field(FieldTag(MSG_TYPE_TAG),MSG_TYPE_HEARTBEAT);
            self.send_raw(heartbeat,now,None)?;
        }

        let since_received = self.state.last_received_time.map(|last| (now - last).num_milliseconds()).unwrap_or(0);
        if since_received >= (heartbeat_ms * 12) / 10 {
            if since_received >= (heartbeat_ms * 12) / 5 {
                self.responder.disconnect();
            }
            else if self.state.test_request_counter == 0 {
                self.state.test_request_counter += 1;
                let mut test_request = Message::new();
                test_request.set_header_field(FieldTag(MSG_TYPE_TAG),MSG_TYPE_TEST_REQUEST);
                test_request.set_body_field(FieldTag(TEST_REQ_ID_TAG),format!("TEST{}",self.state.test_request_counter));
                self.send_raw(test_request,now,None)?;
            }
        }
        else {
            self.state.test_request_counter = 0;
        }

        Ok(())
    }
}

/// Iterates `fields` and prints each `Field::Value` as `tag=value` separated by SOH, used to
/// reconstruct the raw payload of a message that failed to parse for `onIncomingRejected` (spec
/// 7, "User-visible").
#[allow(dead_code)]
fn debug_raw_fields(fields: &[Field]) -> Vec<u8> {
    let mut out = Vec::new();
    for field in fields {
        if let Field::Value(tag,value) = field {
            out.extend_from_slice(tag.to_string().as_bytes());
            out.push(TAG_END);
            out.extend_from_slice(value.as_bytes());
            out.push(VALUE_END);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::NullApplication;
    use crate::dictionary::DataDictionary;
    use crate::responder::RecordingResponder;
    use crate::store::MemoryMessageStore;
    use chrono::TimeZone;

    fn utc(y: i32,mo: u32,d: u32,h: u32,mi: u32,s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y,mo,d,h,mi,s).unwrap()
    }

    fn always_open_schedule() -> Schedule {
        Schedule::parse("W|0,1,2,3,4,5,6|00:00|23:59:59|NoAutoEOD|NoAutoReconnect|0|AutoConnect|NoAutoDisconnect").unwrap()
    }

    fn bare_dictionary() -> DataDictionary {
        let mut dd = DataDictionary::new("FIX.4.4");
        dd.message_fields.insert("D".to_string(),Default::default());
        dd.message_fields.insert("0".to_string(),Default::default());
        dd
    }

    fn new_session(initiate: bool) -> Session<NullApplication,RecordingResponder> {
        let session_id = SessionId::new("FIX.4.4","SENDER","TARGET");
        Session::new(
            session_id,
            initiate,
            bare_dictionary(),
            bare_dictionary(),
            ValidationRules::strict(),
            always_open_schedule(),
            Box::new(MemoryMessageStore::new()),
            RecordingResponder::new(),
            NullApplication,
        )
    }

    fn tokens_for(fields: &[(u32,&str)]) -> Vec<(FieldTag,Vec<u8>)> {
        fields.iter().map(|(tag,value)| (FieldTag(*tag),value.as_bytes().to_vec())).collect()
    }

    #[test]
    fn initiator_sends_logon_on_timer_when_inside_session_time() {
        let mut session = new_session(true);
        session.on_timer(utc(2024,1,1,12,0,0)).unwrap();
        assert!(session.state.sent_logon);
        assert_eq!(session.responder_mut().sent.len(),1);
    }

    #[test]
    fn receiving_logon_establishes_session_and_advances_target() {
        let mut session = new_session(true);
        session.on_timer(utc(2024,1,1,12,0,0)).unwrap();

        let tokens = tokens_for(&[(8,"FIX.4.4"),(35,"A"),(49,"TARGET"),(56,"SENDER"),(34,"1"),(52,"20240101-12:00:00"),(98,"0"),(108,"30")]);
        session.next(&tokens,utc(2024,1,1,12,0,1),false).unwrap();

        assert!(session.is_logged_on());
        assert_eq!(session.state().next_target_msg_seq_num(),2);
    }

    #[test]
    fn gap_detection_queues_message_and_requests_resend() {
        let mut session = new_session(true);
        session.on_timer(utc(2024,1,1,12,0,0)).unwrap();
        let logon_tokens = tokens_for(&[(8,"FIX.4.4"),(35,"A"),(49,"TARGET"),(56,"SENDER"),(34,"1"),(52,"20240101-12:00:00"),(98,"0"),(108,"30")]);
        session.next(&logon_tokens,utc(2024,1,1,12,0,1),false).unwrap();

        let gap_tokens = tokens_for(&[(8,"FIX.4.4"),(35,"0"),(49,"TARGET"),(56,"SENDER"),(34,"5"),(52,"20240101-12:00:05")]);
        session.next(&gap_tokens,utc(2024,1,1,12,0,5),false).unwrap();

        assert_eq!(session.state().next_target_msg_seq_num(),2); //unchanged, message was queued
        assert!(!session.state().resend_range.is_none());
        assert_eq!(session.state().resend_range.begin,2);
        assert_eq!(session.state().resend_range.end,4);
    }

    #[test]
    fn reset_seq_num_flag_logon_resets_both_counters() {
        let mut session = new_session(false); //acceptor
        session.state_mut().set_next_target_msg_seq_num(42);
        session.state_mut().set_next_sender_msg_seq_num(42);

        let tokens = tokens_for(&[(8,"FIX.4.4"),(35,"A"),(49,"TARGET"),(56,"SENDER"),(34,"1"),(52,"20240101-12:00:00"),(98,"0"),(108,"30"),(141,"Y")]);
        session.next(&tokens,utc(2024,1,1,12,0,0),false).unwrap();

        assert_eq!(session.state().next_target_msg_seq_num(),2); //reset to 1, then incremented by this very logon
        assert_eq!(session.state().next_sender_msg_seq_num(),2); //reset to 1, then incremented by the acceptor's reply
    }

    #[test]
    fn logout_is_idempotent_after_sent_logout() {
        let mut session = new_session(true);
        session.on_timer(utc(2024,1,1,12,0,0)).unwrap();
        let logon_tokens = tokens_for(&[(8,"FIX.4.4"),(35,"A"),(49,"TARGET"),(56,"SENDER"),(34,"1"),(52,"20240101-12:00:00"),(98,"0"),(108,"30")]);
        session.next(&logon_tokens,utc(2024,1,1,12,0,1),false).unwrap();

        session.must_logout("test shutdown",utc(2024,1,1,12,0,2)).unwrap();
        let sent_before = session.responder_mut().sent.len();

        let logout_tokens = tokens_for(&[(8,"FIX.4.4"),(35,"5"),(49,"TARGET"),(56,"SENDER"),(34,"2"),(52,"20240101-12:00:03")]);
        session.next(&logout_tokens,utc(2024,1,1,12,0,3),false).unwrap();

        //Already sent a logout; receiving the counterparty's logout must not emit a second one.
        assert_eq!(session.responder_mut().sent.len(),sent_before);
    }
}
