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

#![doc(hidden)]

pub const TAG_END: u8 = b'=';
pub const VALUE_END: u8 = b'\x01'; //SOH

pub const FIXT_1_1_BEGIN_STRING: &str = "FIXT.1.1";
pub const FIX_4_0_BEGIN_STRING: &str = "FIX.4.0";
pub const FIX_4_1_BEGIN_STRING: &str = "FIX.4.1";
pub const FIX_4_2_BEGIN_STRING: &str = "FIX.4.2";
pub const FIX_4_3_BEGIN_STRING: &str = "FIX.4.3";
pub const FIX_4_4_BEGIN_STRING: &str = "FIX.4.4";

//Header tags, present on essentially every message.
pub const BEGIN_STRING_TAG: u32 = 8;
pub const BODY_LENGTH_TAG: u32 = 9;
pub const MSG_TYPE_TAG: u32 = 35;
pub const SENDER_COMP_ID_TAG: u32 = 49;
pub const TARGET_COMP_ID_TAG: u32 = 56;
pub const MSG_SEQ_NUM_TAG: u32 = 34;
pub const SENDING_TIME_TAG: u32 = 52;
pub const POSS_DUP_FLAG_TAG: u32 = 43;
pub const ORIG_SENDING_TIME_TAG: u32 = 122;
pub const CHECK_SUM_TAG: u32 = 10;

//Admin message types.
pub const MSG_TYPE_HEARTBEAT: &str = "0";
pub const MSG_TYPE_TEST_REQUEST: &str = "1";
pub const MSG_TYPE_RESEND_REQUEST: &str = "2";
pub const MSG_TYPE_REJECT: &str = "3";
pub const MSG_TYPE_SEQUENCE_RESET: &str = "4";
pub const MSG_TYPE_LOGOUT: &str = "5";
pub const MSG_TYPE_LOGON: &str = "A";
pub const MSG_TYPE_BUSINESS_MESSAGE_REJECT: &str = "j";

pub const ANY_MSG_TYPE: &str = "?";

//Admin/session-layer body tags used by the state machine (spec 4.5, 6).
pub const ENCRYPT_METHOD_TAG: u32 = 98;
pub const HEART_BT_INT_TAG: u32 = 108;
pub const TEST_REQ_ID_TAG: u32 = 112;
pub const RESET_SEQ_NUM_FLAG_TAG: u32 = 141;
pub const DEFAULT_APPL_VER_ID_TAG: u32 = 1137;
pub const BEGIN_SEQ_NO_TAG: u32 = 7;
pub const END_SEQ_NO_TAG: u32 = 16;
pub const NEW_SEQ_NO_TAG: u32 = 36;
pub const GAP_FILL_FLAG_TAG: u32 = 123;
pub const TEXT_TAG: u32 = 58;
pub const REF_SEQ_NUM_TAG: u32 = 45;
pub const REF_MSG_TYPE_TAG: u32 = 372;
pub const REF_TAG_ID_TAG: u32 = 371;
pub const SESSION_REJECT_REASON_TAG: u32 = 373;
pub const BUSINESS_REJECT_REASON_TAG: u32 = 380;
pub const BUSINESS_REJECT_REF_ID_TAG: u32 = 379;
