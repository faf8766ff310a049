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

//! One flat enum per failure domain, the way the teacher's `fix::ParseError` and
//! `fixt::client::ConnectionTerminatedReason` are laid out -- each variant carries just the data
//! needed to act on it, and `thiserror` derives the `Display`/`Debug` impl the teacher hand-wrote.

use thiserror::Error;

use crate::field_tag::FieldTag;

/// Failures raised by the assumed external tokenizer boundary while splitting a raw byte buffer
/// into (tag, value) fields and matching repeating-group nesting. The session layer never
/// constructs these directly; it only receives and translates them.
#[derive(Clone,Debug,Error,Eq,PartialEq)]
pub enum ParseError {
    #[error("message ended before a required tag ({0}) was found")]
    MissingRequiredTag(FieldTag),
    #[error("tag {0} was repeated without an intervening repeating group")]
    DuplicateTag(FieldTag),
    #[error("tag {0} does not belong to the current message type")]
    UnexpectedTag(FieldTag),
    #[error("tag {0} is not present in any loaded dictionary")]
    UnknownTag(FieldTag),
    #[error("tag {0} has a value that does not match its declared type")]
    WrongFormatTag(FieldTag),
    #[error("tag {0} was present with no value")]
    NoValueAfterTag(FieldTag),
    #[error("group count tag {0} does not match the number of group instances found")]
    RepeatingGroupCountMismatch(FieldTag),
    #[error("message exceeds the configured maximum size")]
    MessageTooBig,
}

/// The parse/structural rejection taxonomy of the data dictionary validator. Every variant here
/// maps to exactly one `SessionRejectReason` (or `BusinessRejectReason` for FIX >= 4.2 application
/// messages) via `From` below.
#[derive(Clone,Debug,Error,Eq,PartialEq)]
pub enum ValidationError {
    #[error("message body is structurally invalid")]
    InvalidMessage,
    #[error("field {0} was expected but not found")]
    FieldNotFound(FieldTag),
    #[error("required tag {0} is missing")]
    RequiredTagMissing(FieldTag),
    #[error("tag {0} is not a recognized field number")]
    InvalidTagNumber(FieldTag),
    #[error("tag {0} is not defined for this message type")]
    TagNotDefinedForMessage(FieldTag),
    #[error("tag {0} appeared out of its required order")]
    TagOutOfOrder(FieldTag),
    #[error("tag {0} was present with an empty value")]
    NoTagValue(FieldTag),
    #[error("tag {0} appeared more than once outside a repeating group")]
    RepeatedTag(FieldTag),
    #[error("declared count for group {0} does not match its instance count")]
    RepeatingGroupCountMismatch(FieldTag),
    #[error("tag {0} has a value that does not match its declared type")]
    IncorrectDataFormat(FieldTag),
    #[error("tag {0} has a value outside its declared enumeration")]
    IncorrectTagValue(FieldTag),
    #[error("message type {0} is not known to this dictionary")]
    InvalidMessageType(String),
    #[error("message type {0} is not supported by this session")]
    UnsupportedMessageType(String),
    #[error("BeginString does not match the session's configured version")]
    UnsupportedVersion,
}

impl ValidationError {
    /// The offending tag, when this variant carries one. Used to build RefTagID(371) on an
    /// outbound Reject(3) (spec 4.5, "Reject generation").
    pub fn offending_tag(&self) -> Option<FieldTag> {
        match *self {
            ValidationError::FieldNotFound(tag)
            | ValidationError::RequiredTagMissing(tag)
            | ValidationError::InvalidTagNumber(tag)
            | ValidationError::TagNotDefinedForMessage(tag)
            | ValidationError::TagOutOfOrder(tag)
            | ValidationError::NoTagValue(tag)
            | ValidationError::RepeatedTag(tag)
            | ValidationError::RepeatingGroupCountMismatch(tag)
            | ValidationError::IncorrectDataFormat(tag)
            | ValidationError::IncorrectTagValue(tag) => Some(tag),
            ValidationError::InvalidMessage
            | ValidationError::InvalidMessageType(_)
            | ValidationError::UnsupportedMessageType(_)
            | ValidationError::UnsupportedVersion => None,
        }
    }
}

/// Session-level Reject(3) SessionRejectReason(373) codes.
#[derive(Clone,Copy,Debug,Eq,PartialEq)]
pub enum SessionRejectReason {
    InvalidTagNumber,
    RequiredTagMissing,
    TagNotDefinedForThisMessageType,
    UndefinedTag,
    TagSpecifiedWithoutAValue,
    ValueIsIncorrectForThisTag,
    IncorrectDataFormatForValue,
    CompIDProblem,
    SendingTimeAccuracyProblem,
    InvalidMsgType,
    TagAppearsMoreThanOnce,
    TagSpecifiedOutOfRequiredOrder,
    IncorrectNumInGroupCountForRepeatingGroup,
    InvalidOrUnsupportedApplicationVersion,
    Other,
}

impl SessionRejectReason {
    /// The wire value of SessionRejectReason(373), per the FIX 4.2+ enumeration.
    pub fn as_value(&self) -> u32 {
        match *self {
            SessionRejectReason::InvalidTagNumber => 0,
            SessionRejectReason::RequiredTagMissing => 1,
            SessionRejectReason::TagNotDefinedForThisMessageType => 2,
            SessionRejectReason::UndefinedTag => 3,
            SessionRejectReason::TagSpecifiedWithoutAValue => 4,
            SessionRejectReason::ValueIsIncorrectForThisTag => 5,
            SessionRejectReason::IncorrectDataFormatForValue => 6,
            SessionRejectReason::CompIDProblem => 9,
            SessionRejectReason::SendingTimeAccuracyProblem => 10,
            SessionRejectReason::InvalidMsgType => 11,
            SessionRejectReason::TagAppearsMoreThanOnce => 13,
            SessionRejectReason::TagSpecifiedOutOfRequiredOrder => 14,
            SessionRejectReason::IncorrectNumInGroupCountForRepeatingGroup => 16,
            SessionRejectReason::InvalidOrUnsupportedApplicationVersion => 18,
            SessionRejectReason::Other => 99,
        }
    }
}

impl From<&ValidationError> for SessionRejectReason {
    fn from(error: &ValidationError) -> SessionRejectReason {
        match *error {
            ValidationError::InvalidTagNumber(_) => SessionRejectReason::InvalidTagNumber,
            ValidationError::RequiredTagMissing(_) => SessionRejectReason::RequiredTagMissing,
            ValidationError::TagNotDefinedForMessage(_) => SessionRejectReason::TagNotDefinedForThisMessageType,
            ValidationError::FieldNotFound(_) => SessionRejectReason::UndefinedTag,
            ValidationError::NoTagValue(_) => SessionRejectReason::TagSpecifiedWithoutAValue,
            ValidationError::IncorrectTagValue(_) => SessionRejectReason::ValueIsIncorrectForThisTag,
            ValidationError::IncorrectDataFormat(_) => SessionRejectReason::IncorrectDataFormatForValue,
            ValidationError::InvalidMessageType(_) | ValidationError::UnsupportedMessageType(_) => SessionRejectReason::InvalidMsgType,
            ValidationError::RepeatedTag(_) => SessionRejectReason::TagAppearsMoreThanOnce,
            ValidationError::TagOutOfOrder(_) => SessionRejectReason::TagSpecifiedOutOfRequiredOrder,
            ValidationError::RepeatingGroupCountMismatch(_) => SessionRejectReason::IncorrectNumInGroupCountForRepeatingGroup,
            ValidationError::InvalidMessage | ValidationError::UnsupportedVersion => SessionRejectReason::Other,
        }
    }
}

/// BusinessMessageReject(j) BusinessRejectReason(380) codes, used for FIX >= 4.2 application
/// messages in place of a session-level Reject (spec 4.5, "Reject generation").
#[derive(Clone,Copy,Debug,Eq,PartialEq)]
pub enum BusinessRejectReason {
    Other,
    UnknownId,
    UnknownSecurity,
    UnsupportedMessageType,
    ApplicationNotAvailable,
    ConditionallyRequiredFieldMissing,
    NotAuthorized,
    DeliverToFirmNotAvailable,
}

impl BusinessRejectReason {
    pub fn as_value(&self) -> u32 {
        match *self {
            BusinessRejectReason::Other => 0,
            BusinessRejectReason::UnknownId => 1,
            BusinessRejectReason::UnknownSecurity => 2,
            BusinessRejectReason::UnsupportedMessageType => 3,
            BusinessRejectReason::ApplicationNotAvailable => 4,
            BusinessRejectReason::ConditionallyRequiredFieldMissing => 5,
            BusinessRejectReason::NotAuthorized => 6,
            BusinessRejectReason::DeliverToFirmNotAvailable => 7,
        }
    }
}

impl From<&ValidationError> for BusinessRejectReason {
    fn from(error: &ValidationError) -> BusinessRejectReason {
        match *error {
            ValidationError::InvalidMessageType(_) | ValidationError::UnsupportedMessageType(_) => BusinessRejectReason::UnsupportedMessageType,
            ValidationError::RequiredTagMissing(_) => BusinessRejectReason::ConditionallyRequiredFieldMissing,
            _ => BusinessRejectReason::Other,
        }
    }
}

/// Load-time failures for `DataDictionary`, `Schedule`, and `ValidationRules` descriptors.
#[derive(Clone,Debug,Error,Eq,PartialEq)]
pub enum ConfigError {
    #[error("malformed dictionary XML: {0}")]
    MalformedXml(String),
    #[error("field {0} referenced by a message or group is not declared in <fields>")]
    UndeclaredField(String),
    #[error("component {0} referenced but not declared under <components>")]
    UndeclaredComponent(String),
    #[error("schedule descriptor does not have 9 pipe-delimited elements: {0:?}")]
    ScheduleElementCount(String),
    #[error("schedule descriptor element could not be parsed: {0}")]
    ScheduleElement(String),
    #[error("validation rules descriptor could not be parsed: {0}")]
    ValidationRulesDescriptor(String),
    #[error("session settings key {0} is missing")]
    MissingSetting(String),
    #[error("session settings key {0} has an invalid value: {1}")]
    InvalidSetting(String,String),
}

/// Protocol-level failures surfaced to the `Session` caller (spec 7, "Protocol"/"Transport").
#[derive(Debug,Error)]
pub enum SessionError {
    #[error("logon rejected: {0}")]
    RejectLogon(String),
    #[error("unsupported BeginString")]
    UnsupportedVersion,
    #[error("application callback declined to send this message")]
    DoNotSend,
    #[error("transport I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_validation_errors_to_session_reject_reason() {
        let error = ValidationError::RequiredTagMissing(FieldTag(108));
        assert_eq!(SessionRejectReason::from(&error),SessionRejectReason::RequiredTagMissing);
        assert_eq!(error.offending_tag(),Some(FieldTag(108)));
    }

    #[test]
    fn invalid_message_type_has_no_offending_tag() {
        let error = ValidationError::InvalidMessageType("Z".to_string());
        assert_eq!(error.offending_tag(),None);
        assert_eq!(SessionRejectReason::from(&error),SessionRejectReason::InvalidMsgType);
    }

    #[test]
    fn maps_required_tag_missing_to_conditionally_required_business_reject() {
        let error = ValidationError::RequiredTagMissing(FieldTag(11));
        assert_eq!(BusinessRejectReason::from(&error),BusinessRejectReason::ConditionallyRequiredFieldMissing);
    }
}
