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

//! `Message` is a generic ordered field container -- unlike the teacher's `define_message!`
//! macro-generated typed structs, nothing here is specific to a single FIX message type. The
//! dictionary module is what gives a `Message`'s fields type and group structure at runtime.

use crate::constant::{BEGIN_STRING_TAG,BODY_LENGTH_TAG,CHECK_SUM_TAG,MSG_SEQ_NUM_TAG,MSG_TYPE_TAG,ORIG_SENDING_TIME_TAG,POSS_DUP_FLAG_TAG,SENDER_COMP_ID_TAG,SENDING_TIME_TAG,TAG_END,TARGET_COMP_ID_TAG,VALUE_END};
use crate::errors::ParseError;
use crate::field_tag::FieldTag;

/// One parsed field: either a scalar value or a repeating group led by a count tag. A group
/// carries its raw declared count string alongside the instances actually parsed, so the
/// validator can compare the two (spec 4.2, "checkGroupCount") instead of a tokenizer-level hard
/// failure when they disagree.
#[derive(Clone,Debug,PartialEq)]
pub enum Field {
    Value(FieldTag,String),
    Group(FieldTag,String,Vec<Message>),
}

impl Field {
    pub fn tag(&self) -> FieldTag {
        match *self {
            Field::Value(tag,_) | Field::Group(tag,_,_) => tag,
        }
    }
}

/// An ordered header, body, and trailer (spec 3, "Message"). `BeginString`(8)/`BodyLength`(9) and
/// `CheckSum`(10) are framing values recomputed on every `to_bytes` call rather than stored
/// fields; a parsed inbound message may still carry them in `header`/`trailer` (the tokenizer
/// handed them over), in which case `to_bytes` ignores the stored copies and `begin_string()`
/// reads the parsed one back out.
#[derive(Clone,Debug,Default,PartialEq)]
pub struct Message {
    pub header: Vec<Field>,
    pub body: Vec<Field>,
    pub trailer: Vec<Field>,
}

impl Message {
    pub fn new() -> Message {
        Message::default()
    }

    fn find_value<'a>(fields: &'a [Field],tag: FieldTag) -> Option<&'a str> {
        fields.iter().find_map(|field| match field {
            Field::Value(t,value) if *t == tag => Some(value.as_str()),
            _ => None,
        })
    }

    /// Looks up a scalar field by tag, searching header, then body, then trailer.
    pub fn field_value(&self,tag: FieldTag) -> Option<&str> {
        Self::find_value(&self.header,tag)
            .or_else(|| Self::find_value(&self.body,tag))
            .or_else(|| Self::find_value(&self.trailer,tag))
    }

    /// Looks up a repeating group by its count tag, searching header, body, then trailer.
    pub fn group(&self,tag: FieldTag) -> Option<&[Message]> {
        [&self.header,&self.body,&self.trailer].into_iter().find_map(|fields| {
            fields.iter().find_map(|field| match field {
                Field::Group(t,_,instances) if *t == tag => Some(instances.as_slice()),
                _ => None,
            })
        })
    }

    pub fn begin_string(&self) -> Option<&str> {
        self.field_value(FieldTag(BEGIN_STRING_TAG))
    }

    pub fn msg_type(&self) -> Option<&str> {
        self.field_value(FieldTag(MSG_TYPE_TAG))
    }

    pub fn sender_comp_id(&self) -> Option<&str> {
        self.field_value(FieldTag(SENDER_COMP_ID_TAG))
    }

    pub fn target_comp_id(&self) -> Option<&str> {
        self.field_value(FieldTag(TARGET_COMP_ID_TAG))
    }

    pub fn msg_seq_num(&self) -> Option<u64> {
        self.field_value(FieldTag(MSG_SEQ_NUM_TAG)).and_then(|value| value.parse().ok())
    }

    pub fn sending_time(&self) -> Option<&str> {
        self.field_value(FieldTag(SENDING_TIME_TAG))
    }

    pub fn orig_sending_time(&self) -> Option<&str> {
        self.field_value(FieldTag(ORIG_SENDING_TIME_TAG))
    }

    pub fn poss_dup_flag(&self) -> bool {
        self.field_value(FieldTag(POSS_DUP_FLAG_TAG)) == Some("Y")
    }

    pub fn set_header_field(&mut self,tag: FieldTag,value: impl Into<String>) {
        Self::set_field(&mut self.header,tag,value.into());
    }

    pub fn set_body_field(&mut self,tag: FieldTag,value: impl Into<String>) {
        Self::set_field(&mut self.body,tag,value.into());
    }

    pub fn set_trailer_field(&mut self,tag: FieldTag,value: impl Into<String>) {
        Self::set_field(&mut self.trailer,tag,value.into());
    }

    fn set_field(fields: &mut Vec<Field>,tag: FieldTag,value: String) {
        if let Some(existing) = fields.iter_mut().find(|field| field.tag() == tag) {
            *existing = Field::Value(tag,value);
        }
        else {
            fields.push(Field::Value(tag,value));
        }
    }

    pub fn remove_header_field(&mut self,tag: FieldTag) {
        self.header.retain(|field| field.tag() != tag);
    }

    /// Scans a raw token stream for MsgType(35) without needing a dictionary. The session layer
    /// uses this to pick the right (session, app) dictionary pair before the token stream can be
    /// properly parsed into a structured `Message` (spec 1: "the wire-format tokenizer ... is
    /// assumed; this spec specifies what the session does with parsed messages").
    pub fn msg_type_from_tokens(tokens: &[(FieldTag,Vec<u8>)]) -> Option<String> {
        tokens.iter()
            .find(|(tag,_)| *tag == FieldTag(MSG_TYPE_TAG))
            .map(|(_,raw)| String::from_utf8_lossy(raw).into_owned())
    }

    /// Scans a raw token stream for BeginString(8).
    pub fn begin_string_from_tokens(tokens: &[(FieldTag,Vec<u8>)]) -> Option<String> {
        tokens.iter()
            .find(|(tag,_)| *tag == FieldTag(BEGIN_STRING_TAG))
            .map(|(_,raw)| String::from_utf8_lossy(raw).into_owned())
    }

    /// Strips `PossDupFlag`(43) and `OrigSendingTime`(122), per `send`'s contract (4.5).
    pub fn strip_retransmission_fields(&mut self) {
        self.remove_header_field(FieldTag(POSS_DUP_FLAG_TAG));
        self.remove_header_field(FieldTag(ORIG_SENDING_TIME_TAG));
    }

    /// Builds a flat `Message` (everything in `body`, nothing classified into header/trailer,
    /// no groups) straight from raw tokens. `DataDictionary::parse_message` is the group- and
    /// header/trailer-aware entry point built on top of this; this constructor exists for
    /// contexts with no dictionary at hand (e.g. a truly schema-less smoke test).
    pub fn from_flat_tokens(tokens: &[(FieldTag,Vec<u8>)]) -> Result<Message,ParseError> {
        let mut message = Message::new();
        for (tag,raw) in tokens {
            let value = String::from_utf8_lossy(raw).into_owned();
            if value.is_empty() {
                return Err(ParseError::NoValueAfterTag(*tag));
            }
            message.body.push(Field::Value(*tag,value));
        }
        Ok(message)
    }

    /// Serializes the message with BeginString/BodyLength/CheckSum synthesized fresh; any stray
    /// copies already present in `header`/`trailer` (e.g. from a parsed inbound message) are
    /// ignored so a round-tripped message always carries a self-consistent framing.
    pub fn to_bytes(&self,begin_string: &str) -> Vec<u8> {
        let mut body_content = Vec::new();

        for field in &self.header {
            if field.tag() == FieldTag(BEGIN_STRING_TAG) || field.tag() == FieldTag(BODY_LENGTH_TAG) {
                continue;
            }
            Self::write_field(&mut body_content,field);
        }
        for field in &self.body {
            Self::write_field(&mut body_content,field);
        }
        for field in &self.trailer {
            if field.tag() == FieldTag(CHECK_SUM_TAG) {
                continue;
            }
            Self::write_field(&mut body_content,field);
        }

        let mut prefix = Vec::new();
        prefix.extend_from_slice(format!("{}={}",BEGIN_STRING_TAG,begin_string).as_bytes());
        prefix.push(VALUE_END);
        prefix.extend_from_slice(format!("{}={}",BODY_LENGTH_TAG,body_content.len()).as_bytes());
        prefix.push(VALUE_END);

        let checksum = Self::checksum(&prefix) .wrapping_add(Self::checksum(&body_content));

        let mut out = Vec::with_capacity(prefix.len() + body_content.len() + 16);
        out.extend_from_slice(&prefix);
        out.extend_from_slice(&body_content);
        out.extend_from_slice(format!("{}={:03}",CHECK_SUM_TAG,checksum).as_bytes());
        out.push(VALUE_END);

        out
    }

    fn write_field(buf: &mut Vec<u8>,field: &Field) {
        match field {
            Field::Value(tag,value) => {
                buf.extend_from_slice(tag.to_string().as_bytes());
                buf.push(TAG_END);
                buf.extend_from_slice(value.as_bytes());
                buf.push(VALUE_END);
            },
            Field::Group(tag,_,instances) => {
                buf.extend_from_slice(tag.to_string().as_bytes());
                buf.push(TAG_END);
                buf.extend_from_slice(instances.len().to_string().as_bytes());
                buf.push(VALUE_END);
                for instance in instances {
                    for field in &instance.body {
                        Self::write_field(buf,field);
                    }
                }
            },
        }
    }

    /// Sum of bytes modulo 256, per CheckSum(10)'s definition (spec 6).
    fn checksum(bytes: &[u8]) -> u8 {
        bytes.iter().fold(0u8,|acc,&b| acc.wrapping_add(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(n: u32) -> FieldTag {
        FieldTag(n)
    }

    #[test]
    fn serializes_checksum_and_bodylength() {
        let mut message = Message::new();
        message.header.push(Field::Value(tag(35),"0".to_string()));
        message.header.push(Field::Value(tag(49),"SENDER".to_string()));
        message.header.push(Field::Value(tag(56),"TARGET".to_string()));
        message.header.push(Field::Value(tag(34),"1".to_string()));

        let bytes = message.to_bytes("FIX.4.4");
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("8=FIX.4.4\u{1}9="));
        assert!(text.contains("35=0\u{1}"));
        assert!(text.ends_with("\u{1}"));

        let checksum_pos = text.rfind("10=").unwrap();
        let checksum_str = &text[checksum_pos + 3..checksum_pos + 6];
        assert_eq!(checksum_str.len(),3);
    }

    #[test]
    fn parses_flat_fields_without_groups() {
        let tokens = vec![
            (tag(35),b"0".to_vec()),
            (tag(49),b"SENDER".to_vec()),
        ];

        let message = Message::from_flat_tokens(&tokens).unwrap();
        assert_eq!(message.field_value(tag(35)),Some("0"));
        assert_eq!(message.field_value(tag(49)),Some("SENDER"));
    }

    #[test]
    fn rejects_empty_value() {
        let tokens = vec![(tag(58),Vec::new())];
        let err = Message::from_flat_tokens(&tokens);
        assert!(matches!(err,Err(ParseError::NoValueAfterTag(t)) if t == tag(58)));
    }
}
