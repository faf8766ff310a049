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

//! A loaded, per-version FIX schema (spec 3, "DataDictionary"; spec 4.2). Unlike the teacher's
//! `dictionary::messages`/`dictionary::fields` modules -- generated at compile time by
//! `define_dictionary!`/`define_fields!` from a fixed field table -- this `DataDictionary` is
//! populated at runtime by `xml::load` and can represent any FIX or FIXT version.

pub mod xml;

use std::collections::{HashMap,HashSet};

use crate::constant::ANY_MSG_TYPE;
use crate::errors::{ParseError,ValidationError};
use crate::field_tag::FieldTag;
use crate::field_type::Type;
use crate::hash::BuildFieldHasher;
use crate::message::{Field,Message};
use crate::validation_rules::{Direction,RejectKind,ValidationRules};

/// Tag-keyed maps/sets use the teacher's `BuildFieldHasher` -- a `FieldTag`'s hash is already a
/// small dense integer, so feeding it through `SipHash` buys nothing but cycles.
pub type TagMap<V> = HashMap<FieldTag,V,BuildFieldHasher>;
pub type TagSet = HashSet<FieldTag,BuildFieldHasher>;

/// A nested group dictionary: the delimiter tag (the group instance's first tag) plus the
/// dictionary describing the group's own fields. Owned by the parent, forming a tree rather than
/// a graph (spec 9, "Cyclic ownership in nested group dictionaries").
#[derive(Clone,Debug)]
pub struct GroupDefinition {
    pub delimiter_tag: FieldTag,
    pub dictionary: DataDictionary,
}

/// A loaded schema for one FIX or FIXT version (spec 3, "DataDictionary").
#[derive(Clone,Debug,Default)]
pub struct DataDictionary {
    pub version: String,
    pub fields: TagSet,
    pub ordered_fields: Vec<FieldTag>,
    pub field_type: TagMap<Type>,
    pub field_values: TagMap<HashSet<String>>,
    pub names: HashMap<String,FieldTag>,
    pub field_names: TagMap<String>,
    pub value_names: HashMap<(FieldTag,String),String>,
    pub message_fields: HashMap<String,TagSet>,
    pub required_fields: HashMap<String,TagSet>,
    pub header_fields: TagMap<bool>,
    pub trailer_fields: TagMap<bool>,
    pub data_fields: TagSet,
    /// `groups[count_tag][msg_type]`, per spec 3: "the nested dictionary is owned; copies are
    /// deep" -- `Clone` on `DataDictionary` already deep-copies this map.
    pub groups: TagMap<HashMap<String,GroupDefinition>>,
    /// The declared field order for each message type, used by `check_fields_out_of_order`
    /// (spec 4.2, step 4 "Structural order"). Absent (or a msg type missing from this map) means
    /// no ordering is enforced beyond what `iterate`'s duplicate-tag check already catches.
    pub message_field_order: HashMap<String,Vec<FieldTag>>,
}

impl DataDictionary {
    pub fn new(version: impl Into<String>) -> DataDictionary {
        DataDictionary {
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn header_tags(&self) -> HashSet<FieldTag> {
        self.header_fields.keys().copied().collect()
    }

    pub fn trailer_tags(&self) -> HashSet<FieldTag> {
        self.trailer_fields.keys().copied().collect()
    }

    /// `checkMsgType` (4.2): fails `InvalidMessageType` if `msg_type` isn't in `message_fields`,
    /// unless `ValidationRules` tolerates a missing message type for this direction.
    pub fn check_msg_type(&self,direction: Direction,msg_type: &str,rules: &ValidationRules) -> Result<(),ValidationError> {
        if self.message_fields.contains_key(msg_type) {
            return Ok(());
        }
        if rules.should_tolerate_missing_message_type(direction) {
            return Ok(());
        }
        Err(ValidationError::InvalidMessageType(msg_type.to_string()))
    }

    /// `checkValidTagNumber` (4.2): unknown tags below UserMin fail `InvalidTagNumber`.
    pub fn check_valid_tag_number(&self,direction: Direction,msg_type: &str,tag: FieldTag,rules: &ValidationRules) -> Result<(),ValidationError> {
        if self.fields.contains(&tag) {
            return Ok(());
        }
        if rules.should_tolerate(RejectKind::UnknownTag,direction,msg_type,tag) {
            return Ok(());
        }
        Err(ValidationError::InvalidTagNumber(tag))
    }

    /// `checkIsInMessage` (4.2): a known tag not declared for this message type, and not a
    /// header/trailer field, fails `TagNotDefinedForMessage`.
    pub fn check_is_in_message(&self,direction: Direction,msg_type: &str,tag: FieldTag,rules: &ValidationRules) -> Result<(),ValidationError> {
        let allowed = self.message_fields.get(msg_type).map(|fields| fields.contains(&tag)).unwrap_or(false);
        if allowed {
            return Ok(());
        }
        if rules.should_tolerate(RejectKind::TagNotDefinedForMessage,direction,msg_type,tag) {
            return Ok(());
        }
        Err(ValidationError::TagNotDefinedForMessage(tag))
    }

    /// `checkHasValue` (4.2): an empty value fails `NoTagValue` unless tolerated. `Message`'s
    /// tokenizer already rejects empty values at parse time (`ParseError::NoValueAfterTag`); this
    /// check exists for callers that build a `Message` directly rather than through the parser.
    pub fn check_has_value(&self,direction: Direction,msg_type: &str,tag: FieldTag,value: &str,rules: &ValidationRules) -> Result<(),ValidationError> {
        if !value.is_empty() {
            return Ok(());
        }
        if rules.should_tolerate(RejectKind::EmptyTag,direction,msg_type,tag) {
            return Ok(());
        }
        Err(ValidationError::NoTagValue(tag))
    }

    /// `checkValidFormat` (4.2): the raw value must parse as the tag's declared type.
    pub fn check_valid_format(&self,direction: Direction,msg_type: &str,tag: FieldTag,value: &str,rules: &ValidationRules) -> Result<(),ValidationError> {
        let Some(field_type) = self.field_type.get(&tag) else {
            return Ok(());
        };
        if field_type.is_valid_format(value) {
            return Ok(());
        }
        if rules.should_tolerate(RejectKind::BadFormat,direction,msg_type,tag) {
            return Ok(());
        }
        Err(ValidationError::IncorrectDataFormat(tag))
    }

    /// `checkValue` (4.2): enumeration membership. Multiple-value types split the raw value on
    /// space and require every token to be listed (spec 9, "Open question: MultipleValueString
    /// delimiter").
    pub fn check_value(&self,direction: Direction,msg_type: &str,tag: FieldTag,value: &str,rules: &ValidationRules) -> Result<(),ValidationError> {
        let Some(allowed_values) = self.field_values.get(&tag) else {
            return Ok(());
        };
        let is_multiple = self.field_type.get(&tag).map(|t| t.is_multiple_value()).unwrap_or(false);

        let ok = if is_multiple {
            value.split(' ').all(|token| allowed_values.contains(token))
        }
        else {
            allowed_values.contains(value)
        };

        if ok {
            return Ok(());
        }
        if rules.should_tolerate(RejectKind::OutOfBounds,direction,msg_type,tag) {
            return Ok(());
        }
        Err(ValidationError::IncorrectTagValue(tag))
    }

    /// `checkGroupCount` (4.2): the declared `NumInGroup` count must equal the actual number of
    /// parsed instances. A non-integer or negative count is unspecified in the source; this
    /// treats it as a mismatch (spec 9, "Open question").
    pub fn check_group_count(&self,direction: Direction,msg_type: &str,tag: FieldTag,declared: &str,actual: usize,rules: &ValidationRules) -> Result<(),ValidationError> {
        let declared_count: Option<usize> = declared.parse().ok();
        if declared_count == Some(actual) {
            return Ok(());
        }
        if rules.should_tolerate(RejectKind::RepeatingGroupMismatch,direction,msg_type,tag) {
            return Ok(());
        }
        Err(ValidationError::RepeatingGroupCountMismatch(tag))
    }

    /// `checkHasRequired` (4.2): every required header, trailer, and message field must be
    /// present; recurses into each present repeating-group instance whose schema is known.
    pub fn check_has_required(&self,direction: Direction,message: &Message,msg_type: &str,rules: &ValidationRules) -> Result<(),ValidationError> {
        for (tag,required) in &self.header_fields {
            if *required && message.field_value(*tag).is_none() && message.group(*tag).is_none() {
                if rules.should_tolerate(RejectKind::Missing,direction,msg_type,*tag) {
                    continue;
                }
                return Err(ValidationError::RequiredTagMissing(*tag));
            }
        }
        for (tag,required) in &self.trailer_fields {
            if *required && message.field_value(*tag).is_none() {
                if rules.should_tolerate(RejectKind::Missing,direction,msg_type,*tag) {
                    continue;
                }
                return Err(ValidationError::RequiredTagMissing(*tag));
            }
        }
        if let Some(required) = self.required_fields.get(msg_type) {
            for tag in required {
                if message.field_value(*tag).is_none() && message.group(*tag).is_none() {
                    if rules.should_tolerate(RejectKind::Missing,direction,msg_type,*tag) {
                        continue;
                    }
                    return Err(ValidationError::RequiredTagMissing(*tag));
                }
            }
        }

        if let Some(group_defs) = self.groups_for_msg_type(msg_type) {
            for (count_tag,definition) in group_defs {
                if let Some(instances) = message.group(count_tag) {
                    for instance in instances {
                        definition.dictionary.check_has_required(direction,instance,msg_type,rules)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn groups_for_msg_type<'a>(&'a self,msg_type: &str) -> Option<Vec<(FieldTag,&'a GroupDefinition)>> {
        let mut result = Vec::new();
        for (count_tag,by_msg_type) in &self.groups {
            if let Some(definition) = by_msg_type.get(msg_type).or_else(|| by_msg_type.get(ANY_MSG_TYPE)) {
                result.push((*count_tag,definition));
            }
        }
        if result.is_empty() { None } else { Some(result) }
    }

    /// A group registered for `msg_type`, falling back to the wildcard -- header and trailer
    /// groups are loaded under `ANY_MSG_TYPE` since they apply across every message type rather
    /// than one (spec 3: "groups: Map<Tag, Map<MsgType, ...>>" keys header/trailer groups the
    /// same way as body groups, just under the wildcard).
    fn group_definition(&self,tag: FieldTag,msg_type: &str) -> Option<&GroupDefinition> {
        let by_msg_type = self.groups.get(&tag)?;
        by_msg_type.get(msg_type).or_else(|| by_msg_type.get(ANY_MSG_TYPE))
    }

    /// `checkFieldsOutOfOrder` (4.2, step 4 "Structural order"): the declared field order for
    /// `msg_type` (if known) must be respected by `fields` -- tags present in both must appear
    /// as a subsequence of the declaration order. Returns the first tag found out of place.
    /// Tags absent from the declared order (header/trailer fields mixed into the body by a
    /// lenient caller, or unknown tags handled elsewhere) are skipped rather than flagged.
    pub fn first_out_of_order_tag(&self,msg_type: &str,fields: &[Field]) -> Option<FieldTag> {
        let Some(order) = self.message_field_order.get(msg_type) else { return None; };
        let rank: TagMap<usize> = order.iter().enumerate().map(|(i,tag)| (*tag,i)).collect();

        let mut last_rank = 0usize;
        for field in fields {
            let tag = field.tag();
            let Some(&this_rank) = rank.get(&tag) else { continue; };
            if this_rank < last_rank {
                return Some(tag);
            }
            last_rank = this_rank;
        }
        None
    }

    /// `iterate` (4.2): walks a field map in declared order, running the per-field checks.
    pub fn iterate(&self,direction: Direction,fields: &[Field],msg_type: &str,rules: &ValidationRules) -> Result<(),ValidationError> {
        let mut previous_tag: Option<FieldTag> = None;

        for field in fields {
            let tag = field.tag();

            if previous_tag == Some(tag) {
                if !rules.should_tolerate(RejectKind::DuplicateTag,direction,msg_type,tag) {
                    return Err(ValidationError::RepeatedTag(tag));
                }
            }
            previous_tag = Some(tag);

            if let Field::Value(_,value) = field {
                self.check_has_value(direction,msg_type,tag,value,rules)?;

                if !self.version.is_empty() {
                    self.check_valid_format(direction,msg_type,tag,value,rules)?;
                    self.check_value(direction,msg_type,tag,value,rules)?;
                }

                if !tag.is_user_defined() {
                    self.check_valid_tag_number(direction,msg_type,tag,rules)?;

                    if !self.header_fields.contains_key(&tag) && !self.trailer_fields.contains_key(&tag) {
                        self.check_is_in_message(direction,msg_type,tag,rules)?;
                    }
                }
            }

            if let Field::Group(tag,declared,instances) = field {
                if !tag.is_user_defined() {
                    if let Some(definition) = self.group_definition(tag,msg_type) {
                        self.check_group_count(direction,msg_type,tag,declared,instances.len(),rules)?;
                        for instance in instances {
                            definition.dictionary.iterate(direction,&instance.body,msg_type,rules)?;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Top-level entry point (4.2, "`validate`"). `session_dd` governs header/trailer and
    /// BeginString; `app_dd` governs the body (for FIXT, a separate application dictionary; for
    /// pre-FIXT versions, callers typically pass the same dictionary for both).
    pub fn validate(direction: Direction,message: &Message,session_dd: &DataDictionary,app_dd: &DataDictionary,rules: &ValidationRules) -> Result<(),ValidationError> {
        if !rules.validate {
            return Ok(());
        }

        let msg_type = message.msg_type().unwrap_or_default().to_string();

        if let Some(begin_string) = message.begin_string() {
            if begin_string != session_dd.version && !rules.should_tolerate(RejectKind::VersionMismatch,direction,&msg_type,FieldTag::empty()) {
                return Err(ValidationError::UnsupportedVersion);
            }
        }

        app_dd.check_msg_type(direction,&msg_type,rules)?;

        if rules.validate_fields_out_of_order {
            if let Some(tag) = app_dd.first_out_of_order_tag(&msg_type,&message.body) {
                if !rules.should_tolerate(RejectKind::OutOfOrderTag,direction,&msg_type,tag) {
                    return Err(ValidationError::TagOutOfOrder(tag));
                }
            }
        }

        app_dd.check_has_required(direction,message,&msg_type,rules)?;

        session_dd.iterate(direction,&message.header,&msg_type,rules)?;
        session_dd.iterate(direction,&message.trailer,&msg_type,rules)?;
        app_dd.iterate(direction,&message.body,&msg_type,rules)?;

        Ok(())
    }

    /// Builds the dictionary actually used to parse an inbound token stream: header/trailer
    /// classification and their own groups come from `session_dd`, body groups are supplemented
    /// from `app_dd` (spec 4.5, "Parse bytes with session DD (and app DD for FIXT app
    /// messages)"). For non-FIXT sessions `session_dd` and `app_dd` are the same dictionary, so
    /// this is a cheap no-op merge.
    pub fn merged_for_parsing(session_dd: &DataDictionary,app_dd: &DataDictionary) -> DataDictionary {
        let mut merged = session_dd.clone();
        for (tag,by_msg_type) in &app_dd.groups {
            let entry = merged.groups.entry(*tag).or_default();
            for (msg_type,definition) in by_msg_type {
                entry.entry(msg_type.clone()).or_insert_with(|| definition.clone());
            }
        }
        merged
    }

    /// Parses a flat, ordered token stream (the assumed external tokenizer's output, spec 1)
    /// into a structured `Message`, nesting repeating groups using this dictionary's `groups`
    /// map for `msg_type`. Header/trailer tags are classified using `header_fields`/
    /// `trailer_fields`; everything else is body.
    pub fn parse_message(&self,tokens: &[(FieldTag,Vec<u8>)],msg_type: &str) -> Result<Message,ParseError> {
        let (fields,consumed) = self.parse_fields(tokens,msg_type)?;
        debug_assert_eq!(consumed,tokens.len());

        let mut message = Message::new();
        for field in fields {
            let tag = field.tag();
            if self.header_fields.contains_key(&tag) {
                message.header.push(field);
            }
            else if self.trailer_fields.contains_key(&tag) {
                message.trailer.push(field);
            }
            else {
                message.body.push(field);
            }
        }
        Ok(message)
    }

    /// Parses `tokens` into a flat list of `Field`s, recursing into nested group dictionaries
    /// (still keyed by `msg_type`, per spec 3's `groups: Map<Tag, Map<MsgType, ...>>`) wherever a
    /// count tag is recognized. Returns the fields plus how many tokens were consumed, so a
    /// caller parsing a group instance knows where the next instance begins.
    fn parse_fields(&self,tokens: &[(FieldTag,Vec<u8>)],msg_type: &str) -> Result<(Vec<Field>,usize),ParseError> {
        let mut fields = Vec::new();
        let mut index = 0;

        while index < tokens.len() {
            let (tag,raw) = &tokens[index];

            if let Some(definition) = self.group_definition(*tag,msg_type) {
                //The declared count is carried through as-is (spec 9, "Open question: checkGroupCount
                //comparing declared count to the map's group count") -- a non-integer, negative, or
                //otherwise mismatched count is a validator concern (`check_group_count`, tolerable
                //per ValidationRules), not a tokenizer-level hard failure. Parsing stops collecting
                //instances as soon as the next token isn't the group's delimiter tag, whatever the
                //declared count said.
                let declared = String::from_utf8_lossy(raw).into_owned();
                index += 1;

                let intended = declared.parse::<usize>().unwrap_or(0);
                let mut instances = Vec::with_capacity(intended);
                for _ in 0..intended {
                    if index >= tokens.len() || tokens[index].0 != definition.delimiter_tag {
                        break;
                    }

                    let group_start = index;
                    let group_end = Self::find_instance_end(tokens,group_start,definition.delimiter_tag);

                    let (instance_fields,consumed) = definition.dictionary.parse_fields(&tokens[group_start..group_end],msg_type)?;
                    let mut instance = Message::new();
                    instance.body = instance_fields;
                    instances.push(instance);
                    index = group_start + consumed;
                }

                fields.push(Field::Group(*tag,declared,instances));
            }
            else {
                let value = String::from_utf8_lossy(raw).into_owned();
                if value.is_empty() {
                    return Err(ParseError::NoValueAfterTag(*tag));
                }
                fields.push(Field::Value(*tag,value));
                index += 1;
            }
        }

        Ok((fields,index))
    }

    /// Finds where the group instance starting at `start` (whose first tag is `delimiter`) ends:
    /// the token before the next occurrence of `delimiter`, or the end of the slice.
    fn find_instance_end(tokens: &[(FieldTag,Vec<u8>)],start: usize,delimiter: FieldTag) -> usize {
        let mut probe = start + 1;
        while probe < tokens.len() {
            if tokens[probe].0 == delimiter {
                return probe;
            }
            probe += 1;
        }
        tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary_with_required(tag: FieldTag,msg_type: &str) -> DataDictionary {
        let mut dictionary = DataDictionary::new("FIX.4.4");
        dictionary.fields.insert(tag);
        dictionary.field_type.insert(tag,Type::String);
        dictionary.message_fields.entry(msg_type.to_string()).or_default().insert(tag);
        dictionary.required_fields.entry(msg_type.to_string()).or_default().insert(tag);
        dictionary
    }

    #[test]
    fn missing_required_field_fails() {
        let dictionary = dictionary_with_required(FieldTag(58),"0");
        let message = Message::new();
        let rules = ValidationRules::strict();
        let result = dictionary.check_has_required(Direction::Incoming,&message,"0",&rules);
        assert_eq!(result,Err(ValidationError::RequiredTagMissing(FieldTag(58))));
    }

    #[test]
    fn present_required_field_passes() {
        let dictionary = dictionary_with_required(FieldTag(58),"0");
        let mut message = Message::new();
        message.set_body_field(FieldTag(58),"hello");
        let rules = ValidationRules::strict();
        assert!(dictionary.check_has_required(Direction::Incoming,&message,"0",&rules).is_ok());
    }

    #[test]
    fn unknown_tag_fails_invalid_tag_number() {
        let dictionary = DataDictionary::new("FIX.4.4");
        let rules = ValidationRules::strict();
        let result = dictionary.check_valid_tag_number(Direction::Incoming,"0",FieldTag(9999),&rules);
        assert_eq!(result,Err(ValidationError::InvalidTagNumber(FieldTag(9999))));
    }

    #[test]
    fn parses_repeating_group_instances() {
        let mut dictionary = DataDictionary::new("FIX.4.4");
        let group_dict = DataDictionary::new("FIX.4.4");
        dictionary.groups.entry(FieldTag(73)).or_default().insert("D".to_string(),GroupDefinition{
            delimiter_tag: FieldTag(11),
            dictionary: group_dict,
        });

        let tokens = vec![
            (FieldTag(35),b"D".to_vec()),
            (FieldTag(73),b"2".to_vec()),
            (FieldTag(11),b"ORDER1".to_vec()),
            (FieldTag(11),b"ORDER2".to_vec()),
        ];

        let message = dictionary.parse_message(&tokens,"D").unwrap();
        let instances = message.group(FieldTag(73)).unwrap();
        assert_eq!(instances.len(),2);
        assert_eq!(instances[0].field_value(FieldTag(11)),Some("ORDER1"));
        assert_eq!(instances[1].field_value(FieldTag(11)),Some("ORDER2"));
    }

    #[test]
    fn mismatched_group_count_parses_short_and_fails_validation() {
        let mut dictionary = DataDictionary::new("FIX.4.4");
        dictionary.groups.entry(FieldTag(73)).or_default().insert("D".to_string(),GroupDefinition{
            delimiter_tag: FieldTag(11),
            dictionary: DataDictionary::new("FIX.4.4"),
        });
        dictionary.message_fields.entry("D".to_string()).or_default().insert(FieldTag(73));

        let tokens = vec![
            (FieldTag(73),b"2".to_vec()),
            (FieldTag(11),b"ORDER1".to_vec()),
        ];

        //Parsing itself no longer hard-fails: it stops collecting instances once the delimiter
        //tag runs out, carrying the declared count of 2 alongside the single instance found.
        let message = dictionary.parse_message(&tokens,"D").unwrap();
        let instances = message.group(FieldTag(73)).unwrap();
        assert_eq!(instances.len(),1);

        //The mismatch surfaces as a tolerable validation error instead.
        let rules = ValidationRules::strict();
        let result = dictionary.iterate(Direction::Incoming,&message.body,"D",&rules);
        assert_eq!(result,Err(ValidationError::RepeatingGroupCountMismatch(FieldTag(73))));
    }

    #[test]
    fn user_defined_tags_bypass_strict_validation() {
        let dictionary = DataDictionary::new("FIX.4.4");
        assert!(FieldTag(6000).is_user_defined());
        //iterate() only runs check_valid_tag_number for non-user-defined tags; exercised in
        //dictionary integration tests rather than duplicated here.
        let _ = dictionary;
    }

    #[test]
    fn detects_first_tag_out_of_declared_order() {
        let mut dictionary = DataDictionary::new("FIX.4.4");
        dictionary.message_field_order.insert("D".to_string(),vec![FieldTag(11),FieldTag(54),FieldTag(38)]);

        let in_order = vec![Field::Value(FieldTag(11),"A".to_string()),Field::Value(FieldTag(54),"1".to_string()),Field::Value(FieldTag(38),"100".to_string())];
        assert_eq!(dictionary.first_out_of_order_tag("D",&in_order),None);

        let out_of_order = vec![Field::Value(FieldTag(54),"1".to_string()),Field::Value(FieldTag(11),"A".to_string())];
        assert_eq!(dictionary.first_out_of_order_tag("D",&out_of_order),Some(FieldTag(11)));
    }

    #[test]
    fn unknown_message_type_has_no_declared_order_to_check() {
        let dictionary = DataDictionary::new("FIX.4.4");
        let fields = vec![Field::Value(FieldTag(54),"1".to_string()),Field::Value(FieldTag(11),"A".to_string())];
        assert_eq!(dictionary.first_out_of_order_tag("Z",&fields),None);
    }
}
