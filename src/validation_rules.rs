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

//! The direction-aware tolerance overlay described in spec 4.3. `DataDictionary::validate`
//! consults a `ValidationRules` for every rejection it is about to raise; this is the sole
//! legitimate way to relax protocol strictness without recompiling the dictionary (spec 7,
//! "Tolerance").

use std::collections::{HashMap,HashSet};

use crate::constant::ANY_MSG_TYPE;
use crate::errors::ConfigError;
use crate::field_tag::FieldTag;

/// Message direction. Kept as a two-variant sum type throughout the API surface rather than the
/// source's magic `int` (spec 9, "Direction as magic int").
#[derive(Clone,Copy,Debug,Eq,Hash,PartialEq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// The nine rejection kinds a `ValidationRules` can selectively tolerate (spec 3,
/// "ValidationRules").
#[derive(Clone,Copy,Debug,Eq,Hash,PartialEq)]
pub enum RejectKind {
    BadFormat,
    Missing,
    OutOfBounds,
    UnknownTag,
    EmptyTag,
    OutOfOrderTag,
    DuplicateTag,
    RepeatingGroupMismatch,
    VersionMismatch,
}

impl RejectKind {
    /// The `rejectType` integer used by the `setValidationRules` descriptor (spec 4.3).
    fn from_descriptor_value(value: u32) -> Option<RejectKind> {
        match value {
            0 => Some(RejectKind::BadFormat),
            1 => Some(RejectKind::OutOfBounds),
            2 => Some(RejectKind::Missing),
            3 => Some(RejectKind::RepeatingGroupMismatch),
            4 => Some(RejectKind::UnknownTag),
            5 => Some(RejectKind::EmptyTag),
            6 => Some(RejectKind::OutOfOrderTag),
            7 => Some(RejectKind::DuplicateTag),
            104 => Some(RejectKind::VersionMismatch),
            _ => None,
        }
    }

    /// Rule descriptors of these kinds additionally imply admission into `allowedFields` (spec
    /// 4.3: "Rules with rejectType in {0,1,4,5} additionally imply admission into allowedFields").
    fn implies_allowed_field(&self) -> bool {
        matches!(*self,RejectKind::BadFormat | RejectKind::OutOfBounds | RejectKind::UnknownTag | RejectKind::EmptyTag)
    }
}

type ToleranceMap = HashMap<String,HashSet<FieldTag>>;

#[derive(Clone,Debug,Default)]
struct DirectionalTolerance {
    inbound: ToleranceMap,
    outbound: ToleranceMap,
}

impl DirectionalTolerance {
    fn map_for(&self,direction: Direction) -> &ToleranceMap {
        match direction {
            Direction::Incoming => &self.inbound,
            Direction::Outgoing => &self.outbound,
        }
    }

    fn map_for_mut(&mut self,direction: Direction) -> &mut ToleranceMap {
        match direction {
            Direction::Incoming => &mut self.inbound,
            Direction::Outgoing => &mut self.outbound,
        }
    }

    fn contains(&self,direction: Direction,msg_type: &str,tag: FieldTag) -> bool {
        let map = self.map_for(direction);
        map.get(msg_type).map(|tags| tags.contains(&tag)).unwrap_or(false)
            || map.get(ANY_MSG_TYPE).map(|tags| tags.contains(&tag)).unwrap_or(false)
    }

    fn insert(&mut self,direction: Direction,msg_type: &str,tag: FieldTag) {
        self.map_for_mut(direction).entry(msg_type.to_string()).or_default().insert(tag);
    }
}

/// A direction- and message-type-aware tolerance overlay (spec 4.3). A `ValidationRules` built
/// with `strict()` tolerates nothing: every tag is validated and every rejection is raised.
#[derive(Clone,Debug)]
pub struct ValidationRules {
    pub validate: bool,
    pub validate_bounds: bool,
    pub validate_length: bool,
    pub validate_checksum: bool,
    pub validate_fields_out_of_order: bool,
    pub validate_fields_have_values: bool,
    pub validate_user_defined_fields: bool,
    allowed_fields: HashMap<String,HashSet<FieldTag>>,
    tolerances: HashMap<RejectKind,DirectionalTolerance>,
    tolerate_missing_message_type: (bool,bool), //(inbound, outbound)
}

impl Default for ValidationRules {
    fn default() -> ValidationRules {
        ValidationRules::strict()
    }
}

impl ValidationRules {
    /// Validates everything, tolerates nothing -- a null `ValidationRules` pointer in the source
    /// denotes exactly this (spec 4.3, "Query contract").
    pub fn strict() -> ValidationRules {
        ValidationRules {
            validate: true,
            validate_bounds: true,
            validate_length: true,
            validate_checksum: true,
            validate_fields_out_of_order: true,
            validate_fields_have_values: true,
            validate_user_defined_fields: true,
            allowed_fields: HashMap::new(),
            tolerances: HashMap::new(),
            tolerate_missing_message_type: (false,false),
        }
    }

    /// `shouldTolerateXxx` (spec 4.3): true iff global validation is off, the tag is in
    /// `allowedFields` for this msg type or the wildcard, or the tag is listed under this
    /// rejection kind for this direction/msg type or the wildcard.
    pub fn should_tolerate(&self,kind: RejectKind,direction: Direction,msg_type: &str,tag: FieldTag) -> bool {
        if !self.validate {
            return true;
        }
        if self.is_allowed_field(msg_type,tag) {
            return true;
        }
        self.tolerances.get(&kind).map(|t| t.contains(direction,msg_type,tag)).unwrap_or(false)
    }

    fn is_allowed_field(&self,msg_type: &str,tag: FieldTag) -> bool {
        self.allowed_fields.get(msg_type).map(|tags| tags.contains(&tag)).unwrap_or(false)
            || self.allowed_fields.get(ANY_MSG_TYPE).map(|tags| tags.contains(&tag)).unwrap_or(false)
    }

    /// `shouldTolerateMissingMessageType` (SPEC_FULL E.5): a direction-only tolerance bit used by
    /// `checkMsgType`, present in the original QuickFIX source alongside the per-tag overlays.
    pub fn should_tolerate_missing_message_type(&self,direction: Direction) -> bool {
        if !self.validate {
            return true;
        }
        match direction {
            Direction::Incoming => self.tolerate_missing_message_type.0,
            Direction::Outgoing => self.tolerate_missing_message_type.1,
        }
    }

    pub fn set_tolerate_missing_message_type(&mut self,direction: Direction,tolerate: bool) {
        match direction {
            Direction::Incoming => self.tolerate_missing_message_type.0 = tolerate,
            Direction::Outgoing => self.tolerate_missing_message_type.1 = tolerate,
        }
    }

    /// Parses `setAllowedFields`'s descriptor: `;`-separated groups, each `msgType:tag1,tag2,...`
    /// (spec 4.3).
    pub fn set_allowed_fields(&mut self,descriptor: &str) -> Result<(),ConfigError> {
        for group in descriptor.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (msg_type,tags) = group.split_once(':').ok_or_else(|| ConfigError::ValidationRulesDescriptor(group.to_string()))?;
            let entry = self.allowed_fields.entry(msg_type.to_string()).or_default();
            for tag_str in tags.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let tag: u32 = tag_str.parse().map_err(|_| ConfigError::ValidationRulesDescriptor(group.to_string()))?;
                entry.insert(FieldTag(tag));
            }
        }
        Ok(())
    }

    /// Parses `setValidationRules`'s descriptor: `,`-separated rules, each
    /// `inbound-rejectType-msgType-tag` (spec 4.3).
    pub fn set_validation_rules(&mut self,descriptor: &str) -> Result<(),ConfigError> {
        for rule in descriptor.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let parts: Vec<&str> = rule.splitn(4,'-').collect();
            if parts.len() != 4 {
                return Err(ConfigError::ValidationRulesDescriptor(rule.to_string()));
            }

            let inbound: u32 = parts[0].parse().map_err(|_| ConfigError::ValidationRulesDescriptor(rule.to_string()))?;
            let reject_type: u32 = parts[1].parse().map_err(|_| ConfigError::ValidationRulesDescriptor(rule.to_string()))?;
            let msg_type = parts[2];
            let tag: u32 = parts[3].parse().map_err(|_| ConfigError::ValidationRulesDescriptor(rule.to_string()))?;

            let direction = match inbound {
                1 => Direction::Incoming,
                0 => Direction::Outgoing,
                _ => return Err(ConfigError::ValidationRulesDescriptor(rule.to_string())),
            };
            let kind = RejectKind::from_descriptor_value(reject_type).ok_or_else(|| ConfigError::ValidationRulesDescriptor(rule.to_string()))?;
            let tag = FieldTag(tag);

            self.tolerances.entry(kind).or_default().insert(direction,msg_type,tag);
            if kind.implies_allowed_field() {
                self.allowed_fields.entry(msg_type.to_string()).or_default().insert(tag);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_tolerates_nothing() {
        let rules = ValidationRules::strict();
        assert!(!rules.should_tolerate(RejectKind::UnknownTag,Direction::Incoming,"D",FieldTag(9999)));
    }

    #[test]
    fn global_validate_off_tolerates_everything() {
        let mut rules = ValidationRules::strict();
        rules.validate = false;
        assert!(rules.should_tolerate(RejectKind::Missing,Direction::Outgoing,"D",FieldTag(1)));
    }

    #[test]
    fn allowed_fields_descriptor_admits_tag_regardless_of_kind() {
        let mut rules = ValidationRules::strict();
        rules.set_allowed_fields("D:9001,9002;8:9003").unwrap();
        assert!(rules.should_tolerate(RejectKind::UnknownTag,Direction::Incoming,"D",FieldTag(9001)));
        assert!(rules.should_tolerate(RejectKind::Missing,Direction::Outgoing,"D",FieldTag(9002)));
        assert!(!rules.should_tolerate(RejectKind::Missing,Direction::Outgoing,"D",FieldTag(9999)));
    }

    #[test]
    fn validation_rules_descriptor_is_direction_and_msgtype_aware() {
        let mut rules = ValidationRules::strict();
        rules.set_validation_rules("1-4-D-9001,0-2-?-58").unwrap();
        //1-4-D-9001: inbound, unknownTag, msgType D, tag 9001
        assert!(rules.should_tolerate(RejectKind::UnknownTag,Direction::Incoming,"D",FieldTag(9001)));
        assert!(!rules.should_tolerate(RejectKind::UnknownTag,Direction::Outgoing,"D",FieldTag(9001)));
        //0-2-?-58: outbound, missing, wildcard msgType, tag 58
        assert!(rules.should_tolerate(RejectKind::Missing,Direction::Outgoing,"ANYTHING",FieldTag(58)));
        assert!(!rules.should_tolerate(RejectKind::Missing,Direction::Incoming,"ANYTHING",FieldTag(58)));
    }

    #[test]
    fn unknown_tag_and_empty_tag_tolerance_implies_allowed_field() {
        let mut rules = ValidationRules::strict();
        rules.set_validation_rules("1-0-D-9001").unwrap();
        //BadFormat (0) implies allowedFields admission, so every tolerance check passes for this
        //tag/msgType, not just BadFormat.
        assert!(rules.should_tolerate(RejectKind::Missing,Direction::Outgoing,"D",FieldTag(9001)));
    }

    #[test]
    fn rejects_malformed_descriptor() {
        let mut rules = ValidationRules::strict();
        assert!(rules.set_validation_rules("not-a-valid-rule").is_err());
        assert!(rules.set_allowed_fields("no-colon-here").is_err());
    }
}
