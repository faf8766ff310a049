// Copyright 2017 James Bendig. See the COPYRIGHT file at the top-level
// directory of this distribution.
//
// Licensed under:
//   the MIT license
//     <LICENSE-MIT or https://opensource.org/licenses/MIT>
//   or the Apache License, Version 2.0
//     <LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0>,
// at your option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::cmp::{Ord,Ordering,PartialOrd};
use std::convert::TryFrom;
use std::fmt;

/// A FIX field tag number. Always >= 1; 0 is reserved as the "empty" sentinel.
#[derive(Clone,Copy,Eq,Hash,PartialEq)]
pub struct FieldTag(pub u32);

impl FieldTag {
    pub fn empty() -> Self {
        FieldTag(0)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_string().into_bytes()
    }

    pub fn is_empty(&self) -> bool {
        //There are no FIX field tags that start with 0.
        self.0 == 0
    }

    /// The lowest tag number reserved for user-defined fields. Tags at or above this
    /// threshold bypass dictionary checks (FIXT 1.1, page 16).
    pub fn user_min() -> Self {
        FieldTag(5000)
    }

    pub fn is_user_defined(&self) -> bool {
        self.0 >= Self::user_min().0
    }
}

impl fmt::Debug for FieldTag {
    fn fmt(&self,f: &mut fmt::Formatter) -> fmt::Result {
        write!(f,"{}",self.0)
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self,f: &mut fmt::Formatter) -> fmt::Result {
        write!(f,"{}",self.0)
    }
}

impl From<FieldTag> for Vec<u8> {
    fn from(tag: FieldTag) -> Vec<u8> {
        tag.to_bytes()
    }
}

impl From<FieldTag> for u32 {
    fn from(tag: FieldTag) -> u32 {
        tag.0
    }
}

impl TryFrom<&[u8]> for FieldTag {
    type Error = ();

    /// Parses an ASCII-decimal tag, e.g. the bytes before the `=` in `35=D`. Rejects empty
    /// input, non-digit bytes, and overflow instead of silently wrapping.
    fn try_from(bytes: &[u8]) -> Result<Self,()> {
        if bytes.is_empty() {
            return Err(());
        }

        let mut tag: u32 = 0;
        for byte in bytes {
            if !byte.is_ascii_digit() {
                return Err(());
            }
            tag = tag.checked_mul(10).ok_or(())?;
            tag = tag.checked_add((byte - b'0') as u32).ok_or(())?;
        }

        Ok(FieldTag(tag))
    }
}

impl From<u32> for FieldTag {
    fn from(tag: u32) -> Self {
        FieldTag(tag)
    }
}

impl PartialOrd for FieldTag {
    fn partial_cmp(&self,other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldTag {
    fn cmp(&self,other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_tags() {
        assert_eq!(FieldTag::try_from(b"35".as_ref()),Ok(FieldTag(35)));
        assert_eq!(FieldTag::try_from(b"1".as_ref()),Ok(FieldTag(1)));
    }

    #[test]
    fn rejects_non_numeric_or_empty() {
        assert!(FieldTag::try_from(b"3x".as_ref()).is_err());
        assert!(FieldTag::try_from(b"".as_ref()).is_err());
    }

    #[test]
    fn user_defined_threshold() {
        assert!(!FieldTag(4999).is_user_defined());
        assert!(FieldTag(5000).is_user_defined());
    }
}
