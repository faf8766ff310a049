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

use std::cmp::Ordering;
use std::fmt;

use crate::constant::{
    FIXT_1_1_BEGIN_STRING,FIX_4_0_BEGIN_STRING,FIX_4_1_BEGIN_STRING,
    FIX_4_2_BEGIN_STRING,FIX_4_3_BEGIN_STRING,FIX_4_4_BEGIN_STRING,
};

/// A BeginString(8) value. Ordering is defined over (family, major, minor) instead of the raw
/// string so FIXT.1.1 does not get compared lexicographically against FIX.4.x.
#[derive(Clone,Copy,Debug,Eq,Hash,PartialEq)]
#[allow(non_camel_case_types)]
pub enum FIXVersion {
    FIX_4_0,
    FIX_4_1,
    FIX_4_2,
    FIX_4_3,
    FIX_4_4,
    FIXT_1_1,
}

#[derive(Clone,Copy,Eq,PartialEq,PartialOrd,Ord)]
struct VersionKey {
    family: u8, //0 = FIX, 1 = FIXT
    major: u8,
    minor: u8,
}

impl FIXVersion {
    pub fn begin_string(&self) -> &'static str {
        match *self {
            FIXVersion::FIXT_1_1 => FIXT_1_1_BEGIN_STRING,
            FIXVersion::FIX_4_0 => FIX_4_0_BEGIN_STRING,
            FIXVersion::FIX_4_1 => FIX_4_1_BEGIN_STRING,
            FIXVersion::FIX_4_2 => FIX_4_2_BEGIN_STRING,
            FIXVersion::FIX_4_3 => FIX_4_3_BEGIN_STRING,
            FIXVersion::FIX_4_4 => FIX_4_4_BEGIN_STRING,
        }
    }

    pub fn from_begin_string(begin_string: &str) -> Option<FIXVersion> {
        match begin_string {
            FIXT_1_1_BEGIN_STRING => Some(FIXVersion::FIXT_1_1),
            FIX_4_0_BEGIN_STRING => Some(FIXVersion::FIX_4_0),
            FIX_4_1_BEGIN_STRING => Some(FIXVersion::FIX_4_1),
            FIX_4_2_BEGIN_STRING => Some(FIXVersion::FIX_4_2),
            FIX_4_3_BEGIN_STRING => Some(FIXVersion::FIX_4_3),
            FIX_4_4_BEGIN_STRING => Some(FIXVersion::FIX_4_4),
            _ => None,
        }
    }

    pub fn is_fixt(&self) -> bool {
        matches!(*self,FIXVersion::FIXT_1_1)
    }

    /// Whether this version serializes UtcTimeStamp fields with millisecond precision. True for
    /// FIX >= 4.2 and for FIXT.1.1.
    pub fn uses_millisecond_timestamps(&self) -> bool {
        self.is_fixt() || self.key() >= FIXVersion::FIX_4_2.key()
    }

    /// FIX >= 4.2, or FIXT.1.1 (spec 4.5, "Reject generation": several Reject(3) fields and
    /// BusinessMessageReject only exist from this version onward).
    pub fn at_least_4_2(&self) -> bool {
        self.is_fixt() || self.key() >= FIXVersion::FIX_4_2.key()
    }

    fn key(&self) -> VersionKey {
        match *self {
            FIXVersion::FIX_4_0 => VersionKey{ family: 0, major: 4, minor: 0 },
            FIXVersion::FIX_4_1 => VersionKey{ family: 0, major: 4, minor: 1 },
            FIXVersion::FIX_4_2 => VersionKey{ family: 0, major: 4, minor: 2 },
            FIXVersion::FIX_4_3 => VersionKey{ family: 0, major: 4, minor: 3 },
            FIXVersion::FIX_4_4 => VersionKey{ family: 0, major: 4, minor: 4 },
            FIXVersion::FIXT_1_1 => VersionKey{ family: 1, major: 1, minor: 1 },
        }
    }
}

impl PartialOrd for FIXVersion {
    fn partial_cmp(&self,other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FIXVersion {
    /// Only meaningful for comparing within a family; FIXT.1.1 sorts after FIX.4.4 by
    /// convention since it is the transport layer for the 5.x application family.
    fn cmp(&self,other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for FIXVersion {
    fn fmt(&self,f: &mut fmt::Formatter) -> fmt::Result {
        write!(f,"{}",self.begin_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_begin_string() {
        for version in [FIXVersion::FIX_4_0,FIXVersion::FIX_4_1,FIXVersion::FIX_4_2,FIXVersion::FIX_4_3,FIXVersion::FIX_4_4,FIXVersion::FIXT_1_1] {
            assert_eq!(FIXVersion::from_begin_string(version.begin_string()),Some(version));
        }
    }

    #[test]
    fn orders_by_family_not_lexicographically() {
        assert!(FIXVersion::FIX_4_4 > FIXVersion::FIX_4_0);
        //Lexicographic comparison of "FIXT.1.1" vs "FIX.4.4" would put FIXT before FIX.4.4
        //because 'T' < '.'. The tuple-based ordering instead treats them as distinct families.
        assert!(FIXVersion::FIXT_1_1 > FIXVersion::FIX_4_4);
    }

    #[test]
    fn millisecond_precision_threshold() {
        assert!(!FIXVersion::FIX_4_0.uses_millisecond_timestamps());
        assert!(!FIXVersion::FIX_4_1.uses_millisecond_timestamps());
        assert!(FIXVersion::FIX_4_2.uses_millisecond_timestamps());
        assert!(FIXVersion::FIXT_1_1.uses_millisecond_timestamps());
    }
}
