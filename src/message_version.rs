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

use crate::fix_version::FIXVersion;

/// The application-message-layer version. Carried numerically as ApplVerID(1128) inside a
/// Logon's DefaultApplVerID(1137) for FIXT sessions; for pre-FIXT sessions it is derived directly
/// from BeginString(8) since session and application layers are the same version (4.5, "For
/// Logon: if FIXT, read DefaultApplVerID; else derive from BeginString").
#[derive(Clone,Copy,Debug,Eq,Hash,PartialEq)]
#[allow(non_camel_case_types)]
pub enum MessageVersion {
    //Unsupported FIX27,
    //Unsupported FIX30,
    FIX40,
    FIX41,
    FIX42,
    FIX43,
    FIX44,
    FIX50,
    FIX50SP1,
    FIX50SP2,
}

impl MessageVersion {
    pub fn new(value: u32) -> Option<MessageVersion> {
        match value {
            //Unsupported 0 => MessageVersion::FIX27,
            //Unsupported 1 => MessageVersion::FIX30,
            2 => Some(MessageVersion::FIX40),
            3 => Some(MessageVersion::FIX41),
            4 => Some(MessageVersion::FIX42),
            5 => Some(MessageVersion::FIX43),
            6 => Some(MessageVersion::FIX44),
            7 => Some(MessageVersion::FIX50),
            8 => Some(MessageVersion::FIX50SP1),
            9 => Some(MessageVersion::FIX50SP2),
            _ => None,
        }
    }

    pub fn as_value(&self) -> u8 {
        match *self {
            //Unsupported MessageVersion::FIX27 => 0,
            //Unsupported MessageVersion::FIX30 => 1,
            MessageVersion::FIX40 => 2,
            MessageVersion::FIX41 => 3,
            MessageVersion::FIX42 => 4,
            MessageVersion::FIX43 => 5,
            MessageVersion::FIX44 => 6,
            MessageVersion::FIX50 => 7,
            MessageVersion::FIX50SP1 => 8,
            MessageVersion::FIX50SP2 => 9,
        }
    }

    /// The implicit application version for a non-FIXT BeginString. Returns `None` for
    /// `FIXT.1.1`, which carries no implicit application version -- a FIXT Logon must supply
    /// DefaultApplVerID(1137) explicitly.
    pub fn derive_from_begin_string(version: FIXVersion) -> Option<MessageVersion> {
        match version {
            FIXVersion::FIX_4_0 => Some(MessageVersion::FIX40),
            FIXVersion::FIX_4_1 => Some(MessageVersion::FIX41),
            FIXVersion::FIX_4_2 => Some(MessageVersion::FIX42),
            FIXVersion::FIX_4_3 => Some(MessageVersion::FIX43),
            FIXVersion::FIX_4_4 => Some(MessageVersion::FIX44),
            FIXVersion::FIXT_1_1 => None,
        }
    }

    /// Maps a loaded dictionary's `version` string -- e.g. "FIX.4.4" or, for a FIXT application
    /// dictionary, "FIX.5.0SP2" -- to the `MessageVersion` carried numerically over the wire.
    /// `FIXVersion` only models transport BeginStrings up to FIX.4.4, so the FIX 5.0 family is
    /// matched directly against the dictionary string here instead.
    pub fn from_dictionary_version(version: &str) -> Option<MessageVersion> {
        match version {
            "FIX.4.0" => Some(MessageVersion::FIX40),
            "FIX.4.1" => Some(MessageVersion::FIX41),
            "FIX.4.2" => Some(MessageVersion::FIX42),
            "FIX.4.3" => Some(MessageVersion::FIX43),
            "FIX.4.4" => Some(MessageVersion::FIX44),
            "FIX.5.0" => Some(MessageVersion::FIX50),
            "FIX.5.0SP1" => Some(MessageVersion::FIX50SP1),
            "FIX.5.0SP2" => Some(MessageVersion::FIX50SP2),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_numeric_value() {
        for version in [MessageVersion::FIX40,MessageVersion::FIX41,MessageVersion::FIX42,MessageVersion::FIX43,MessageVersion::FIX44,MessageVersion::FIX50,MessageVersion::FIX50SP1,MessageVersion::FIX50SP2] {
            assert_eq!(MessageVersion::new(version.as_value() as u32),Some(version));
        }
    }

    #[test]
    fn derives_from_non_fixt_begin_string() {
        assert_eq!(MessageVersion::derive_from_begin_string(FIXVersion::FIX_4_4),Some(MessageVersion::FIX44));
    }

    #[test]
    fn fixt_has_no_implicit_application_version() {
        assert_eq!(MessageVersion::derive_from_begin_string(FIXVersion::FIXT_1_1),None);
    }

    #[test]
    fn maps_dictionary_version_strings() {
        assert_eq!(MessageVersion::from_dictionary_version("FIX.4.4"),Some(MessageVersion::FIX44));
        assert_eq!(MessageVersion::from_dictionary_version("FIX.5.0SP2"),Some(MessageVersion::FIX50SP2));
        assert_eq!(MessageVersion::from_dictionary_version("bogus"),None);
    }
}
