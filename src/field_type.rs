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

use chrono::NaiveDate;

use crate::fix_version::FIXVersion;

/// The closed set of field types a `DataDictionary` can assign to a tag. Unlike the teacher's
/// per-field Rust structs generated at compile time, this is a runtime value: the dictionary
/// loader reads a `<field type="...">` string out of the XML and maps it to one of these.
#[derive(Clone,Copy,Debug,Eq,PartialEq)]
pub enum Type {
    String,
    Char,
    Int,
    Price,
    Amt,
    Qty,
    Currency,
    MultipleValueString,
    MultipleStringValue,
    MultipleCharValue,
    Exchange,
    UtcTimeStamp,
    Boolean,
    LocalMktDate,
    Data,
    Float,
    PriceOffset,
    MonthYear,
    DayOfMonth,
    UtcDate,
    UtcDateOnly,
    UtcTimeOnly,
    NumInGroup,
    Percentage,
    SeqNum,
    Length,
    Country,
    TzTimeOnly,
    TzTimeStamp,
    XmlData,
    Language,
    Unknown,
}

impl Type {
    /// Maps an XML dictionary's `type="..."` attribute to a `Type`. "TIME" is a long-standing
    /// alias for UtcTimeStamp; before FIX 4.2 "CHAR" denotes a single-character field that the
    /// dictionary still treats as String for value-set checking purposes. Anything unrecognized
    /// becomes `Unknown`, which skips format checking entirely (4.2, "Type mapping").
    pub fn from_xml_type(xml_type: &str,version: FIXVersion) -> Type {
        match xml_type {
            "STRING" => Type::String,
            "CHAR" => {
                if version.at_least_4_2() {
                    Type::Char
                }
                else {
                    Type::String
                }
            },
            "INT" => Type::Int,
            "PRICE" => Type::Price,
            "AMT" => Type::Amt,
            "QTY" => Type::Qty,
            "CURRENCY" => Type::Currency,
            "MULTIPLEVALUESTRING" => Type::MultipleValueString,
            "MULTIPLESTRINGVALUE" => Type::MultipleStringValue,
            "MULTIPLECHARVALUE" => Type::MultipleCharValue,
            "EXCHANGE" => Type::Exchange,
            "UTCTIMESTAMP" | "TIME" => Type::UtcTimeStamp,
            "BOOLEAN" => Type::Boolean,
            "LOCALMKTDATE" => Type::LocalMktDate,
            "DATA" => Type::Data,
            "FLOAT" => Type::Float,
            "PRICEOFFSET" => Type::PriceOffset,
            "MONTHYEAR" => Type::MonthYear,
            "DAYOFMONTH" => Type::DayOfMonth,
            "UTCDATE" => Type::UtcDate,
            "UTCDATEONLY" => Type::UtcDateOnly,
            "UTCTIMEONLY" => Type::UtcTimeOnly,
            "NUMINGROUP" => Type::NumInGroup,
            "PERCENTAGE" => Type::Percentage,
            "SEQNUM" => Type::SeqNum,
            "LENGTH" => Type::Length,
            "COUNTRY" => Type::Country,
            "TZTIMEONLY" => Type::TzTimeOnly,
            "TZTIMESTAMP" => Type::TzTimeStamp,
            "XMLDATA" => Type::XmlData,
            "LANGUAGE" => Type::Language,
            _ => Type::Unknown,
        }
    }

    /// True for the MultipleValue* family, where the raw value is a list of tokens instead of a
    /// single value (4.2, `checkValue`: "split on space and require every token to be a listed
    /// value").
    pub fn is_multiple_value(&self) -> bool {
        matches!(*self,Type::MultipleValueString | Type::MultipleStringValue | Type::MultipleCharValue)
    }

    /// Checks that `raw` parses as this type. `Unknown` always passes (4.2, "Type mapping": format
    /// checking is skipped). Multiple-value types are checked token by token against the
    /// delimiter named in 9's open question, defaulting to a single space.
    pub fn is_valid_format(&self,raw: &str) -> bool {
        if raw.is_empty() {
            return false;
        }

        match *self {
            Type::Unknown => true,
            Type::String | Type::Exchange | Type::Currency | Type::Country | Type::Language | Type::Data | Type::XmlData => true,
            Type::Char => raw.chars().count() == 1,
            Type::MultipleValueString | Type::MultipleStringValue => raw.split(' ').all(|token| !token.is_empty()),
            Type::MultipleCharValue => raw.split(' ').all(|token| token.chars().count() == 1),
            Type::Int | Type::Length => raw.parse::<i64>().is_ok(),
            Type::SeqNum | Type::NumInGroup => raw.parse::<u64>().is_ok(),
            Type::Price | Type::Amt | Type::Qty | Type::Float | Type::PriceOffset | Type::Percentage => raw.parse::<f64>().is_ok(),
            Type::Boolean => raw == "Y" || raw == "N",
            Type::UtcTimeStamp | Type::TzTimeStamp => parse_utc_timestamp(raw).is_some(),
            Type::UtcDate | Type::UtcDateOnly | Type::LocalMktDate => parse_utc_date_only(raw).is_some(),
            Type::UtcTimeOnly | Type::TzTimeOnly => parse_utc_time_only(raw).is_some(),
            Type::MonthYear => parse_month_year(raw).is_some(),
            Type::DayOfMonth => raw.parse::<u8>().map(|day| (1..=31).contains(&day)).unwrap_or(false),
        }
    }
}

/// `YYYYMMDD-HH:MM:SS` or `YYYYMMDD-HH:MM:SS.sss`.
fn parse_utc_timestamp(raw: &str) -> Option<()> {
    chrono::NaiveDateTime::parse_from_str(raw,"%Y%m%d-%H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw,"%Y%m%d-%H:%M:%S"))
        .ok()
        .map(|_| ())
}

/// `YYYYMMDD`.
fn parse_utc_date_only(raw: &str) -> Option<()> {
    NaiveDate::parse_from_str(raw,"%Y%m%d").ok().map(|_| ())
}

/// `HH:MM:SS` or `HH:MM:SS.sss`.
fn parse_utc_time_only(raw: &str) -> Option<()> {
    chrono::NaiveTime::parse_from_str(raw,"%H:%M:%S%.f")
        .or_else(|_| chrono::NaiveTime::parse_from_str(raw,"%H:%M:%S"))
        .ok()
        .map(|_| ())
}

/// `YYYYMM` with an optional `DD` or `WW` week suffix; only the 6-digit core is validated here.
fn parse_month_year(raw: &str) -> Option<()> {
    if raw.len() < 6 {
        return None;
    }
    let (core,_rest) = raw.split_at(6);
    if core.bytes().all(|b| b.is_ascii_digit()) {
        let month: u32 = core[4..6].parse().ok()?;
        if (1..=12).contains(&month) {
            return Some(());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_time_alias_to_utc_timestamp() {
        assert_eq!(Type::from_xml_type("TIME",FIXVersion::FIX_4_4),Type::UtcTimeStamp);
        assert_eq!(Type::from_xml_type("UTCTIMESTAMP",FIXVersion::FIX_4_4),Type::UtcTimeStamp);
    }

    #[test]
    fn char_maps_to_string_before_4_2() {
        assert_eq!(Type::from_xml_type("CHAR",FIXVersion::FIX_4_1),Type::String);
        assert_eq!(Type::from_xml_type("CHAR",FIXVersion::FIX_4_2),Type::Char);
        assert_eq!(Type::from_xml_type("CHAR",FIXVersion::FIXT_1_1),Type::Char);
    }

    #[test]
    fn unrecognized_type_is_unknown_and_always_valid() {
        assert_eq!(Type::from_xml_type("NOT_A_REAL_TYPE",FIXVersion::FIX_4_4),Type::Unknown);
        assert!(Type::Unknown.is_valid_format("anything at all"));
    }

    #[test]
    fn validates_int_and_seqnum() {
        assert!(Type::Int.is_valid_format("-42"));
        assert!(!Type::Int.is_valid_format("4.2"));
        assert!(Type::SeqNum.is_valid_format("1"));
        assert!(!Type::SeqNum.is_valid_format("-1"));
    }

    #[test]
    fn validates_utc_timestamp_with_and_without_millis() {
        assert!(Type::UtcTimeStamp.is_valid_format("20231231-23:59:59"));
        assert!(Type::UtcTimeStamp.is_valid_format("20231231-23:59:59.999"));
        assert!(!Type::UtcTimeStamp.is_valid_format("2023-12-31"));
    }

    #[test]
    fn multiple_value_string_splits_on_space() {
        assert!(Type::MultipleValueString.is_valid_format("A B C"));
        assert!(!Type::MultipleValueString.is_valid_format("A  C"));
    }

    #[test]
    fn empty_raw_value_is_never_valid() {
        assert!(!Type::String.is_valid_format(""));
        assert!(!Type::Unknown.is_valid_format(""));
    }
}
