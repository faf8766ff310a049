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

//! The session-time window, spec 4.1. Decides whether a given UTC instant lies inside the
//! session's connection window and exposes the auto-connect / auto-reconnect / auto-EOD /
//! auto-disconnect policy bits the `Session` state machine consults on every tick.

use chrono::{Datelike,Timelike};
use std::time::Duration;

use crate::errors::ConfigError;

const DAY_MS: u64 = 86_400_000;
const WEEK_MS: u64 = DAY_MS * 7;

#[derive(Clone,Debug,Eq,PartialEq)]
enum Kind {
    Weekly,
    Daily,
}

/// The session-time window described by a pipe-delimited descriptor (spec 4.1, "Descriptor").
/// `Schedule::null()` is always out of range and carries every policy bit false -- used by
/// `Session::must_logout` to disable future reconnects (spec 4.5).
#[derive(Clone,Debug)]
pub struct Schedule {
    kind: Kind,
    days: Vec<u32>, //0-6, sorted ascending
    start_ms: u64, //time-of-day, milliseconds
    end_ms: u64,
    reverse: bool,
    auto_eod: bool,
    auto_reconnect: bool,
    reconnect_interval: Duration,
    auto_connect: bool,
    auto_disconnect: bool,
}

fn parse_time(raw: &str) -> Result<u64,ConfigError> {
    //5-char forms ("HH:MM") get ":00" appended (spec 4.1).
    let padded = if raw.len() == 5 { format!("{}:00",raw) } else { raw.to_string() };
    let parts: Vec<&str> = padded.split(':').collect();
    if parts.len() != 3 {
        return Err(ConfigError::ScheduleElement(raw.to_string()));
    }
    let h: u64 = parts[0].parse().map_err(|_| ConfigError::ScheduleElement(raw.to_string()))?;
    let m: u64 = parts[1].parse().map_err(|_| ConfigError::ScheduleElement(raw.to_string()))?;
    let s: u64 = parts[2].parse().map_err(|_| ConfigError::ScheduleElement(raw.to_string()))?;
    if h > 23 || m > 59 || s > 59 {
        return Err(ConfigError::ScheduleElement(raw.to_string()));
    }
    Ok(((h * 3600) + (m * 60) + s) * 1000)
}

fn parse_auto_token(raw: &str,yes: &str,no: &str) -> Result<bool,ConfigError> {
    match raw {
        _ if raw == yes => Ok(true),
        _ if raw == no => Ok(false),
        _ => Err(ConfigError::ScheduleElement(raw.to_string())),
    }
}

impl Schedule {
    /// Always out of range; every policy bit is false.
    pub fn null() -> Schedule {
        Schedule {
            kind: Kind::Daily,
            days: Vec::new(),
            start_ms: 0,
            end_ms: 0,
            reverse: false,
            auto_eod: false,
            auto_reconnect: false,
            reconnect_interval: Duration::from_secs(0),
            auto_connect: false,
            auto_disconnect: false,
        }
    }

    /// Parses the 9-element pipe-delimited descriptor (spec 4.1): `W|D|days|start|end|AutoEOD|
    /// AutoReconnect|interval|AutoConnect|AutoDisconnect`.
    pub fn parse(descriptor: &str) -> Result<Schedule,ConfigError> {
        let elements: Vec<&str> = descriptor.split('|').collect();
        if elements.len() != 9 {
            return Err(ConfigError::ScheduleElementCount(descriptor.to_string()));
        }

        let kind = match elements[0] {
            "W" => Kind::Weekly,
            "D" => Kind::Daily,
            other => return Err(ConfigError::ScheduleElement(other.to_string())),
        };

        let mut days = Vec::new();
        for day_str in elements[1].split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let day: u32 = day_str.parse().map_err(|_| ConfigError::ScheduleElement(day_str.to_string()))?;
            if day > 6 {
                return Err(ConfigError::ScheduleElement(day_str.to_string()));
            }
            days.push(day);
        }
        days.sort_unstable();
        days.dedup();

        let start_ms = parse_time(elements[2])?;
        let end_ms = parse_time(elements[3])?;
        let reverse = end_ms < start_ms;

        let auto_eod = parse_auto_token(elements[4],"AutoEOD","NoAutoEOD")?;
        let auto_reconnect = parse_auto_token(elements[5],"AutoReconnect","NoAutoReconnect")?;
        let interval_secs: u64 = elements[6].parse().map_err(|_| ConfigError::ScheduleElement(elements[6].to_string()))?;
        let auto_connect = parse_auto_token(elements[7],"AutoConnect","NoAutoConnect")?;
        let auto_disconnect = parse_auto_token(elements[8],"AutoDisconnect","NoAutoDisconnect")?;

        Ok(Schedule {
            kind,
            days,
            start_ms,
            end_ms,
            reverse,
            auto_eod,
            auto_reconnect,
            reconnect_interval: Duration::from_secs(interval_secs),
            auto_connect,
            auto_disconnect,
        })
    }

    fn weekly_ms(weekday: u32,time_ms: u64) -> u64 {
        (weekday as u64) * DAY_MS + time_ms
    }

    fn weekday_of(now: &chrono::DateTime<chrono::Utc>) -> u32 {
        //num_days_from_sunday() already yields 0-6 with Sunday=0, matching the descriptor's
        //weekday numbering (spec 4.1).
        now.weekday().num_days_from_sunday()
    }

    fn time_of_day_ms(now: &chrono::DateTime<chrono::Utc>) -> u64 {
        (now.num_seconds_from_midnight() as u64) * 1000 + (now.timestamp_subsec_millis() as u64)
    }

    /// `isInRange` (spec 4.1, "Range semantics").
    pub fn is_in_range(&self,now: &chrono::DateTime<chrono::Utc>) -> bool {
        if self.days.is_empty() {
            return false;
        }

        let wm = Self::weekly_ms(Self::weekday_of(now),Self::time_of_day_ms(now));

        match self.kind {
            Kind::Weekly => {
                let min = Self::weekly_ms(self.days[0],self.start_ms);
                let max = Self::weekly_ms(*self.days.last().unwrap(),self.end_ms);
                if !self.reverse {
                    wm >= min && wm <= max
                }
                else {
                    wm <= min || wm >= max
                }
            },
            Kind::Daily => {
                for &day in &self.days {
                    if !self.reverse {
                        let lo = Self::weekly_ms(day,self.start_ms);
                        let hi = Self::weekly_ms(day,self.end_ms);
                        if wm >= lo && wm <= hi {
                            return true;
                        }
                    }
                    else {
                        //Crosses midnight into day+1 (spec 4.1: "[d+start, (d+1)+end]").
                        let lo = Self::weekly_ms(day,self.start_ms);
                        let hi = day as u64 * DAY_MS + DAY_MS + self.end_ms;
                        if wm >= lo && wm <= hi {
                            return true;
                        }
                        //The (d+1) segment may wrap past the end of the week (d==6); check the
                        //next-cycle alias of wm too.
                        if wm + WEEK_MS >= lo && wm + WEEK_MS <= hi {
                            return true;
                        }
                    }
                }
                false
            },
        }
    }

    pub fn should_auto_eod(&self) -> bool {
        self.auto_eod
    }

    pub fn should_auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    pub fn should_auto_connect(&self) -> bool {
        self.auto_connect
    }

    pub fn should_auto_disconnect(&self) -> bool {
        self.auto_disconnect
    }

    pub fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32,mo: u32,d: u32,h: u32,mi: u32,s: u32) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(y,mo,d,h,mi,s).unwrap()
    }

    #[test]
    fn null_schedule_is_always_out_of_range() {
        let schedule = Schedule::null();
        assert!(!schedule.is_in_range(&utc(2024,1,1,12,0,0)));
        assert!(!schedule.should_auto_eod());
        assert!(!schedule.should_auto_reconnect());
        assert!(!schedule.should_auto_connect());
        assert!(!schedule.should_auto_disconnect());
    }

    #[test]
    fn daily_normal_window() {
        //Monday (1) 09:00-17:00.
        let schedule = Schedule::parse("D|1|09:00|17:00|AutoEOD|AutoReconnect|30|AutoConnect|AutoDisconnect").unwrap();
        assert!(schedule.is_in_range(&utc(2024,1,1,12,0,0))); //Monday noon
        assert!(!schedule.is_in_range(&utc(2024,1,1,8,0,0))); //before window
        assert!(!schedule.is_in_range(&utc(2024,1,2,12,0,0))); //Tuesday
    }

    #[test]
    fn daily_reverse_crosses_midnight() {
        //Friday (5) 22:00 through Saturday 06:00 -- reverse because end < start.
        let schedule = Schedule::parse("D|5|22:00|06:00|NoAutoEOD|NoAutoReconnect|0|NoAutoConnect|NoAutoDisconnect").unwrap();
        assert!(schedule.is_in_range(&utc(2024,1,5,23,0,0))); //Friday 23:00
        assert!(schedule.is_in_range(&utc(2024,1,6,2,0,0))); //Saturday 02:00, next-day segment
        assert!(!schedule.is_in_range(&utc(2024,1,5,12,0,0))); //Friday noon, outside
    }

    #[test]
    fn weekly_reverse_is_the_complement() {
        //Weekly Mon-Fri 09:00-17:00 reverse means outside business hours across the week.
        let schedule = Schedule::parse("W|1,2,3,4,5|17:00|09:00|AutoEOD|AutoReconnect|30|AutoConnect|AutoDisconnect").unwrap();
        assert!(schedule.is_in_range(&utc(2024,1,1,6,0,0))); //Monday early morning
        assert!(!schedule.is_in_range(&utc(2024,1,3,12,0,0))); //Wednesday noon, inside business hours
    }

    #[test]
    fn rejects_wrong_element_count() {
        assert!(matches!(Schedule::parse("W|1|09:00|17:00"),Err(ConfigError::ScheduleElementCount(_))));
    }

    #[test]
    fn pads_five_character_time() {
        let schedule = Schedule::parse("D|0|09:00|17:00|AutoEOD|AutoReconnect|0|AutoConnect|AutoDisconnect").unwrap();
        assert!(schedule.is_in_range(&utc(2023,12,31,9,0,0))); //Sunday
    }
}
