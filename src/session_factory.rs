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

//! Builds a `Session` from a settings dictionary (spec 2, "SessionFactory"; spec 4.5,
//! "Construction"; spec 6, "Session settings keys consumed"). Mirrors the original
//! `SessionFactory::create`: `ConnectionType` picks initiator/acceptor, the dictionary paths are
//! loaded and cached by path, and the remaining keys are applied as overrides on top of the
//! `Session` defaults set by `Session::new`.

use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use crate::application::Application;
use crate::dictionary::{self,DataDictionary};
use crate::errors::ConfigError;
use crate::responder::Responder;
use crate::schedule::Schedule;
use crate::session::{Session,SessionId};
use crate::store::MessageStore;
use crate::validation_rules::ValidationRules;

pub const CONNECTION_TYPE: &str = "ConnectionType";
pub const SESSION_QUALIFIER: &str = "SessionQualifier";
pub const USE_DATA_DICTIONARY: &str = "UseDataDictionary";
pub const DEFAULT_APPL_VER_ID: &str = "DefaultApplVerID";
pub const TRANSPORT_DATA_DICTIONARY: &str = "TransportDataDictionary";
pub const APP_DATA_DICTIONARY: &str = "AppDataDictionary";
pub const DATA_DICTIONARY: &str = "DataDictionary";
pub const HEART_BT_INT: &str = "HeartBtInt";
pub const SCHEDULE: &str = "Schedule";
pub const CHECK_COMP_ID: &str = "CheckCompID";
pub const CHECK_LATENCY: &str = "CheckLatency";
pub const MAX_LATENCY: &str = "MaxLatency";
pub const LOGON_TIMEOUT: &str = "LogonTimeout";
pub const LOGOUT_TIMEOUT: &str = "LogoutTimeout";
pub const REFRESH_ON_LOGON: &str = "RefreshOnLogon";
pub const MILLISECONDS_IN_TIMESTAMP: &str = "MillisecondsInTimeStamp";
pub const PERSIST_MESSAGES: &str = "PersistMessages";
pub const VALIDATE_LENGTH_AND_CHECKSUM: &str = "ValidateLengthAndChecksum";
pub const VALIDATE: &str = "Validate";
pub const VALIDATE_FIELDS_OUT_OF_ORDER: &str = "ValidateFieldsOutOfOrder";
pub const VALIDATE_FIELDS_HAVE_VALUES: &str = "ValidateFieldsHaveValues";
pub const VALIDATE_USER_DEFINED_FIELDS: &str = "ValidateUserDefinedFields";
pub const VALIDATE_BOUNDS: &str = "ValidateBounds";
pub const ALLOWED_FIELDS: &str = "AllowedFields";
pub const VALIDATION_RULES: &str = "ValidationRules";
pub const SEND_REDUNDANT_RESEND_REQUESTS: &str = "SendRedundantResendRequests";

/// A thin typed wrapper over the `HashMap<String,String>` settings dictionary, keyed exactly as
/// listed in spec 6 (SPEC_FULL D). Values are stored as strings the way the original `Dictionary`
/// stores them; the `*_int`/`*_bool` accessors parse on read instead of at insert time.
#[derive(Clone,Debug,Default)]
pub struct SessionSettings {
    values: HashMap<String,String>,
}

impl SessionSettings {
    pub fn new() -> SessionSettings {
        SessionSettings{values: HashMap::new()}
    }

    pub fn set(&mut self,key: impl Into<String>,value: impl Into<String>) -> &mut SessionSettings {
        self.values.insert(key.into(),value.into());
        self
    }

    pub fn has(&self,key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_string(&self,key: &str) -> Result<&str,ConfigError> {
        self.values.get(key).map(String::as_str).ok_or_else(|| ConfigError::MissingSetting(key.to_string()))
    }

    pub fn get_string_opt(&self,key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_bool(&self,key: &str) -> Result<bool,ConfigError> {
        let raw = self.get_string(key)?;
        match raw {
            "Y" | "y" | "true" | "1" => Ok(true),
            "N" | "n" | "false" | "0" => Ok(false),
            _ => Err(ConfigError::InvalidSetting(key.to_string(),raw.to_string())),
        }
    }

    pub fn get_u32(&self,key: &str) -> Result<u32,ConfigError> {
        let raw = self.get_string(key)?;
        raw.parse().map_err(|_| ConfigError::InvalidSetting(key.to_string(),raw.to_string()))
    }

    /// Keys beginning with `AppDataDictionary` -- either the bare key (single app version) or
    /// `AppDataDictionary.<qualifier>` (one per ApplVerID a FIXT session might negotiate).
    fn app_data_dictionary_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.values.keys()
            .map(String::as_str)
            .filter(|key| *key == APP_DATA_DICTIONARY || key.starts_with("AppDataDictionary."))
            .collect();
        keys.sort();
        keys
    }
}

/// Builds `Session`s from `SessionSettings`, caching loaded `DataDictionary`s by file path so
/// multiple sessions sharing a dictionary file parse the XML once (spec 4.5, "Construction";
/// mirrors the original factory's `m_dictionaries` cache).
#[derive(Debug,Default)]
pub struct SessionFactory {
    dictionaries: HashMap<String,DataDictionary>,
}

impl SessionFactory {
    pub fn new() -> SessionFactory {
        SessionFactory{dictionaries: HashMap::new()}
    }

    fn load_dictionary(&mut self,path: &str) -> Result<DataDictionary,ConfigError> {
        if let Some(cached) = self.dictionaries.get(path) {
            return Ok(cached.clone());
        }

        let xml = fs::read_to_string(path).map_err(|e| ConfigError::MalformedXml(format!("{}: {}",path,e)))?;
        let loaded = dictionary::xml::load(&xml)?;
        self.dictionaries.insert(path.to_string(),loaded.clone());
        Ok(loaded)
    }

    /// `connectionType` read as `initiate: bool`; rejects anything other than "acceptor" or
    /// "initiator", and rejects `SessionQualifier` on an acceptor (spec 4.5; original
    /// `SessionFactory::create`).
    fn read_connection_type(settings: &SessionSettings) -> Result<bool,ConfigError> {
        let connection_type = settings.get_string(CONNECTION_TYPE)?;
        let initiate = match connection_type {
            "initiator" => true,
            "acceptor" => false,
            other => return Err(ConfigError::InvalidSetting(CONNECTION_TYPE.to_string(),other.to_string())),
        };
        if !initiate && settings.has(SESSION_QUALIFIER) {
            return Err(ConfigError::InvalidSetting(SESSION_QUALIFIER.to_string(),"cannot be used with an acceptor".to_string()));
        }
        Ok(initiate)
    }

    fn read_schedule(settings: &SessionSettings) -> Result<Schedule,ConfigError> {
        match settings.get_string_opt(SCHEDULE) {
            Some(descriptor) => Schedule::parse(descriptor),
            None => Ok(Schedule::null()),
        }
    }

    fn read_validation_rules(settings: &SessionSettings) -> Result<ValidationRules,ConfigError> {
        let mut rules = ValidationRules::strict();
        if let Some(descriptor) = settings.get_string_opt(ALLOWED_FIELDS) {
            rules.set_allowed_fields(descriptor)?;
        }
        if let Some(descriptor) = settings.get_string_opt(VALIDATION_RULES) {
            rules.set_validation_rules(descriptor)?;
        }
        Ok(rules)
    }

    /// Loads the transport and application dictionaries (spec 4.5; spec 3, "FIXT separates
    /// session and application dictionaries"). For a FIXT `SessionId`, `TransportDataDictionary`
    /// backs the session layer and the first matching `AppDataDictionary[.qualifier]` backs the
    /// application layer; for every other `BeginString` a single `DataDictionary` entry backs
    /// both.
    fn read_dictionaries(&mut self,session_id: &SessionId,settings: &SessionSettings) -> Result<(DataDictionary,DataDictionary),ConfigError> {
        if !settings.has(USE_DATA_DICTIONARY) || settings.get_bool(USE_DATA_DICTIONARY)? {
            if session_id.is_fixt() {
                let session_dd = self.load_dictionary(settings.get_string(TRANSPORT_DATA_DICTIONARY)?)?;
                let app_keys = settings.app_data_dictionary_keys();
                let app_path = app_keys.first().copied().ok_or_else(|| ConfigError::MissingSetting(APP_DATA_DICTIONARY.to_string()))?;
                let app_dd = self.load_dictionary(settings.get_string(app_path)?)?;
                Ok((session_dd,app_dd))
            }
            else {
                let dd = self.load_dictionary(settings.get_string(DATA_DICTIONARY)?)?;
                Ok((dd.clone(),dd))
            }
        }
        else {
            Ok((DataDictionary::new(session_id.begin_string.clone()),DataDictionary::new(session_id.begin_string.clone())))
        }
    }

    /// Constructs a `Session` for `session_id` from `settings`, plumbing in the caller-supplied
    /// `store`, `responder`, and `application` the way the original factory's `m_application`/
    /// `m_messageStoreFactory`/`m_pLogFactory` members would -- passed explicitly here rather than
    /// stored as trait objects on the factory (spec 9, "Global session registry").
    pub fn create<A: Application,R: Responder>(
        &mut self,
        session_id: SessionId,
        settings: &SessionSettings,
        store: Box<dyn MessageStore>,
        responder: R,
        application: A,
    ) -> Result<Session<A,R>,ConfigError> {
        let initiate = Self::read_connection_type(settings)?;

        if session_id.is_fixt() && !settings.has(DEFAULT_APPL_VER_ID) {
            return Err(ConfigError::MissingSetting(DEFAULT_APPL_VER_ID.to_string()));
        }

        let (session_dd,app_dd) = self.read_dictionaries(&session_id,settings)?;
        let rules = Self::read_validation_rules(settings)?;
        let schedule = Self::read_schedule(settings)?;

        log::debug!("building session {} (initiate={})",session_id,initiate);

        let mut session = Session::new(session_id,initiate,session_dd,app_dd,rules,schedule,store,responder,application);

        if initiate {
            let heart_bt_int = settings.get_u32(HEART_BT_INT)?;
            if heart_bt_int == 0 {
                return Err(ConfigError::InvalidSetting(HEART_BT_INT.to_string(),"0".to_string()));
            }
            session.state_mut().heart_bt_int = Duration::from_secs(heart_bt_int as u64);
        }

        if settings.has(SEND_REDUNDANT_RESEND_REQUESTS) {
            session.send_redundant_resend_requests = settings.get_bool(SEND_REDUNDANT_RESEND_REQUESTS)?;
        }
        if settings.has(CHECK_COMP_ID) {
            session.check_comp_id = settings.get_bool(CHECK_COMP_ID)?;
        }
        if settings.has(CHECK_LATENCY) {
            session.check_latency = settings.get_bool(CHECK_LATENCY)?;
        }
        if settings.has(MAX_LATENCY) {
            session.max_latency = Duration::from_secs(settings.get_u32(MAX_LATENCY)? as u64);
        }
        if settings.has(LOGON_TIMEOUT) {
            session.state_mut().logon_timeout = Duration::from_secs(settings.get_u32(LOGON_TIMEOUT)? as u64);
        }
        if settings.has(LOGOUT_TIMEOUT) {
            session.state_mut().logout_timeout = Duration::from_secs(settings.get_u32(LOGOUT_TIMEOUT)? as u64);
        }
        if settings.has(REFRESH_ON_LOGON) {
            session.refresh_on_logon = settings.get_bool(REFRESH_ON_LOGON)?;
        }
        if settings.has(MILLISECONDS_IN_TIMESTAMP) {
            session.millis_in_timestamp = settings.get_bool(MILLISECONDS_IN_TIMESTAMP)?;
        }
        if settings.has(RESET_ON_LOGON_KEY) {
            session.reset_on_logon = settings.get_bool(RESET_ON_LOGON_KEY)?;
        }
        if settings.has(RESET_ON_LOGOUT_KEY) {
            session.reset_on_logout = settings.get_bool(RESET_ON_LOGOUT_KEY)?;
        }

        //PersistMessages/ValidateLengthAndChecksum/Validate/ValidateFieldsOutOfOrder/
        //ValidateFieldsHaveValues/ValidateUserDefinedFields/ValidateBounds are read but, absent a
        //wire-framing layer in this crate (spec 1, "Out of scope"), only the ones with a home on
        //`Session`/`ValidationRules` have anywhere to land; the rest are accepted for
        //compatibility with a settings file that sets every key in spec 6's list and ignored.
        for key in [PERSIST_MESSAGES,VALIDATE_LENGTH_AND_CHECKSUM,VALIDATE,VALIDATE_FIELDS_HAVE_VALUES,VALIDATE_USER_DEFINED_FIELDS,VALIDATE_BOUNDS] {
            if settings.has(key) {
                settings.get_bool(key)?;
            }
        }
        if settings.has(VALIDATE_FIELDS_OUT_OF_ORDER) {
            let _ = settings.get_bool(VALIDATE_FIELDS_OUT_OF_ORDER)?;
        }

        Ok(session)
    }
}

//Not part of spec 6's explicit key list, but needed to honor the `resetOnLogon`/`resetOnLogout`
//fields `Session::new` already exposes; named the way the rest of this module's keys are.
const RESET_ON_LOGON_KEY: &str = "ResetOnLogon";
const RESET_ON_LOGOUT_KEY: &str = "ResetOnLogout";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::NullApplication;
    use crate::responder::RecordingResponder;
    use crate::store::MemoryMessageStore;

    #[test]
    fn connection_type_must_be_acceptor_or_initiator() {
        let mut settings = SessionSettings::new();
        settings.set(CONNECTION_TYPE,"bogus");
        assert!(matches!(SessionFactory::read_connection_type(&settings),Err(ConfigError::InvalidSetting(_,_))));
    }

    #[test]
    fn session_qualifier_rejected_for_acceptor() {
        let mut settings = SessionSettings::new();
        settings.set(CONNECTION_TYPE,"acceptor");
        settings.set(SESSION_QUALIFIER,"Q1");
        assert!(SessionFactory::read_connection_type(&settings).is_err());
    }

    #[test]
    fn missing_connection_type_is_a_missing_setting_error() {
        let settings = SessionSettings::new();
        assert_eq!(SessionFactory::read_connection_type(&settings),Err(ConfigError::MissingSetting(CONNECTION_TYPE.to_string())));
    }

    #[test]
    fn missing_schedule_descriptor_yields_null_schedule() {
        let settings = SessionSettings::new();
        let schedule = SessionFactory::read_schedule(&settings).unwrap();
        assert!(schedule.is_in_range(&chrono::Utc::now()));
    }

    #[test]
    fn fixt_session_without_default_appl_ver_id_is_rejected() {
        let mut factory = SessionFactory::new();
        let mut settings = SessionSettings::new();
        settings.set(CONNECTION_TYPE,"initiator");
        settings.set(USE_DATA_DICTIONARY,"N");
        settings.set(HEART_BT_INT,"30");

        let session_id = SessionId::new("FIXT.1.1","SENDER","TARGET");
        let result = factory.create(session_id,&settings,Box::new(MemoryMessageStore::new()),RecordingResponder::default(),NullApplication);
        assert!(matches!(result,Err(ConfigError::MissingSetting(key)) if key == DEFAULT_APPL_VER_ID));
    }

    #[test]
    fn builds_initiator_session_with_no_data_dictionary() {
        let mut factory = SessionFactory::new();
        let mut settings = SessionSettings::new();
        settings.set(CONNECTION_TYPE,"initiator");
        settings.set(USE_DATA_DICTIONARY,"N");
        settings.set(HEART_BT_INT,"30");
        settings.set(CHECK_LATENCY,"N");

        let session_id = SessionId::new("FIX.4.4","SENDER","TARGET");
        let session = factory.create(session_id.clone(),&settings,Box::new(MemoryMessageStore::new()),RecordingResponder::default(),NullApplication).unwrap();
        assert_eq!(session.session_id(),&session_id);
        assert!(!session.check_latency);
        assert_eq!(session.state().heart_bt_int,Duration::from_secs(30));
    }

    #[test]
    fn zero_heart_bt_int_is_rejected_for_an_initiator() {
        let mut factory = SessionFactory::new();
        let mut settings = SessionSettings::new();
        settings.set(CONNECTION_TYPE,"initiator");
        settings.set(USE_DATA_DICTIONARY,"N");
        settings.set(HEART_BT_INT,"0");

        let session_id = SessionId::new("FIX.4.4","SENDER","TARGET");
        let result = factory.create(session_id,&settings,Box::new(MemoryMessageStore::new()),RecordingResponder::default(),NullApplication);
        assert!(result.is_err());
    }

    #[test]
    fn acceptor_does_not_require_heart_bt_int() {
        let mut factory = SessionFactory::new();
        let mut settings = SessionSettings::new();
        settings.set(CONNECTION_TYPE,"acceptor");
        settings.set(USE_DATA_DICTIONARY,"N");

        let session_id = SessionId::new("FIX.4.4","SENDER","TARGET");
        let session = factory.create(session_id,&settings,Box::new(MemoryMessageStore::new()),RecordingResponder::default(),NullApplication).unwrap();
        assert_eq!(session.state().heart_bt_int,Duration::from_secs(30)); //unchanged default
    }

    #[test]
    fn unreadable_dictionary_path_surfaces_a_config_error() {
        let mut factory = SessionFactory::new();
        let mut settings = SessionSettings::new();
        settings.set(CONNECTION_TYPE,"acceptor");
        settings.set(DATA_DICTIONARY,"/nonexistent/path/does-not-exist.xml");

        let session_id = SessionId::new("FIX.4.4","SENDER","TARGET");
        let result = factory.create(session_id,&settings,Box::new(MemoryMessageStore::new()),RecordingResponder::default(),NullApplication);
        assert!(result.is_err());
    }
}
