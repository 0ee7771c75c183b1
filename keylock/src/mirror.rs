//! The wireless status service, modelled as three characteristics behind one service.

use crate::config::ServiceConfig;
use crate::controller::LockState;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Characteristic {
    State,
    Username,
    Password,
}

impl Characteristic {
    pub const ALL: [Characteristic; 3] = [
        Characteristic::State,
        Characteristic::Username,
        Characteristic::Password,
    ];

    pub fn is_writable(self) -> bool {
        !matches!(self, Characteristic::State)
    }

    pub fn uuid(self, service: &ServiceConfig) -> &str {
        match self {
            Characteristic::State => &service.state_uuid,
            Characteristic::Username => &service.username_uuid,
            Characteristic::Password => &service.password_uuid,
        }
    }
}

impl Display for Characteristic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            Characteristic::State => "state",
            Characteristic::Username => "username",
            Characteristic::Password => "password",
        };
        write!(f, "{}", str)
    }
}

#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub enum MirrorError {
    #[error("the {0} characteristic is read-only")]
    ReadOnly(Characteristic),
    #[error("empty value written to the {0} characteristic")]
    EmptyValue(Characteristic),
    #[error("status mirror poisoned")]
    Poisoned,
}

/// How many audit entries are kept. Older entries are dropped first.
pub const AUDIT_CAPACITY: usize = 64;

/// One accepted write.
#[derive(Clone, Debug, PartialEq)]
pub struct AuditEntry {
    pub at: OffsetDateTime,
    pub characteristic: Characteristic,
    pub value: String,
}

impl Display for AuditEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let at = self.at.format(&Rfc3339).map_err(|_| std::fmt::Error)?;
        write!(f, "[{}] {} = {:?}", at, self.characteristic, self.value)
    }
}

#[derive(Debug)]
struct Fields {
    state: String,
    username: String,
    password: String,
}

#[derive(Debug)]
pub struct StatusMirror {
    service: ServiceConfig,
    fields: Mutex<Fields>,
    audit: Mutex<VecDeque<AuditEntry>>,
    advertising_starts: AtomicUsize,
}

impl StatusMirror {
    /// Sets up the service and starts advertising.
    pub fn new(service: ServiceConfig, username: &str, password: &str) -> Self {
        info!(
            "Status service {} up as {:?}.",
            service.service_uuid, service.device_name
        );
        let mirror = Self {
            service,
            fields: Mutex::new(Fields {
                state: String::new(),
                username: username.to_string(),
                password: password.to_string(),
            }),
            audit: Mutex::new(VecDeque::with_capacity(AUDIT_CAPACITY)),
            advertising_starts: AtomicUsize::new(0),
        };
        mirror.start_advertising();
        mirror
    }

    fn fields(&self) -> Result<MutexGuard<'_, Fields>, MirrorError> {
        self.fields.lock().map_err(|_| MirrorError::Poisoned)
    }

    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    /// Refreshes the state characteristic.
    pub fn publish(&self, state: LockState, candidate: &str) {
        match self.fields() {
            Ok(mut fields) => fields.state = state.status_text(candidate),
            Err(e) => warn!("Couldn't publish state: {}", e),
        }
    }

    pub fn read(&self, characteristic: Characteristic) -> Result<String, MirrorError> {
        let fields = self.fields()?;
        Ok(match characteristic {
            Characteristic::State => fields.state.clone(),
            Characteristic::Username => fields.username.clone(),
            Characteristic::Password => fields.password.clone(),
        })
    }

    /// Handles a write from a connected client.
    ///
    /// # Errors
    /// - `MirrorError::ReadOnly` for the state characteristic.
    /// - `MirrorError::EmptyValue` for an empty value, which leaves the field as it was.
    pub fn write(&self, characteristic: Characteristic, value: &str) -> Result<(), MirrorError> {
        if !characteristic.is_writable() {
            return Err(MirrorError::ReadOnly(characteristic));
        }
        if value.is_empty() {
            return Err(MirrorError::EmptyValue(characteristic));
        }

        {
            let mut fields = self.fields()?;
            match characteristic {
                Characteristic::Username => fields.username = value.to_string(),
                Characteristic::Password => fields.password = value.to_string(),
                Characteristic::State => return Err(MirrorError::ReadOnly(characteristic)),
            }
        }

        let entry = AuditEntry {
            at: OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
            characteristic,
            value: value.to_string(),
        };
        info!("New {}: {}", characteristic, value);
        let mut audit = self.audit.lock().map_err(|_| MirrorError::Poisoned)?;
        if audit.len() == AUDIT_CAPACITY {
            audit.pop_front();
        }
        audit.push_back(entry);
        Ok(())
    }

    pub fn password(&self) -> Result<String, MirrorError> {
        self.read(Characteristic::Password)
    }

    pub fn username(&self) -> Result<String, MirrorError> {
        self.read(Characteristic::Username)
    }

    /// The most recent accepted writes, oldest first.
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit
            .lock()
            .map(|a| a.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn on_connect(&self) {
        info!("Client connected.");
        self.start_advertising();
    }

    pub fn on_disconnect(&self) {
        info!("Client disconnected.");
        self.start_advertising();
    }

    /// How many times advertising was (re)started.
    pub fn advertising_starts(&self) -> usize {
        self.advertising_starts.load(Ordering::Relaxed)
    }

    fn start_advertising(&self) {
        let count = self.advertising_starts.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Advertising {:?} (start #{}).", self.service.device_name, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirror() -> StatusMirror {
        StatusMirror::new(ServiceConfig::default(), "", "1234")
    }

    #[test]
    fn state_is_read_only() {
        let mirror = mirror();
        mirror.publish(LockState::Active, "12");
        assert_eq!(mirror.read(Characteristic::State).unwrap(), "ACTIVE : '12'");
        assert_eq!(
            mirror.write(Characteristic::State, "DEFUSED"),
            Err(MirrorError::ReadOnly(Characteristic::State))
        );
        assert_eq!(mirror.read(Characteristic::State).unwrap(), "ACTIVE : '12'");
    }

    #[test]
    fn writes_update_fields_and_audit() {
        let mirror = mirror();
        mirror.write(Characteristic::Password, "9999").unwrap();
        mirror.write(Characteristic::Username, "alice").unwrap();
        assert_eq!(mirror.password().unwrap(), "9999");
        assert_eq!(mirror.username().unwrap(), "alice");

        let log = mirror.audit_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].characteristic, Characteristic::Password);
        assert_eq!(log[1].value, "alice");
        assert!(log[1].to_string().ends_with("username = \"alice\""));
    }

    #[test]
    fn audit_keeps_the_latest_writes() {
        let mirror = mirror();
        for i in 0..AUDIT_CAPACITY + 6 {
            mirror.write(Characteristic::Password, &i.to_string()).unwrap();
        }
        let log = mirror.audit_log();
        assert_eq!(log.len(), AUDIT_CAPACITY);
        assert_eq!(log[0].value, "6");
        assert_eq!(log[AUDIT_CAPACITY - 1].value, (AUDIT_CAPACITY + 5).to_string());
    }

    #[test]
    fn empty_writes_are_ignored() {
        let mirror = mirror();
        assert_eq!(
            mirror.write(Characteristic::Password, ""),
            Err(MirrorError::EmptyValue(Characteristic::Password))
        );
        assert_eq!(mirror.password().unwrap(), "1234");
        assert!(mirror.audit_log().is_empty());
    }

    #[test]
    fn connections_restart_advertising() {
        let mirror = mirror();
        assert_eq!(mirror.advertising_starts(), 1);
        mirror.on_connect();
        mirror.on_disconnect();
        assert_eq!(mirror.advertising_starts(), 3);
    }

    #[test]
    fn uuids_follow_the_service() {
        let service = ServiceConfig::default();
        assert_eq!(
            Characteristic::Password.uuid(&service),
            "19B10013-E8F2-537E-4F6C-D104768A1214"
        );
        assert!(Characteristic::ALL.iter().filter(|c| c.is_writable()).count() == 2);
    }
}
