use std::collections::HashMap;

use crate::characteristic::CharacteristicHandle;
use crate::session::PeripheralSession;
use crate::{ConnectionState, DeviceId};

/// Owns every [`PeripheralSession`], keyed by device identifier.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<DeviceId, PeripheralSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &DeviceId) -> Option<&PeripheralSession> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &DeviceId) -> Option<&mut PeripheralSession> {
        self.sessions.get_mut(id)
    }

    /// Adds a session for `id` unless one exists; an existing session is never replaced.
    /// Returns `true` if a session was added.
    pub fn insert(&mut self, id: DeviceId, name: Option<String>) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                session.set_name(name);
                false
            }
            None => {
                self.sessions
                    .insert(id.clone(), PeripheralSession::new(id, name));
                true
            }
        }
    }

    pub fn get_or_insert(&mut self, id: &DeviceId) -> &mut PeripheralSession {
        self.sessions
            .entry(id.clone())
            .or_insert_with(|| PeripheralSession::new(id.clone(), None))
    }

    /// `Disconnected` for unknown devices.
    pub fn state(&self, id: &DeviceId) -> ConnectionState {
        self.sessions
            .get(id)
            .map(PeripheralSession::state)
            .unwrap_or_default()
    }

    pub fn characteristic(&self, id: &DeviceId) -> Option<&CharacteristicHandle> {
        self.sessions.get(id)?.characteristic()
    }

    pub fn ids(&self) -> impl Iterator<Item = &DeviceId> + '_ {
        self.sessions.keys()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Removes every session and returns them.
    pub fn drain(&mut self) -> Vec<PeripheralSession> {
        self.sessions.drain().map(|(_, session)| session).collect()
    }
}
