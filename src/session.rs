//! Per-device connection and discovery state machine.
//!
//! A session goes `Disconnected -> Connecting -> Connected`, and only reaches
//! `Connected` once the configured service and characteristic are discovered
//! and notifications are requested. Operations are gated on that state.

use log::{debug, info, warn};

use crate::characteristic::CharacteristicHandle;
use crate::error::{ConnectionError, NativeError};
use crate::native::NativeCentral;
use crate::service::ServiceHandle;
use crate::{ConnectionState, DeviceId, PeripheralSettings};

/// Receives the outcome of one connection cycle: `Ok(Connected)`, `Ok(Disconnected)`
/// when the link went down before or after it was established, or an error.
pub type ConnectionCompletion =
    Box<dyn FnOnce(Result<ConnectionState, ConnectionError>) + Send + 'static>;

/// Where the session is within a connection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    /// Waiting for the radio link.
    Radio,
    Services,
    Characteristics,
    /// Discovery failed; still linked, waiting for the caller to retry or disconnect.
    Stalled,
    Ready,
}

pub struct PeripheralSession {
    id: DeviceId,
    name: Option<String>,
    stage: Stage,
    settings: Option<PeripheralSettings>,
    service: Option<ServiceHandle>,
    characteristic: Option<CharacteristicHandle>,
    completion: Option<ConnectionCompletion>,
}

impl PartialEq for PeripheralSession {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeripheralSession {}

impl std::hash::Hash for PeripheralSession {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for PeripheralSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut f = f.debug_struct("PeripheralSession");
        f.field("name", &self.name.as_deref().unwrap_or("(Unknown name)"));
        f.field("id", &self.id);
        f.field("state", &self.state());
        f.field("pending_connection", &self.completion.is_some());
        f.finish()
    }
}

impl PeripheralSession {
    pub fn new(id: DeviceId, name: Option<String>) -> Self {
        Self {
            id,
            name,
            stage: Stage::Idle,
            settings: None,
            service: None,
            characteristic: None,
            completion: None,
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn set_name(&mut self, name: Option<String>) {
        if name.is_some() {
            self.name = name;
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.stage {
            Stage::Idle => ConnectionState::Disconnected,
            Stage::Radio | Stage::Services | Stage::Characteristics | Stage::Stalled => {
                ConnectionState::Connecting
            }
            Stage::Ready => ConnectionState::Connected,
        }
    }

    pub fn settings(&self) -> Option<&PeripheralSettings> {
        self.settings.as_ref()
    }

    pub fn service(&self) -> Option<&ServiceHandle> {
        self.service.as_ref()
    }

    /// The characteristic operations run against; `None` unless connected.
    pub fn characteristic(&self) -> Option<&CharacteristicHandle> {
        match self.stage {
            Stage::Ready => self.characteristic.as_ref(),
            _ => None,
        }
    }

    pub fn has_pending_connection(&self) -> bool {
        self.completion.is_some()
    }

    /// Starts (or restarts) a connection cycle. The completion replaces any
    /// pending one: the most recent caller wins.
    pub fn connect(
        &mut self,
        settings: PeripheralSettings,
        completion: ConnectionCompletion,
        native: &mut dyn NativeCentral,
    ) {
        if self.stage == Stage::Ready {
            if self.settings.as_ref() != Some(&settings) {
                warn!("{} is already connected with other settings, keeping them", self.id);
            }
            completion(Ok(ConnectionState::Connected));
            return;
        }
        if self.completion.replace(completion).is_some() {
            warn!("pending connection completion of {} was superseded", self.id);
        }
        self.settings = Some(settings);
        match self.stage {
            Stage::Idle => {
                info!("connecting to {}", self.id);
                self.stage = Stage::Radio;
                if let Err(e) = native.connect(&self.id) {
                    self.stage = Stage::Idle;
                    self.resolve(Err(ConnectionError::ConnectionFailed(Some(e))));
                }
            }
            Stage::Stalled => {
                debug!("retrying discovery on {}", self.id);
                self.start_service_discovery(native);
            }
            Stage::Radio | Stage::Services | Stage::Characteristics | Stage::Ready => (),
        }
    }

    /// Explicit disconnect. Returns `false` if the session was already disconnected.
    pub fn disconnect(&mut self, native: &mut dyn NativeCentral) -> bool {
        if self.stage == Stage::Idle {
            return false;
        }
        native.disconnect(&self.id);
        self.on_disconnected(None)
    }

    /// Ends the session for good: a pending connection fails and a live link is torn down.
    pub(crate) fn close(&mut self, native: &mut dyn NativeCentral) {
        self.resolve(Err(ConnectionError::ConnectionFailed(None)));
        if self.stage != Stage::Idle {
            native.disconnect(&self.id);
            self.clear();
        }
    }

    pub fn on_connected(&mut self, native: &mut dyn NativeCentral) {
        if self.stage != Stage::Radio {
            debug!("ignored connect event for {} in {:?}", self.id, self.stage);
            return;
        }
        info!("{} connected, discovering services", self.id);
        self.start_service_discovery(native);
    }

    pub fn on_failed_to_connect(&mut self, error: Option<NativeError>) {
        if self.state() != ConnectionState::Connecting {
            debug!("ignored connect failure for {} in {:?}", self.id, self.stage);
            return;
        }
        warn!("failed to connect to {}", self.id);
        self.clear();
        self.resolve(Err(ConnectionError::ConnectionFailed(error)));
    }

    /// Returns `false` for a duplicate event (already disconnected).
    pub fn on_disconnected(&mut self, error: Option<NativeError>) -> bool {
        if self.stage == Stage::Idle {
            return false;
        }
        match error {
            Some(e) => info!("{} disconnected: {e}", self.id),
            None => info!("{} disconnected", self.id),
        }
        self.clear();
        self.resolve(Ok(ConnectionState::Disconnected));
        true
    }

    pub fn on_services_discovered(
        &mut self,
        services: &[ServiceHandle],
        error: Option<NativeError>,
        native: &mut dyn NativeCentral,
    ) {
        if self.stage != Stage::Services {
            debug!("ignored services of {} in {:?}", self.id, self.stage);
            return;
        }
        if let Some(e) = error {
            return self.stall(ConnectionError::ServiceDiscoveryFailed(Some(e)));
        }
        let Some(wanted) = self.settings.map(|s| s.service) else {
            return self.stall(ConnectionError::ServiceDiscoveryFailed(None));
        };
        let Some(service) = ServiceHandle::select(services, wanted).cloned() else {
            warn!("{} has no service {wanted}", self.id);
            return self.stall(ConnectionError::ServiceDiscoveryFailed(None));
        };
        self.stage = Stage::Characteristics;
        let result = native.discover_characteristics(&self.id, &service);
        self.service = Some(service);
        if let Err(e) = result {
            self.stall(ConnectionError::CharacteristicDiscoveryFailed(Some(e)));
        }
    }

    pub fn on_characteristics_discovered(
        &mut self,
        service: &ServiceHandle,
        characteristics: &[CharacteristicHandle],
        error: Option<NativeError>,
        native: &mut dyn NativeCentral,
    ) {
        if self.stage != Stage::Characteristics || self.service.as_ref() != Some(service) {
            debug!("ignored characteristics of {} in {:?}", self.id, self.stage);
            return;
        }
        if let Some(e) = error {
            return self.stall(ConnectionError::CharacteristicDiscoveryFailed(Some(e)));
        }
        let Some(wanted) = self.settings.map(|s| s.characteristic) else {
            return self.stall(ConnectionError::CharacteristicDiscoveryFailed(None));
        };
        let Some(characteristic) =
            CharacteristicHandle::select(characteristics, service, wanted).cloned()
        else {
            warn!("{} has no characteristic {wanted}", self.id);
            return self.stall(ConnectionError::CharacteristicDiscoveryFailed(None));
        };
        if let Err(e) = native.set_notify(&self.id, &characteristic, true) {
            return self.stall(ConnectionError::CharacteristicDiscoveryFailed(Some(e)));
        }
        info!("{} is ready on characteristic {wanted}", self.id);
        self.characteristic = Some(characteristic);
        self.stage = Stage::Ready;
        self.resolve(Ok(ConnectionState::Connected));
    }

    fn start_service_discovery(&mut self, native: &mut dyn NativeCentral) {
        self.stage = Stage::Services;
        self.service = None;
        self.characteristic = None;
        if let Err(e) = native.discover_services(&self.id) {
            self.stall(ConnectionError::ServiceDiscoveryFailed(Some(e)));
        }
    }

    fn stall(&mut self, error: ConnectionError) {
        warn!("connection to {} stalled: {error}", self.id);
        self.stage = Stage::Stalled;
        self.resolve(Err(error));
    }

    fn clear(&mut self) {
        self.stage = Stage::Idle;
        self.service = None;
        self.characteristic = None;
    }

    fn resolve(&mut self, result: Result<ConnectionState, ConnectionError>) {
        if let Some(completion) = self.completion.take() {
            completion(result);
        }
    }
}
