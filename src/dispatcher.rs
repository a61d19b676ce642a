//! The synchronous core: routes caller commands and native events to the
//! sessions, the scheduler and the scan state.
//!
//! Every method takes `&mut self`, so whoever owns the [`Dispatcher`] is the
//! single serializing context. [`crate::EventLoop`] is the usual owner; tests
//! and custom runtimes may drive it directly with their own clock.

use std::time::Instant;

use log::{debug, info, trace, warn};

use crate::central::CentralConfig;
use crate::error::NativeError;
use crate::native::{NativeCentral, NativeEvent};
use crate::registry::SessionRegistry;
use crate::request::Request;
use crate::scan::{ManagerAction, ScanDecision, ScanOptions, ScanPolicy, Scanner};
use crate::scheduler::{OperationId, Scheduler};
use crate::session::{ConnectionCompletion, PeripheralSession};
use crate::{ConnectionState, DeviceId, DiscoveredPeripheral, ManagerState, PeripheralSettings, Priority};

/// Structured events handed to the observer sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralEvent {
    ManagerStateChanged(ManagerState),
    /// A discovered device the scan policy kept.
    DeviceDiscovered(DiscoveredPeripheral),
    ConnectionStateChanged {
        device: DeviceId,
        state: ConnectionState,
    },
    /// A value update no read was waiting for.
    Notification {
        device: DeviceId,
        value: Vec<u8>,
    },
    OperationTimedOut {
        device: DeviceId,
        operation: OperationId,
    },
}

/// Observer sink; called on the serializing context.
pub type Observer = Box<dyn FnMut(&CentralEvent) + Send + 'static>;

pub struct Dispatcher<N: NativeCentral> {
    native: N,
    registry: SessionRegistry,
    scheduler: Scheduler,
    scanner: Scanner,
    policy: Box<dyn ScanPolicy>,
    manager_state: ManagerState,
    observer: Observer,
}

impl<N: NativeCentral> Dispatcher<N> {
    pub fn new(
        native: N,
        policy: impl ScanPolicy,
        config: &CentralConfig,
        observer: impl FnMut(&CentralEvent) + Send + 'static,
    ) -> Self {
        Self {
            native,
            registry: SessionRegistry::new(),
            scheduler: Scheduler::new(config.operation_timeout),
            scanner: Scanner::default(),
            policy: Box::new(policy),
            manager_state: ManagerState::Unknown,
            observer: Box::new(observer),
        }
    }

    pub fn native(&self) -> &N {
        &self.native
    }

    pub fn native_mut(&mut self) -> &mut N {
        &mut self.native
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn session(&self, device: &DeviceId) -> Option<&PeripheralSession> {
        self.registry.get(device)
    }

    pub fn state(&self, device: &DeviceId) -> ConnectionState {
        self.registry.state(device)
    }

    pub fn manager_state(&self) -> ManagerState {
        self.manager_state
    }

    /// `false` only after the native stack reported `Unauthorized`.
    pub fn is_authorized(&self) -> bool {
        self.manager_state != ManagerState::Unauthorized
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Starts a connection cycle. A session is created if the device was never discovered.
    pub fn connect(
        &mut self,
        device: &DeviceId,
        settings: PeripheralSettings,
        completion: ConnectionCompletion,
    ) {
        if self.registry.get(device).is_none() {
            debug!("connecting to undiscovered device {device}");
            self.registry.get_or_insert(device);
        }
        self.with_session(device, |session, native| {
            session.connect(settings, completion, native)
        });
    }

    /// Cancels the device's operations and tears the link down.
    /// Returns `false` if the device had no connected or connecting session.
    pub fn disconnect(&mut self, device: &DeviceId) -> bool {
        self.scheduler.on_disconnected(device);
        self.with_session(device, |session, native| session.disconnect(native))
            .unwrap_or(false)
    }

    pub fn submit(
        &mut self,
        device: &DeviceId,
        request: Request,
        priority: Priority,
        now: Instant,
    ) -> Option<OperationId> {
        self.scheduler
            .submit(&self.registry, &mut self.native, device, request, priority, now)
    }

    pub fn cancel_all(&mut self, device: &DeviceId) -> usize {
        self.scheduler.cancel_all(device)
    }

    pub fn scan(&mut self, options: &ScanOptions) -> Result<(), NativeError> {
        self.scanner.scan(options, &mut self.native)
    }

    pub fn stop_scan(&mut self) {
        self.scanner.stop(&mut self.native);
    }

    /// Applies one native event.
    pub fn handle_native(&mut self, event: NativeEvent, now: Instant) {
        trace!("native event {event:?}");
        match event {
            NativeEvent::StateChanged(state) => self.on_state_changed(state),
            NativeEvent::Discovered {
                device,
                name,
                advertisement,
                rssi,
            } => {
                let peripheral = DiscoveredPeripheral {
                    id: device,
                    name,
                    advertisement,
                    rssi,
                };
                if self.policy.on_discovered(&peripheral) == ScanDecision::Skip {
                    return;
                }
                if self
                    .registry
                    .insert(peripheral.id.clone(), peripheral.name.clone())
                {
                    debug!("new session for {}", peripheral.id);
                }
                self.emit(CentralEvent::DeviceDiscovered(peripheral));
            }
            NativeEvent::Connected { device } => {
                self.with_session(&device, |session, native| session.on_connected(native));
            }
            NativeEvent::FailedToConnect { device, error } => {
                self.with_session(&device, |session, _| session.on_failed_to_connect(error));
            }
            NativeEvent::Disconnected { device, error } => {
                self.scheduler.on_disconnected(&device);
                self.with_session(&device, |session, _| session.on_disconnected(error));
            }
            NativeEvent::ServicesDiscovered {
                device,
                services,
                error,
            } => {
                self.with_session(&device, |session, native| {
                    session.on_services_discovered(&services, error, native)
                });
            }
            NativeEvent::CharacteristicsDiscovered {
                device,
                service,
                characteristics,
                error,
            } => {
                self.with_session(&device, |session, native| {
                    session.on_characteristics_discovered(&service, &characteristics, error, native)
                });
            }
            NativeEvent::WriteAck { device, error } => {
                self.scheduler
                    .on_write_ack(&self.registry, &mut self.native, &device, error, now);
            }
            NativeEvent::ValueUpdate {
                device,
                value,
                error,
            } => {
                let notification = self.scheduler.on_value_update(
                    &self.registry,
                    &mut self.native,
                    &device,
                    value,
                    error,
                    now,
                );
                if let Some(value) = notification {
                    self.emit(CentralEvent::Notification { device, value });
                }
            }
        }
    }

    /// Times out expired operations; call when [`Dispatcher::next_deadline`] passes.
    pub fn poll_timeouts(&mut self, now: Instant) {
        let expired = self
            .scheduler
            .poll_timeouts(&self.registry, &mut self.native, now);
        for (device, operation) in expired {
            self.emit(CentralEvent::OperationTimedOut { device, operation });
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Cancels every queue, fails pending connections with `ConnectionFailed(None)`,
    /// disconnects live links and drops every session.
    pub fn shutdown(&mut self) {
        let devices: Vec<DeviceId> = self.registry.ids().cloned().collect();
        for device in &devices {
            self.scheduler.on_disconnected(device);
            self.with_session(device, |session, native| session.close(native));
        }
        if self.scanner.is_scanning() {
            self.scanner.stop(&mut self.native);
        }
        let dropped = self.registry.drain().len();
        info!("dispatcher shut down, {dropped} session(s) dropped");
    }

    fn on_state_changed(&mut self, state: ManagerState) {
        info!("manager state changed to {state:?}");
        self.manager_state = state;
        if state != ManagerState::PoweredOn {
            self.scanner.reset();
        }
        self.emit(CentralEvent::ManagerStateChanged(state));
        if self.policy.on_state_changed(state) == ManagerAction::Scan {
            let options = ScanOptions::new()
                .with_force(true)
                .with_reuse_last_filters(true);
            if let Err(e) = self.scan(&options) {
                warn!("automatic scan failed: {e}");
            }
        }
    }

    /// Runs `f` on the session of `device`, reporting a connection state change if it made one.
    fn with_session<R>(
        &mut self,
        device: &DeviceId,
        f: impl FnOnce(&mut PeripheralSession, &mut dyn NativeCentral) -> R,
    ) -> Option<R> {
        let Some(session) = self.registry.get_mut(device) else {
            debug!("no session for {device}, event ignored");
            return None;
        };
        let before = session.state();
        let result = f(session, &mut self.native);
        let after = session.state();
        if before != after {
            self.emit(CentralEvent::ConnectionStateChanged {
                device: device.clone(),
                state: after,
            });
        }
        Some(result)
    }

    fn emit(&mut self, event: CentralEvent) {
        (self.observer)(&event);
    }
}

impl<N: NativeCentral> std::fmt::Debug for Dispatcher<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("manager_state", &self.manager_state)
            .field("registry", &self.registry)
            .field("scanning", &self.scanner.is_scanning())
            .finish_non_exhaustive()
    }
}
