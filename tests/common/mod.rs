#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use gatt_wrapper::error::NativeError;
use gatt_wrapper::{
    CentralEvent, CharacteristicHandle, DeviceId, NativeCentral, NativeEvent, NativeEvents,
    PeripheralSettings, ServiceHandle, Uuid,
};

pub const SERVICE: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
pub const CHARACTERISTIC: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);
pub const DEV: &str = "C0:FF:EE:00:00:01";

pub fn settings() -> PeripheralSettings {
    PeripheralSettings::new(SERVICE, CHARACTERISTIC)
}

pub fn service(dev: &str) -> ServiceHandle {
    ServiceHandle::new(dev.into(), SERVICE, 0x0c)
}

pub fn characteristic(dev: &str) -> CharacteristicHandle {
    CharacteristicHandle::new(service(dev), CHARACTERISTIC, 0x0e)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Scan(Option<Vec<Uuid>>),
    StopScan,
    Connect(DeviceId),
    Disconnect(DeviceId),
    DiscoverServices(DeviceId),
    DiscoverCharacteristics(DeviceId),
    SetNotify(DeviceId, bool),
    Write(DeviceId, Vec<u8>),
    Read(DeviceId),
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    peer: Option<NativeEvents>,
    answers: VecDeque<Vec<u8>>,
    silent: bool,
}

/// Records every outbound call. Once attached to a [`NativeEvents`] handle it
/// also answers them the way a cooperative peripheral would.
#[derive(Clone, Default)]
pub struct FakeNative {
    inner: Arc<Mutex<Inner>>,
}

impl FakeNative {
    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn io_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Write(..) | Call::Read(_)))
            .collect()
    }

    pub fn attach(&self, events: NativeEvents) {
        self.inner.lock().unwrap().peer = Some(events);
    }

    /// Value delivered after the next write or read.
    pub fn answer_with(&self, bytes: &[u8]) {
        self.inner.lock().unwrap().answers.push_back(bytes.to_vec());
    }

    /// Stops answering reads and writes.
    pub fn go_silent(&self) {
        self.inner.lock().unwrap().silent = true;
    }

    fn record(&self, call: Call) {
        self.inner.lock().unwrap().calls.push(call);
    }

    fn reply(&self, event: NativeEvent) {
        let peer = self.inner.lock().unwrap().peer.clone();
        if let Some(peer) = peer {
            peer.send(event);
        }
    }

    fn is_silent(&self) -> bool {
        self.inner.lock().unwrap().silent
    }

    fn next_answer(&self) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().answers.pop_front()
    }
}

impl NativeCentral for FakeNative {
    fn scan(&mut self, services: Option<&[Uuid]>, _: bool) -> Result<(), NativeError> {
        self.record(Call::Scan(services.map(<[Uuid]>::to_vec)));
        Ok(())
    }

    fn stop_scan(&mut self) {
        self.record(Call::StopScan);
    }

    fn connect(&mut self, device: &DeviceId) -> Result<(), NativeError> {
        self.record(Call::Connect(device.clone()));
        self.reply(NativeEvent::Connected {
            device: device.clone(),
        });
        Ok(())
    }

    fn disconnect(&mut self, device: &DeviceId) {
        self.record(Call::Disconnect(device.clone()));
        self.reply(NativeEvent::Disconnected {
            device: device.clone(),
            error: None,
        });
    }

    fn discover_services(&mut self, device: &DeviceId) -> Result<(), NativeError> {
        self.record(Call::DiscoverServices(device.clone()));
        self.reply(NativeEvent::ServicesDiscovered {
            device: device.clone(),
            services: vec![service(device.as_str())],
            error: None,
        });
        Ok(())
    }

    fn discover_characteristics(
        &mut self,
        device: &DeviceId,
        service: &ServiceHandle,
    ) -> Result<(), NativeError> {
        self.record(Call::DiscoverCharacteristics(device.clone()));
        self.reply(NativeEvent::CharacteristicsDiscovered {
            device: device.clone(),
            service: service.clone(),
            characteristics: vec![characteristic(device.as_str())],
            error: None,
        });
        Ok(())
    }

    fn set_notify(
        &mut self,
        device: &DeviceId,
        _: &CharacteristicHandle,
        enabled: bool,
    ) -> Result<(), NativeError> {
        self.record(Call::SetNotify(device.clone(), enabled));
        Ok(())
    }

    fn write_value(
        &mut self,
        device: &DeviceId,
        _: &CharacteristicHandle,
        value: &[u8],
    ) -> Result<(), NativeError> {
        self.record(Call::Write(device.clone(), value.to_vec()));
        if self.is_silent() {
            return Ok(());
        }
        self.reply(NativeEvent::WriteAck {
            device: device.clone(),
            error: None,
        });
        if let Some(answer) = self.next_answer() {
            self.reply(NativeEvent::ValueUpdate {
                device: device.clone(),
                value: Some(answer),
                error: None,
            });
        }
        Ok(())
    }

    fn read_value(&mut self, device: &DeviceId, _: &CharacteristicHandle) -> Result<(), NativeError> {
        self.record(Call::Read(device.clone()));
        if !self.is_silent() {
            self.reply(NativeEvent::ValueUpdate {
                device: device.clone(),
                value: self.next_answer(),
                error: None,
            });
        }
        Ok(())
    }
}

/// Observer sink collecting every published event.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<CentralEvent>>>);

impl Events {
    pub fn sink(&self) -> impl FnMut(&CentralEvent) + Send + 'static {
        let events = self.0.clone();
        move |event| events.lock().unwrap().push(event.clone())
    }

    pub fn all(&self) -> Vec<CentralEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn connection_states(&self) -> Vec<gatt_wrapper::ConnectionState> {
        self.all()
            .into_iter()
            .filter_map(|event| match event {
                CentralEvent::ConnectionStateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }
}

/// Collects completion results of any type.
#[derive(Clone)]
pub struct Slot<T>(Arc<Mutex<Vec<T>>>);

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }
}

impl<T: Clone + Send + 'static> Slot<T> {
    pub fn completion(&self) -> impl FnOnce(T) + Send + 'static {
        let slot = self.0.clone();
        move |value| slot.lock().unwrap().push(value)
    }

    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}
