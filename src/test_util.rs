//! Recording native stack and completion collectors shared by the unit tests.

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::characteristic::CharacteristicHandle;
use crate::error::{ConnectionError, NativeError, ReadError, WriteError};
use crate::native::NativeCentral;
use crate::request::{Request, Typed};
use crate::service::ServiceHandle;
use crate::session::ConnectionCompletion;
use crate::{ConnectionState, DeviceId};

pub const SERV: Uuid = Uuid::from_u128(0x0000fff0_0000_1000_8000_00805f9b34fb);
pub const CHAR: Uuid = Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb);

pub fn service(dev: &str) -> ServiceHandle {
    ServiceHandle::new(dev.into(), SERV, 0x10)
}

pub fn characteristic(dev: &str) -> CharacteristicHandle {
    CharacteristicHandle::new(service(dev), CHAR, 0x12)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Scan(Option<Vec<Uuid>>),
    StopScan,
    Connect(DeviceId),
    Disconnect(DeviceId),
    DiscoverServices(DeviceId),
    DiscoverCharacteristics(DeviceId, Uuid),
    SetNotify(DeviceId, Uuid, bool),
    Write(DeviceId, Vec<u8>),
    Read(DeviceId),
}

#[derive(Clone, Default)]
pub struct RecordingNative {
    calls: Arc<Mutex<Vec<Call>>>,
    reject_io: Arc<Mutex<Option<NativeError>>>,
}

impl RecordingNative {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Reads and writes issued from now on are refused with `error`.
    pub fn reject_io(&self, error: NativeError) {
        *self.reject_io.lock().unwrap() = Some(error);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn io_result(&self) -> Result<(), NativeError> {
        match self.reject_io.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl NativeCentral for RecordingNative {
    fn scan(&mut self, services: Option<&[Uuid]>, _: bool) -> Result<(), NativeError> {
        self.record(Call::Scan(services.map(<[Uuid]>::to_vec)));
        Ok(())
    }

    fn stop_scan(&mut self) {
        self.record(Call::StopScan);
    }

    fn connect(&mut self, device: &DeviceId) -> Result<(), NativeError> {
        self.record(Call::Connect(device.clone()));
        Ok(())
    }

    fn disconnect(&mut self, device: &DeviceId) {
        self.record(Call::Disconnect(device.clone()));
    }

    fn discover_services(&mut self, device: &DeviceId) -> Result<(), NativeError> {
        self.record(Call::DiscoverServices(device.clone()));
        Ok(())
    }

    fn discover_characteristics(
        &mut self,
        device: &DeviceId,
        service: &ServiceHandle,
    ) -> Result<(), NativeError> {
        self.record(Call::DiscoverCharacteristics(device.clone(), service.uuid()));
        Ok(())
    }

    fn set_notify(
        &mut self,
        device: &DeviceId,
        characteristic: &CharacteristicHandle,
        enabled: bool,
    ) -> Result<(), NativeError> {
        self.record(Call::SetNotify(device.clone(), characteristic.uuid(), enabled));
        Ok(())
    }

    fn write_value(
        &mut self,
        device: &DeviceId,
        _: &CharacteristicHandle,
        value: &[u8],
    ) -> Result<(), NativeError> {
        self.record(Call::Write(device.clone(), value.to_vec()));
        self.io_result()
    }

    fn read_value(&mut self, device: &DeviceId, _: &CharacteristicHandle) -> Result<(), NativeError> {
        self.record(Call::Read(device.clone()));
        self.io_result()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Write(Result<(), WriteError>),
    Read(Result<Vec<u8>, ReadError>),
}

/// Collects every completion fired, tagged with the command that produced it.
#[derive(Clone, Default)]
pub struct Outcomes {
    connections: Arc<Mutex<Vec<Result<ConnectionState, ConnectionError>>>>,
    resolved: Arc<Mutex<Vec<(u8, Outcome)>>>,
}

impl Outcomes {
    pub fn connection(&self) -> ConnectionCompletion {
        let sink = self.connections.clone();
        Box::new(move |res| sink.lock().unwrap().push(res))
    }

    pub fn connections(&self) -> Vec<Result<ConnectionState, ConnectionError>> {
        self.connections.lock().unwrap().clone()
    }

    pub fn write(&self, tag: u8) -> Request {
        let sink = self.resolved.clone();
        Request::write(&tag, None, move |res| {
            sink.lock().unwrap().push((tag, Outcome::Write(res)))
        })
    }

    pub fn read(&self, tag: u8) -> Request {
        let sink = self.resolved.clone();
        Request::read(&tag, Typed::<Vec<u8>>::new(), move |res| {
            sink.lock().unwrap().push((tag, Outcome::Read(res)))
        })
    }

    pub fn query(&self, tag: u8) -> Request {
        let sink = self.resolved.clone();
        Request::query(&tag, None, Typed::<Vec<u8>>::new(), move |res| {
            sink.lock().unwrap().push((tag, Outcome::Read(res)))
        })
    }

    pub fn resolved(&self) -> Vec<(u8, Outcome)> {
        self.resolved.lock().unwrap().clone()
    }

    pub fn tags(&self) -> Vec<u8> {
        self.resolved().into_iter().map(|(tag, _)| tag).collect()
    }
}
