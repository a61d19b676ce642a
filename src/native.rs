//! The narrow interface to the platform's Bluetooth stack.
//!
//! The platform shim implements [`NativeCentral`] for outbound requests and
//! reports everything that happens as [`NativeEvent`]s, which are processed one
//! at a time on the event loop.

use uuid::Uuid;

use crate::characteristic::CharacteristicHandle;
use crate::error::NativeError;
use crate::service::ServiceHandle;
use crate::{AdvertisementData, DeviceId, ManagerState};

/// Outbound requests to the native stack.
///
/// An `Err` means the request was not accepted at all; the outcome of an
/// accepted request arrives later as a [`NativeEvent`].
pub trait NativeCentral: Send + 'static {
    fn scan(&mut self, services: Option<&[Uuid]>, allow_duplicates: bool) -> Result<(), NativeError>;

    fn stop_scan(&mut self);

    fn connect(&mut self, device: &DeviceId) -> Result<(), NativeError>;

    fn disconnect(&mut self, device: &DeviceId);

    fn discover_services(&mut self, device: &DeviceId) -> Result<(), NativeError>;

    fn discover_characteristics(
        &mut self,
        device: &DeviceId,
        service: &ServiceHandle,
    ) -> Result<(), NativeError>;

    fn set_notify(
        &mut self,
        device: &DeviceId,
        characteristic: &CharacteristicHandle,
        enabled: bool,
    ) -> Result<(), NativeError>;

    /// Write with response; acknowledged by [`NativeEvent::WriteAck`].
    fn write_value(
        &mut self,
        device: &DeviceId,
        characteristic: &CharacteristicHandle,
        value: &[u8],
    ) -> Result<(), NativeError>;

    /// Answered by [`NativeEvent::ValueUpdate`].
    fn read_value(
        &mut self,
        device: &DeviceId,
        characteristic: &CharacteristicHandle,
    ) -> Result<(), NativeError>;
}

/// Inbound events from the native stack, in the order the stack emits them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEvent {
    StateChanged(ManagerState),
    Discovered {
        device: DeviceId,
        name: Option<String>,
        advertisement: AdvertisementData,
        rssi: i16,
    },
    Connected {
        device: DeviceId,
    },
    FailedToConnect {
        device: DeviceId,
        error: Option<NativeError>,
    },
    Disconnected {
        device: DeviceId,
        error: Option<NativeError>,
    },
    ServicesDiscovered {
        device: DeviceId,
        services: Vec<ServiceHandle>,
        error: Option<NativeError>,
    },
    CharacteristicsDiscovered {
        device: DeviceId,
        service: ServiceHandle,
        characteristics: Vec<CharacteristicHandle>,
        error: Option<NativeError>,
    },
    WriteAck {
        device: DeviceId,
        error: Option<NativeError>,
    },
    ValueUpdate {
        device: DeviceId,
        value: Option<Vec<u8>>,
        error: Option<NativeError>,
    },
}

impl NativeEvent {
    /// The device the event is about, if any.
    pub fn device(&self) -> Option<&DeviceId> {
        match self {
            NativeEvent::StateChanged(_) => None,
            NativeEvent::Discovered { device, .. }
            | NativeEvent::Connected { device }
            | NativeEvent::FailedToConnect { device, .. }
            | NativeEvent::Disconnected { device, .. }
            | NativeEvent::ServicesDiscovered { device, .. }
            | NativeEvent::CharacteristicsDiscovered { device, .. }
            | NativeEvent::WriteAck { device, .. }
            | NativeEvent::ValueUpdate { device, .. } => Some(device),
        }
    }
}
