use uuid::Uuid;

use super::service::ServiceHandle;
use super::DeviceId;

/// A GATT characteristic reported by the native stack during characteristic discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle {
    service: ServiceHandle,
    char_id: Uuid,
    handle: u16,
}

impl CharacteristicHandle {
    pub fn new(service: ServiceHandle, char_id: Uuid, handle: u16) -> Self {
        Self {
            service,
            char_id,
            handle,
        }
    }

    /// The [Uuid] identifying the type of this GATT characteristic.
    pub fn uuid(&self) -> Uuid {
        self.char_id
    }

    /// The service this characteristic belongs to.
    pub fn service(&self) -> &ServiceHandle {
        &self.service
    }

    pub fn device_id(&self) -> &DeviceId {
        self.service.device_id()
    }

    pub fn handle(&self) -> u16 {
        self.handle
    }

    /// Returns the first characteristic of type `uuid` that belongs to `service`.
    pub(crate) fn select<'a>(
        chars: &'a [CharacteristicHandle],
        service: &ServiceHandle,
        uuid: Uuid,
    ) -> Option<&'a CharacteristicHandle> {
        chars
            .iter()
            .find(|ch| ch.uuid() == uuid && ch.service() == service)
    }
}
