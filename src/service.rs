use uuid::Uuid;

use super::DeviceId;

/// A GATT service reported by the native stack during service discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceHandle {
    dev_id: DeviceId,
    service_id: Uuid,
    handle: u16,
}

impl ServiceHandle {
    /// `handle` is the native stack's own reference to the service (its start
    /// attribute handle on most platforms); it tells apart two instances of one [Uuid].
    pub fn new(dev_id: DeviceId, service_id: Uuid, handle: u16) -> Self {
        Self {
            dev_id,
            service_id,
            handle,
        }
    }

    /// The [Uuid] identifying the type of this GATT service.
    pub fn uuid(&self) -> Uuid {
        self.service_id
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.dev_id
    }

    pub fn handle(&self) -> u16 {
        self.handle
    }

    /// Returns the first service of type `uuid`.
    pub(crate) fn select(services: &[ServiceHandle], uuid: Uuid) -> Option<&ServiceHandle> {
        services.iter().find(|serv| serv.uuid() == uuid)
    }
}
