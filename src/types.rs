use std::collections::HashMap;

use uuid::Uuid;

/// A platform-specific device identifier.
///
/// Two sessions for the same physical device compare equal and hash identically,
/// because both only look at this value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DeviceId(pub(crate) String);

impl DeviceId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Connection state of a peripheral session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    /// The configured characteristic is discovered and notifications are requested.
    Connected,
}

/// Identifiers a connection must resolve before operations may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralSettings {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl PeripheralSettings {
    pub fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }
}

/// State of the local Bluetooth radio as reported by the native stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ManagerState {
    #[default]
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

/// Advertisement fields delivered with a discovery.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdvertisementData {
    pub local_name: Option<String>,
    pub manufacturer_data: Option<(u16, Vec<u8>)>,
    pub services: Vec<Uuid>,
    pub service_data: HashMap<Uuid, Vec<u8>>,
    pub tx_power_level: Option<i16>,
    pub is_connectable: bool,
}

/// A device reported by a scan, handed to the scan policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeripheral {
    pub id: DeviceId,
    pub name: Option<String>,
    pub advertisement: AdvertisementData,
    pub rssi: i16,
}

/// Position a submitted operation takes in its device queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    #[default]
    Normal,
    /// Goes in front of every pending normal operation, after earlier expedited ones.
    Expedited,
}

/// Which completion slot of a request is eligible to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Read,
    Write,
}
