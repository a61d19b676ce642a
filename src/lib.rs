//! Serialized request/response access to one GATT characteristic per BLE peripheral.
//!
//! Commands are encoded into hex payloads ([`request`], [`codec`]), queued per device
//! with at most one operation in flight and a deadline each ([`Scheduler`]), and only
//! run once the peripheral session has connected, discovered the configured service
//! and characteristic and enabled notifications ([`PeripheralSession`]).
//!
//! The platform's Bluetooth stack is reached through [`NativeCentral`] and reports
//! back with [`NativeEvent`]s. All state lives in a [`Dispatcher`], which is owned
//! by an [`EventLoop`] future that can be spawned on any executor:
//!
//! ```no_run
//! # use gatt_wrapper::*;
//! # fn demo<N: NativeCentral>(native: N, settings: PeripheralSettings) {
//! let (central, native_events, event_loop) =
//!     central(native, DefaultScanPolicy, CentralConfig::default());
//! // spawn `event_loop.run()`, hand `native_events` to the platform shim, then:
//! # let _ = (native_events, event_loop);
//! # let _ = futures_lite::future::block_on(async {
//! central.connect("AA:BB:CC:DD:EE:FF", settings).await?;
//! let status: u16 = central
//!     .query("AA:BB:CC:DD:EE:FF", &0x10u8, None, Priority::Normal)
//!     .await?;
//! # let _ = status;
//! # Ok::<(), Error>(())
//! # });
//! # }
//! ```

pub use central::{central, Central, CentralConfig, EventLoop, NativeEvents};
pub use characteristic::CharacteristicHandle;
pub use dispatcher::{CentralEvent, Dispatcher, Observer};
pub use error::Error;
pub use native::{NativeCentral, NativeEvent};
pub use registry::SessionRegistry;
pub use request::{Command, Request, Shifted, Value};
pub use scan::{DefaultScanPolicy, ManagerAction, ScanDecision, ScanOptions, ScanPolicy};
pub use scheduler::{OperationId, Scheduler, UnitState, DEFAULT_OPERATION_TIMEOUT};
pub use service::ServiceHandle;
pub use session::{ConnectionCompletion, PeripheralSession};

/// Convenience alias for a result with [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

pub use uuid::Uuid;
pub mod codec;
pub mod error;
pub mod request;
mod types;
pub use types::*;

mod async_util;
mod central;
mod characteristic;
mod dispatcher;
mod native;
mod registry;
mod scan;
mod scheduler;
mod service;
mod session;

#[cfg(test)]
mod test_util;
