//! When to scan, with which filters, and which discovered devices get a session.

use log::{debug, warn};
use uuid::Uuid;

use crate::error::NativeError;
use crate::native::NativeCentral;
use crate::{DiscoveredPeripheral, ManagerState};

/// What to do after the radio state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerAction {
    /// Start a forced scan with the last used filters.
    Scan,
    Nothing,
}

/// Whether a discovered device gets a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDecision {
    Add,
    Skip,
}

/// Application hooks consulted by the dispatcher.
pub trait ScanPolicy: Send + 'static {
    fn on_state_changed(&mut self, state: ManagerState) -> ManagerAction;

    fn on_discovered(&mut self, peripheral: &DiscoveredPeripheral) -> ScanDecision;
}

/// Scans as soon as the radio is powered on and keeps every device it finds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScanPolicy;

impl ScanPolicy for DefaultScanPolicy {
    fn on_state_changed(&mut self, state: ManagerState) -> ManagerAction {
        match state {
            ManagerState::PoweredOn => ManagerAction::Scan,
            _ => ManagerAction::Nothing,
        }
    }

    fn on_discovered(&mut self, _: &DiscoveredPeripheral) -> ScanDecision {
        ScanDecision::Add
    }
}

/// Parameters of one scan request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanOptions {
    /// Only report devices advertising one of these services; `None` reports all.
    pub services: Option<Vec<Uuid>>,
    pub allow_duplicates: bool,
    /// Stop a running scan before starting this one.
    pub force: bool,
    /// Ignore `services` and scan with the filters of the last scan.
    pub reuse_last_filters: bool,
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_services(mut self, services: impl IntoIterator<Item = Uuid>) -> Self {
        self.services = Some(services.into_iter().collect());
        self
    }

    pub fn with_allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_reuse_last_filters(mut self, reuse: bool) -> Self {
        self.reuse_last_filters = reuse;
        self
    }
}

/// Tracks the scan state and the filters to reuse.
#[derive(Debug, Default)]
pub(crate) struct Scanner {
    last_filters: Option<Vec<Uuid>>,
    scanning: bool,
}

impl Scanner {
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn last_filters(&self) -> Option<&[Uuid]> {
        self.last_filters.as_deref()
    }

    pub fn scan(
        &mut self,
        options: &ScanOptions,
        native: &mut dyn NativeCentral,
    ) -> Result<(), NativeError> {
        if options.force && self.scanning {
            self.stop(native);
        }
        if !options.reuse_last_filters {
            self.last_filters = options.services.clone();
        }
        let filters = if options.reuse_last_filters {
            self.last_filters.as_deref()
        } else {
            options.services.as_deref()
        };
        debug!("scanning with filters {filters:?}");
        match native.scan(filters, options.allow_duplicates) {
            Ok(()) => {
                self.scanning = true;
                Ok(())
            }
            Err(e) => {
                warn!("native stack refused to scan: {e}");
                Err(e)
            }
        }
    }

    pub fn stop(&mut self, native: &mut dyn NativeCentral) {
        native.stop_scan();
        self.scanning = false;
    }

    /// The radio went away; any scan is over.
    pub fn reset(&mut self) {
        self.scanning = false;
    }
}
