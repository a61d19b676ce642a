//! Serialized execution of requests against the native stack.
//!
//! Each device has its own queue with at most one operation in flight. An
//! in-flight operation finishes on the matching native event, on its deadline,
//! or when the queue is cancelled; whichever comes first resolves it and every
//! later event for it is discarded.
//!
//! Native answers carry no operation id. When an issued unit is finished early,
//! the answers it still has coming are counted per device and swallowed before
//! the next unit may take any.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::NativeError;
use crate::native::NativeCentral;
use crate::registry::SessionRegistry;
use crate::request::{Exchange, Failure, Request};
use crate::{ConnectionState, DeviceId, Priority};

/// Deadline of an operation that does not set its own.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifies a submitted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(u64);

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of an operation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    Executing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Awaiting {
    Ack,
    Value,
}

struct OperationUnit {
    id: OperationId,
    priority: Priority,
    /// Taken when the unit finishes, so the completion can only fire once.
    request: Option<Request>,
    awaiting: Awaiting,
    deadline: Option<Instant>,
}

impl OperationUnit {
    fn state(&self) -> UnitState {
        match (&self.request, self.deadline) {
            (None, _) => UnitState::Finished,
            (Some(_), Some(_)) => UnitState::Executing,
            (Some(_), None) => UnitState::Pending,
        }
    }

    fn fail(&mut self, failure: Failure) {
        if let Some(request) = self.request.take() {
            request.fail(failure);
        }
    }
}

#[derive(Default)]
struct DeviceQueue {
    pending: VecDeque<OperationUnit>,
    in_flight: Option<OperationUnit>,
    /// Acks still due to abandoned units; `true` when a query value follows a successful one.
    stale_acks: VecDeque<bool>,
    stale_values: usize,
}

impl DeviceQueue {
    fn enqueue(&mut self, unit: OperationUnit) {
        match unit.priority {
            Priority::Normal => self.pending.push_back(unit),
            Priority::Expedited => {
                let at = self
                    .pending
                    .iter()
                    .position(|pending| pending.priority == Priority::Normal)
                    .unwrap_or(self.pending.len());
                self.pending.insert(at, unit);
            }
        }
    }

    /// Takes the in-flight unit off the queue before it got its answer.
    fn abandon_in_flight(&mut self) -> Option<OperationUnit> {
        let unit = self.in_flight.take()?;
        if unit.state() == UnitState::Executing {
            match unit.awaiting {
                Awaiting::Ack => {
                    let query = matches!(
                        unit.request.as_ref().map(Request::exchange),
                        Some(Exchange::Query)
                    );
                    self.stale_acks.push_back(query);
                }
                Awaiting::Value => self.stale_values += 1,
            }
        }
        Some(unit)
    }
}

pub struct Scheduler {
    queues: HashMap<DeviceId, DeviceQueue>,
    next_id: u64,
    default_timeout: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_OPERATION_TIMEOUT)
    }
}

impl Scheduler {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            queues: HashMap::new(),
            next_id: 0,
            default_timeout,
        }
    }

    /// Queues `request` for `device`, or resolves it with `NotConnected` right away
    /// if the device session is not connected.
    pub fn submit(
        &mut self,
        registry: &SessionRegistry,
        native: &mut dyn NativeCentral,
        device: &DeviceId,
        request: Request,
        priority: Priority,
        now: Instant,
    ) -> Option<OperationId> {
        if registry.state(device) != ConnectionState::Connected {
            warn!("rejected {request:?}: {device} isn't connected");
            request.fail(Failure::NotConnected);
            return None;
        }
        let id = OperationId(self.next_id);
        self.next_id += 1;
        debug!("queued {id} for {device}: {request:?}");
        let unit = OperationUnit {
            id,
            priority,
            request: Some(request),
            awaiting: Awaiting::Ack,
            deadline: None,
        };
        self.queues.entry(device.clone()).or_default().enqueue(unit);
        self.advance(registry, native, device, now);
        Some(id)
    }

    /// Starts the next pending unit of `device` if nothing is in flight.
    fn advance(
        &mut self,
        registry: &SessionRegistry,
        native: &mut dyn NativeCentral,
        device: &DeviceId,
        now: Instant,
    ) {
        let Some(queue) = self.queues.get_mut(device) else {
            return;
        };
        while queue.in_flight.is_none() {
            let Some(mut unit) = queue.pending.pop_front() else {
                return;
            };
            let Some(request) = unit.request.as_ref() else {
                continue;
            };
            let Some(characteristic) = registry.characteristic(device) else {
                unit.fail(Failure::NotConnected);
                continue;
            };
            let timeout = request.timeout().unwrap_or(self.default_timeout);
            let issued = match request.exchange() {
                Exchange::Read => {
                    unit.awaiting = Awaiting::Value;
                    native.read_value(device, characteristic)
                }
                Exchange::Write | Exchange::Query => {
                    let bytes = match request.payload().to_bytes() {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            unit.fail(Failure::Encode(e));
                            continue;
                        }
                    };
                    unit.awaiting = Awaiting::Ack;
                    native.write_value(device, characteristic, &bytes)
                }
            };
            if let Err(e) = issued {
                warn!("native stack refused {} for {device}: {e}", unit.id);
                unit.fail(Failure::Native(Some(e)));
                continue;
            }
            debug!("executing {} on {device}", unit.id);
            unit.deadline = Some(now + timeout);
            queue.in_flight = Some(unit);
        }
    }

    /// Resolves the in-flight write (or the write half of a query) of `device`.
    pub fn on_write_ack(
        &mut self,
        registry: &SessionRegistry,
        native: &mut dyn NativeCentral,
        device: &DeviceId,
        error: Option<NativeError>,
        now: Instant,
    ) {
        if let Some(queue) = self.queues.get_mut(device) {
            if let Some(query) = queue.stale_acks.pop_front() {
                if query && error.is_none() {
                    queue.stale_values += 1;
                }
                debug!("discarded write ack for {device}: its operation already finished");
                return;
            }
        }
        let Some(unit) = self.in_flight_awaiting(device, Awaiting::Ack) else {
            debug!("discarded write ack for {device}: nothing awaits it");
            return;
        };
        let Some(request) = unit.request.take() else {
            return;
        };
        match (request.exchange(), error) {
            (Exchange::Query, None) => {
                unit.request = Some(request);
                unit.awaiting = Awaiting::Value;
                return;
            }
            (_, Some(e)) => request.fail(Failure::Native(Some(e))),
            (_, None) => request.complete_write(),
        }
        self.finish_in_flight(registry, native, device, now);
    }

    /// Resolves the in-flight read of `device`. If no read awaits a value, the
    /// update is an unsolicited notification and its bytes are handed back.
    pub fn on_value_update(
        &mut self,
        registry: &SessionRegistry,
        native: &mut dyn NativeCentral,
        device: &DeviceId,
        value: Option<Vec<u8>>,
        error: Option<NativeError>,
        now: Instant,
    ) -> Option<Vec<u8>> {
        if let Some(queue) = self.queues.get_mut(device) {
            if queue.stale_values > 0 {
                queue.stale_values -= 1;
                debug!("discarded value update for {device}: its operation already finished");
                return None;
            }
        }
        let Some(unit) = self.in_flight_awaiting(device, Awaiting::Value) else {
            if let Some(e) = error {
                debug!("discarded failed value update for {device}: {e}");
                return None;
            }
            return value;
        };
        if let Some(request) = unit.request.take() {
            request.complete_read(value, error);
        }
        self.finish_in_flight(registry, native, device, now);
        None
    }

    /// Resolves every pending and in-flight unit of `device` with `Cancelled`.
    /// Returns the number of units cancelled.
    pub fn cancel_all(&mut self, device: &DeviceId) -> usize {
        let Some(queue) = self.queues.get_mut(device) else {
            return 0;
        };
        let in_flight = queue.abandon_in_flight();
        let units: Vec<OperationUnit> = in_flight
            .into_iter()
            .chain(queue.pending.drain(..))
            .collect();
        let mut count = 0;
        for mut unit in units {
            if unit.state() != UnitState::Finished {
                unit.fail(Failure::Cancelled);
                count += 1;
            }
        }
        if count > 0 {
            debug!("cancelled {count} operation(s) of {device}");
        }
        count
    }

    /// The link to `device` is gone: cancels its units and forgets the answers
    /// they still had coming, since none will arrive.
    pub fn on_disconnected(&mut self, device: &DeviceId) -> usize {
        let count = self.cancel_all(device);
        self.queues.remove(device);
        count
    }

    /// Times out every in-flight unit whose deadline is at or before `now`, then
    /// lets the affected queues advance. Returns the timed out operations.
    pub fn poll_timeouts(
        &mut self,
        registry: &SessionRegistry,
        native: &mut dyn NativeCentral,
        now: Instant,
    ) -> Vec<(DeviceId, OperationId)> {
        let expired: Vec<DeviceId> = self
            .queues
            .iter()
            .filter(|(_, queue)| {
                queue
                    .in_flight
                    .as_ref()
                    .and_then(|unit| unit.deadline)
                    .is_some_and(|deadline| deadline <= now)
            })
            .map(|(device, _)| device.clone())
            .collect();

        let mut timed_out = Vec::with_capacity(expired.len());
        for device in expired {
            let Some(mut unit) = self
                .queues
                .get_mut(&device)
                .and_then(DeviceQueue::abandon_in_flight)
            else {
                continue;
            };
            warn!("{} on {device} timed out", unit.id);
            unit.fail(Failure::Timeout);
            timed_out.push((device.clone(), unit.id));
            self.advance(registry, native, &device, now);
        }
        timed_out
    }

    /// The earliest deadline among in-flight units.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queues
            .values()
            .filter_map(|queue| queue.in_flight.as_ref()?.deadline)
            .min()
    }

    pub fn in_flight(&self, device: &DeviceId) -> Option<OperationId> {
        Some(self.queues.get(device)?.in_flight.as_ref()?.id)
    }

    pub fn pending(&self, device: &DeviceId) -> Vec<OperationId> {
        self.queues
            .get(device)
            .map(|queue| queue.pending.iter().map(|unit| unit.id).collect())
            .unwrap_or_default()
    }

    pub fn state_of(&self, device: &DeviceId, id: OperationId) -> UnitState {
        let Some(queue) = self.queues.get(device) else {
            return UnitState::Finished;
        };
        queue
            .in_flight
            .iter()
            .chain(queue.pending.iter())
            .find(|unit| unit.id == id)
            .map(OperationUnit::state)
            .unwrap_or(UnitState::Finished)
    }

    fn in_flight_awaiting(
        &mut self,
        device: &DeviceId,
        awaiting: Awaiting,
    ) -> Option<&mut OperationUnit> {
        self.queues
            .get_mut(device)?
            .in_flight
            .as_mut()
            .filter(|unit| unit.awaiting == awaiting && unit.request.is_some())
    }

    fn finish_in_flight(
        &mut self,
        registry: &SessionRegistry,
        native: &mut dyn NativeCentral,
        device: &DeviceId,
        now: Instant,
    ) {
        if let Some(queue) = self.queues.get_mut(device) {
            if let Some(unit) = queue.in_flight.take() {
                debug!("{} on {device} finished", unit.id);
            }
        }
        self.advance(registry, native, device, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReadError, WriteError};
    use crate::test_util::{characteristic, service, Call, Outcome, Outcomes, RecordingNative};
    use crate::PeripheralSettings;

    fn connected(dev: &str, native: &mut RecordingNative) -> SessionRegistry {
        let mut registry = SessionRegistry::new();
        let session = registry.get_or_insert(&dev.into());
        let outcomes = Outcomes::default();
        session.connect(
            PeripheralSettings::new(crate::test_util::SERV, crate::test_util::CHAR),
            outcomes.connection(),
            native,
        );
        session.on_connected(native);
        session.on_services_discovered(&[service(dev)], None, native);
        session.on_characteristics_discovered(&service(dev), &[characteristic(dev)], None, native);
        registry
    }

    fn writes(native: &RecordingNative) -> Vec<Vec<u8>> {
        native
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Write(_, bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn rejects_when_not_connected() {
        let mut native = RecordingNative::default();
        let registry = SessionRegistry::new();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let id = scheduler.submit(
            &registry,
            &mut native,
            &"dev".into(),
            outcomes.read(1),
            Priority::Normal,
            Instant::now(),
        );
        assert!(id.is_none());
        assert_eq!(
            outcomes.resolved(),
            vec![(1, Outcome::Read(Err(ReadError::NotConnected)))]
        );
        assert!(native.calls().is_empty());
    }

    #[test]
    fn one_operation_in_flight_at_a_time() {
        let mut native = RecordingNative::default();
        let registry = connected("dev", &mut native);
        let dev: DeviceId = "dev".into();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let now = Instant::now();
        for tag in 1..=3 {
            scheduler.submit(&registry, &mut native, &dev, outcomes.write(tag), Priority::Normal, now);
        }
        assert_eq!(writes(&native), vec![vec![1]]);
        assert_eq!(scheduler.pending(&dev).len(), 2);

        scheduler.on_write_ack(&registry, &mut native, &dev, None, now);
        assert_eq!(writes(&native), vec![vec![1], vec![2]]);
        scheduler.on_write_ack(&registry, &mut native, &dev, None, now);
        scheduler.on_write_ack(&registry, &mut native, &dev, None, now);
        assert_eq!(outcomes.tags(), vec![1, 2, 3]);
        assert!(scheduler.in_flight(&dev).is_none());
    }

    #[test]
    fn expedited_jumps_pending_units() {
        let mut native = RecordingNative::default();
        let registry = connected("dev", &mut native);
        let dev: DeviceId = "dev".into();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let now = Instant::now();
        scheduler.submit(&registry, &mut native, &dev, outcomes.write(0), Priority::Normal, now);
        let first = scheduler
            .submit(&registry, &mut native, &dev, outcomes.write(1), Priority::Normal, now)
            .unwrap();
        let second = scheduler
            .submit(&registry, &mut native, &dev, outcomes.write(2), Priority::Expedited, now)
            .unwrap();
        assert_eq!(scheduler.state_of(&dev, first), UnitState::Pending);
        assert_eq!(scheduler.pending(&dev), vec![second, first]);

        for _ in 0..3 {
            scheduler.on_write_ack(&registry, &mut native, &dev, None, now);
        }
        assert_eq!(outcomes.tags(), vec![0, 2, 1]);
    }

    #[test]
    fn expedited_units_keep_their_submission_order() {
        let mut native = RecordingNative::default();
        let registry = connected("dev", &mut native);
        let dev: DeviceId = "dev".into();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let now = Instant::now();
        for tag in 0..2 {
            scheduler.submit(&registry, &mut native, &dev, outcomes.write(tag), Priority::Normal, now);
        }
        for tag in 2..4 {
            scheduler.submit(&registry, &mut native, &dev, outcomes.write(tag), Priority::Expedited, now);
        }
        for _ in 0..4 {
            scheduler.on_write_ack(&registry, &mut native, &dev, None, now);
        }
        assert_eq!(outcomes.tags(), vec![0, 2, 3, 1]);
        assert_eq!(writes(&native), vec![vec![0], vec![2], vec![3], vec![1]]);
    }

    #[test]
    fn timeout_resolves_and_next_unit_starts() {
        let mut native = RecordingNative::default();
        let registry = connected("dev", &mut native);
        let dev: DeviceId = "dev".into();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let start = Instant::now();
        scheduler.submit(&registry, &mut native, &dev, outcomes.read(1), Priority::Normal, start);
        scheduler.submit(&registry, &mut native, &dev, outcomes.write(2), Priority::Normal, start);
        assert_eq!(scheduler.next_deadline(), Some(start + DEFAULT_OPERATION_TIMEOUT));

        let early = scheduler.poll_timeouts(&registry, &mut native, start + Duration::from_secs(9));
        assert!(early.is_empty());

        let later = start + Duration::from_secs(10);
        let expired = scheduler.poll_timeouts(&registry, &mut native, later);
        assert_eq!(expired.len(), 1);
        assert_eq!(outcomes.resolved(), vec![(1, Outcome::Read(Err(ReadError::Timeout)))]);
        assert_eq!(writes(&native), vec![vec![2]]);
        assert_eq!(scheduler.next_deadline(), Some(later + DEFAULT_OPERATION_TIMEOUT));

        // the answer to the timed out read arrives late
        let note = scheduler.on_value_update(&registry, &mut native, &dev, Some(vec![9]), None, later);
        assert_eq!(note, None);
        assert_eq!(outcomes.resolved().len(), 1);

        scheduler.on_write_ack(&registry, &mut native, &dev, None, later);
        assert_eq!(outcomes.tags(), vec![1, 2]);
    }

    #[test]
    fn late_ack_of_timed_out_write_is_not_given_to_the_next_one() {
        let mut native = RecordingNative::default();
        let registry = connected("dev", &mut native);
        let dev: DeviceId = "dev".into();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let start = Instant::now();
        scheduler.submit(&registry, &mut native, &dev, outcomes.write(1), Priority::Normal, start);
        scheduler.submit(&registry, &mut native, &dev, outcomes.write(2), Priority::Normal, start);
        let later = start + DEFAULT_OPERATION_TIMEOUT;
        scheduler.poll_timeouts(&registry, &mut native, later);

        scheduler.on_write_ack(&registry, &mut native, &dev, None, later);
        assert_eq!(outcomes.resolved(), vec![(1, Outcome::Write(Err(WriteError::Timeout)))]);
        assert!(scheduler.in_flight(&dev).is_some());

        scheduler.on_write_ack(&registry, &mut native, &dev, None, later);
        assert_eq!(
            outcomes.resolved(),
            vec![
                (1, Outcome::Write(Err(WriteError::Timeout))),
                (2, Outcome::Write(Ok(()))),
            ]
        );
    }

    #[test]
    fn late_answers_of_a_timed_out_query_are_discarded() {
        let mut native = RecordingNative::default();
        let registry = connected("dev", &mut native);
        let dev: DeviceId = "dev".into();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let start = Instant::now();
        scheduler.submit(&registry, &mut native, &dev, outcomes.query(1), Priority::Normal, start);
        scheduler.submit(&registry, &mut native, &dev, outcomes.read(2), Priority::Normal, start);
        let later = start + DEFAULT_OPERATION_TIMEOUT;
        scheduler.poll_timeouts(&registry, &mut native, later);

        // ack and answer of the query, then the answer of the read
        scheduler.on_write_ack(&registry, &mut native, &dev, None, later);
        scheduler.on_value_update(&registry, &mut native, &dev, Some(vec![0xaa]), None, later);
        scheduler.on_value_update(&registry, &mut native, &dev, Some(vec![0xbb]), None, later);

        assert_eq!(
            outcomes.resolved(),
            vec![
                (1, Outcome::Read(Err(ReadError::Timeout))),
                (2, Outcome::Read(Ok(vec![0xbb]))),
            ]
        );
    }

    #[test]
    fn late_ack_of_cancelled_write_is_discarded() {
        let mut native = RecordingNative::default();
        let registry = connected("dev", &mut native);
        let dev: DeviceId = "dev".into();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let now = Instant::now();
        scheduler.submit(&registry, &mut native, &dev, outcomes.write(1), Priority::Normal, now);
        scheduler.cancel_all(&dev);
        scheduler.submit(&registry, &mut native, &dev, outcomes.write(2), Priority::Normal, now);

        let refused = NativeError::StatusCode(3);
        scheduler.on_write_ack(&registry, &mut native, &dev, Some(refused), now);
        assert_eq!(outcomes.resolved(), vec![(1, Outcome::Write(Err(WriteError::Cancelled)))]);

        scheduler.on_write_ack(&registry, &mut native, &dev, None, now);
        assert_eq!(outcomes.resolved()[1], (2, Outcome::Write(Ok(()))));
    }

    #[test]
    fn disconnect_forgets_answers_still_due() {
        let mut native = RecordingNative::default();
        let registry = connected("dev", &mut native);
        let dev: DeviceId = "dev".into();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let now = Instant::now();
        scheduler.submit(&registry, &mut native, &dev, outcomes.read(1), Priority::Normal, now);
        assert_eq!(scheduler.on_disconnected(&dev), 1);

        scheduler.submit(&registry, &mut native, &dev, outcomes.read(2), Priority::Normal, now);
        scheduler.on_value_update(&registry, &mut native, &dev, Some(vec![5]), None, now);
        assert_eq!(outcomes.resolved()[1], (2, Outcome::Read(Ok(vec![5]))));
    }

    #[test]
    fn late_timeout_after_native_answer_is_a_no_op() {
        let mut native = RecordingNative::default();
        let registry = connected("dev", &mut native);
        let dev: DeviceId = "dev".into();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let now = Instant::now();
        scheduler.submit(&registry, &mut native, &dev, outcomes.write(1), Priority::Normal, now);
        scheduler.on_write_ack(&registry, &mut native, &dev, None, now);
        scheduler.on_write_ack(&registry, &mut native, &dev, None, now);
        let expired = scheduler.poll_timeouts(&registry, &mut native, now + Duration::from_secs(60));

        assert!(expired.is_empty());
        assert_eq!(outcomes.resolved(), vec![(1, Outcome::Write(Ok(())))]);
    }

    #[test]
    fn per_request_timeout_overrides_default() {
        let mut native = RecordingNative::default();
        let registry = connected("dev", &mut native);
        let dev: DeviceId = "dev".into();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let now = Instant::now();
        let request = outcomes.write(1).with_timeout(Duration::from_millis(250));
        scheduler.submit(&registry, &mut native, &dev, request, Priority::Normal, now);
        assert_eq!(scheduler.next_deadline(), Some(now + Duration::from_millis(250)));
    }

    #[test]
    fn query_writes_then_waits_for_the_value() {
        let mut native = RecordingNative::default();
        let registry = connected("dev", &mut native);
        let dev: DeviceId = "dev".into();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let now = Instant::now();
        scheduler.submit(&registry, &mut native, &dev, outcomes.query(7), Priority::Normal, now);
        assert_eq!(writes(&native), vec![vec![7]]);

        scheduler.on_write_ack(&registry, &mut native, &dev, None, now);
        assert!(outcomes.resolved().is_empty());
        let id = scheduler.in_flight(&dev).unwrap();
        assert_eq!(scheduler.state_of(&dev, id), UnitState::Executing);

        scheduler.on_value_update(&registry, &mut native, &dev, Some(vec![1, 2]), None, now);
        assert_eq!(outcomes.resolved(), vec![(7, Outcome::Read(Ok(vec![1, 2])))]);
    }

    #[test]
    fn failed_query_write_fails_the_read() {
        let mut native = RecordingNative::default();
        let registry = connected("dev", &mut native);
        let dev: DeviceId = "dev".into();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let now = Instant::now();
        scheduler.submit(&registry, &mut native, &dev, outcomes.query(7), Priority::Normal, now);
        let cause = NativeError::StatusCode(3);
        scheduler.on_write_ack(&registry, &mut native, &dev, Some(cause.clone()), now);
        assert_eq!(
            outcomes.resolved(),
            vec![(7, Outcome::Read(Err(ReadError::Read(Some(cause)))))]
        );
    }

    #[test]
    fn refused_native_call_resolves_and_moves_on() {
        let mut native = RecordingNative::default();
        let registry = connected("dev", &mut native);
        let dev: DeviceId = "dev".into();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let now = Instant::now();
        native.reject_io(NativeError::Platform("busy".into()));
        scheduler.submit(&registry, &mut native, &dev, outcomes.write(1), Priority::Normal, now);
        scheduler.submit(&registry, &mut native, &dev, outcomes.read(2), Priority::Normal, now);

        assert_eq!(
            outcomes.resolved(),
            vec![
                (
                    1,
                    Outcome::Write(Err(WriteError::Write(Some(NativeError::Platform(
                        "busy".into()
                    )))))
                ),
                (
                    2,
                    Outcome::Read(Err(ReadError::Read(Some(NativeError::Platform(
                        "busy".into()
                    )))))
                ),
            ]
        );
        assert!(scheduler.in_flight(&dev).is_none());
    }

    #[test]
    fn cancel_all_resolves_everything_once() {
        let mut native = RecordingNative::default();
        let registry = connected("dev", &mut native);
        let dev: DeviceId = "dev".into();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let now = Instant::now();
        scheduler.submit(&registry, &mut native, &dev, outcomes.read(1), Priority::Normal, now);
        scheduler.submit(&registry, &mut native, &dev, outcomes.write(2), Priority::Normal, now);

        assert_eq!(scheduler.cancel_all(&dev), 2);
        assert_eq!(scheduler.cancel_all(&dev), 0);
        scheduler.on_value_update(&registry, &mut native, &dev, Some(vec![1]), None, now);
        scheduler.poll_timeouts(&registry, &mut native, now + Duration::from_secs(60));

        assert_eq!(
            outcomes.resolved(),
            vec![
                (1, Outcome::Read(Err(ReadError::Cancelled))),
                (2, Outcome::Write(Err(WriteError::Cancelled))),
            ]
        );
    }

    #[test]
    fn invalid_payload_is_an_encoding_failure() {
        let mut native = RecordingNative::default();
        let registry = connected("dev", &mut native);
        let dev: DeviceId = "dev".into();
        let outcomes = Outcomes::default();
        let mut scheduler = Scheduler::default();
        let request = Request::write(&0x01u8, Some(crate::request::Value::hex("123")), |res| {
            assert!(matches!(res, Err(WriteError::Parse(_))));
        });
        scheduler.submit(&registry, &mut native, &dev, request, Priority::Normal, Instant::now());
        scheduler.submit(&registry, &mut native, &dev, outcomes.write(2), Priority::Normal, Instant::now());
        assert_eq!(writes(&native), vec![vec![2]]);
    }
}
