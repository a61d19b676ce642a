use std::time::{Duration, Instant};

use async_broadcast::{InactiveReceiver, Receiver};
use async_channel::Sender;
use futures_core::Stream;
use futures_lite::StreamExt;
use log::{debug, info, warn};

use crate::async_util::{oneshot, recv_until, StreamUntil, Wake};
use crate::dispatcher::{CentralEvent, Dispatcher};
use crate::error::{ConnectionError, ErrorKind, ReadError, WriteError};
use crate::native::{NativeCentral, NativeEvent};
use crate::request::{Command, Failure, Parse, Request, Typed, Value};
use crate::scan::{ScanOptions, ScanPolicy};
use crate::scheduler::DEFAULT_OPERATION_TIMEOUT;
use crate::session::ConnectionCompletion;
use crate::{ConnectionState, DeviceId, PeripheralSettings, Priority, Result};

/// Settings of a [`Central`] and its [`EventLoop`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CentralConfig {
    /// Deadline of operations that do not set their own.
    pub operation_timeout: Duration,
    /// Buffer size of the [`Central::events`] channel; the oldest events are dropped on overflow.
    pub event_capacity: usize,
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            event_capacity: 64,
        }
    }
}

impl CentralConfig {
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

enum Message {
    Native(NativeEvent),
    Connect {
        device: DeviceId,
        settings: PeripheralSettings,
        completion: ConnectionCompletion,
    },
    Disconnect(DeviceId),
    Submit {
        device: DeviceId,
        request: Request,
        priority: Priority,
    },
    CancelAll(DeviceId),
    Scan(ScanOptions),
    StopScan,
    State {
        device: DeviceId,
        reply: Box<dyn FnOnce(ConnectionState) + Send>,
    },
    Authorized(Box<dyn FnOnce(bool) + Send>),
}

impl Message {
    /// Resolves whatever completion the message carries; the loop is gone.
    fn reject(self) {
        match self {
            Message::Connect { completion, .. } => {
                completion(Err(ConnectionError::ConnectionFailed(None)))
            }
            Message::Submit { request, .. } => request.fail(Failure::Cancelled),
            Message::Native(event) => debug!("event loop stopped, dropped {event:?}"),
            _ => debug!("event loop stopped, command dropped"),
        }
    }
}

/// Creates the handles of a central and the loop that serves them.
///
/// The [`EventLoop`] must be spawned on an executor; it ends once every
/// [`Central`] and [`NativeEvents`] handle is dropped, or after [`Central::shutdown`].
pub fn central<N: NativeCentral>(
    native: N,
    policy: impl ScanPolicy,
    config: CentralConfig,
) -> (Central, NativeEvents, EventLoop<N>) {
    let (sender, receiver) = async_channel::unbounded();
    let (mut events_tx, events_rx) = async_broadcast::broadcast(config.event_capacity.max(1));
    events_tx.set_overflow(true);
    events_tx.set_await_active(false);
    let observer = move |event: &CentralEvent| {
        let _ = events_tx.try_broadcast(event.clone());
    };
    let dispatcher = Dispatcher::new(native, policy, &config, observer);
    let central = Central {
        sender: sender.clone(),
        events: events_rx.deactivate(),
    };
    (
        central,
        NativeEvents { sender },
        EventLoop {
            dispatcher,
            receiver,
        },
    )
}

/// Cloneable handle for callers.
#[derive(Clone)]
pub struct Central {
    sender: Sender<Message>,
    events: InactiveReceiver<CentralEvent>,
}

impl std::fmt::Debug for Central {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Central")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl Central {
    /// Starts connecting to `device`; `completion` receives the outcome of the cycle.
    pub fn connect_with(
        &self,
        device: impl Into<DeviceId>,
        settings: PeripheralSettings,
        completion: impl FnOnce(std::result::Result<ConnectionState, ConnectionError>) + Send + 'static,
    ) {
        self.send(Message::Connect {
            device: device.into(),
            settings,
            completion: Box::new(completion),
        });
    }

    /// Connects to `device` and waits until it is ready for operations.
    pub async fn connect(
        &self,
        device: impl Into<DeviceId>,
        settings: PeripheralSettings,
    ) -> Result<ConnectionState> {
        let (complete, outcome) = oneshot::<std::result::Result<ConnectionState, ConnectionError>>();
        self.connect_with(device, settings, complete);
        Ok(outcome.recv().await.ok_or(ErrorKind::Cancelled)??)
    }

    /// Cancels the queued operations of `device` and disconnects it.
    pub fn disconnect(&self, device: impl Into<DeviceId>) {
        self.send(Message::Disconnect(device.into()));
    }

    pub fn submit(&self, device: impl Into<DeviceId>, request: Request, priority: Priority) {
        self.send(Message::Submit {
            device: device.into(),
            request,
            priority,
        });
    }

    /// Writes `command` (+ `value`) and waits for the acknowledgement.
    pub async fn write<C: Command + ?Sized>(
        &self,
        device: impl Into<DeviceId>,
        command: &C,
        value: Option<Value>,
        priority: Priority,
    ) -> Result<()> {
        let (complete, outcome) = oneshot::<std::result::Result<(), WriteError>>();
        self.submit(device, Request::write(command, value, complete), priority);
        Ok(outcome.recv().await.ok_or(ErrorKind::Cancelled)??)
    }

    /// Reads the characteristic and parses the value as the answer to `command`.
    pub async fn read<T, C>(&self, device: impl Into<DeviceId>, command: &C, priority: Priority) -> Result<T>
    where
        T: Parse + Send + 'static,
        C: Command + ?Sized,
    {
        let (complete, outcome) = oneshot::<std::result::Result<T, ReadError>>();
        let request = Request::read(command, Typed::<T>::new(), complete);
        self.submit(device, request, priority);
        Ok(outcome.recv().await.ok_or(ErrorKind::Cancelled)??)
    }

    /// Writes `command` (+ `value`) and parses the next value update as its answer.
    pub async fn query<T, C>(
        &self,
        device: impl Into<DeviceId>,
        command: &C,
        value: Option<Value>,
        priority: Priority,
    ) -> Result<T>
    where
        T: Parse + Send + 'static,
        C: Command + ?Sized,
    {
        let (complete, outcome) = oneshot::<std::result::Result<T, ReadError>>();
        let request = Request::query(command, value, Typed::<T>::new(), complete);
        self.submit(device, request, priority);
        Ok(outcome.recv().await.ok_or(ErrorKind::Cancelled)??)
    }

    pub fn cancel_all(&self, device: impl Into<DeviceId>) {
        self.send(Message::CancelAll(device.into()));
    }

    pub fn scan(&self, options: ScanOptions) {
        self.send(Message::Scan(options));
    }

    pub fn stop_scan(&self) {
        self.send(Message::StopScan);
    }

    /// `Disconnected` for unknown devices, or if the loop has stopped.
    pub async fn state(&self, device: impl Into<DeviceId>) -> ConnectionState {
        let (complete, outcome) = oneshot::<ConnectionState>();
        self.send(Message::State {
            device: device.into(),
            reply: Box::new(complete),
        });
        outcome.recv().await.unwrap_or_default()
    }

    pub async fn is_authorized(&self) -> Result<bool> {
        let (complete, outcome) = oneshot::<bool>();
        self.send(Message::Authorized(Box::new(complete)));
        Ok(outcome.recv().await.ok_or(ErrorKind::Cancelled)?)
    }

    /// Structured events published by the loop from now on.
    pub fn events(&self) -> Receiver<CentralEvent> {
        self.events.activate_cloned()
    }

    /// Values notified by `device` while no read waits for them. Ends when the device disconnects.
    pub fn notifications(&self, device: impl Into<DeviceId>) -> impl Stream<Item = Vec<u8>> + Send + Unpin {
        let device = device.into();
        let watched = device.clone();
        let values = self.events().filter_map(move |event| match event {
            CentralEvent::Notification { device: from, value } if from == device => Some(value),
            _ => None,
        });
        StreamUntil::create(Box::pin(values), Box::pin(self.events()), move |event: &CentralEvent| {
            matches!(
                event,
                CentralEvent::ConnectionStateChanged {
                    device,
                    state: ConnectionState::Disconnected,
                } if *device == watched
            )
        })
    }

    /// Stops the loop once the messages already sent are handled. Later commands are rejected.
    pub fn shutdown(&self) {
        self.sender.close();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn send(&self, message: Message) {
        if let Err(e) = self.sender.try_send(message) {
            warn!("event loop is not running");
            e.into_inner().reject();
        }
    }
}

/// Handle the native shim delivers inbound events through.
#[derive(Debug, Clone)]
pub struct NativeEvents {
    sender: Sender<Message>,
}

impl NativeEvents {
    /// Returns `false` if the loop has stopped.
    pub fn send(&self, event: NativeEvent) -> bool {
        match self.sender.try_send(Message::Native(event)) {
            Ok(()) => true,
            Err(e) => {
                e.into_inner().reject();
                false
            }
        }
    }
}

/// The serializing context: owns the dispatcher and applies messages one at a time.
pub struct EventLoop<N: NativeCentral> {
    dispatcher: Dispatcher<N>,
    receiver: async_channel::Receiver<Message>,
}

impl<N: NativeCentral> EventLoop<N> {
    pub fn dispatcher(&self) -> &Dispatcher<N> {
        &self.dispatcher
    }

    /// Runs until the channel closes, then cancels everything still queued.
    pub async fn run(mut self) -> Dispatcher<N> {
        info!("event loop started");
        loop {
            let deadline = self.dispatcher.next_deadline();
            match recv_until(&self.receiver, deadline).await {
                Wake::Message(message) => self.handle(message),
                Wake::Deadline => (),
                Wake::Closed => break,
            }
            self.dispatcher.poll_timeouts(Instant::now());
        }
        self.dispatcher.shutdown();
        info!("event loop stopped");
        self.dispatcher
    }

    fn handle(&mut self, message: Message) {
        let now = Instant::now();
        match message {
            Message::Native(event) => self.dispatcher.handle_native(event, now),
            Message::Connect {
                device,
                settings,
                completion,
            } => self.dispatcher.connect(&device, settings, completion),
            Message::Disconnect(device) => {
                if !self.dispatcher.disconnect(&device) {
                    debug!("{device} was not connected");
                }
            }
            Message::Submit {
                device,
                request,
                priority,
            } => {
                self.dispatcher.submit(&device, request, priority, now);
            }
            Message::CancelAll(device) => {
                self.dispatcher.cancel_all(&device);
            }
            Message::Scan(options) => {
                if let Err(e) = self.dispatcher.scan(&options) {
                    warn!("scan failed: {e}");
                }
            }
            Message::StopScan => self.dispatcher.stop_scan(),
            Message::State { device, reply } => reply(self.dispatcher.state(&device)),
            Message::Authorized(reply) => reply(self.dispatcher.is_authorized()),
        }
    }
}

impl<N: NativeCentral> std::fmt::Debug for EventLoop<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("dispatcher", &self.dispatcher)
            .field("queued", &self.receiver.len())
            .finish()
    }
}
