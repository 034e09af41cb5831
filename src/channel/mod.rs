//! Live reading channel
//!
//! Keeps one authenticated realtime session open for the selected device
//! and exposes the latest reading to its owner.
//!
//! ## How it works:
//! 1. Inputs (device id + credential) arrive; both must be non-empty
//! 2. The transport opens a session, presenting the credential at handshake
//! 3. On `authenticated` the channel sends `subscribe_device`
//! 4. Every `device_data` event replaces the latest reading
//! 5. When inputs change or the channel closes, the session is torn down
//!    (`unsubscribe_device` first if it was authenticated)
//!
//! There is no automatic reconnection: a dropped session is surfaced as an
//! error and only replaced when the inputs change.

pub mod events;
pub mod state;
pub mod transport;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use events::{EventSink, InboundEvent, OutboundEvent, SessionEvent, SessionId};
use state::{classify_connect_error, is_clean_disconnect, ChannelError, ChannelState, Phase};
use transport::{ConnectRequest, Transport, TransportHandle};

/// The two values that gate a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inputs {
    pub device_id: Option<String>,
    pub credential: Option<String>,
}

impl Inputs {
    pub fn new(device_id: Option<String>, credential: Option<String>) -> Self {
        Self {
            device_id: device_id.filter(|s| !s.is_empty()),
            credential: credential.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.device_id.is_some() && self.credential.is_some()
    }
}

struct Session<H> {
    id: SessionId,
    device_id: String,
    handle: H,
    authenticated: bool,
}

/// State machine for one live reading subscription.
///
/// All mutation happens through `set_inputs`, `handle_event` and `close`,
/// which the owner calls from a single task (see [`LiveReadingChannel::run`]).
pub struct LiveReadingChannel<T: Transport> {
    transport: T,
    inputs: Inputs,
    session: Option<Session<T::Handle>>,
    phase: Phase,
    state: ChannelState,
    last_session: SessionId,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    phase_tx: Option<watch::Sender<Phase>>,
}

impl<T: Transport> LiveReadingChannel<T> {
    pub fn new(transport: T) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            inputs: Inputs::default(),
            session: None,
            phase: Phase::Idle,
            state: ChannelState::default(),
            last_session: 0,
            events_tx,
            events_rx,
            phase_tx: None,
        }
    }

    /// Also publish phase changes from [`LiveReadingChannel::run`].
    pub fn with_phase_updates(mut self, phase_tx: watch::Sender<Phase>) -> Self {
        self.phase_tx = Some(phase_tx);
        self
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    /// Apply new inputs.
    ///
    /// Equal inputs are a no-op. Otherwise the current session (if any) is
    /// torn down before a new one is opened, so two sessions never coexist.
    /// Returns whether anything changed.
    pub fn set_inputs(&mut self, inputs: Inputs) -> bool {
        let inputs = Inputs::new(inputs.device_id, inputs.credential);
        if inputs == self.inputs {
            return false;
        }

        self.teardown();
        self.inputs = inputs;
        self.state = ChannelState::default();
        self.phase = Phase::Idle;

        if let (Some(device_id), Some(credential)) =
            (self.inputs.device_id.clone(), self.inputs.credential.clone())
        {
            self.open(device_id, credential);
        } else {
            debug!("Inputs incomplete, channel idle");
        }
        true
    }

    /// Apply an event reported by the transport.
    ///
    /// Events from sessions other than the live one are discarded.
    /// Returns whether the observable state changed. Every accepted reading
    /// counts as a change, even one equal to the previous reading.
    pub fn handle_event(&mut self, event: SessionEvent) -> bool {
        let Some(session) = self.session.as_mut() else {
            debug!("Dropping {:?} for closed session {}", event.event, event.session);
            return false;
        };
        if session.id != event.session {
            debug!(
                "Dropping {:?} for stale session {} (live: {})",
                event.event, event.session, session.id
            );
            return false;
        }

        let before = self.state.clone();
        let mut reading_received = false;

        match event.event {
            InboundEvent::Connected => {
                debug!("Session {} connected, awaiting authentication", session.id);
            }
            InboundEvent::Authenticated => {
                if self.phase == Phase::Connecting {
                    info!(
                        "Session {} authenticated, subscribing to device {}",
                        session.id, session.device_id
                    );
                    session.authenticated = true;
                    session.handle.emit(OutboundEvent::SubscribeDevice {
                        device_id: session.device_id.clone(),
                    });
                    self.phase = Phase::Subscribing;
                    self.state.connecting = false;
                    self.state.error = None;
                } else {
                    debug!("Ignoring authentication ack in phase {:?}", self.phase);
                }
            }
            InboundEvent::Subscribed => {
                if self.phase == Phase::Subscribing {
                    info!("Subscribed to device {}", session.device_id);
                    self.phase = Phase::Active;
                }
            }
            InboundEvent::Unsubscribed => {
                debug!("Unsubscribed from device {}", session.device_id);
            }
            InboundEvent::Data(reading) => {
                if matches!(self.phase, Phase::Subscribing | Phase::Active) {
                    debug!("Reading for device {}", session.device_id);
                    self.phase = Phase::Active;
                    self.state.reading = Some(reading);
                    reading_received = true;
                } else {
                    debug!("Ignoring reading in phase {:?}", self.phase);
                }
            }
            InboundEvent::ServerError(message) => {
                self.fail(ChannelError::Server(message));
            }
            InboundEvent::ConnectError(message) => {
                self.fail(classify_connect_error(&message));
            }
            InboundEvent::Disconnected(reason) => {
                session.authenticated = false;
                if is_clean_disconnect(&reason) {
                    info!("Session {} closed ({})", session.id, reason);
                    if !matches!(self.phase, Phase::Failed(_)) {
                        self.phase = Phase::Closed;
                    }
                    self.state.connecting = false;
                } else {
                    self.fail(ChannelError::Disconnected(reason));
                }
            }
        }

        reading_received || self.state != before
    }

    /// Tear down the session and forget the inputs.
    pub fn close(&mut self) {
        self.teardown();
        self.inputs = Inputs::default();
        self.state = ChannelState::default();
        self.phase = Phase::Idle;
    }

    /// Drive the channel until the inputs sender is dropped.
    ///
    /// Input changes and transport events are applied in arrival order on
    /// this task; every state change is published to `state_tx`.
    pub async fn run(
        mut self,
        mut inputs: watch::Receiver<Inputs>,
        state_tx: watch::Sender<ChannelState>,
    ) {
        let initial = inputs.borrow_and_update().clone();
        if self.set_inputs(initial) {
            state_tx.send_replace(self.state.clone());
        }
        self.publish_phase();

        loop {
            tokio::select! {
                changed = inputs.changed() => {
                    if changed.is_err() {
                        debug!("Inputs sender dropped, stopping channel");
                        break;
                    }
                    let next = inputs.borrow_and_update().clone();
                    if self.set_inputs(next) {
                        state_tx.send_replace(self.state.clone());
                    }
                }
                Some(event) = self.events_rx.recv() => {
                    if self.handle_event(event) {
                        state_tx.send_replace(self.state.clone());
                    }
                }
            }
            self.publish_phase();
        }

        self.close();
        state_tx.send_replace(self.state.clone());
        self.publish_phase();
    }

    fn publish_phase(&self) {
        if let Some(phase_tx) = &self.phase_tx {
            phase_tx.send_if_modified(|published| {
                if *published == self.phase {
                    return false;
                }
                *published = self.phase.clone();
                true
            });
        }
    }

    fn open(&mut self, device_id: String, credential: String) {
        self.last_session += 1;
        let id = self.last_session;
        info!("Opening session {} for device {}", id, device_id);

        let sink = EventSink::new(id, self.events_tx.clone());
        let handle = self.transport.open(
            ConnectRequest {
                device_id: device_id.clone(),
                credential,
            },
            sink,
        );

        self.session = Some(Session {
            id,
            device_id,
            handle,
            authenticated: false,
        });
        self.phase = Phase::Connecting;
        self.state.connecting = true;
    }

    fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if session.authenticated {
            session.handle.emit(OutboundEvent::UnsubscribeDevice {
                device_id: session.device_id.clone(),
            });
        }
        session.handle.close();
        debug!("Session {} torn down", session.id);
    }

    fn fail(&mut self, error: ChannelError) {
        if matches!(self.phase, Phase::Failed(_)) {
            debug!("Session already failed, ignoring {:?}", error);
            return;
        }
        warn!("Live reading channel failed: {}", error);
        self.state.error = Some(error.to_string());
        self.state.reading = None;
        self.state.connecting = false;
        self.phase = Phase::Failed(error);
    }
}

impl<T: Transport> Drop for LiveReadingChannel<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}
