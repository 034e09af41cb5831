//! Seam between the channel state machine and the network

use super::events::{EventSink, OutboundEvent};

/// What a transport needs to open a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub device_id: String,
    /// Bearer credential presented in the connection handshake
    pub credential: String,
}

/// Opens sessions. Opening never blocks: progress and failures are reported
/// asynchronously through the sink.
pub trait Transport {
    type Handle: TransportHandle;

    fn open(&self, request: ConnectRequest, sink: EventSink) -> Self::Handle;
}

/// Control side of one open session
pub trait TransportHandle {
    /// Queue an outbound event (fire-and-forget)
    fn emit(&mut self, event: OutboundEvent);

    /// Close the session. Idempotent.
    fn close(&mut self);
}
