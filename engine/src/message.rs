use crate::error::BridgeError;
use tokio::sync::mpsc::UnboundedSender;

/// Sent from subsystem callbacks to [`crate::session::Bridge::run`].
#[derive(Debug)]
pub enum BridgeEvent {
    Fatal(BridgeError),
    /// The PulseAudio server closed the connection cleanly.
    Terminated,
}

pub type EventSender = UnboundedSender<BridgeEvent>;

/// Delivers `err` to the run loop. A closed channel means the bridge is
/// already shutting down, so the error is only logged.
pub fn send_fatal(tx: &EventSender, err: BridgeError) {
    tracing::error!("{err}");
    let _ = tx.send(BridgeEvent::Fatal(err));
}
