// Finding the monitor source for the sink the playback stream landed on.

use crate::{error::BridgeError, reconfig::StreamRole};

/// Fires the sink lookup once, on the first playback Ready.
#[derive(Debug, Default)]
pub struct MonitorDiscovery {
    requested: bool,
}

impl MonitorDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_ready(&mut self, role: StreamRole) -> bool {
        if role != StreamRole::Playback || self.requested {
            return false;
        }
        self.requested = true;
        true
    }
}

/// One callback's worth of a sink-info lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkLookup<'a> {
    Item { monitor_source: Option<&'a str> },
    End,
    Error,
}

#[derive(Debug)]
pub enum MonitorAction {
    Connect(String),
    Fail(BridgeError),
    Wait,
}

/// `errno` is only asked for when the lookup itself failed.
pub fn monitor_action(lookup: SinkLookup<'_>, errno: impl FnOnce() -> String) -> MonitorAction {
    match lookup {
        SinkLookup::Item {
            monitor_source: Some(source),
        } => MonitorAction::Connect(source.to_string()),
        SinkLookup::Item {
            monitor_source: None,
        } => MonitorAction::Fail(BridgeError::SinkQuery(
            "sink has no monitor source".to_string(),
        )),
        SinkLookup::End => MonitorAction::Wait,
        SinkLookup::Error => MonitorAction::Fail(BridgeError::SinkQuery(errno())),
    }
}
