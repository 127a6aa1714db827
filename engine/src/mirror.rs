// Port-connect notifications arrive while JACK holds its graph lock, so the
// mirrored ops wait in `PendingOps` for the next process cycle.

use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Connect,
    Disconnect,
}

impl LinkAction {
    pub fn from_connected(connected: bool) -> Self {
        if connected {
            LinkAction::Connect
        } else {
            LinkAction::Disconnect
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOp {
    pub source: String,
    pub destination: String,
    pub action: LinkAction,
}

#[derive(Debug, Clone)]
pub struct MirrorPolicy {
    client_name: String,
    system_prefix: String,
    playback: Vec<String>,
    capture: Vec<String>,
}

impl MirrorPolicy {
    /// `playback` and `capture` are the bridge's own short port names, which
    /// are chosen to match the system ports they stand in for.
    pub fn new(
        client_name: &str,
        system_client: &str,
        playback: Vec<String>,
        capture: Vec<String>,
    ) -> Self {
        Self {
            client_name: client_name.to_string(),
            system_prefix: format!("{system_client}:"),
            playback,
            capture,
        }
    }

    fn full_name(&self, short: &str) -> String {
        format!("{}:{}", self.client_name, short)
    }

    pub fn mirror(&self, source: &str, destination: &str, connected: bool) -> Vec<ConnectionOp> {
        let action = LinkAction::from_connected(connected);
        let mut ops = Vec::new();

        if let Some(short) = source.strip_prefix(self.system_prefix.as_str()) {
            if let Some(own) = self.capture.iter().find(|c| c.as_str() == short) {
                ops.push(ConnectionOp {
                    source: self.full_name(own),
                    destination: destination.to_string(),
                    action,
                });
            }
        }

        if let Some(short) = destination.strip_prefix(self.system_prefix.as_str()) {
            if let Some(own) = self.playback.iter().find(|p| p.as_str() == short) {
                ops.push(ConnectionOp {
                    source: source.to_string(),
                    destination: self.full_name(own),
                    action,
                });
            }
        }

        ops
    }
}

/// FIFO of operations waiting for the next process cycle.
///
/// Filled from the notification thread, drained from the process thread with
/// `try_lock`, so a cycle that races a notification leaves the queue for the
/// next cycle instead of blocking.
#[derive(Debug, Default)]
pub struct PendingOps {
    queue: Mutex<VecDeque<ConnectionOp>>,
}

impl PendingOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, op: ConnectionOp) {
        match self.queue.lock() {
            Ok(mut queue) => queue.push_back(op),
            Err(poisoned) => poisoned.into_inner().push_back(op),
        }
    }

    /// Applies queued operations in order. Returns how many were applied.
    pub fn drain(&self, mut apply: impl FnMut(&ConnectionOp)) -> usize {
        let Ok(mut queue) = self.queue.try_lock() else {
            return 0;
        };
        let mut applied = 0;
        while let Some(op) = queue.pop_front() {
            apply(&op);
            applied += 1;
        }
        applied
    }

    pub fn len(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> MirrorPolicy {
        MirrorPolicy::new(
            "bridge",
            "system",
            vec!["playback_1".to_string(), "playback_2".to_string()],
            vec!["capture_1".to_string(), "capture_2".to_string()],
        )
    }

    #[test]
    fn system_capture_is_mirrored_from_bridge_capture() {
        let ops = policy().mirror("system:capture_2", "ardour:in_1", true);
        assert_eq!(
            ops,
            vec![ConnectionOp {
                source: "bridge:capture_2".to_string(),
                destination: "ardour:in_1".to_string(),
                action: LinkAction::Connect,
            }]
        );
    }

    #[test]
    fn system_playback_is_mirrored_into_bridge_playback() {
        let ops = policy().mirror("ardour:out_1", "system:playback_1", false);
        assert_eq!(
            ops,
            vec![ConnectionOp {
                source: "ardour:out_1".to_string(),
                destination: "bridge:playback_1".to_string(),
                action: LinkAction::Disconnect,
            }]
        );
    }

    #[test]
    fn unrelated_ports_produce_nothing() {
        let p = policy();
        assert!(p.mirror("ardour:out_1", "carla:in_1", true).is_empty());
        assert!(p.mirror("system:midi_capture_1", "carla:in", true).is_empty());
        assert!(p.mirror("systemd:capture_1", "carla:in", true).is_empty());
        assert!(p.mirror("bridge:capture_1", "carla:in", true).is_empty());
    }

    #[test]
    fn connections_to_bridge_ports_are_mirrored_too() {
        let p = policy();
        assert_eq!(
            p.mirror("system:capture_1", "bridge:playback_1", true),
            vec![ConnectionOp {
                source: "bridge:capture_1".to_string(),
                destination: "bridge:playback_1".to_string(),
                action: LinkAction::Connect,
            }]
        );
        assert_eq!(
            p.mirror("bridge:monitor_1", "system:playback_1", false),
            vec![ConnectionOp {
                source: "bridge:monitor_1".to_string(),
                destination: "bridge:playback_1".to_string(),
                action: LinkAction::Disconnect,
            }]
        );
    }

    #[test]
    fn pending_ops_drain_in_fifo_order() {
        let pending = PendingOps::new();
        for i in 0..5 {
            pending.push(ConnectionOp {
                source: format!("a:{i}"),
                destination: format!("b:{i}"),
                action: LinkAction::Connect,
            });
        }
        assert_eq!(pending.len(), 5);
        let mut seen = Vec::new();
        assert_eq!(pending.drain(|op| seen.push(op.source.clone())), 5);
        assert_eq!(seen, vec!["a:0", "a:1", "a:2", "a:3", "a:4"]);
        assert!(pending.is_empty());
        assert_eq!(pending.drain(|_| panic!("queue should be empty")), 0);
    }
}
