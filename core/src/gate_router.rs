//! Dispatch `(gate_kind, gate_id)` to the appropriate gate.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::error::SchedulerError;
use crate::gate::{HumanGate, RemotePrClient, RemotePrGate, TimerGate};

pub struct GateRouter {
    timer: TimerGate,
    human: HumanGate,
    remote: RemotePrGate,
}

impl GateRouter {
    pub fn new(remote_client: Option<Box<dyn RemotePrClient>>, remote_ttl: Duration) -> Self {
        GateRouter {
            timer: TimerGate,
            human: HumanGate::default(),
            remote: RemotePrGate::new(remote_client, remote_ttl),
        }
    }

    /// `true` when both `kind` and `id` are absent (no gate), otherwise
    /// dispatches by `kind`.
    pub fn is_open(
        &mut self,
        kind: Option<&str>,
        id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, SchedulerError> {
        let (kind, id) = match (kind, id) {
            (None, None) => return Ok(true),
            (Some(kind), Some(id)) => (kind, id),
            _ => return Ok(true),
        };

        match kind {
            "timer" => self.timer.is_open(id, now),
            "human" => Ok(self.human.is_open(id)),
            "gh:pr" => self.remote.is_open(id, Instant::now()),
            other => Err(SchedulerError::UnknownGateKind(other.to_string())),
        }
    }

    pub fn status(&mut self, kind: Option<&str>, id: Option<&str>, now: DateTime<Utc>) -> String {
        let (kind, id) = match (kind, id) {
            (Some(kind), Some(id)) => (kind, id),
            _ => return "no gate".to_string(),
        };

        match kind {
            "timer" => self.timer.status(id, now),
            "human" => self.human.status(id),
            "gh:pr" => self.remote.status(id, Instant::now()),
            other => format!("error (unknown gate kind: {other})"),
        }
    }

    pub fn approve_human_gate(&mut self, id: &str) {
        self.human.approve(id);
    }

    pub fn revoke_human_gate(&mut self, id: &str) {
        self.human.revoke(id);
    }

    pub fn clear_remote_cache(&mut self) {
        self.remote.clear_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_gate_is_always_open() {
        let mut router = GateRouter::new(None, Duration::from_secs(300));
        assert!(router.is_open(None, None, Utc::now()).unwrap());
    }

    #[test]
    fn unknown_kind_errors() {
        let mut router = GateRouter::new(None, Duration::from_secs(300));
        assert!(router.is_open(Some("carrier-pigeon"), Some("x"), Utc::now()).is_err());
    }

    #[test]
    fn human_gate_round_trip_through_router() {
        let mut router = GateRouter::new(None, Duration::from_secs(300));
        assert!(!router.is_open(Some("human"), Some("ok"), Utc::now()).unwrap());
        router.approve_human_gate("ok");
        assert!(router.is_open(Some("human"), Some("ok"), Utc::now()).unwrap());
        router.revoke_human_gate("ok");
        assert!(!router.is_open(Some("human"), Some("ok"), Utc::now()).unwrap());
    }
}
