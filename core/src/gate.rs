//! Gate evaluators: external preconditions keyed by a typed id.
//!
//! The set of gate kinds is small and closed (timer / human / remote PR),
//! so it is dispatched through [`crate::gate_router::GateRouter`] on a
//! string kind rather than via an open-ended trait-object hierarchy.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::error::SchedulerError;

/// Pluggable client for the `gh:pr` gate kind. The core ships no concrete
/// implementation; callers that want real GitHub lookups provide one.
pub trait RemotePrClient {
    fn is_pr_merged(&self, owner: &str, repo: &str, pr_number: u64) -> bool;
}

/// Opens once `now >= id`, where `id` is an RFC-3339/ISO-8601 instant.
#[derive(Debug, Default)]
pub struct TimerGate;

impl TimerGate {
    pub fn is_open(&self, id: &str, now: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let target = parse_timer(id)?;
        Ok(now >= target)
    }

    pub fn status(&self, id: &str, now: DateTime<Utc>) -> String {
        match parse_timer(id) {
            Ok(target) if now >= target => "open".to_string(),
            Ok(target) => format!("closed (opens in {})", target - now),
            Err(_) => "error".to_string(),
        }
    }
}

fn parse_timer(id: &str) -> Result<DateTime<Utc>, SchedulerError> {
    DateTime::parse_from_rfc3339(id)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SchedulerError::BadGateId {
            kind: "timer".to_string(),
            id: id.to_string(),
            reason: e.to_string(),
        })
}

/// Opens once manually approved via [`HumanGate::approve`].
#[derive(Debug, Default)]
pub struct HumanGate {
    approvals: HashSet<String>,
}

impl HumanGate {
    pub fn is_open(&self, id: &str) -> bool {
        self.approvals.contains(id)
    }

    pub fn approve(&mut self, id: &str) {
        self.approvals.insert(id.to_string());
    }

    pub fn revoke(&mut self, id: &str) {
        self.approvals.remove(id);
    }

    pub fn status(&self, id: &str) -> String {
        if self.is_open(id) {
            "open".to_string()
        } else {
            "pending approval".to_string()
        }
    }
}

/// Opens once the referenced GitHub PR is merged, per an optional
/// pluggable [`RemotePrClient`]; memoizes results for `ttl`.
pub struct RemotePrGate {
    client: Option<Box<dyn RemotePrClient>>,
    cache: HashMap<String, (bool, Instant)>,
    ttl: Duration,
}

impl RemotePrGate {
    pub fn new(client: Option<Box<dyn RemotePrClient>>, ttl: Duration) -> Self {
        RemotePrGate {
            client,
            cache: HashMap::new(),
            ttl,
        }
    }

    pub fn is_open(&mut self, id: &str, now: Instant) -> Result<bool, SchedulerError> {
        if let Some((merged, at)) = self.cache.get(id) {
            if now.duration_since(*at) < self.ttl {
                return Ok(*merged);
            }
        }

        let (owner, repo, pr_number) = parse_pr_id(id)?;

        let merged = match &self.client {
            None => {
                log::warn!("gh:pr gate '{id}' checked with no remote client configured; treating as closed");
                false
            }
            Some(client) => client.is_pr_merged(&owner, &repo, pr_number),
        };

        self.cache.insert(id.to_string(), (merged, now));
        Ok(merged)
    }

    pub fn status(&mut self, id: &str, now: Instant) -> String {
        match self.is_open(id, now) {
            Ok(true) => "open (PR merged)".to_string(),
            Ok(false) => "closed (PR not merged)".to_string(),
            Err(_) => "error".to_string(),
        }
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

fn parse_pr_id(id: &str) -> Result<(String, String, u64), SchedulerError> {
    let bad = |reason: &str| SchedulerError::BadGateId {
        kind: "gh:pr".to_string(),
        id: id.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = id.split('/').collect();
    if parts.len() != 4 || parts[2] != "pulls" {
        return Err(bad("expected 'owner/repo/pulls/<number>'"));
    }
    let pr_number: u64 = parts[3]
        .parse()
        .map_err(|_| bad("pull request number must be a positive integer"))?;
    if pr_number == 0 {
        return Err(bad("pull request number must be a positive integer"));
    }

    Ok((parts[0].to_string(), parts[1].to_string(), pr_number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn timer_gate_open_in_past() {
        let gate = TimerGate;
        let now = Utc::now();
        let past = now - ChronoDuration::hours(1);
        assert!(gate.is_open(&past.to_rfc3339(), now).unwrap());
    }

    #[test]
    fn timer_gate_closed_in_future() {
        let gate = TimerGate;
        let now = Utc::now();
        let future = now + ChronoDuration::hours(1);
        assert!(!gate.is_open(&future.to_rfc3339(), now).unwrap());
    }

    #[test]
    fn timer_gate_rejects_bad_format() {
        let gate = TimerGate;
        assert!(gate.is_open("not-a-timestamp", Utc::now()).is_err());
    }

    #[test]
    fn human_gate_approve_and_revoke() {
        let mut gate = HumanGate::default();
        assert!(!gate.is_open("ok"));
        gate.approve("ok");
        assert!(gate.is_open("ok"));
        gate.revoke("ok");
        assert!(!gate.is_open("ok"));
    }

    #[test]
    fn remote_pr_gate_without_client_stays_closed() {
        let mut gate = RemotePrGate::new(None, Duration::from_secs(300));
        assert!(!gate.is_open("owner/repo/pulls/7", Instant::now()).unwrap());
    }

    #[test]
    fn remote_pr_gate_rejects_malformed_id() {
        let mut gate = RemotePrGate::new(None, Duration::from_secs(300));
        assert!(gate.is_open("owner/repo/issues/7", Instant::now()).is_err());
        assert!(gate.is_open("owner/repo/pulls/not-a-number", Instant::now()).is_err());
    }

    struct AlwaysMerged;
    impl RemotePrClient for AlwaysMerged {
        fn is_pr_merged(&self, _owner: &str, _repo: &str, _pr_number: u64) -> bool {
            true
        }
    }

    #[test]
    fn remote_pr_gate_consults_client_and_caches() {
        let mut gate = RemotePrGate::new(Some(Box::new(AlwaysMerged)), Duration::from_secs(300));
        assert!(gate.is_open("owner/repo/pulls/7", Instant::now()).unwrap());
    }
}
