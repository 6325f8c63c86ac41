//! Public operations; orchestrates [`GraphStore`]/[`RankReorderer`]/[`CacheLayer`]
//! and dispatches gate checks through [`GateRouter`].

use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::cache::CacheLayer;
use crate::error::{Result, SchedulerError};
use crate::gate::RemotePrClient;
use crate::gate_router::GateRouter;
use crate::graph_store::{GraphStore, NodeIdx};
use crate::planner::{self, Schedule};
use crate::priority::Priority;
use crate::rank_reorder::{self, EdgeOutcome};
use crate::task::{Task, TaskStatus};

/// Tunables for inheritance, aging, and cache freshness.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enable_priority_inheritance: bool,
    pub priority_inheritance_depth: usize,
    pub aging_threshold: ChronoDuration,
    pub aging_boost: u8,
    /// 0 disables time-based expiry of the ready-set cache.
    pub ready_cache_ttl: Duration,
    pub gate_cache_ttl: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            enable_priority_inheritance: true,
            priority_inheritance_depth: 10,
            aging_threshold: ChronoDuration::days(7),
            aging_boost: 1,
            ready_cache_ttl: Duration::from_secs(60),
            gate_cache_ttl: Duration::from_secs(300),
        }
    }
}

/// A ready task alongside the priority it was scheduled under and whether
/// that value was strengthened by inheritance or aging.
#[derive(Debug, Clone)]
pub struct ReadyEntry {
    pub task: Task,
    pub effective_priority: Priority,
    pub priority_boosted: bool,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct StatusBreakdown {
    pub open: usize,
    pub blocked: usize,
    pub in_progress: usize,
    pub closed: usize,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct PriorityBreakdown {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub backlog: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total_tasks: usize,
    pub total_edges: usize,
    pub ready_tasks: usize,
    pub status_breakdown: StatusBreakdown,
    pub priority_breakdown: PriorityBreakdown,
    pub avg_indegree: f64,
    pub ready_cache_valid: bool,
    pub priority_cache_size: usize,
    pub indegree_cache_size: usize,
    pub ready_cache_age_seconds: Option<f64>,
}

pub struct Scheduler {
    tasks: Vec<Task>,
    graph: GraphStore,
    cache: CacheLayer,
    gates: GateRouter,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Scheduler {
            tasks: Vec::new(),
            graph: GraphStore::new(),
            cache: CacheLayer::new(config.ready_cache_ttl),
            gates: GateRouter::new(None, config.gate_cache_ttl),
            config,
        }
    }

    pub fn with_remote_pr_client(mut self, client: Box<dyn RemotePrClient>) -> Self {
        self.gates = GateRouter::new(Some(client), self.config.gate_cache_ttl);
        self
    }

    fn idx_of(&self, name: &str) -> Result<NodeIdx> {
        self.graph
            .index_of(name)
            .ok_or_else(|| SchedulerError::NotFound(name.to_string()))
    }

    // ---- mutations ----

    pub fn register(&mut self, task: Task) -> Result<()> {
        if self.graph.index_of(&task.name).is_some() {
            return Err(SchedulerError::DuplicateName(task.name));
        }
        if task.name.is_empty() {
            return Err(SchedulerError::BadTask("task name must be non-empty".into()));
        }
        if task.duration == 0 || task.estimated_tokens == 0 {
            return Err(SchedulerError::BadTask(format!(
                "task '{}' must have positive duration and estimated_tokens",
                task.name
            )));
        }

        let idx = self.graph.register(&task.name);
        self.cache.grow_to(self.graph.node_count());
        self.cache.set_indegree(idx, 0);

        let status = task.status;
        self.tasks.push(task);

        if status == TaskStatus::Open {
            self.check_and_add_to_ready(idx)?;
        }

        Ok(())
    }

    pub fn add_edge(&mut self, u: &str, v: &str) -> Result<bool> {
        if u == v {
            return Err(SchedulerError::SelfLoop(u.to_string()));
        }
        let u_idx = self.idx_of(u)?;
        let v_idx = self.idx_of(v)?;

        let outcome = rank_reorder::add_edge(&mut self.graph, u_idx, v_idx)?;
        if outcome == EdgeOutcome::AlreadyPresent {
            return Ok(false);
        }

        self.cache.invalidate_indegree(v_idx);
        self.recompute_status(v_idx)?;

        self.cache.ready_remove(v_idx);
        let preds: Vec<NodeIdx> = self.graph.predecessors(v_idx).iter().copied().collect();
        self.cache.invalidate_priority(v_idx);
        self.cache.invalidate_priority_many(preds);
        self.cache.invalidate_ready();

        log::debug!("add_edge({u}, {v}): {outcome:?}");
        Ok(true)
    }

    pub fn remove_edge(&mut self, u: &str, v: &str) -> Result<bool> {
        let u_idx = self.idx_of(u)?;
        let v_idx = self.idx_of(v)?;

        let removed = self.graph.remove_edge(u_idx, v_idx);
        if !removed {
            return Ok(false);
        }

        self.cache.invalidate_indegree(v_idx);
        self.recompute_status(v_idx)?;
        self.check_and_add_to_ready(v_idx)?;

        let preds: Vec<NodeIdx> = self.graph.predecessors(v_idx).iter().copied().collect();
        self.cache.invalidate_priority(v_idx);
        self.cache.invalidate_priority_many(preds);
        self.cache.invalidate_ready();

        Ok(true)
    }

    pub fn mark_completed(&mut self, name: &str) -> Result<()> {
        let idx = self.idx_of(name)?;
        self.tasks[idx].status = TaskStatus::Closed;
        self.cache.ready_remove(idx);

        let successors: Vec<NodeIdx> = self.graph.successors(idx).iter().copied().collect();
        self.cache.invalidate_indegree_many(successors.iter().copied());
        for &succ in &successors {
            self.recompute_status(succ)?;
            self.check_and_add_to_ready(succ)?;
        }
        for &succ in &successors {
            self.cache.invalidate_priority(succ);
            let succ_preds: Vec<NodeIdx> = self.graph.predecessors(succ).iter().copied().collect();
            self.cache.invalidate_priority_many(succ_preds);
        }

        self.cache.invalidate_ready();
        Ok(())
    }

    /// Leaving `OPEN` for `IN_PROGRESS` has the same effect on successors'
    /// in-degree as closing would: it stops counting as a blocker, so their
    /// in-degree caches need the same invalidate-and-recheck as `mark_completed`.
    pub fn mark_in_progress(&mut self, name: &str) -> Result<()> {
        let idx = self.idx_of(name)?;
        if self.tasks[idx].status == TaskStatus::Closed {
            return Ok(());
        }
        self.tasks[idx].status = TaskStatus::InProgress;
        self.cache.ready_remove(idx);

        let successors: Vec<NodeIdx> = self.graph.successors(idx).iter().copied().collect();
        self.cache.invalidate_indegree_many(successors.iter().copied());
        for &succ in &successors {
            self.recompute_status(succ)?;
            self.check_and_add_to_ready(succ)?;
        }
        Ok(())
    }

    /// Returning to `OPEN` re-blocks successors exactly like a fresh,
    /// unfinished predecessor would.
    pub fn reopen(&mut self, name: &str) -> Result<()> {
        let idx = self.idx_of(name)?;
        if self.tasks[idx].status == TaskStatus::InProgress {
            self.tasks[idx].status = TaskStatus::Open;
            self.check_and_add_to_ready(idx)?;

            let successors: Vec<NodeIdx> = self.graph.successors(idx).iter().copied().collect();
            self.cache.invalidate_indegree_many(successors.iter().copied());
            for &succ in &successors {
                self.recompute_status(succ)?;
                self.check_and_add_to_ready(succ)?;
            }
        }
        Ok(())
    }

    pub fn approve_gate(&mut self, id: &str) {
        self.gates.approve_human_gate(id);
        self.cache.invalidate_ready();
    }

    pub fn revoke_gate(&mut self, id: &str) {
        self.gates.revoke_human_gate(id);
        self.cache.invalidate_ready();
    }

    pub fn gate_status(&mut self, kind: &str, id: &str) -> String {
        self.gates.status(Some(kind), Some(id), Utc::now())
    }

    // ---- internal helpers ----

    fn gate_open(&mut self, idx: NodeIdx) -> Result<bool> {
        let task = &self.tasks[idx];
        let (kind, id) = match &task.gate {
            Some(g) => (Some(g.kind.as_str()), Some(g.id.as_str())),
            None => (None, None),
        };
        self.gates.is_open(kind, id, Utc::now())
    }

    /// Only `OPEN` predecessors block: `IN_PROGRESS` has already left the
    /// blocking state even though it has not yet `CLOSED`.
    fn raw_indegree(&self, idx: NodeIdx) -> usize {
        self.graph
            .predecessors(idx)
            .iter()
            .filter(|&&p| self.tasks[p].status == TaskStatus::Open)
            .count()
    }

    pub fn in_degree(&mut self, name: &str) -> Result<usize> {
        let idx = self.idx_of(name)?;
        Ok(self.in_degree_idx(idx))
    }

    fn in_degree_idx(&mut self, idx: NodeIdx) -> usize {
        if let Some(v) = self.cache.indegree(idx) {
            return v;
        }
        let v = self.raw_indegree(idx);
        self.cache.set_indegree(idx, v);
        v
    }

    /// Flip `OPEN <-> BLOCKED` based on current in-degree and gate state.
    /// Never touches `IN_PROGRESS` or `CLOSED`: those are externally
    /// managed (see the Open Question (b) resolution in the design notes).
    fn recompute_status(&mut self, idx: NodeIdx) -> Result<()> {
        match self.tasks[idx].status {
            TaskStatus::Closed | TaskStatus::InProgress => return Ok(()),
            _ => {}
        }

        let indegree = self.in_degree_idx(idx);
        let gate_open = self.gate_open(idx)?;

        let blocked = indegree > 0 || !gate_open;
        self.tasks[idx].status = if blocked {
            TaskStatus::Blocked
        } else {
            TaskStatus::Open
        };
        Ok(())
    }

    fn check_and_add_to_ready(&mut self, idx: NodeIdx) -> Result<()> {
        if self.tasks[idx].status != TaskStatus::Open {
            self.cache.ready_remove(idx);
            return Ok(());
        }
        if self.in_degree_idx(idx) > 0 {
            self.cache.ready_remove(idx);
            return Ok(());
        }
        if !self.gate_open(idx)? {
            self.cache.ready_remove(idx);
            return Ok(());
        }
        self.cache.ready_insert(idx);
        Ok(())
    }

    fn rebuild_ready(&mut self) -> Result<()> {
        self.cache.ready_clear();
        for idx in 0..self.tasks.len() {
            self.check_and_add_to_ready(idx)?;
        }
        self.cache.mark_ready_valid(Instant::now());
        log::debug!("ready cache rebuilt: {} ready tasks", self.cache.ready_len());
        Ok(())
    }

    fn effective_priority_idx(&mut self, idx: NodeIdx) -> Priority {
        if let Some(p) = self.cache.priority(idx) {
            return p;
        }

        let base = self.tasks[idx].priority;
        if !self.config.enable_priority_inheritance {
            self.cache.set_priority(idx, base);
            return base;
        }

        let mut min_priority = base;
        let mut visited = std::collections::HashSet::new();
        visited.insert(idx);
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((idx, 0usize));

        while let Some((curr, depth)) = queue.pop_front() {
            if depth >= self.config.priority_inheritance_depth {
                continue;
            }
            let successors: Vec<NodeIdx> = self.graph.successors(curr).iter().copied().collect();
            for dependent in successors {
                if !visited.insert(dependent) {
                    continue;
                }
                let dep_task = &self.tasks[dependent];
                if dep_task.priority < min_priority {
                    min_priority = dep_task.priority;
                }
                if matches!(dep_task.status, TaskStatus::Open | TaskStatus::Blocked) {
                    queue.push_back((dependent, depth + 1));
                }
            }
        }

        self.cache.set_priority(idx, min_priority);
        min_priority
    }

    pub fn effective_priority(&mut self, name: &str) -> Result<Priority> {
        let idx = self.idx_of(name)?;
        Ok(self.effective_priority_idx(idx))
    }

    // ---- queries ----

    pub fn compute_ready(&mut self, limit: usize) -> Result<Vec<ReadyEntry>> {
        let now_instant = Instant::now();
        if !self.cache.ready_is_fresh(now_instant) {
            self.rebuild_ready()?;
        }

        let now = Utc::now();
        let ready_idxs: Vec<NodeIdx> = self.cache.ready_iter().collect();

        let mut entries: Vec<ReadyEntry> = ready_idxs
            .into_iter()
            .map(|idx| {
                let mut effective = self.effective_priority_idx(idx);
                let task = self.tasks[idx].clone();
                let mut boosted = effective < task.priority;

                let age = now - task.created_at;
                if age >= self.config.aging_threshold && effective > Priority::Critical {
                    effective = effective.boost(self.config.aging_boost);
                    boosted = true;
                }

                ReadyEntry {
                    task,
                    effective_priority: effective,
                    priority_boosted: boosted,
                }
            })
            .collect();

        entries.sort_by(|a, b| {
            (a.effective_priority, a.task.created_at, &a.task.name).cmp(&(
                b.effective_priority,
                b.task.created_at,
                &b.task.name,
            ))
        });

        if limit > 0 {
            entries.truncate(limit);
        }

        Ok(entries)
    }

    pub fn topological_order(&self) -> Vec<String> {
        planner::topological_order(&self.graph, &self.tasks)
    }

    pub fn calculate_schedule(&self) -> Schedule {
        planner::calculate_schedule(&self.graph, &self.tasks)
    }

    pub fn task(&self, name: &str) -> Result<&Task> {
        let idx = self.idx_of(name)?;
        Ok(&self.tasks[idx])
    }

    pub fn statistics(&self) -> Statistics {
        let mut status_breakdown = StatusBreakdown::default();
        let mut priority_breakdown = PriorityBreakdown::default();
        let mut indegree_sum: u64 = 0;

        for task in &self.tasks {
            match task.status {
                TaskStatus::Open => status_breakdown.open += 1,
                TaskStatus::Blocked => status_breakdown.blocked += 1,
                TaskStatus::InProgress => status_breakdown.in_progress += 1,
                TaskStatus::Closed => status_breakdown.closed += 1,
            }
            match task.priority {
                Priority::Critical => priority_breakdown.critical += 1,
                Priority::High => priority_breakdown.high += 1,
                Priority::Medium => priority_breakdown.medium += 1,
                Priority::Low => priority_breakdown.low += 1,
                Priority::Backlog => priority_breakdown.backlog += 1,
            }
        }

        for idx in 0..self.tasks.len() {
            indegree_sum += self.raw_indegree(idx) as u64;
        }

        let avg_indegree = if self.tasks.is_empty() {
            0.0
        } else {
            indegree_sum as f64 / self.tasks.len() as f64
        };

        let now = Instant::now();
        Statistics {
            total_tasks: self.tasks.len(),
            total_edges: self.graph.total_edges(),
            ready_tasks: self.cache.ready_len(),
            status_breakdown,
            priority_breakdown,
            avg_indegree,
            ready_cache_valid: self.cache.ready_cache_valid(),
            priority_cache_size: self.cache.priority_cache_size(),
            indegree_cache_size: self.cache.indegree_cache_size(),
            ready_cache_age_seconds: self.cache.ready_cache_age_seconds(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::Priority;
    use chrono::Duration as ChronoDuration;

    fn scheduler() -> Scheduler {
        Scheduler::new(SchedulerConfig::default())
    }

    fn ready_names(s: &mut Scheduler) -> Vec<String> {
        s.compute_ready(0)
            .unwrap()
            .into_iter()
            .map(|e| e.task.name)
            .collect()
    }

    // Scenario 1: linear chain.
    #[test]
    fn linear_chain() {
        let mut s = scheduler();
        s.register(Task::new("A", Priority::High, 1, 1000).unwrap()).unwrap();
        s.register(Task::new("B", Priority::Medium, 1, 1000).unwrap()).unwrap();
        s.register(Task::new("C", Priority::Low, 1, 1000).unwrap()).unwrap();
        s.add_edge("A", "B").unwrap();
        s.add_edge("B", "C").unwrap();

        assert_eq!(ready_names(&mut s), vec!["A"]);
        s.mark_completed("A").unwrap();
        assert_eq!(ready_names(&mut s), vec!["B"]);
        s.mark_completed("B").unwrap();
        assert_eq!(ready_names(&mut s), vec!["C"]);
    }

    // Scenario 2: priority inheritance.
    #[test]
    fn priority_inheritance() {
        let mut s = scheduler();
        s.register(Task::new("Blocker", Priority::Backlog, 1, 1000).unwrap())
            .unwrap();
        s.register(Task::new("Blocked", Priority::Critical, 1, 1000).unwrap())
            .unwrap();
        s.add_edge("Blocker", "Blocked").unwrap();

        assert_eq!(s.effective_priority("Blocker").unwrap(), Priority::Critical);

        let ready = s.compute_ready(0).unwrap();
        assert_eq!(ready[0].task.name, "Blocker");
        assert!(ready[0].priority_boosted);
    }

    // Scenario 3: cycle rejection.
    #[test]
    fn cycle_rejection() {
        let mut s = scheduler();
        for name in ["T0", "T1", "T2"] {
            s.register(Task::new(name, Priority::Medium, 1, 1000).unwrap())
                .unwrap();
        }
        s.add_edge("T0", "T1").unwrap();
        s.add_edge("T1", "T2").unwrap();

        let err = s.add_edge("T2", "T0").unwrap_err();
        match err {
            SchedulerError::CycleDetected { path } => {
                assert!(path.contains(&"T0".to_string()));
                assert!(path.contains(&"T1".to_string()));
                assert!(path.contains(&"T2".to_string()));
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }

        assert_eq!(ready_names(&mut s), vec!["T0"]);
    }

    // Scenario 4: timer gate.
    #[test]
    fn timer_gate() {
        let mut s = scheduler();
        let now = Utc::now();
        let past = (now - ChronoDuration::hours(1)).to_rfc3339();
        let future = (now + ChronoDuration::hours(1)).to_rfc3339();

        s.register(
            Task::new("G", Priority::Medium, 1, 1000)
                .unwrap()
                .with_gate("timer", past),
        )
        .unwrap();
        s.register(
            Task::new("G2", Priority::Medium, 1, 1000)
                .unwrap()
                .with_gate("timer", future),
        )
        .unwrap();

        let names = ready_names(&mut s);
        assert!(names.contains(&"G".to_string()));
        assert!(!names.contains(&"G2".to_string()));
    }

    // Scenario 5: human gate.
    #[test]
    fn human_gate() {
        let mut s = scheduler();
        s.register(
            Task::new("A", Priority::Medium, 1, 1000)
                .unwrap()
                .with_gate("human", "ok"),
        )
        .unwrap();

        assert!(!ready_names(&mut s).contains(&"A".to_string()));
        s.approve_gate("ok");
        assert!(ready_names(&mut s).contains(&"A".to_string()));
        s.revoke_gate("ok");
        assert!(!ready_names(&mut s).contains(&"A".to_string()));
    }

    // Scenario 6: reorder locality.
    #[test]
    fn reorder_locality() {
        let mut s = scheduler();
        for i in 0..5 {
            s.register(Task::new(format!("T{i}"), Priority::Medium, 1, 1000).unwrap())
                .unwrap();
        }
        s.add_edge("T2", "T3").unwrap();
        s.add_edge("T0", "T1").unwrap();
        s.add_edge("T1", "T3").unwrap();

        let rank = |s: &Scheduler, n: &str| s.graph.rank(s.graph.index_of(n).unwrap());
        assert!(rank(&s, "T0") < rank(&s, "T1"));
        assert!(rank(&s, "T1") < rank(&s, "T3"));
        assert!(rank(&s, "T2") < rank(&s, "T3"));
    }

    #[test]
    fn duplicate_registration_errors() {
        let mut s = scheduler();
        s.register(Task::new("x", Priority::Medium, 1, 1).unwrap()).unwrap();
        let err = s
            .register(Task::new("x", Priority::Low, 1, 1).unwrap())
            .unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateName(_)));
    }

    #[test]
    fn self_loop_rejected() {
        let mut s = scheduler();
        s.register(Task::new("x", Priority::Medium, 1, 1).unwrap()).unwrap();
        assert!(matches!(
            s.add_edge("x", "x").unwrap_err(),
            SchedulerError::SelfLoop(_)
        ));
    }

    #[test]
    fn edge_on_unknown_task_errors() {
        let mut s = scheduler();
        s.register(Task::new("x", Priority::Medium, 1, 1).unwrap()).unwrap();
        assert!(matches!(
            s.add_edge("x", "y").unwrap_err(),
            SchedulerError::NotFound(_)
        ));
    }

    #[test]
    fn idempotent_edge_insertion() {
        let mut s = scheduler();
        s.register(Task::new("a", Priority::Medium, 1, 1).unwrap()).unwrap();
        s.register(Task::new("b", Priority::Medium, 1, 1).unwrap()).unwrap();
        assert!(s.add_edge("a", "b").unwrap());
        assert!(!s.add_edge("a", "b").unwrap());
    }

    #[test]
    fn in_degree_drops_only_when_predecessor_closes() {
        let mut s = scheduler();
        s.register(Task::new("a", Priority::Medium, 1, 1).unwrap()).unwrap();
        s.register(Task::new("b", Priority::Medium, 1, 1).unwrap()).unwrap();
        s.add_edge("a", "b").unwrap();
        assert_eq!(s.in_degree("b").unwrap(), 1);
        s.mark_completed("a").unwrap();
        assert_eq!(s.in_degree("b").unwrap(), 0);
    }

    #[test]
    fn statistics_reports_counts() {
        let mut s = scheduler();
        s.register(Task::new("a", Priority::Medium, 1, 1).unwrap()).unwrap();
        s.register(Task::new("b", Priority::Medium, 1, 1).unwrap()).unwrap();
        s.add_edge("a", "b").unwrap();
        let stats = s.statistics();
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.total_edges, 1);
    }

    #[test]
    fn mark_in_progress_is_not_ready_and_stops_blocking_successors() {
        let mut s = scheduler();
        s.register(Task::new("a", Priority::Medium, 1, 1).unwrap()).unwrap();
        s.register(Task::new("b", Priority::Medium, 1, 1).unwrap()).unwrap();
        s.add_edge("a", "b").unwrap();
        s.mark_in_progress("a").unwrap();
        assert!(!ready_names(&mut s).contains(&"a".to_string()));
        // a is IN_PROGRESS, not OPEN, so it no longer counts toward b's in-degree.
        assert_eq!(s.in_degree("b").unwrap(), 0);
    }
}
