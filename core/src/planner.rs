//! Full priority-aware topological sort and schedule timeline.
//!
//! Unlike the incrementally-maintained rank vector in [`crate::rank_reorder`],
//! this is a from-scratch Kahn sweep over the *current* graph, run only
//! when a caller actually wants the full order or a timeline (not on every
//! mutation).

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::graph_store::{GraphStore, NodeIdx};
use crate::priority::Priority;
use crate::task::{Task, TaskStatus};

fn live_indegree(graph: &GraphStore, tasks: &[Task], idx: NodeIdx) -> usize {
    graph
        .predecessors(idx)
        .iter()
        .filter(|&&p| tasks[p].status == TaskStatus::Open)
        .count()
}

/// Heap key: lower priority value (more urgent) first, then older
/// `created_at`, matching the tie-break rule used for the ready set.
#[derive(PartialEq, Eq)]
struct HeapKey {
    priority: u8,
    created_at: DateTime<Utc>,
    idx: NodeIdx,
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.priority, self.created_at, self.idx).cmp(&(
            other.priority,
            other.created_at,
            other.idx,
        ))
    }
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Every registered task, in priority-aware topological order. In-degree
/// counts only `OPEN` predecessors, mirroring `in_degree`/the ready set:
/// an `IN_PROGRESS` predecessor no longer blocks, but does not count as
/// done either.
pub fn topological_order(graph: &GraphStore, tasks: &[Task]) -> Vec<String> {
    let mut indeg: Vec<usize> = (0..tasks.len())
        .map(|idx| live_indegree(graph, tasks, idx))
        .collect();

    let mut heap: BinaryHeap<Reverse<HeapKey>> = BinaryHeap::new();
    for idx in 0..tasks.len() {
        if indeg[idx] == 0 {
            heap.push(Reverse(HeapKey {
                priority: tasks[idx].priority.value(),
                created_at: tasks[idx].created_at,
                idx,
            }));
        }
    }

    let mut order = Vec::with_capacity(tasks.len());
    while let Some(Reverse(key)) = heap.pop() {
        order.push(graph.name_of(key.idx).to_string());
        for &succ in graph.successors(key.idx) {
            indeg[succ] -= 1;
            if indeg[succ] == 0 {
                heap.push(Reverse(HeapKey {
                    priority: tasks[succ].priority.value(),
                    created_at: tasks[succ].created_at,
                    idx: succ,
                }));
            }
        }
    }

    order
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleEntry {
    pub task_name: String,
    pub start_time: u64,
    pub end_time: u64,
    pub duration: u32,
    pub priority: u8,
    pub estimated_tokens: u32,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Schedule {
    pub total_projected_tokens: u64,
    pub task_count: usize,
    pub schedule: Vec<ScheduleEntry>,
}

/// Walk the topological order, assigning `start_time`/`end_time` so that
/// every successor starts no earlier than all of its predecessors finish.
pub fn calculate_schedule(graph: &GraphStore, tasks: &[Task]) -> Schedule {
    let order = topological_order(graph, tasks);

    let mut start_time: Vec<u64> = vec![0; tasks.len()];
    let mut entries = Vec::with_capacity(order.len());
    let mut total_tokens: u64 = 0;

    for name in &order {
        let idx = graph.index_of(name).expect("name came from topological_order");
        let task = &tasks[idx];
        let start = start_time[idx];
        let end = start + task.duration as u64;

        for &succ in graph.successors(idx) {
            if end > start_time[succ] {
                start_time[succ] = end;
            }
        }

        total_tokens += task.estimated_tokens as u64;
        entries.push(ScheduleEntry {
            task_name: task.name.clone(),
            start_time: start,
            end_time: end,
            duration: task.duration,
            priority: task.priority.value(),
            estimated_tokens: task.estimated_tokens,
            status: task.status.as_str(),
        });
    }

    entries.sort_by_key(|e| (e.start_time, e.priority));

    Schedule {
        total_projected_tokens: total_tokens,
        task_count: entries.len(),
        schedule: entries,
    }
}
