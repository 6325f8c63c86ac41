//! Performance benchmarks for [`scheduler_core::Scheduler`].
//!
//! Measures graph construction, incremental edge maintenance, ready-set
//! queries, cycle rejection, priority inheritance, and full-graph
//! topological sort/schedule generation across a handful of graph sizes,
//! and writes the results to `benchmark_results.json`.

use std::fs;
use std::time::Instant;

use chrono::Utc;
use rand::rngs::ThreadRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_derive::Serialize;

use scheduler_core::{Priority, Scheduler, SchedulerConfig, Task};

#[derive(Serialize)]
struct BenchResult {
    test_name: String,
    nodes: usize,
    edges: usize,
    operation: String,
    duration_ms: f64,
    iterations: usize,
    avg_ms: f64,
}

#[derive(Serialize)]
struct Metadata {
    timestamp: String,
    rustc_edition: &'static str,
}

#[derive(Serialize)]
struct BenchmarkResults {
    metadata: Metadata,
    results: Vec<BenchResult>,
}

impl BenchmarkResults {
    fn new() -> Self {
        BenchmarkResults {
            metadata: Metadata {
                timestamp: Utc::now().to_rfc3339(),
                rustc_edition: "2021",
            },
            results: Vec::new(),
        }
    }

    fn add(&mut self, test_name: &str, nodes: usize, edges: usize, operation: &str, duration_ms: f64, iterations: usize) {
        let avg_ms = if iterations > 0 { duration_ms / iterations as f64 } else { 0.0 };
        self.results.push(BenchResult {
            test_name: test_name.to_string(),
            nodes,
            edges,
            operation: operation.to_string(),
            duration_ms,
            iterations,
            avg_ms,
        });
    }
}

const PRIORITIES: [Priority; 5] = [
    Priority::Critical,
    Priority::High,
    Priority::Medium,
    Priority::Low,
    Priority::Backlog,
];

fn random_priority(rng: &mut ThreadRng) -> Priority {
    PRIORITIES[rng.gen_range(0..PRIORITIES.len())]
}

/// Build a random DAG by only ever connecting a lower-indexed task to a
/// higher-indexed one, which guarantees acyclicity regardless of edge order.
fn create_graph(num_nodes: usize, num_edges: usize) -> (Scheduler, Vec<String>, Vec<(String, String)>) {
    let mut rng = rand::thread_rng();
    let mut scheduler = Scheduler::new(SchedulerConfig::default());
    let names: Vec<String> = (0..num_nodes).map(|i| format!("task_{i:05}")).collect();

    for name in &names {
        let priority = random_priority(&mut rng);
        let duration = rng.gen_range(1..=5);
        let tokens = rng.gen_range(500..=5000);
        let task = Task::new(name.clone(), priority, duration, tokens).expect("valid task");
        scheduler.register(task).expect("unique name");
    }

    let mut edges = Vec::new();
    let max_attempts = num_edges * 3;
    for _ in 0..max_attempts {
        if edges.len() >= num_edges {
            break;
        }
        let from_idx = rng.gen_range(0..num_nodes - 1);
        let to_idx = rng.gen_range(from_idx + 1..num_nodes);
        if scheduler.add_edge(&names[from_idx], &names[to_idx]).unwrap_or(false) {
            edges.push((names[from_idx].clone(), names[to_idx].clone()));
        }
    }

    (scheduler, names, edges)
}

fn run_suite(num_nodes: usize, num_edges: usize, results: &mut BenchmarkResults) {
    println!("\n{}", "=".repeat(60));
    println!("Benchmark suite: {num_nodes} nodes, {num_edges} edges");
    println!("{}", "=".repeat(60));

    let start = Instant::now();
    let (mut scheduler, names, mut edges) = create_graph(num_nodes, num_edges);
    let creation_ms = start.elapsed().as_secs_f64() * 1000.0;
    results.add(&format!("graph_creation_{num_nodes}"), num_nodes, edges.len(), "create_graph", creation_ms, 1);
    println!("  created in {creation_ms:.2}ms");

    let mut rng = rand::thread_rng();

    // Incremental edge additions.
    let num_additions = (num_nodes / 10).min(100).max(1);
    let mut add_durations = Vec::with_capacity(num_additions);
    for _ in 0..num_additions {
        let from_idx = rng.gen_range(0..num_nodes - 1);
        let to_idx = rng.gen_range(from_idx + 1..num_nodes);
        let start = Instant::now();
        let added = scheduler.add_edge(&names[from_idx], &names[to_idx]).unwrap_or(false);
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        if added {
            add_durations.push(elapsed);
            edges.push((names[from_idx].clone(), names[to_idx].clone()));
        }
    }
    if !add_durations.is_empty() {
        let avg = add_durations.iter().sum::<f64>() / add_durations.len() as f64;
        let max = add_durations.iter().cloned().fold(f64::MIN, f64::max);
        results.add(&format!("edge_add_{num_nodes}"), num_nodes, edges.len(), "add_edge_avg", avg, 1);
        results.add(&format!("edge_add_{num_nodes}"), num_nodes, edges.len(), "add_edge_max", max, 1);
        println!("  add_edge avg {avg:.3}ms, max {max:.3}ms");
    }

    // Ready queries.
    let num_queries = num_nodes.min(100);
    let start = Instant::now();
    for _ in 0..num_queries {
        scheduler.compute_ready(10).expect("compute_ready");
    }
    let ready_ms = start.elapsed().as_secs_f64() * 1000.0;
    results.add(&format!("ready_query_{num_nodes}"), num_nodes, edges.len(), "ready_query", ready_ms, num_queries);
    println!("  ready_query avg {:.3}ms", ready_ms / num_queries as f64);

    // Cycle detection: try to add edges from the back half to the front half.
    let num_attempts = (num_nodes / 10).min(50).max(1);
    let start = Instant::now();
    for _ in 0..num_attempts {
        let from_idx = rng.gen_range(num_nodes / 2..num_nodes);
        let to_idx = rng.gen_range(0..=num_nodes / 2);
        if from_idx != to_idx {
            let _ = scheduler.add_edge(&names[from_idx], &names[to_idx]);
        }
    }
    let cycle_ms = start.elapsed().as_secs_f64() * 1000.0;
    results.add(&format!("cycle_detect_{num_nodes}"), num_nodes, edges.len(), "cycle_detection", cycle_ms, num_attempts);
    println!("  cycle_detection avg {:.3}ms", cycle_ms / num_attempts as f64);

    // Priority inheritance.
    let sample_size = (num_nodes / 10).min(50).max(1);
    let sample: Vec<&String> = names.choose_multiple(&mut rng, sample_size).collect();
    let start = Instant::now();
    for name in &sample {
        scheduler.effective_priority(name).expect("known task");
    }
    let inherit_ms = start.elapsed().as_secs_f64() * 1000.0;
    results.add(&format!("priority_inherit_{num_nodes}"), num_nodes, edges.len(), "priority_inheritance", inherit_ms, sample.len());
    println!("  priority_inheritance avg {:.3}ms", inherit_ms / sample.len() as f64);

    // Edge removal.
    let num_removals = (num_nodes / 20).min(50);
    if num_removals > 0 && !edges.is_empty() {
        let to_remove: Vec<&(String, String)> = edges.choose_multiple(&mut rng, num_removals.min(edges.len())).collect();
        let start = Instant::now();
        for (u, v) in &to_remove {
            scheduler.remove_edge(u, v).expect("known tasks");
        }
        let remove_ms = start.elapsed().as_secs_f64() * 1000.0;
        results.add(&format!("edge_remove_{num_nodes}"), num_nodes, edges.len(), "remove_edge", remove_ms, to_remove.len());
        println!("  remove_edge avg {:.3}ms", remove_ms / to_remove.len() as f64);
    }

    // Full topological sort.
    let start = Instant::now();
    scheduler.topological_order();
    let topo_ms = start.elapsed().as_secs_f64() * 1000.0;
    results.add(&format!("topo_sort_{num_nodes}"), num_nodes, edges.len(), "topological_sort", topo_ms, 1);
    println!("  topological_sort {topo_ms:.2}ms");

    // Full schedule.
    let start = Instant::now();
    scheduler.calculate_schedule();
    let schedule_ms = start.elapsed().as_secs_f64() * 1000.0;
    results.add(&format!("full_schedule_{num_nodes}"), num_nodes, edges.len(), "full_schedule", schedule_ms, 1);
    println!("  full_schedule {schedule_ms:.2}ms");
}

fn main() {
    env_logger_init();

    println!("{}", "=".repeat(60));
    println!("scheduler_core - performance benchmarks");
    println!("{}", "=".repeat(60));

    let mut results = BenchmarkResults::new();

    // (nodes, edges); kept an order of magnitude below the Python suite's
    // largest configurations so the bench finishes quickly by default.
    let configs = [(100, 200), (500, 1000), (1000, 3000)];

    for (num_nodes, num_edges) in configs {
        run_suite(num_nodes, num_edges, &mut results);
    }

    let json = serde_json::to_string_pretty(&results).expect("serializable results");
    fs::write("benchmark_results.json", &json).expect("write results");
    println!("\nresults written to benchmark_results.json");
}

fn env_logger_init() {
    let _ = env_logger::try_init();
}
