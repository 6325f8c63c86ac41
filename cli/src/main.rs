use std::fs;
use std::process::ExitCode;

use clap::Parser;
use serde_derive::Deserialize;

use scheduler_core::{Priority, Scheduler, SchedulerConfig, Task};

#[derive(Parser)]
#[clap(
    name = "scheduler_cli",
    version = "0.1.0",
    about = "Load a task graph from YAML, apply gate approvals, and print the ready queue, topological order, and schedule."
)]
struct ArgParser {
    /// Path to the task graph YAML file.
    #[clap(short = 'f', long = "graph_path", required = true)]
    graph_path: String,
    /// Human gate id to approve before computing the ready queue. Repeatable.
    #[clap(long = "approve")]
    approve: Vec<String>,
    /// Human gate id to revoke before computing the ready queue. Repeatable.
    #[clap(long = "revoke")]
    revoke: Vec<String>,
    /// Limit on the number of ready tasks printed (0 = unlimited).
    #[clap(long = "limit", default_value_t = 0)]
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct TaskSpec {
    name: String,
    priority: String,
    duration: u32,
    estimated_tokens: u32,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    await_kind: Option<String>,
    #[serde(default)]
    await_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphSpec {
    tasks: Vec<TaskSpec>,
}

fn parse_priority(raw: &str) -> Result<Priority, String> {
    match raw.to_ascii_lowercase().as_str() {
        "critical" => Ok(Priority::Critical),
        "high" => Ok(Priority::High),
        "medium" => Ok(Priority::Medium),
        "low" => Ok(Priority::Low),
        "backlog" => Ok(Priority::Backlog),
        other => Err(format!("unknown priority '{other}'")),
    }
}

fn run(arg: &ArgParser) -> Result<(), String> {
    let raw = fs::read_to_string(&arg.graph_path)
        .map_err(|e| format!("reading '{}': {e}", arg.graph_path))?;
    let spec: GraphSpec = serde_yaml::from_str(&raw).map_err(|e| format!("parsing graph: {e}"))?;

    let mut scheduler = Scheduler::new(SchedulerConfig::default());

    for task_spec in &spec.tasks {
        let priority = parse_priority(&task_spec.priority)?;
        let mut task = Task::new(&task_spec.name, priority, task_spec.duration, task_spec.estimated_tokens)
            .map_err(|e| e.to_string())?;
        if let (Some(kind), Some(id)) = (&task_spec.await_kind, &task_spec.await_id) {
            task = task.with_gate(kind.clone(), id.clone());
        }
        scheduler.register(task).map_err(|e| e.to_string())?;
    }

    for task_spec in &spec.tasks {
        for dep in &task_spec.depends_on {
            scheduler
                .add_edge(dep, &task_spec.name)
                .map_err(|e| format!("adding edge {dep} -> {}: {e}", task_spec.name))?;
        }
    }

    for id in &arg.approve {
        scheduler.approve_gate(id);
    }
    for id in &arg.revoke {
        scheduler.revoke_gate(id);
    }

    let ready = scheduler.compute_ready(arg.limit).map_err(|e| e.to_string())?;
    println!("ready queue ({} tasks):", ready.len());
    for entry in &ready {
        println!(
            "  {} (priority={:?}, effective={:?}, boosted={})",
            entry.task.name, entry.task.priority, entry.effective_priority, entry.priority_boosted
        );
    }

    println!("\ntopological order:");
    for name in scheduler.topological_order() {
        println!("  {name}");
    }

    let schedule = scheduler.calculate_schedule();
    let rendered = serde_yaml::to_string(&schedule).map_err(|e| format!("serializing schedule: {e}"))?;
    println!("\nschedule:\n{rendered}");

    let stats = scheduler.statistics();
    log::info!(
        "{} tasks, {} edges, {} ready, avg in-degree {:.2}",
        stats.total_tasks,
        stats.total_edges,
        stats.ready_tasks,
        stats.avg_indegree
    );

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let arg = ArgParser::parse();

    match run(&arg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::FAILURE
        }
    }
}
