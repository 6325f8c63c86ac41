//! Reads `benchmark_results.json` (written by the `benchmark` binary) and
//! renders a Markdown performance report.

use std::collections::BTreeMap;
use std::fs;
use std::process::ExitCode;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct BenchResult {
    #[allow(dead_code)]
    test_name: String,
    nodes: usize,
    edges: usize,
    operation: String,
    avg_ms: f64,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct BenchmarkResults {
    metadata: Metadata,
    results: Vec<BenchResult>,
}

fn format_duration(ms: f64) -> String {
    if ms < 1.0 {
        format!("{:.0}\u{3bc}s", ms * 1000.0)
    } else if ms < 1000.0 {
        format!("{ms:.2}ms")
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}

fn group_by_config(results: &[BenchResult]) -> BTreeMap<(usize, usize), Vec<&BenchResult>> {
    let mut grouped: BTreeMap<(usize, usize), Vec<&BenchResult>> = BTreeMap::new();
    for r in results {
        grouped.entry((r.nodes, r.edges)).or_default().push(r);
    }
    grouped
}

fn metric<'a>(group: &[&'a BenchResult], op: &str) -> Option<f64> {
    group.iter().find(|r| r.operation == op).map(|r| r.avg_ms)
}

fn summary_table(results: &[BenchResult]) -> String {
    let mut lines = vec![
        "| Graph Size | Edge Add (Avg) | Ready Query | Cycle Detection | Priority Inherit | Topo Sort | Full Schedule |".to_string(),
        "|------------|----------------|-------------|------------------|-------------------|-----------|---------------|".to_string(),
    ];

    for ((nodes, edges), group) in group_by_config(results) {
        lines.push(format!(
            "| {nodes} nodes<br>{edges} edges | {} | {} | {} | {} | {} | {} |",
            metric(&group, "add_edge_avg").map(format_duration).unwrap_or_else(|| "-".into()),
            metric(&group, "ready_query").map(format_duration).unwrap_or_else(|| "-".into()),
            metric(&group, "cycle_detection").map(format_duration).unwrap_or_else(|| "-".into()),
            metric(&group, "priority_inheritance").map(format_duration).unwrap_or_else(|| "-".into()),
            metric(&group, "topological_sort").map(format_duration).unwrap_or_else(|| "-".into()),
            metric(&group, "full_schedule").map(format_duration).unwrap_or_else(|| "-".into()),
        ));
    }

    lines.join("\n")
}

fn detailed_sections(results: &[BenchResult]) -> String {
    let mut out = String::new();
    for ((nodes, edges), group) in group_by_config(results) {
        out.push_str(&format!("### Graph: {nodes} nodes, {edges} edges\n\n"));
        out.push_str("| Operation | Avg Duration |\n|-----------|---------------|\n");
        for r in &group {
            out.push_str(&format!("| {} | {} |\n", r.operation, format_duration(r.avg_ms)));
        }
        out.push('\n');
    }
    out
}

fn run() -> Result<(), String> {
    let raw = fs::read_to_string("benchmark_results.json")
        .map_err(|_| "benchmark_results.json not found; run the benchmark binary first".to_string())?;
    let data: BenchmarkResults = serde_json::from_str(&raw).map_err(|e| format!("parsing results: {e}"))?;

    let mut report = String::new();
    report.push_str("# Scheduler Core - Performance Benchmark Report\n\n");
    report.push_str(&format!("**Test run:** {}\n\n", data.metadata.timestamp));
    report.push_str("---\n\n## Performance Summary\n\n");
    report.push_str(&summary_table(&data.results));
    report.push_str("\n\n---\n\n## Detailed Results\n\n");
    report.push_str(&detailed_sections(&data.results));
    report.push_str("---\n");

    fs::write("benchmark_report.md", &report).map_err(|e| format!("writing report: {e}"))?;
    println!("report generated: benchmark_report.md ({} bytes)", report.len());
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::FAILURE
        }
    }
}
