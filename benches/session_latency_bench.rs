// Session latency benchmark
// Measures one full in-process session: open, compile, load, execute.
// Budget: p50 < 5ms, p95 < 20ms for small plugins

use scriptbox::config::loader::SandboxConfig;
use scriptbox::core::unit::PluginUnit;
use scriptbox::exec::CompilationOrchestrator;
use std::time::{Duration, Instant};

const ITERATIONS: usize = 200;
const WARMUP_ITERATIONS: usize = 20;

struct LatencyStats {
    p50: Duration,
    p95: Duration,
    p99: Duration,
    min: Duration,
    max: Duration,
    mean: Duration,
}

impl LatencyStats {
    fn from_samples(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        let len = samples.len();

        let p50_idx = (len as f64 * 0.50) as usize;
        let p95_idx = (len as f64 * 0.95) as usize;
        let p99_idx = (len as f64 * 0.99) as usize;

        let sum: Duration = samples.iter().sum();
        let mean = sum / len as u32;

        Self {
            p50: samples[p50_idx],
            p95: samples[p95_idx],
            p99: samples[p99_idx],
            min: samples[0],
            max: samples[len - 1],
            mean,
        }
    }

    fn print(&self, label: &str) {
        println!("\n{}", label);
        println!("  p50: {:?}", self.p50);
        println!("  p95: {:?}", self.p95);
        println!("  p99: {:?}", self.p99);
        println!("  min: {:?}", self.min);
        println!("  max: {:?}", self.max);
        println!("  mean: {:?}", self.mean);
    }
}

struct BenchmarkResult {
    scenario: String,
    stats: LatencyStats,
    passed: bool,
    reason: Option<String>,
}

impl BenchmarkResult {
    fn print(&self) {
        println!("\n=== {} ===", self.scenario);
        self.stats.print("Latency");

        match &self.reason {
            None => println!("PASS"),
            Some(reason) => println!("FAIL: {}", reason),
        }
    }
}

fn measure(scenario: &str, units: &[(&str, &str)], p50: Duration, p95: Duration) -> BenchmarkResult {
    let orchestrator = CompilationOrchestrator::new(SandboxConfig::default());
    let build = || -> Vec<PluginUnit> {
        units
            .iter()
            .map(|(name, source)| PluginUnit::new(name, *source).expect("valid unit name"))
            .collect()
    };

    for _ in 0..WARMUP_ITERATIONS {
        let _ = orchestrator.run(build());
    }

    let mut samples = Vec::with_capacity(ITERATIONS);
    for _ in 0..ITERATIONS {
        let units = build();
        let start = Instant::now();
        let report = orchestrator.run(units).expect("session");
        samples.push(start.elapsed());
        assert!(report.succeeded(), "{:?}", report.failure);
    }

    let stats = LatencyStats::from_samples(samples);
    let passed = stats.p50 < p50 && stats.p95 < p95;
    let reason = if passed {
        None
    } else {
        Some(format!(
            "p50={:?} (target <{:?}), p95={:?} (target <{:?})",
            stats.p50, p50, stats.p95, p95
        ))
    };

    BenchmarkResult {
        scenario: scenario.to_string(),
        stats,
        passed,
        reason,
    }
}

fn main() {
    println!("=== scriptbox Session Latency Benchmark ===");
    println!("Iterations: {} (after {} warmup)", ITERATIONS, WARMUP_ITERATIONS);

    let results = vec![
        measure(
            "Hello plugin",
            &[(
                "contract.Hello",
                "import io.print; plugin Hello : Plugin { fn execute() { print(\"Hello, World!\"); } }",
            )],
            Duration::from_millis(5),
            Duration::from_millis(20),
        ),
        measure(
            "Loop with sibling call",
            &[
                (
                    "contract.Main",
                    "plugin Main : Plugin { fn execute() { let i = 0; while i < 1000 { i = Step.next(i); } } }",
                ),
                (
                    "contract.Step",
                    "plugin Step : Plugin { fn execute() { } fn next(i) { return i + 1; } }",
                ),
            ],
            Duration::from_millis(10),
            Duration::from_millis(40),
        ),
    ];

    for result in &results {
        result.print();
    }

    let passed_count = results.iter().filter(|r| r.passed).count();
    let total_count = results.len();

    println!("\n=== Summary ===");
    println!("{}/{} scenarios passed", passed_count, total_count);

    if passed_count == total_count {
        println!("All session latency budgets met");
        std::process::exit(0);
    } else {
        println!("Some session latency budgets exceeded");
        std::process::exit(1);
    }
}
