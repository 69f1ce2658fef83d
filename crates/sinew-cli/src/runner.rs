//! Benchmark runner and metrics.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use sinew_solver::{MuscleSolver, StepOutcome};
use sinew_types::SinewResult;

use crate::scenarios::Scenario;

/// Metrics collected from one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkMetrics {
    pub scenario: String,
    pub backend: String,
    /// Execution path selected at initialization.
    pub path: String,
    pub particle_count: usize,
    pub constraint_count: usize,
    pub timesteps: u32,
    /// Steps that made no position update.
    pub skipped_steps: u32,
    /// Total wall-clock time (seconds).
    pub total_wall_time: f64,
    pub avg_step_time: f64,
    pub min_step_time: f64,
    pub max_step_time: f64,
    /// Largest `|L - rest|` before the first step.
    pub initial_error: f32,
    pub final_error: f32,
}

impl BenchmarkMetrics {
    pub fn to_csv_header() -> String {
        "scenario,backend,path,particles,constraints,timesteps,skipped,total_wall_time_s,avg_step_ms,min_step_ms,max_step_ms,initial_error,final_error".to_string()
    }

    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{:.6},{:.4},{:.4},{:.4},{:.6e},{:.6e}",
            self.scenario,
            self.backend,
            self.path,
            self.particle_count,
            self.constraint_count,
            self.timesteps,
            self.skipped_steps,
            self.total_wall_time,
            self.avg_step_time * 1000.0,
            self.min_step_time * 1000.0,
            self.max_step_time * 1000.0,
            self.initial_error,
            self.final_error,
        )
    }

    /// Header plus one row per run.
    pub fn to_csv(metrics: &[BenchmarkMetrics]) -> String {
        let mut csv = Self::to_csv_header();
        for m in metrics {
            csv.push('\n');
            csv.push_str(&m.to_csv_row());
        }
        csv
    }
}

/// Runs scenarios against a solver and collects metrics.
pub struct BenchmarkRunner;

impl BenchmarkRunner {
    /// Initializes `solver` with the scenario mesh and steps it to the end.
    pub fn run(scenario: &Scenario, mut solver: MuscleSolver) -> SinewResult<BenchmarkMetrics> {
        let path = solver.initialize(scenario.mesh.clone())?;
        let error = |s: &MuscleSolver| s.body().map_or(0.0, |b| b.max_constraint_error());
        let initial_error = error(&solver);

        let mut step_times = Vec::with_capacity(scenario.timesteps as usize);
        let mut skipped_steps = 0;
        let total_start = Instant::now();
        for _ in 0..scenario.timesteps {
            let result = solver.solve(scenario.dt);
            step_times.push(result.wall_time);
            if let StepOutcome::Skipped(_) = result.outcome {
                skipped_steps += 1;
            }
        }
        solver.flush();
        let total_wall_time = total_start.elapsed().as_secs_f64();

        let avg_step_time = if step_times.is_empty() {
            0.0
        } else {
            step_times.iter().sum::<f64>() / step_times.len() as f64
        };
        let min_step_time = step_times.iter().copied().fold(f64::MAX, f64::min);
        let max_step_time = step_times.iter().copied().fold(0.0, f64::max);

        Ok(BenchmarkMetrics {
            scenario: scenario.kind.name().to_string(),
            backend: solver.backend_name().to_string(),
            path: path.to_string(),
            particle_count: solver.positions().len(),
            constraint_count: solver.constraints().len(),
            timesteps: scenario.timesteps,
            skipped_steps,
            total_wall_time,
            avg_step_time,
            min_step_time,
            max_step_time,
            initial_error,
            final_error: error(&solver),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::ScenarioKind;
    use sinew_solver::SolverConfig;

    #[test]
    fn tetrahedron_run_reduces_error() {
        let scenario = Scenario::from_kind(ScenarioKind::Tetrahedron);
        let solver = MuscleSolver::cpu_only(SolverConfig::default());
        let metrics = BenchmarkRunner::run(&scenario, solver).unwrap();

        assert_eq!(metrics.path, "cpu");
        assert_eq!(metrics.backend, "none");
        assert_eq!(metrics.particle_count, 4);
        assert_eq!(metrics.constraint_count, 6);
        assert_eq!(metrics.skipped_steps, 0);
        assert!(metrics.final_error < metrics.initial_error);
    }

    #[test]
    fn csv_has_one_row_per_run() {
        let scenario = Scenario::from_kind(ScenarioKind::Tetrahedron);
        let metrics = BenchmarkRunner::run(&scenario, MuscleSolver::cpu_only(SolverConfig::default())).unwrap();
        let csv = BenchmarkMetrics::to_csv(&[metrics.clone(), metrics]);

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        let columns = lines[0].split(',').count();
        assert!(lines[1..].iter().all(|l| l.split(',').count() == columns));
    }
}
