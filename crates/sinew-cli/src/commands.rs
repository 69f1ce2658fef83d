//! CLI command implementations.

use std::error::Error;
use std::path::{Path, PathBuf};

use sinew_gpu::{ComputeBackend, EmulatedDevice, KernelManager, KernelSource, WgpuBackend};
use sinew_mesh::{color_constraints, MeshData, SoftBody};
use sinew_solver::{MuscleSolver, SolverConfig};
use sinew_telemetry::Diagnostics;
use sinew_types::{SinewError, SinewResult};

use crate::config::SimulationConfig;
use crate::runner::{BenchmarkMetrics, BenchmarkRunner};
use crate::scenarios::{Scenario, ScenarioKind};
use crate::Backend;

type CommandResult = Result<(), Box<dyn Error>>;

fn load_mesh(path: &Path) -> SinewResult<MeshData> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| SinewError::Serialization(format!("{}: {e}", path.display())))
}

fn solver_for(backend: Backend, config: SolverConfig) -> MuscleSolver {
    let device: Box<dyn ComputeBackend> = match backend {
        Backend::Cpu => return MuscleSolver::cpu_only(config),
        Backend::Emulated => Box::new(EmulatedDevice::new()),
        Backend::Wgpu => sinew_gpu::default_backend(),
    };
    MuscleSolver::new(config, device)
}

/// Run a simulation from config file.
pub fn simulate(config_path: &str, mesh_path: Option<&str>, log_level: Option<&str>) -> CommandResult {
    let sim = SimulationConfig::load(Path::new(config_path))?;
    crate::init_tracing(Some(log_level.unwrap_or(&sim.log_level)));

    println!("Sinew Simulation");
    println!("────────────────");
    println!("Config: {config_path}");

    let mesh = match mesh_path.map(PathBuf::from).or_else(|| sim.mesh.clone()) {
        Some(path) => {
            println!("Mesh:   {}", path.display());
            load_mesh(&path)?
        }
        None => {
            println!("Mesh:   {} (built-in)", sim.scenario.name());
            Scenario::from_kind(sim.scenario).mesh
        }
    };

    let backend = if sim.solver.prefer_gpu { Backend::Wgpu } else { Backend::Cpu };
    let mut solver = solver_for(backend, sim.solver.clone());
    let path = solver.initialize(mesh)?;
    println!(
        "Solver: {} particles, {} constraints, {path} path ({})",
        solver.positions().len(),
        solver.constraints().len(),
        solver.backend_name()
    );
    println!();

    let error = |s: &MuscleSolver| s.body().map_or(0.0, |b| b.max_constraint_error());
    let initial_error = error(&solver);
    let mut skipped = 0u32;
    let mut wall_time = 0.0;
    for step in 0..sim.steps {
        let result = solver.solve(sim.dt);
        wall_time += result.wall_time;
        if result.outcome.is_skipped() {
            skipped += 1;
        }
        if step % 60 == 0 {
            tracing::debug!(step, error = error(&solver), "progress");
        }
    }
    solver.flush();

    println!("  Steps:         {} ({skipped} skipped)", sim.steps);
    println!("  Wall time:     {wall_time:.3}s");
    println!("  Max error:     {initial_error:.6e} -> {:.6e}", error(&solver));

    if let Some(out) = &sim.output {
        let result = MeshData {
            positions: solver.positions().to_vec(),
            rest_positions: solver.rest_positions().to_vec(),
            constraints: solver.constraints().iter().map(|&c| c.into()).collect(),
        };
        std::fs::write(out, serde_json::to_string_pretty(&result)?)?;
        println!("Final mesh written to: {}", out.display());
    }

    Ok(())
}

/// Run benchmark suite.
pub fn benchmark(scenario_name: &str, backend: Backend, output_path: Option<&str>) -> CommandResult {
    println!("Sinew Benchmark Suite");
    println!("═════════════════════");
    println!();

    let scenarios: Vec<ScenarioKind> = if scenario_name == "all" {
        ScenarioKind::all().to_vec()
    } else {
        match ScenarioKind::from_name(scenario_name) {
            Some(kind) => vec![kind],
            None => {
                eprintln!("Unknown scenario: {scenario_name}");
                eprintln!("Available: tetrahedron, chain, lattice, all");
                return Err("Unknown scenario".into());
            }
        }
    };

    let mut all_metrics = Vec::new();
    for &kind in &scenarios {
        let scenario = Scenario::from_kind(kind);
        println!(
            "Running: {} ({} particles, {} constraints, {} steps)",
            kind.name(),
            scenario.mesh.particle_count(),
            scenario.mesh.constraint_count(),
            scenario.timesteps,
        );

        let solver = solver_for(backend, SolverConfig::default());
        let metrics = BenchmarkRunner::run(&scenario, solver).map_err(|e| format!("Benchmark failed: {e}"))?;

        println!("  Path:          {} ({})", metrics.path, metrics.backend);
        println!("  Wall time:     {:.3}s", metrics.total_wall_time);
        println!("  Avg step:      {:.3}ms", metrics.avg_step_time * 1000.0);
        println!("  Max error:     {:.6e} -> {:.6e}", metrics.initial_error, metrics.final_error);
        if metrics.skipped_steps > 0 {
            println!("  Skipped:       {}", metrics.skipped_steps);
        }
        println!();

        all_metrics.push(metrics);
    }

    if let Some(path) = output_path {
        std::fs::write(path, BenchmarkMetrics::to_csv(&all_metrics))?;
        println!("Results written to: {path}");
    } else {
        println!("CSV Output:");
        println!("{}", BenchmarkMetrics::to_csv(&all_metrics));
    }

    Ok(())
}

/// Validate a mesh (.json) or simulation config (.toml).
pub fn validate(path: &str) -> CommandResult {
    println!("Sinew Validator");
    println!("───────────────");
    println!("File: {path}");
    println!();

    let file = Path::new(path);
    match file.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            let body = SoftBody::from_mesh(load_mesh(file)?)?;
            let batches = color_constraints(body.constraints(), body.particle_count());
            println!("Particles:     {}", body.particle_count());
            println!("Constraints:   {}", body.constraint_count());
            println!("Max error:     {:.6e}", body.max_constraint_error());
            println!("Colors:        {}", batches.batch_count());
            if body.has_shared_vertices() {
                println!("Note: constraints share particles; concurrent GPU dispatch is non-deterministic.");
                println!("      Set solver.dispatch_mode = \"colored\" for reproducible results.");
            }
        }
        Some("toml") => {
            let sim = SimulationConfig::load(file)?;
            println!("Steps:         {} x {:.4}s", sim.steps, sim.dt);
            println!("Stiffness:     {}", sim.solver.stiffness);
            println!("Workgroup:     {}", sim.solver.workgroup_size);
            println!("Dispatch:      {:?}", sim.solver.dispatch_mode);
            println!("Readback:      {:?}", sim.solver.readback_mode);
            if let Some(mesh) = &sim.mesh {
                SoftBody::from_mesh(load_mesh(mesh)?)?;
                println!("Mesh:          {} (valid)", mesh.display());
            }
        }
        _ => return Err(format!("unsupported file type: {path} (expected .json or .toml)").into()),
    }

    println!();
    println!("OK");
    Ok(())
}

/// Report the GPU adapter and kernel availability.
pub fn probe(kernel: Option<&str>, workgroup_size: u32) -> CommandResult {
    println!("Sinew Device Probe");
    println!("──────────────────");

    let mut backend = match WgpuBackend::new() {
        Ok(backend) => backend,
        Err(e) => {
            println!("Adapter:       none ({e})");
            println!("GPU path:      unavailable; solver will use the CPU path");
            return Ok(());
        }
    };

    let info = backend.adapter_info();
    println!("Adapter:       {}", info.name);
    println!("Backend:       {:?}", info.backend);
    println!("Device type:   {:?}", info.device_type);
    if !info.driver.is_empty() {
        println!("Driver:        {} {}", info.driver, info.driver_info);
    }

    let source = kernel.map_or(KernelSource::Embedded, |path| KernelSource::File(path.into()));
    println!("Kernel:        {} (workgroup size {workgroup_size})", source.describe());

    let mut diagnostics = Diagnostics::with_tracing();
    let mut manager = KernelManager::new(source, workgroup_size);
    let available = manager.initialize(&mut backend, &mut diagnostics);
    diagnostics.finalize();

    if available {
        println!("GPU path:      available");
    } else {
        println!("GPU path:      unavailable (kernel failed to compile)");
    }
    Ok(())
}
