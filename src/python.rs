//! Python bindings for the metrics simulator using PyO3

use crate::config::{EncounterConfig, RunOptions};
use crate::error::SimError;
use crate::simulation::run_and_report;
use pyo3::prelude::*;

fn to_py_err(e: SimError) -> PyErr {
    match e {
        SimError::Io { .. } => PyErr::new::<pyo3::exceptions::PyIOError, _>(e.to_string()),
        _ => PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string()),
    }
}

fn run(py: Python<'_>, config: EncounterConfig, options: RunOptions) -> PyResult<String> {
    // Release GIL during computation
    let report = py
        .allow_threads(|| run_and_report(&config, &options))
        .map_err(to_py_err)?;
    report.to_json().map_err(to_py_err)
}

/// Run an encounter given as JSON and return the report as JSON
#[pyfunction]
#[pyo3(signature = (config_json, iterations, parallel=false, seed=0, save_all_values=false))]
fn simulate(
    py: Python<'_>,
    config_json: &str,
    iterations: usize,
    parallel: bool,
    seed: i64,
    save_all_values: bool,
) -> PyResult<String> {
    let config = EncounterConfig::from_json(config_json).map_err(to_py_err)?;
    let options = RunOptions {
        iterations,
        random_seed: seed,
        save_all_values,
        parallel,
    };
    run(py, config, options)
}

/// Run an encounter from a YAML or JSON file
#[pyfunction]
#[pyo3(signature = (config_path, iterations, parallel=false, seed=0))]
fn simulate_from_file(
    py: Python<'_>,
    config_path: &str,
    iterations: usize,
    parallel: bool,
    seed: i64,
) -> PyResult<String> {
    let config = EncounterConfig::from_file(config_path).map_err(to_py_err)?;
    let options = RunOptions {
        iterations,
        random_seed: seed,
        parallel,
        ..Default::default()
    };
    run(py, config, options)
}

/// Get number of threads being used for parallel simulation
#[pyfunction]
fn get_thread_count() -> PyResult<usize> {
    Ok(rayon::current_num_threads())
}

/// Get number of available CPU cores
#[pyfunction]
fn get_available_cores() -> PyResult<usize> {
    Ok(num_cpus::get())
}

/// Python module definition
#[pymodule]
fn combat_metrics_lib(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(simulate, m)?)?;
    m.add_function(wrap_pyfunction!(simulate_from_file, m)?)?;
    m.add_function(wrap_pyfunction!(get_thread_count, m)?)?;
    m.add_function(wrap_pyfunction!(get_available_cores, m)?)?;
    Ok(())
}
