use std::process::ExitCode;

use serde_json::{Value, json};

use corobeam_io::CaseConfig;
use corobeam_solver::{
    AdjointDriver, BeamModel, BeamSolver, DesignVariable, NonlinearConfig, Objective, SolverError,
    check_gradients, finite_difference_gradient,
};

fn usage() {
    eprintln!("usage: corobeam-cli <solve|adjoint|check-gradient> <case.json>");
}

fn run_solve(case: &CaseConfig) -> Result<Value, SolverError> {
    let mut solver = BeamSolver::from_case(case)?;
    let report = solver.solve(0)?.clone();
    let displacements: Vec<Value> = solver
        .displacement_records()
        .iter()
        .map(|r| json!({ "node": r.node + 1, "displacement": r.displacement }))
        .collect();
    Ok(json!({
        "command": "solve",
        "report": report,
        "residual": solver.equilibrium_residual(),
        "displacements": displacements,
    }))
}

/// Design variables of the case; Young's modulus when none are listed
fn design_variables(case: &CaseConfig) -> Vec<DesignVariable> {
    if case.design_variables.is_empty() {
        vec![DesignVariable::YoungModulus]
    } else {
        case.design_variables.iter().map(DesignVariable::from).collect()
    }
}

fn objective(case: &CaseConfig) -> Result<Objective, SolverError> {
    case.objective
        .as_ref()
        .map(Objective::from)
        .ok_or_else(|| SolverError::InvalidModel("case has no objective".to_string()))
}

fn run_adjoint(case: &CaseConfig) -> Result<(AdjointDriver, f64), SolverError> {
    let model = BeamModel::from_case(case)?;
    let objective = objective(case)?;
    let mut driver = AdjointDriver::new(model, NonlinearConfig::from(&case.solver))?;

    driver.start_recording()?;
    for variable in design_variables(case) {
        driver.register_input(variable)?;
    }
    driver.set_dependencies()?;
    driver.solve(0)?;
    let value = driver.set_objective(&objective)?;
    driver.stop_recording()?;
    driver.compute_adjoint()?;
    Ok((driver, value))
}

fn adjoint_report(case: &CaseConfig) -> Result<Value, SolverError> {
    let (driver, value) = run_adjoint(case)?;
    let mut gradients = Vec::new();
    for variable in design_variables(case) {
        let entry = match variable {
            DesignVariable::AllLoads => json!({ "variable": variable, "gradient": driver.gradients()?.loads }),
            _ => json!({ "variable": variable, "gradient": driver.gradient(variable)? }),
        };
        gradients.push(entry);
    }
    Ok(json!({
        "command": "adjoint",
        "objective": value,
        "tape_length": driver.tape().len(),
        "gradients": gradients,
    }))
}

fn gradient_check_report(case: &CaseConfig) -> Result<Value, SolverError> {
    let (driver, value) = run_adjoint(case)?;
    let differences = finite_difference_gradient(
        driver.model(),
        &NonlinearConfig::from(&case.solver),
        &objective(case)?,
        &design_variables(case),
        case.fd_step,
    )?;
    let checks = check_gradients(driver.gradients()?, &differences);
    let max_error = checks.iter().map(|c| c.relative_error).fold(0.0, f64::max);
    Ok(json!({
        "command": "check-gradient",
        "objective": value,
        "fd_step": case.fd_step,
        "max_relative_error": max_error,
        "checks": checks,
    }))
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        usage();
        return ExitCode::from(2);
    }

    let case = match CaseConfig::load(&args[2]) {
        Ok(case) => case,
        Err(err) => {
            eprintln!("case error: {err}");
            return ExitCode::from(1);
        }
    };

    let result = match args[1].as_str() {
        "solve" => run_solve(&case),
        "adjoint" => adjoint_report(&case),
        "check-gradient" => gradient_check_report(&case),
        _ => {
            usage();
            return ExitCode::from(2);
        }
    };

    match result.and_then(|report| {
        serde_json::to_string_pretty(&report)
            .map_err(|e| SolverError::InvalidModel(format!("report serialization failed: {e}")))
    }) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}
