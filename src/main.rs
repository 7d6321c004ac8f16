mod car_rental;
mod config;
mod gridworld;
mod solver;

use std::path::Path;
use std::process;

use log::info;

use car_rental::CarRental;
use config::Config;
use gridworld::GridWorld;
use solver::policy_iteration::PolicyIteration;
use solver::SolverError;

const CONFIG_FILE: &str = "dp.toml";

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        process::exit(1);
    }
}

fn run() -> Result<(), SolverError> {
    let config = Config::load(Path::new(CONFIG_FILE))?;

    println!("== Grid world ==");
    let grid = GridWorld::from_config(&config.grid.world)?;
    let mut engine = PolicyIteration::new(grid, config.grid.solver.clone())?;
    let solution = engine.run()?;
    info!(
        "grid world: converged={}, sweeps={}, improvements={}",
        solution.converged, solution.evaluation_sweeps, solution.improvements
    );
    println!("state values:");
    gridworld::print_grid_values(engine.model(), &solution.values);
    println!("policy:");
    gridworld::print_grid_policy(engine.model(), &solution.policy);

    println!("== Jack's car rental ==");
    let rental = CarRental::new(config.rental.model.clone())?;
    println!("expected rewards:");
    car_rental::print_rental_rewards(&rental);
    let mut engine = PolicyIteration::new(rental, config.rental.solver.clone())?;
    let solution = engine.run()?;
    info!(
        "car rental: converged={}, sweeps={}, improvements={}",
        solution.converged, solution.evaluation_sweeps, solution.improvements
    );
    println!("state values:");
    car_rental::print_rental_values(engine.model(), &solution.values);
    println!("policy (cars moved from location 1 to 2):");
    car_rental::print_rental_policy(engine.model(), &solution.policy);

    Ok(())
}
