use std::collections::HashMap;

use log::debug;
use prettytable::{Cell, Row, Table};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Discrete, Poisson};

use crate::solver::{Model, Policy, SolverError, ValueTable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RentalConfig {
    /// Capacity of each location; states range over [0, max_cars]^2.
    pub max_cars: i32,
    /// Largest overnight transfer in either direction.
    pub max_move: i32,
    /// Income per car rented out.
    pub rental_reward: f64,
    /// Cost per car actually moved overnight.
    pub transfer_cost: f64,
    /// Poisson rates for rental demand at locations 1 and 2.
    pub rental_lambda: [f64; 2],
    /// Poisson rates for returns at locations 1 and 2.
    pub return_lambda: [f64; 2],
    /// The demand/return integrals run over [0, truncation) instead of the
    /// unbounded Poisson support. The tail mass left out is tiny for the
    /// default rates but never exactly zero.
    pub truncation: i32,
    /// Reject infeasible transfers instead of clamping them.
    pub strict_actions: bool,
}

impl Default for RentalConfig {
    fn default() -> RentalConfig {
        RentalConfig {
            max_cars: 20,
            max_move: 5,
            rental_reward: 10.0,
            transfer_cost: 2.0,
            rental_lambda: [3.0, 4.0],
            return_lambda: [3.0, 2.0],
            truncation: 40,
            strict_actions: false,
        }
    }
}

impl RentalConfig {
    pub fn validate(&self) -> Result<(), SolverError> {
        if self.max_cars <= 0 {
            return Err(SolverError::InvalidConfiguration(format!(
                "max_cars must be positive, got {}",
                self.max_cars
            )));
        }
        if self.max_move < 0 {
            return Err(SolverError::InvalidConfiguration(format!(
                "max_move must be non-negative, got {}",
                self.max_move
            )));
        }
        if self.truncation <= 0 {
            return Err(SolverError::InvalidConfiguration(format!(
                "truncation must be positive, got {}",
                self.truncation
            )));
        }
        for lambda in self.rental_lambda.iter().chain(self.return_lambda.iter()) {
            if *lambda <= 0.0 {
                return Err(SolverError::InvalidConfiguration(format!(
                    "Poisson rates must be positive, got {}",
                    lambda
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct State {
    // Cars at locations 1 and 2 at the start of the day.
    pub l1: i32,
    pub l2: i32,
}

impl State {
    pub fn new(l1: i32, l2: i32) -> State {
        State { l1, l2 }
    }
}

/// Jack's car rental: two locations, Poisson rental demand and returns,
/// overnight transfers as actions. A positive action moves cars from
/// location 1 to location 2. Expected per-state rewards are integrated once
/// at construction; transitions cover the transfer only, with the day's
/// stochastic flow folded into the reward table.
pub struct CarRental {
    config: RentalConfig,
    rewards: HashMap<State, f64>,
}

impl CarRental {
    pub fn new(config: RentalConfig) -> Result<CarRental, SolverError> {
        config.validate()?;

        let rentals = [
            poisson(config.rental_lambda[0])?,
            poisson(config.rental_lambda[1])?,
        ];
        let returns = [
            poisson(config.return_lambda[0])?,
            poisson(config.return_lambda[1])?,
        ];

        let mut rewards = HashMap::new();
        for l1 in 0..=config.max_cars {
            let r1 = location_reward(l1, &rentals[0], &returns[0], &config);
            for l2 in 0..=config.max_cars {
                let r2 = location_reward(l2, &rentals[1], &returns[1], &config);
                rewards.insert(State::new(l1, l2), r1 + r2);
            }
        }
        debug!("precomputed expected rewards for {} states", rewards.len());

        Ok(CarRental { config, rewards })
    }

    // Largest transfer in the direction of `action` that respects the source
    // count and the destination capacity. Feasible actions map to themselves.
    fn clamp_transfer(&self, state: State, action: i32) -> i32 {
        if action >= 0 {
            action.min(state.l1).min(self.config.max_cars - state.l2)
        } else {
            -((-action).min(state.l2).min(self.config.max_cars - state.l1))
        }
    }
}

fn poisson(lambda: f64) -> Result<Poisson, SolverError> {
    Poisson::new(lambda).map_err(|_| {
        SolverError::InvalidConfiguration(format!("invalid Poisson rate {}", lambda))
    })
}

// Expected one-day rental income at a single location holding `cars`,
// integrating over the truncated (demand, returns) grid. When the day's net
// change would go negative, the payout is scaled by `net_change + demanded`
// instead of the raw demand.
fn location_reward(cars: i32, rentals: &Poisson, returns: &Poisson, config: &RentalConfig) -> f64 {
    let mut reward = 0.0;
    for demanded in 0..config.truncation {
        let demand_prob = rentals.pmf(demanded as u64);
        for returned in 0..config.truncation {
            let probability = demand_prob * returns.pmf(returned as u64);
            let net_change = cars - demanded + returned;
            let served = if net_change >= 0 {
                demanded
            } else {
                net_change + demanded
            };
            reward += config.rental_reward * served as f64 * probability;
        }
    }
    reward
}

impl Model for CarRental {
    type State = State;
    type Action = i32;

    fn states(&self) -> Vec<State> {
        let mut states = Vec::new();
        for l1 in 0..=self.config.max_cars {
            for l2 in 0..=self.config.max_cars {
                states.push(State::new(l1, l2));
            }
        }
        states
    }

    fn legal_actions(&self, state: State) -> Vec<i32> {
        // The zero transfer is always feasible, so the set is never empty.
        (-self.config.max_move..=self.config.max_move)
            .filter(|action| self.clamp_transfer(state, *action) == *action)
            .collect()
    }

    fn expected_reward(&self, state: State) -> f64 {
        *self.rewards.get(&state).unwrap_or(&0.0)
    }

    fn apply_action(&self, state: State, action: i32) -> Result<(State, f64), SolverError> {
        let moved = self.clamp_transfer(state, action);
        if self.config.strict_actions && moved != action {
            return Err(SolverError::IllegalAction {
                state: format!("({}, {})", state.l1, state.l2),
                action: action.to_string(),
            });
        }

        let next_state = State::new(state.l1 - moved, state.l2 + moved);
        Ok((next_state, self.config.transfer_cost * moved.abs() as f64))
    }
}

pub fn print_rental_values(rental: &CarRental, values: &ValueTable<State>) {
    print_rental_table(rental, |state| format!("{:.1}", values.get(state)));
}

pub fn print_rental_rewards(rental: &CarRental) {
    print_rental_table(rental, |state| format!("{:.1}", rental.expected_reward(state)));
}

pub fn print_rental_policy(rental: &CarRental, policy: &Policy<State, i32>) {
    print_rental_table(rental, |state| {
        let chosen: Vec<i32> = match policy.states.get(&state) {
            Some(policy_state) => policy_state
                .actions
                .iter()
                .filter(|(_, probability)| **probability > 0.0)
                .map(|(action, _)| *action)
                .collect(),
            None => Vec::new(),
        };
        match chosen.len() {
            0 => " ".to_string(),
            1 => chosen[0].to_string(),
            _ => "?".to_string(),
        }
    });
}

// Rows are location 1 counts, columns location 2 counts.
fn print_rental_table<F: Fn(State) -> String>(rental: &CarRental, cell: F) {
    let mut table = Table::new();
    for l1 in 0..=rental.config.max_cars {
        let mut cells = Vec::new();
        for l2 in 0..=rental.config.max_cars {
            cells.push(Cell::new(cell(State::new(l1, l2)).as_str()));
        }
        table.add_row(Row::new(cells));
    }
    table.printstd();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::policy_iteration::{PolicyIteration, PolicyIterationConfig};
    use float_eq::assert_float_eq;

    fn small_config() -> RentalConfig {
        RentalConfig {
            max_cars: 5,
            ..RentalConfig::default()
        }
    }

    #[test]
    fn truncated_poisson_mass_is_nearly_one() {
        let config = RentalConfig::default();
        for lambda in config
            .rental_lambda
            .iter()
            .chain(config.return_lambda.iter())
        {
            let distribution = poisson(*lambda).unwrap();
            let mass: f64 = (0..config.truncation)
                .map(|n| distribution.pmf(n as u64))
                .sum();
            assert!(mass >= 0.999, "mass {} for rate {}", mass, lambda);
            // The truncation bias for the default rates sits below f64
            // resolution, so only a loose upper bound can be checked.
            assert!(mass <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn expected_reward_grows_with_inventory() {
        let rental = CarRental::new(small_config()).unwrap();

        let mut previous = -1.0;
        for cars in 0..=5 {
            let reward = rental.expected_reward(State::new(cars, 0));
            assert!(reward > previous, "reward not increasing at {}", cars);
            previous = reward;
        }
    }

    #[test]
    fn legal_actions_respect_counts_and_capacity() {
        let rental = CarRental::new(small_config()).unwrap();

        // No cars anywhere: only the no-op.
        assert_eq!(rental.legal_actions(State::new(0, 0)), vec![0]);
        // Three cars at location 2: up to three can come back.
        assert_eq!(rental.legal_actions(State::new(0, 3)), vec![-3, -2, -1, 0]);
        // Full board: nothing can move.
        assert_eq!(rental.legal_actions(State::new(5, 5)), vec![0]);
    }

    #[test]
    fn infeasible_transfers_clamp_to_feasible() {
        let rental = CarRental::new(small_config()).unwrap();

        // Only three cars available: the request for five moves three.
        let (next_state, cost) = rental.apply_action(State::new(3, 0), 5).unwrap();
        assert_eq!(next_state, State::new(0, 3));
        assert_float_eq!(cost, 6.0, abs <= 0.0);

        // Destination capacity binds on the way back.
        let (next_state, cost) = rental.apply_action(State::new(4, 5), -4).unwrap();
        assert_eq!(next_state, State::new(5, 4));
        assert_float_eq!(cost, 2.0, abs <= 0.0);
    }

    #[test]
    fn zero_action_is_a_free_no_op() {
        let rental = CarRental::new(small_config()).unwrap();

        let (next_state, cost) = rental.apply_action(State::new(2, 4), 0).unwrap();
        assert_eq!(next_state, State::new(2, 4));
        assert_float_eq!(cost, 0.0, abs <= 0.0);
    }

    #[test]
    fn strict_mode_rejects_infeasible_transfers() {
        let config = RentalConfig {
            strict_actions: true,
            ..small_config()
        };
        let rental = CarRental::new(config).unwrap();

        let result = rental.apply_action(State::new(3, 0), 5);
        assert!(matches!(result, Err(SolverError::IllegalAction { .. })));

        // Feasible transfers still work.
        assert!(rental.apply_action(State::new(3, 0), 3).is_ok());
    }

    #[test]
    fn config_rejects_bad_rates() {
        let config = RentalConfig {
            rental_lambda: [0.0, 4.0],
            ..RentalConfig::default()
        };
        assert!(CarRental::new(config).is_err());
    }

    // With no cars to move, the first sweep of the empty state reduces to its
    // own expected reward: the only legal action is the no-op, whose
    // successor is the state itself, and the initial values are all zero.
    #[test]
    fn first_sweep_of_empty_state_is_its_reward() {
        let config = RentalConfig {
            transfer_cost: 0.0,
            ..small_config()
        };
        let rental = CarRental::new(config).unwrap();
        let policy = Policy::uniform(&rental);
        let mut values = ValueTable::zeroed(&rental);

        values.sweep_in_place(&rental, &policy, 0.9).unwrap();

        let expected = rental.expected_reward(State::new(0, 0));
        assert_float_eq!(values.get(State::new(0, 0)), expected, abs <= 1e-12);
    }

    #[test]
    fn small_rental_policy_iteration_stabilizes() {
        let rental = CarRental::new(small_config()).unwrap();
        let config = PolicyIterationConfig {
            discount: 0.9,
            theta: 1e-8,
            ..PolicyIterationConfig::default()
        };
        let mut engine = PolicyIteration::new(rental, config).unwrap();

        let solution = engine.run().unwrap();

        assert!(solution.converged);
        assert!(solution.improvements < 20);
        // The stable policy never moves cars out of an empty location.
        let empty = solution.policy.states.get(&State::new(0, 0)).unwrap();
        assert_float_eq!(empty.probability(0), 1.0, abs <= 0.0);
    }
}
