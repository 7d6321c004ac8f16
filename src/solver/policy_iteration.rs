use std::collections::HashMap;
use std::hash::Hash;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{action_value, Model, Policy, PolicyState, SolverError, ValueTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    /// Values are updated as the sweep goes; later states read earlier
    /// states' fresh values. The default.
    InPlace,
    /// Double-buffered synchronous sweep. Converges along a different path,
    /// and commits nothing if a backup fails mid-sweep.
    Buffered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyIterationConfig {
    /// Discount factor, in (0, 1).
    pub discount: f64,
    /// Evaluation stops once the largest per-sweep value change drops below
    /// this threshold.
    pub theta: f64,
    /// Cap on evaluation sweeps per improvement round. Hitting it flags the
    /// run as unconverged instead of looping forever.
    pub max_eval_sweeps: u32,
    /// Cap on improvement rounds.
    pub max_improvements: u32,
    pub sweep: SweepMode,
    /// With improvement disabled the engine performs a single policy
    /// evaluation and stops.
    pub improve_policy: bool,
}

impl Default for PolicyIterationConfig {
    fn default() -> PolicyIterationConfig {
        PolicyIterationConfig {
            discount: 0.9,
            theta: 1e-8,
            max_eval_sweeps: 100_000,
            max_improvements: 100,
            sweep: SweepMode::InPlace,
            improve_policy: true,
        }
    }
}

impl PolicyIterationConfig {
    pub fn validate(&self) -> Result<(), SolverError> {
        if !(self.discount > 0.0 && self.discount < 1.0) {
            return Err(SolverError::InvalidConfiguration(format!(
                "discount must be in (0, 1), got {}",
                self.discount
            )));
        }
        if self.theta <= 0.0 {
            return Err(SolverError::InvalidConfiguration(format!(
                "theta must be positive, got {}",
                self.theta
            )));
        }
        if self.max_eval_sweeps == 0 || self.max_improvements == 0 {
            return Err(SolverError::InvalidConfiguration(
                "iteration caps must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// The tables produced by a policy-iteration run. `converged` is false when
/// an iteration cap was hit first; the tables then hold the best estimates
/// found so far.
#[derive(Debug, Clone)]
pub struct Solution<S: Eq + Hash, A: Eq + Hash> {
    pub values: ValueTable<S>,
    pub policy: Policy<S, A>,
    pub converged: bool,
    pub evaluation_sweeps: u64,
    pub improvements: u32,
}

/// Alternates policy evaluation and greedy policy improvement until the
/// policy is stable. Starts from a zero value table and the uniform random
/// policy; each evaluation warm-starts from the previous round's values.
pub struct PolicyIteration<M: Model> {
    model: M,
    config: PolicyIterationConfig,
    values: ValueTable<M::State>,
    policy: Policy<M::State, M::Action>,
}

impl<M: Model> PolicyIteration<M> {
    pub fn new(model: M, config: PolicyIterationConfig) -> Result<PolicyIteration<M>, SolverError> {
        config.validate()?;
        if model.states().is_empty() {
            return Err(SolverError::InvalidConfiguration(
                "state space is empty".to_string(),
            ));
        }

        let values = ValueTable::zeroed(&model);
        let policy = Policy::uniform(&model);
        Ok(PolicyIteration {
            model,
            config,
            values,
            policy,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn values(&self) -> &ValueTable<M::State> {
        &self.values
    }

    pub fn policy(&self) -> &Policy<M::State, M::Action> {
        &self.policy
    }

    /// Sweeps until the maximum value change drops below theta or the sweep
    /// cap is hit. Returns the number of sweeps and whether theta was reached.
    pub fn evaluate_policy(&mut self) -> Result<(u32, bool), SolverError> {
        for sweep in 1..=self.config.max_eval_sweeps {
            let max_delta = match self.config.sweep {
                SweepMode::InPlace => {
                    self.values
                        .sweep_in_place(&self.model, &self.policy, self.config.discount)?
                }
                SweepMode::Buffered => {
                    self.values
                        .sweep_buffered(&self.model, &self.policy, self.config.discount)?
                }
            };
            debug!("evaluation sweep {}: max delta {:e}", sweep, max_delta);
            if max_delta < self.config.theta {
                return Ok((sweep, true));
            }
        }

        warn!(
            "policy evaluation hit the {}-sweep cap before reaching theta",
            self.config.max_eval_sweeps
        );
        Ok((self.config.max_eval_sweeps, false))
    }

    /// Makes the policy greedy with respect to the current value table.
    /// Returns true if no state's action probabilities changed.
    pub fn improve_policy(&mut self) -> Result<bool, SolverError> {
        let mut stable = true;
        for state in self.model.states() {
            let legal_actions = self.model.legal_actions(state);
            if legal_actions.is_empty() {
                continue;
            }

            let mut action_values = HashMap::new();
            for action in legal_actions {
                action_values.insert(
                    action,
                    action_value(&self.model, &self.values, state, action, self.config.discount)?,
                );
            }

            let improved = PolicyState::greedy(&action_values);
            if self.policy.states.get(&state) != Some(&improved) {
                stable = false;
            }
            self.policy.states.insert(state, improved);
        }
        Ok(stable)
    }

    /// Runs evaluation and improvement to a stable policy (or a cap).
    pub fn run(&mut self) -> Result<Solution<M::State, M::Action>, SolverError> {
        let mut evaluation_sweeps: u64 = 0;
        let mut improvements: u32 = 0;
        let mut converged = false;

        loop {
            let (sweeps, evaluation_converged) = self.evaluate_policy()?;
            evaluation_sweeps += u64::from(sweeps);

            if !self.config.improve_policy {
                converged = evaluation_converged;
                break;
            }
            if !evaluation_converged {
                break;
            }

            improvements += 1;
            let stable = self.improve_policy()?;
            info!(
                "improvement {}: policy {}",
                improvements,
                if stable { "stable" } else { "changed" }
            );
            if stable {
                converged = true;
                break;
            }
            if improvements >= self.config.max_improvements {
                warn!(
                    "policy iteration hit the {}-improvement cap without a stable policy",
                    self.config.max_improvements
                );
                break;
            }
        }

        info!(
            "policy iteration finished: converged={}, sweeps={}, improvements={}",
            converged, evaluation_sweeps, improvements
        );
        Ok(Solution {
            values: self.values.clone(),
            policy: self.policy.clone(),
            converged,
            evaluation_sweeps,
            improvements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gridworld::{Coord, GridWorld};
    use float_eq::assert_float_eq;

    fn grid_config() -> PolicyIterationConfig {
        PolicyIterationConfig {
            discount: 0.5,
            theta: 1e-10,
            ..PolicyIterationConfig::default()
        }
    }

    #[test]
    fn config_rejects_bad_discount() {
        for discount in [0.0, 1.0, -0.5, 1.5].iter() {
            let config = PolicyIterationConfig {
                discount: *discount,
                ..PolicyIterationConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(SolverError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn config_rejects_non_positive_theta() {
        let config = PolicyIterationConfig {
            theta: 0.0,
            ..PolicyIterationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn converged_values_are_a_fixed_point() {
        let grid = GridWorld::new(2, 2).unwrap();
        let mut engine = PolicyIteration::new(grid, grid_config()).unwrap();

        let (_, converged) = engine.evaluate_policy().unwrap();
        assert!(converged);

        // One more sweep over the converged values moves nothing past theta.
        let mut values = engine.values().clone();
        let max_delta = values
            .sweep_in_place(engine.model(), engine.policy(), 0.5)
            .unwrap();
        assert!(max_delta < 1e-10);
    }

    #[test]
    fn improvement_is_monotone() {
        let grid = GridWorld::new(2, 2).unwrap();
        let mut engine = PolicyIteration::new(grid, grid_config()).unwrap();

        engine.evaluate_policy().unwrap();
        let before = engine.values().clone();

        engine.improve_policy().unwrap();
        engine.evaluate_policy().unwrap();

        for state in engine.model().states() {
            assert!(
                engine.values().get(state) >= before.get(state) - 1e-9,
                "value dropped at {:?}",
                state
            );
        }
    }

    #[test]
    fn grid_policy_iteration_converges() {
        let grid = GridWorld::new(2, 2).unwrap();
        let mut engine = PolicyIteration::new(grid, grid_config()).unwrap();

        let solution = engine.run().unwrap();

        assert!(solution.converged);
        // Every non-terminal square should head straight for the goal:
        // the corner adjacent squares pick a single best direction each,
        // the far corner splits between the two equally good ones.
        let start = solution.policy.states.get(&Coord::new(0, 0)).unwrap();
        let nonzero = start.actions.values().filter(|p| **p > 0.0).count();
        assert_eq!(nonzero, 2);
    }

    #[test]
    fn sweep_cap_flags_non_convergence() {
        let grid = GridWorld::new(2, 2).unwrap();
        let config = PolicyIterationConfig {
            discount: 0.9,
            theta: 1e-15,
            max_eval_sweeps: 3,
            ..PolicyIterationConfig::default()
        };
        let mut engine = PolicyIteration::new(grid, config).unwrap();

        let solution = engine.run().unwrap();

        assert!(!solution.converged);
        assert_eq!(solution.evaluation_sweeps, 3);
        // Best-so-far values are still reported.
        assert!(solution.values.get(Coord::new(0, 1)) > 0.0);
    }

    #[test]
    fn evaluation_only_mode_skips_improvement() {
        let grid = GridWorld::new(2, 2).unwrap();
        let config = PolicyIterationConfig {
            improve_policy: false,
            ..grid_config()
        };
        let mut engine = PolicyIteration::new(grid, config).unwrap();

        let solution = engine.run().unwrap();

        assert!(solution.converged);
        assert_eq!(solution.improvements, 0);
        // The policy is still the uniform one.
        let start = solution.policy.states.get(&Coord::new(0, 0)).unwrap();
        assert_float_eq!(start.probability(crate::gridworld::Direction::Up), 0.25, abs <= 0.0);
    }

    #[test]
    fn buffered_sweeps_differ_from_in_place_after_two_rounds() {
        let grid = GridWorld::new(2, 2).unwrap();
        let policy = Policy::uniform(&grid);

        let mut in_place = ValueTable::zeroed(&grid);
        let mut buffered = ValueTable::zeroed(&grid);
        for _ in 0..2 {
            in_place.sweep_in_place(&grid, &policy, 0.5).unwrap();
            buffered.sweep_buffered(&grid, &policy, 0.5).unwrap();
        }

        assert_float_eq!(in_place.get(Coord::new(0, 1)), 0.3203125, abs <= 1e-12);
        assert_float_eq!(buffered.get(Coord::new(0, 1)), 0.3125, abs <= 1e-12);
    }
}
