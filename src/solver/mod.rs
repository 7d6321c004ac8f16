use std::collections::HashMap;
use std::error;
use std::fmt;
use std::hash::Hash;

pub mod policy_iteration;

#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    InvalidConfiguration(String),
    IllegalAction { state: String, action: String },
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::InvalidConfiguration(reason) => {
                write!(f, "invalid configuration: {}", reason)
            }
            SolverError::IllegalAction { state, action } => {
                write!(f, "action {} is not legal in state {}", action, state)
            }
        }
    }
}

impl error::Error for SolverError {}

/// A finite MDP presented as a per-state expected reward table and a
/// deterministic transition rule. The policy-iteration engine is generic over
/// this trait; the grid-world and the car-rental problem are the two
/// implementations.
pub trait Model {
    type State: Copy + Eq + Hash + Ord;
    type Action: Copy + Eq + Hash + Ord;

    /// All states, in a fixed enumeration order.
    /// Sweeps visit states in exactly this order.
    fn states(&self) -> Vec<Self::State>;

    /// Legal actions in this state.
    /// Empty marks a terminal state.
    fn legal_actions(&self, state: Self::State) -> Vec<Self::Action>;

    /// Expected immediate reward for landing in `state`.
    fn expected_reward(&self, state: Self::State) -> f64;

    /// Applies `action` to `state`, returning the successor state and the
    /// cost charged for taking the action.
    fn apply_action(
        &self,
        state: Self::State,
        action: Self::Action,
    ) -> Result<(Self::State, f64), SolverError>;
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PolicyState<A: Eq + Hash> {
    // Action selection probabilities.
    // Non-negative, sum to 1 over the legal actions of the state.
    pub actions: HashMap<A, f64>,
}

impl<A: Copy + Eq + Hash> PolicyState<A> {
    /// Equal probability for every legal action.
    pub fn uniform(legal_actions: &[A]) -> PolicyState<A> {
        let probability = 1.0 / legal_actions.len() as f64;
        PolicyState {
            actions: legal_actions
                .iter()
                .map(|action| (*action, probability))
                .collect(),
        }
    }

    /// Collapses onto the maximizing actions: each of the k actions attaining
    /// the maximum value gets probability 1/k, every other action an explicit
    /// 0. The maximum comparison is exact, so ties split mass only when the
    /// action values are bit-identical.
    pub fn greedy(action_values: &HashMap<A, f64>) -> PolicyState<A> {
        let max_value = action_values
            .values()
            .fold(f64::NEG_INFINITY, |a, b| a.max(*b));
        let maximizers = action_values
            .values()
            .filter(|value| **value == max_value)
            .count();
        let probability = 1.0 / maximizers as f64;

        PolicyState {
            actions: action_values
                .iter()
                .map(|(action, value)| {
                    (*action, if *value == max_value { probability } else { 0.0 })
                })
                .collect(),
        }
    }

    pub fn probability(&self, action: A) -> f64 {
        *self.actions.get(&action).unwrap_or(&0.0)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Policy<S: Eq + Hash, A: Eq + Hash> {
    // Terminal states carry no entry.
    pub states: HashMap<S, PolicyState<A>>,
}

impl<S: Copy + Eq + Hash + Ord, A: Copy + Eq + Hash> Policy<S, A> {
    /// Uniform random policy over each state's legal actions.
    pub fn uniform<M: Model<State = S, Action = A>>(model: &M) -> Policy<S, A> {
        let mut states = HashMap::new();
        for state in model.states() {
            let legal_actions = model.legal_actions(state);
            if legal_actions.is_empty() {
                continue;
            }
            states.insert(state, PolicyState::uniform(&legal_actions));
        }
        Policy { states }
    }
}

/// One-step lookahead value of a single action: the successor's expected
/// reward net of the action cost, plus the discounted successor value.
pub fn action_value<M: Model>(
    model: &M,
    values: &ValueTable<M::State>,
    state: M::State,
    action: M::Action,
    discount: f64,
) -> Result<f64, SolverError> {
    let (next_state, cost) = model.apply_action(state, action)?;
    Ok((model.expected_reward(next_state) - cost) + discount * values.get(next_state))
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValueTable<S: Eq + Hash> {
    values: HashMap<S, f64>,
}

impl<S: Copy + Eq + Hash + Ord> ValueTable<S> {
    /// Zero estimate for every state of the model, terminal states included.
    pub fn zeroed<M: Model<State = S>>(model: &M) -> ValueTable<S> {
        ValueTable {
            values: model.states().iter().map(|state| (*state, 0.0)).collect(),
        }
    }

    pub fn get(&self, state: S) -> f64 {
        *self.values.get(&state).unwrap_or(&0.0)
    }

    pub fn set(&mut self, state: S, value: f64) {
        self.values.insert(state, value);
    }

    /// Expected value of `state` under `policy_state`:
    /// sum over actions of probability * ((R(next) - cost) + discount * V(next)).
    pub fn backup<M: Model<State = S>>(
        &self,
        model: &M,
        policy_state: &PolicyState<M::Action>,
        state: S,
        discount: f64,
    ) -> Result<f64, SolverError> {
        let mut new_value = 0.0;
        for action in model.legal_actions(state) {
            let probability = policy_state.probability(action);
            if probability == 0.0 {
                continue;
            }
            new_value += probability * action_value(model, self, state, action, discount)?;
        }
        Ok(new_value)
    }

    /// One evaluation sweep over all states in the model's enumeration order.
    /// Each state's new value is written back immediately, so later states in
    /// the same sweep read already-updated values (Gauss-Seidel).
    /// Returns the maximum absolute change.
    pub fn sweep_in_place<M: Model<State = S>>(
        &mut self,
        model: &M,
        policy: &Policy<S, M::Action>,
        discount: f64,
    ) -> Result<f64, SolverError> {
        let mut max_delta: f64 = 0.0;
        for state in model.states() {
            let policy_state = match policy.states.get(&state) {
                Some(policy_state) => policy_state,
                None => continue,
            };
            let new_value = self.backup(model, policy_state, state, discount)?;
            max_delta = max_delta.max((new_value - self.get(state)).abs());
            self.set(state, new_value);
        }
        Ok(max_delta)
    }

    /// Synchronous variant of `sweep_in_place`: every backup reads the
    /// pre-sweep values, and nothing is written until the whole sweep has
    /// succeeded. Converges to the same fixed point along a different path.
    pub fn sweep_buffered<M: Model<State = S>>(
        &mut self,
        model: &M,
        policy: &Policy<S, M::Action>,
        discount: f64,
    ) -> Result<f64, SolverError> {
        let mut updates = Vec::new();
        for state in model.states() {
            let policy_state = match policy.states.get(&state) {
                Some(policy_state) => policy_state,
                None => continue,
            };
            updates.push((state, self.backup(model, policy_state, state, discount)?));
        }

        let mut max_delta: f64 = 0.0;
        for (state, new_value) in updates {
            max_delta = max_delta.max((new_value - self.get(state)).abs());
            self.set(state, new_value);
        }
        Ok(max_delta)
    }
}
