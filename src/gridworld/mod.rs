use std::fmt;

use prettytable::{Cell, Row, Table};
use serde::{Deserialize, Serialize};

use crate::solver::{Model, Policy, SolverError, ValueTable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub rows: i32,
    pub cols: i32,
}

impl Default for GridConfig {
    fn default() -> GridConfig {
        GridConfig { rows: 2, cols: 2 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coord {
    pub row: i32,
    pub col: i32,
}

impl Coord {
    pub fn new(row: i32, col: i32) -> Coord {
        Coord { row, col }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self {
            Direction::Up => "↑",
            Direction::Down => "↓",
            Direction::Left => "←",
            Direction::Right => "→",
        };
        write!(f, "{}", arrow)
    }
}

/// Rectangular grid with a single terminal goal square in the bottom-right
/// corner carrying reward 1; every other square carries reward 0. Moves off
/// the edge leave the position unchanged. Moving costs nothing.
pub struct GridWorld {
    rows: i32,
    cols: i32,
    goal: Coord,
}

impl GridWorld {
    pub fn new(rows: i32, cols: i32) -> Result<GridWorld, SolverError> {
        if rows <= 0 || cols <= 0 {
            return Err(SolverError::InvalidConfiguration(format!(
                "grid dimensions must be positive, got {}x{}",
                rows, cols
            )));
        }
        Ok(GridWorld {
            rows,
            cols,
            goal: Coord::new(rows - 1, cols - 1),
        })
    }

    pub fn from_config(config: &GridConfig) -> Result<GridWorld, SolverError> {
        GridWorld::new(config.rows, config.cols)
    }

    // Clamped to the grid bounds: stepping off an edge stays in place.
    fn neighbor(&self, coord: Coord, direction: Direction) -> Coord {
        match direction {
            Direction::Up => Coord::new((coord.row - 1).max(0), coord.col),
            Direction::Down => Coord::new((coord.row + 1).min(self.rows - 1), coord.col),
            Direction::Left => Coord::new(coord.row, (coord.col - 1).max(0)),
            Direction::Right => Coord::new(coord.row, (coord.col + 1).min(self.cols - 1)),
        }
    }
}

impl Model for GridWorld {
    type State = Coord;
    type Action = Direction;

    fn states(&self) -> Vec<Coord> {
        let mut states = Vec::new();
        for row in 0..self.rows {
            for col in 0..self.cols {
                states.push(Coord::new(row, col));
            }
        }
        states
    }

    fn legal_actions(&self, state: Coord) -> Vec<Direction> {
        if state == self.goal {
            Vec::new()
        } else {
            Direction::ALL.to_vec()
        }
    }

    fn expected_reward(&self, state: Coord) -> f64 {
        if state == self.goal {
            1.0
        } else {
            0.0
        }
    }

    fn apply_action(&self, state: Coord, action: Direction) -> Result<(Coord, f64), SolverError> {
        Ok((self.neighbor(state, action), 0.0))
    }
}

pub fn print_grid_values(grid: &GridWorld, values: &ValueTable<Coord>) {
    let mut table = Table::new();
    for row in 0..grid.rows {
        let mut cells = Vec::new();
        for col in 0..grid.cols {
            cells.push(Cell::new(
                format!("{:.2}", values.get(Coord::new(row, col))).as_str(),
            ));
        }
        table.add_row(Row::new(cells));
    }
    table.printstd();
}

pub fn print_grid_policy(grid: &GridWorld, policy: &Policy<Coord, Direction>) {
    let mut table = Table::new();
    for row in 0..grid.rows {
        let mut cells = Vec::new();
        for col in 0..grid.cols {
            let chosen: Vec<Direction> = match policy.states.get(&Coord::new(row, col)) {
                Some(policy_state) => policy_state
                    .actions
                    .iter()
                    .filter(|(_, probability)| **probability > 0.0)
                    .map(|(action, _)| *action)
                    .collect(),
                None => Vec::new(),
            };

            let symbol = match chosen.len() {
                0 => " ".to_string(),
                1 => chosen[0].to_string(),
                _ => "?".to_string(),
            };
            cells.push(Cell::new(symbol.as_str()));
        }
        table.add_row(Row::new(cells));
    }
    table.printstd();
}
