// File: src/world.rs
//
// A minimal world model backing the built-in surface: player position,
// facing, energy, and crystals, plus ground crystal deposits. Adapted from
// `models/game/{player,probot,grid}.py`, reduced to the fields the
// illustrative built-ins (`move`, `turn`, `inspect`, `give`, `collect`, ...)
// actually read or mutate. No persistence, rendering, or combat/economy
// systems -- those are out of scope (spec.md Non-goals).

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub fn turned(self, clockwise: bool) -> Self {
        use Direction::*;
        match (self, clockwise) {
            (North, true) => East,
            (East, true) => South,
            (South, true) => West,
            (West, true) => North,
            (North, false) => West,
            (West, false) => South,
            (South, false) => East,
            (East, false) => North,
        }
    }

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::East => "east",
            Direction::South => "south",
            Direction::West => "west",
        }
    }
}

/// What a probot is doing this instant, flipped by a transition's
/// `on_start`/`on_complete` -- `is_idle()` reads this rather than guessing
/// from position deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbotState {
    #[default]
    Idle,
    Moving,
    Turning,
}

#[derive(Debug, Clone)]
pub struct Probot {
    pub x: i32,
    pub y: i32,
    pub facing: Direction,
    pub energy: i64,
    pub crystals: i64,
    pub last_said: Option<String>,
    pub state: ProbotState,
}

impl Probot {
    pub fn new(x: i32, y: i32, starting_energy: i64) -> Self {
        Self {
            x,
            y,
            facing: Direction::North,
            energy: starting_energy,
            crystals: 0,
            last_said: None,
            state: ProbotState::Idle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    pub probot: Probot,
}

/// The shared board: dimensions, every player's probot, and crystal deposits
/// lying on the ground keyed by cell.
#[derive(Debug)]
pub struct Grid {
    pub width: i32,
    pub height: i32,
    pub players: HashMap<String, Player>,
    pub crystals_on_ground: HashMap<(i32, i32), i64>,
}

impl Grid {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height, players: HashMap::new(), crystals_on_ground: HashMap::new() }
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    pub fn player_at(&self, x: i32, y: i32) -> Option<&Player> {
        self.players.values().find(|p| p.probot.x == x && p.probot.y == y)
    }

    pub fn add_player(&mut self, id: impl Into<String>, x: i32, y: i32, starting_energy: i64) {
        let id = id.into();
        self.players.insert(id.clone(), Player { id, probot: Probot::new(x, y, starting_energy) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turning_cycles_through_all_four_directions() {
        let mut d = Direction::North;
        for expected in [Direction::East, Direction::South, Direction::West, Direction::North] {
            d = d.turned(true);
            assert_eq!(d, expected);
        }
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let grid = Grid::new(5, 5);
        assert!(!grid.in_bounds(-1, 0));
        assert!(!grid.in_bounds(5, 0));
        assert!(grid.in_bounds(4, 4));
    }
}
